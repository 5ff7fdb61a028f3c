//! Actuator drivers for the steering mirror.
//!
//! The mirror is positioned by hobby servos behind small microcontroller
//! boards, one board per serial port. Each board accepts `<axis><degrees>`
//! ASCII commands and acknowledges every command with a single byte.
//!
//! # Features
//!
//! - `serial` - [`SerialChannel`](servo::SerialChannel) over the `serialport`
//!   crate, and the `servo_tool` binary
//!
//! Without `serial` only the [`MockChannel`](servo::MockChannel) is available,
//! which is enough to run the control loop in tests and dry runs.

pub mod servo;
