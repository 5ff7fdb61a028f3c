//! Servo actuator control.
//!
//! # Wire protocol
//!
//! Commands are the axis label followed by the integer angle in degrees, with
//! no terminator and no checksum:
//!
//! ```text
//! host  → board : X45
//! board → host  : <one byte, contents ignored>
//! ```
//!
//! The link is half-duplex in practice: the board only reads the next command
//! after it has acknowledged the previous one, so the host waits for the ack
//! byte before sending again.
//!
//! # Components
//!
//! - [`ActuatorChannel`] - transport seam (serial port or mock)
//! - [`ActuatorAxis`] - clamp bounds and last commanded value for one axis
//! - [`ServoController`] - the polling loop that turns
//!   [`ControlTarget`](shared::ControlTarget) changes into commands

pub mod axis;
pub mod channel;
pub mod controller;
pub mod mock;
#[cfg(feature = "serial")]
pub mod serial;

pub use axis::ActuatorAxis;
pub use channel::{format_command, ActuatorChannel, ChannelError, ChannelResult};
pub use controller::{ServoConfig, ServoController, ServoHandle, ServoStats, StepOutcome};
pub use mock::{AckBehavior, MockChannel, MockHandle};
#[cfg(feature = "serial")]
pub use serial::{available_ports, SerialChannel, DEFAULT_BAUD_RATE};
