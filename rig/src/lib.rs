//! Face-tracking steering mirror.
//!
//! Wires the tracking registry and the servo control loop together around one
//! shared [`ControlTarget`](shared::ControlTarget):
//!
//! ```text
//! SensorFrame ─► TrackingRegistry ─► ControlTarget ◄─ ServoController ─► channels
//!                 (caller's thread)    (lock-free)      (servo thread)
//! ```

pub mod pipeline;

pub use pipeline::{MirrorRig, RigError};
