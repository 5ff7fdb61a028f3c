//! Shared components for the face-tracking mirror rig.
//!
//! Holds the pieces both sides of the system agree on: the lock-free
//! [`ControlTarget`](control_target::ControlTarget) that the tracking pipeline
//! writes and the servo loop reads, the axis labels used on the wire, and the
//! rig configuration with its on-disk storage.

pub mod axis;
pub mod config_storage;
pub mod control_target;
pub mod rig_config;

pub use axis::AxisLabel;
pub use control_target::{ControlTarget, TargetSnapshot};
pub use rig_config::{AxisLimits, ConfigError, RigConfig, RigVariant};
