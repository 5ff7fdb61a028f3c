//! Transport abstraction for servo boards.

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use shared::AxisLabel;
use thiserror::Error;

/// Errors from a single actuator channel.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Low-level I/O error on the port.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The port could not be opened.
    #[error("Failed to open {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    /// Write or read attempted before `open` or after `close`.
    #[error("Channel not open")]
    NotOpen,

    /// No acknowledgment byte arrived within the ack timeout.
    #[error("Timeout waiting for acknowledgment")]
    Timeout,

    /// The stop flag was raised while waiting.
    #[error("Cancelled")]
    Cancelled,
}

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// A byte channel to one servo board.
///
/// Implementations must be `Send` so the control loop can own them on its
/// own thread.
pub trait ActuatorChannel: Send {
    /// Human-readable name, usually the port path.
    fn name(&self) -> &str;

    /// Open (or reopen) the underlying port.
    fn open(&mut self) -> ChannelResult<()>;

    fn is_open(&self) -> bool;

    /// Write one complete command. Does not wait for the ack.
    fn write(&mut self, command: &str) -> ChannelResult<()>;

    /// Block until one ack byte arrives.
    ///
    /// Returns [`ChannelError::Timeout`] once `timeout` elapses, and
    /// [`ChannelError::Cancelled`] as soon as `cancel` is observed set.
    fn read_ack(&mut self, timeout: Duration, cancel: &AtomicBool) -> ChannelResult<u8>;

    /// Release the port. Idempotent.
    fn close(&mut self);
}

/// Format an axis command, e.g. `X45`.
pub fn format_command(label: AxisLabel, degrees: i32) -> String {
    format!("{}{}", label.tag(), degrees)
}
