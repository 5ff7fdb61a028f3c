//! In-memory actuator channel for tests and dry runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use super::channel::{ActuatorChannel, ChannelError, ChannelResult};

/// Poll interval while a silent mock waits out its timeout.
const SILENT_POLL: Duration = Duration::from_millis(1);

/// Commands kept by a mock before the oldest are discarded.
pub const DEFAULT_LOG_CAPACITY: usize = 4096;

/// How a [`MockChannel`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckBehavior {
    /// Ack every command at once.
    #[default]
    Immediate,
    /// Never ack; `read_ack` waits out its timeout.
    Silent,
    /// Every write fails with an I/O error.
    FailWrites,
}

#[derive(Debug)]
struct MockState {
    commands: VecDeque<String>,
    log_capacity: usize,
    behavior: AckBehavior,
    fail_open: bool,
    opens: usize,
    closes: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            commands: VecDeque::new(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            behavior: AckBehavior::default(),
            fail_open: false,
            opens: 0,
            closes: 0,
        }
    }
}

impl MockState {
    fn record(&mut self, command: &str) {
        if self.log_capacity == 0 {
            return;
        }
        while self.commands.len() >= self.log_capacity {
            self.commands.pop_front();
        }
        self.commands.push_back(command.to_string());
    }
}

/// Test-side view of a [`MockChannel`], shared with the channel itself.
#[derive(Debug, Clone, Default)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// The most recent commands written, oldest first.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.iter().cloned().collect()
    }

    /// Drain the command log.
    pub fn take_commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.drain(..).collect()
    }

    /// Bound the command log to the last `capacity` entries. Zero disables it.
    pub fn set_log_capacity(&self, capacity: usize) {
        let mut state = self.state.lock().unwrap();
        state.log_capacity = capacity;
        let excess = state.commands.len().saturating_sub(capacity);
        state.commands.drain(..excess);
    }

    pub fn set_behavior(&self, behavior: AckBehavior) {
        self.state.lock().unwrap().behavior = behavior;
    }

    /// Make subsequent `open` calls fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().unwrap().fail_open = fail;
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

/// Channel that logs commands instead of driving hardware.
#[derive(Debug)]
pub struct MockChannel {
    name: String,
    open: bool,
    handle: MockHandle,
}

impl MockChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            open: false,
            handle: MockHandle::default(),
        }
    }

    pub fn with_behavior(self, behavior: AckBehavior) -> Self {
        self.handle.set_behavior(behavior);
        self
    }

    pub fn with_log_capacity(self, capacity: usize) -> Self {
        self.handle.set_log_capacity(capacity);
        self
    }

    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }
}

impl ActuatorChannel for MockChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> ChannelResult<()> {
        let mut state = self.handle.state.lock().unwrap();
        if state.fail_open {
            return Err(ChannelError::OpenFailed {
                port: self.name.clone(),
                reason: "mock configured to fail".to_string(),
            });
        }
        state.opens += 1;
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn write(&mut self, command: &str) -> ChannelResult<()> {
        if !self.open {
            return Err(ChannelError::NotOpen);
        }
        let mut state = self.handle.state.lock().unwrap();
        if state.behavior == AckBehavior::FailWrites {
            return Err(ChannelError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock write failure",
            )));
        }
        debug!("{} <- {}", self.name, command);
        state.record(command);
        Ok(())
    }

    fn read_ack(&mut self, timeout: Duration, cancel: &AtomicBool) -> ChannelResult<u8> {
        if !self.open {
            return Err(ChannelError::NotOpen);
        }
        let behavior = self.handle.state.lock().unwrap().behavior;
        if behavior != AckBehavior::Silent {
            return Ok(b'\n');
        }

        let deadline = Instant::now() + timeout;
        loop {
            if cancel.load(Ordering::Relaxed) {
                return Err(ChannelError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(ChannelError::Timeout);
            }
            thread::sleep(SILENT_POLL);
        }
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.handle.state.lock().unwrap().closes += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_open() {
        let mut channel = MockChannel::new("mock0");
        assert!(matches!(channel.write("X1"), Err(ChannelError::NotOpen)));
        channel.open().unwrap();
        channel.write("X1").unwrap();
        assert_eq!(channel.handle().commands(), vec!["X1"]);
    }

    #[test]
    fn test_silent_times_out() {
        let mut channel = MockChannel::new("mock0").with_behavior(AckBehavior::Silent);
        channel.open().unwrap();
        let cancel = AtomicBool::new(false);
        let start = Instant::now();
        assert!(matches!(
            channel.read_ack(Duration::from_millis(20), &cancel),
            Err(ChannelError::Timeout)
        ));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_silent_observes_cancel() {
        let mut channel = MockChannel::new("mock0").with_behavior(AckBehavior::Silent);
        channel.open().unwrap();
        let cancel = AtomicBool::new(true);
        assert!(matches!(
            channel.read_ack(Duration::from_secs(10), &cancel),
            Err(ChannelError::Cancelled)
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut channel = MockChannel::new("mock0");
        let handle = channel.handle();
        channel.open().unwrap();
        channel.close();
        channel.close();
        assert_eq!(handle.open_count(), 1);
        assert_eq!(handle.close_count(), 1);
    }

    #[test]
    fn test_log_keeps_most_recent_commands() {
        let mut channel = MockChannel::new("mock0").with_log_capacity(3);
        let handle = channel.handle();
        channel.open().unwrap();
        for i in 0..10 {
            channel.write(&format!("X{i}")).unwrap();
        }
        assert_eq!(handle.commands(), vec!["X7", "X8", "X9"]);

        handle.set_log_capacity(1);
        assert_eq!(handle.take_commands(), vec!["X9"]);
        assert!(handle.commands().is_empty());
    }

    #[test]
    fn test_default_log_is_bounded() {
        let mut channel = MockChannel::new("mock0");
        let handle = channel.handle();
        channel.open().unwrap();
        for _ in 0..DEFAULT_LOG_CAPACITY + 10 {
            channel.write("X90").unwrap();
        }
        assert_eq!(handle.commands().len(), DEFAULT_LOG_CAPACITY);
    }

    #[test]
    fn test_disabled_log_still_accepts_writes() {
        let mut channel = MockChannel::new("dry-run").with_log_capacity(0);
        channel.open().unwrap();
        channel.write("X90").unwrap();
        assert!(channel.handle().commands().is_empty());
    }

    #[test]
    fn test_fail_open() {
        let mut channel = MockChannel::new("mock0");
        channel.handle().set_fail_open(true);
        assert!(matches!(channel.open(), Err(ChannelError::OpenFailed { .. })));
        assert!(!channel.is_open());
    }
}
