//! The servo control loop.
//!
//! The loop polls the shared [`ControlTarget`] and sends a command for every
//! axis whose clamped target differs from what that axis last received. Each
//! command blocks on its acknowledgment before the next is sent, so one slow
//! board delays only the axes behind it on the same channel, and never for
//! longer than the ack timeout.
//!
//! ```text
//! loop {
//!     snapshot = target.snapshot()
//!     for channel:
//!         faulted?  → reconnect if the interval elapsed, else skip
//!         for axis: clamp → changed? → write → record → read_ack
//!     nothing sent → sleep(idle_delay)
//! }
//! ```
//!
//! A write error or ack timeout marks the channel faulted and closes it.
//! Faulted channels are reopened no more often than the reconnect interval,
//! and then resume with whatever values differ from the last ones sent.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use shared::{AxisLabel, AxisLimits, ControlTarget, RigConfig, TargetSnapshot};
use tracing::{debug, error, info, warn};

use super::axis::ActuatorAxis;
use super::channel::{format_command, ActuatorChannel, ChannelError};

/// Loop timing and axis bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct ServoConfig {
    pub axes: Vec<AxisLimits>,
    pub ack_timeout: Duration,
    /// Sleep after an iteration that sent nothing. Zero busy-polls.
    pub idle_delay: Duration,
    pub reconnect_interval: Duration,
}

impl ServoConfig {
    pub fn from_rig(config: &RigConfig) -> Self {
        Self {
            axes: config.axes.clone(),
            ack_timeout: config.ack_timeout(),
            idle_delay: config.idle_delay(),
            reconnect_interval: config.reconnect_interval(),
        }
    }
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self::from_rig(&RigConfig::default())
    }
}

/// Counters accumulated over the life of a controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServoStats {
    pub iterations: u64,
    pub commands_sent: u64,
    pub faults: u64,
    pub reconnects: u64,
}

/// Result of one loop iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub commands_sent: usize,
    /// Channels that faulted during this iteration.
    pub faults: usize,
    pub reconnects: usize,
    /// The stop flag interrupted the iteration.
    pub cancelled: bool,
}

struct ChannelSlot {
    channel: Box<dyn ActuatorChannel>,
    axes: Vec<ActuatorAxis>,
    faulted_since: Option<Instant>,
}

impl ChannelSlot {
    /// Send every pending axis value. Returns the number of commands sent
    /// before the first error, if any.
    fn service(
        &mut self,
        snapshot: &TargetSnapshot,
        ack_timeout: Duration,
        stop: &AtomicBool,
    ) -> (usize, Option<ChannelError>) {
        let mut sent = 0;
        for axis in self.axes.iter_mut() {
            let Some(value) = axis.pending(snapshot) else {
                continue;
            };
            let command = format_command(axis.label(), value);

            if let Err(e) = self.channel.write(&command) {
                return (sent, Some(e));
            }
            axis.record_sent(value);
            sent += 1;

            if let Err(e) = self.channel.read_ack(ack_timeout, stop) {
                return (sent, Some(e));
            }
        }
        (sent, None)
    }

    fn mark_faulted(&mut self, now: Instant) {
        self.channel.close();
        self.faulted_since = Some(now);
    }
}

/// Drives a set of actuator channels from a shared [`ControlTarget`].
pub struct ServoController {
    slots: Vec<ChannelSlot>,
    target: Arc<ControlTarget>,
    config: ServoConfig,
    stop: Arc<AtomicBool>,
    stats: ServoStats,
}

impl ServoController {
    /// Take ownership of `channels`, opening any that are not yet open.
    ///
    /// A channel that fails to open starts out faulted and is retried on the
    /// reconnect schedule. Every axis is primed with the target value current
    /// at construction, so nothing is sent until the target changes.
    pub fn new(
        config: ServoConfig,
        target: Arc<ControlTarget>,
        channels: Vec<Box<dyn ActuatorChannel>>,
    ) -> Self {
        let snapshot = target.snapshot();
        let now = Instant::now();

        let slots = channels
            .into_iter()
            .map(|mut channel| {
                let mut faulted_since = None;
                if !channel.is_open() {
                    if let Err(e) = channel.open() {
                        warn!("Channel {} unavailable: {e}", channel.name());
                        faulted_since = Some(now);
                    }
                }
                let axes = config
                    .axes
                    .iter()
                    .map(|limits| ActuatorAxis::new(*limits, snapshot.get(limits.label)))
                    .collect();
                ChannelSlot {
                    channel,
                    axes,
                    faulted_since,
                }
            })
            .collect();

        Self {
            slots,
            target,
            config,
            stop: Arc::new(AtomicBool::new(false)),
            stats: ServoStats::default(),
        }
    }

    pub fn config(&self) -> &ServoConfig {
        &self.config
    }

    pub fn target(&self) -> &Arc<ControlTarget> {
        &self.target
    }

    pub fn stats(&self) -> ServoStats {
        self.stats
    }

    /// Flag that ends [`run`](Self::run) and interrupts a pending ack read.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn channel_count(&self) -> usize {
        self.slots.len()
    }

    /// Channels currently faulted.
    pub fn faulted_channels(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|s| s.faulted_since.is_some())
            .map(|s| s.channel.name())
            .collect()
    }

    /// Last value sent to one axis of one channel.
    pub fn last_commanded(&self, channel: usize, label: AxisLabel) -> Option<i32> {
        self.slots
            .get(channel)?
            .axes
            .iter()
            .find(|a| a.label() == label)
            .map(ActuatorAxis::last_commanded)
    }

    /// Reset every axis's last commanded value to the current raw target.
    pub fn prime(&mut self) {
        let snapshot = self.target.snapshot();
        for axis in self.slots.iter_mut().flat_map(|s| s.axes.iter_mut()) {
            axis.prime(&snapshot);
        }
    }

    /// Run exactly one loop iteration.
    pub fn step(&mut self) -> StepOutcome {
        let snapshot = self.target.snapshot();
        let mut outcome = StepOutcome::default();
        self.stats.iterations += 1;

        for slot in self.slots.iter_mut() {
            if self.stop.load(Ordering::Relaxed) {
                outcome.cancelled = true;
                break;
            }

            if let Some(since) = slot.faulted_since {
                if since.elapsed() < self.config.reconnect_interval {
                    continue;
                }
                match slot.channel.open() {
                    Ok(()) => {
                        info!("Channel {} reconnected", slot.channel.name());
                        slot.faulted_since = None;
                        outcome.reconnects += 1;
                    }
                    Err(e) => {
                        debug!("Reconnect of {} failed: {e}", slot.channel.name());
                        slot.faulted_since = Some(Instant::now());
                        continue;
                    }
                }
            }

            let (sent, err) = slot.service(&snapshot, self.config.ack_timeout, &self.stop);
            outcome.commands_sent += sent;

            match err {
                None => {}
                Some(ChannelError::Cancelled) => {
                    outcome.cancelled = true;
                    break;
                }
                Some(e) => {
                    warn!("Channel {} faulted: {e}", slot.channel.name());
                    slot.mark_faulted(Instant::now());
                    outcome.faults += 1;
                }
            }
        }

        self.stats.commands_sent += outcome.commands_sent as u64;
        self.stats.faults += outcome.faults as u64;
        self.stats.reconnects += outcome.reconnects as u64;
        outcome
    }

    /// Loop until the stop flag is raised, then close every channel.
    pub fn run(&mut self) -> ServoStats {
        info!(
            "Servo loop started with {} channel(s), {} axes each",
            self.slots.len(),
            self.config.axes.len()
        );

        while !self.stop.load(Ordering::Relaxed) {
            let outcome = self.step();
            if outcome.commands_sent == 0 && !outcome.cancelled && !self.config.idle_delay.is_zero()
            {
                thread::sleep(self.config.idle_delay);
            }
        }

        self.close_all();
        info!(
            "Servo loop stopped: {} iterations, {} commands, {} faults, {} reconnects",
            self.stats.iterations,
            self.stats.commands_sent,
            self.stats.faults,
            self.stats.reconnects
        );
        self.stats
    }

    /// Close every channel. Faulted channels are already closed.
    pub fn close_all(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.channel.close();
        }
    }

    /// Move the loop onto its own thread.
    pub fn spawn(mut self) -> io::Result<ServoHandle> {
        let stop = self.stop.clone();
        let join = thread::Builder::new()
            .name("servo-loop".to_string())
            .spawn(move || self.run())?;
        Ok(ServoHandle {
            stop,
            join: Some(join),
        })
    }
}

/// Owner of a running servo loop thread. Dropping it stops the loop.
pub struct ServoHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<ServoStats>>,
}

impl ServoHandle {
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|j| !j.is_finished())
    }

    /// Signal stop, wait for the loop to close its channels and exit.
    pub fn shutdown(mut self) -> ServoStats {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> ServoStats {
        self.stop.store(true, Ordering::Relaxed);
        match self.join.take().map(JoinHandle::join) {
            Some(Ok(stats)) => stats,
            Some(Err(_)) => {
                error!("Servo loop thread panicked");
                ServoStats::default()
            }
            None => ServoStats::default(),
        }
    }
}

impl Drop for ServoHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.stop_and_join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servo::mock::{AckBehavior, MockChannel, MockHandle};

    fn two_axis_config() -> ServoConfig {
        ServoConfig {
            axes: vec![
                AxisLimits::new(AxisLabel::X, 20, 160),
                AxisLimits::new(AxisLabel::Y, 20, 160),
            ],
            ack_timeout: Duration::from_millis(20),
            idle_delay: Duration::ZERO,
            reconnect_interval: Duration::ZERO,
        }
    }

    fn controller(channels: usize) -> (ServoController, Vec<MockHandle>) {
        let mut handles = Vec::new();
        let mut boxed: Vec<Box<dyn ActuatorChannel>> = Vec::new();
        for i in 0..channels {
            let channel = MockChannel::new(format!("mock{i}"));
            handles.push(channel.handle());
            boxed.push(Box::new(channel));
        }
        let target = Arc::new(ControlTarget::default());
        (ServoController::new(two_axis_config(), target, boxed), handles)
    }

    #[test]
    fn test_new_opens_channels_and_primes() {
        let (ctrl, handles) = controller(2);
        assert_eq!(handles[0].open_count(), 1);
        assert_eq!(handles[1].open_count(), 1);
        assert_eq!(ctrl.last_commanded(0, AxisLabel::X), Some(90));
        assert_eq!(ctrl.last_commanded(1, AxisLabel::Y), Some(90));
        assert_eq!(ctrl.last_commanded(0, AxisLabel::A), None);
    }

    #[test]
    fn test_no_change_sends_nothing() {
        let (mut ctrl, handles) = controller(1);
        let outcome = ctrl.step();
        assert_eq!(outcome.commands_sent, 0);
        assert!(handles[0].commands().is_empty());
    }

    #[test]
    fn test_every_channel_receives_every_change() {
        let (mut ctrl, handles) = controller(3);
        ctrl.target().publish(45, 61, 13);

        let outcome = ctrl.step();
        assert_eq!(outcome.commands_sent, 6);
        for handle in &handles {
            assert_eq!(handle.commands(), vec!["X45", "Y61"]);
        }
    }

    #[test]
    fn test_write_failure_faults_channel() {
        let (mut ctrl, handles) = controller(2);
        handles[0].set_behavior(AckBehavior::FailWrites);
        ctrl.target().set_axis(AxisLabel::X, 100);

        let outcome = ctrl.step();
        assert_eq!(outcome.faults, 1);
        assert_eq!(outcome.commands_sent, 1);
        assert_eq!(ctrl.faulted_channels(), vec!["mock0"]);
        // The failed write was never recorded.
        assert_eq!(ctrl.last_commanded(0, AxisLabel::X), Some(90));
        assert_eq!(handles[0].close_count(), 1);
    }

    #[test]
    fn test_unopenable_channel_starts_faulted() {
        let channel = MockChannel::new("mock0");
        let handle = channel.handle();
        handle.set_fail_open(true);
        let channels: Vec<Box<dyn ActuatorChannel>> = vec![Box::new(channel)];
        let target = Arc::new(ControlTarget::default());
        let mut ctrl = ServoController::new(two_axis_config(), target, channels);
        assert_eq!(ctrl.faulted_channels(), vec!["mock0"]);

        handle.set_fail_open(false);
        ctrl.target().set_axis(AxisLabel::Y, 30);
        let outcome = ctrl.step();
        assert_eq!(outcome.reconnects, 1);
        assert_eq!(handle.commands(), vec!["Y30"]);
    }

    #[test]
    fn test_step_observes_stop_flag() {
        let (mut ctrl, handles) = controller(1);
        ctrl.target().set_axis(AxisLabel::X, 50);
        ctrl.stop_flag().store(true, Ordering::Relaxed);

        assert!(ctrl.step().cancelled);
        assert!(handles[0].commands().is_empty());
    }

    #[test]
    fn test_run_closes_channels() {
        let (mut ctrl, handles) = controller(2);
        ctrl.stop_flag().store(true, Ordering::Relaxed);
        ctrl.run();
        assert_eq!(handles[0].close_count(), 1);
        assert_eq!(handles[1].close_count(), 1);
    }

    #[test]
    fn test_config_from_rig() {
        let config = ServoConfig::from_rig(&RigConfig::four_axis());
        assert_eq!(config.axes.len(), 4);
        assert_eq!(config.ack_timeout, Duration::from_millis(500));
        assert_eq!(config.idle_delay, Duration::from_millis(1));
    }
}
