//! Control loop behavior against mock channels.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hardware::servo::{
    AckBehavior, ActuatorChannel, MockChannel, MockHandle, ServoConfig, ServoController,
};
use shared::{AxisLabel, AxisLimits, ControlTarget, RigConfig, TargetSnapshot};

fn config(axes: Vec<AxisLimits>) -> ServoConfig {
    ServoConfig {
        axes,
        ack_timeout: Duration::from_millis(30),
        idle_delay: Duration::from_millis(1),
        reconnect_interval: Duration::from_secs(3600),
    }
}

fn x_only() -> ServoConfig {
    config(vec![AxisLimits::new(AxisLabel::X, 40, 140)])
}

fn mocks(n: usize) -> (Vec<Box<dyn ActuatorChannel>>, Vec<MockHandle>) {
    let channels: Vec<MockChannel> = (0..n).map(|i| MockChannel::new(format!("mock{i}"))).collect();
    let handles = channels.iter().map(MockChannel::handle).collect();
    let boxed = channels
        .into_iter()
        .map(|c| Box::new(c) as Box<dyn ActuatorChannel>)
        .collect();
    (boxed, handles)
}

/// Poll `f` until it holds or `timeout` elapses.
fn wait_for(timeout: Duration, mut f: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    f()
}

#[test]
fn target_stream_is_clamped_and_deduplicated() {
    let (channels, handles) = mocks(1);
    let target = Arc::new(ControlTarget::default());
    let mut ctrl = ServoController::new(x_only(), target.clone(), channels);

    let mut per_step = Vec::new();
    for value in [90, 90, 200, 200, 90] {
        target.set_axis(AxisLabel::X, value);
        ctrl.step();
        per_step.push(handles[0].take_commands());
    }

    let expected: Vec<Vec<String>> = vec![
        vec![],
        vec![],
        vec!["X140".to_string()],
        vec![],
        vec!["X90".to_string()],
    ];
    assert_eq!(per_step, expected);
}

#[test]
fn first_value_sent_when_it_differs_from_initial() {
    let (channels, handles) = mocks(1);
    let target = Arc::new(ControlTarget::new(TargetSnapshot::uniform(60)));
    let mut ctrl = ServoController::new(x_only(), target.clone(), channels);

    target.set_axis(AxisLabel::X, 90);
    ctrl.step();
    assert_eq!(handles[0].take_commands(), vec!["X90"]);
}

#[test]
fn priming_below_bound_sends_lower_bound_first() {
    let (channels, handles) = mocks(1);
    let target = Arc::new(ControlTarget::default());
    target.set_axis(AxisLabel::X, 39);
    let mut ctrl = ServoController::new(x_only(), target.clone(), channels);

    for value in [40, 42, 44] {
        target.set_axis(AxisLabel::X, value);
        ctrl.step();
    }
    assert_eq!(handles[0].take_commands(), vec!["X40", "X42", "X44"]);
}

#[test]
fn priming_at_bound_skips_lower_bound() {
    let (channels, handles) = mocks(1);
    let target = Arc::new(ControlTarget::default());
    target.set_axis(AxisLabel::X, 40);
    let mut ctrl = ServoController::new(x_only(), target.clone(), channels);

    target.set_axis(AxisLabel::X, 40);
    ctrl.step();
    assert!(handles[0].take_commands().is_empty());
}

#[test]
fn identical_targets_produce_no_traffic() {
    let (channels, handles) = mocks(2);
    let target = Arc::new(ControlTarget::default());
    let mut ctrl = ServoController::new(ServoConfig::from_rig(&RigConfig::four_axis()), target.clone(), channels);

    target.publish(45, 45, 13);
    ctrl.step();
    for _ in 0..50 {
        target.publish(45, 45, 13);
        assert_eq!(ctrl.step().commands_sent, 0);
    }
    for handle in &handles {
        assert_eq!(handle.commands(), vec!["X45", "Y45", "A40", "B40"]);
    }
}

#[test]
fn commands_stay_within_bounds() {
    let rig = RigConfig::four_axis();
    let (channels, handles) = mocks(1);
    let target = Arc::new(ControlTarget::default());
    let mut ctrl = ServoController::new(ServoConfig::from_rig(&rig), target.clone(), channels);

    for value in (-400..=400).step_by(7) {
        target.publish(value, -value, 13);
        ctrl.step();
    }

    for command in handles[0].commands() {
        let label = AxisLabel::from_tag(command.chars().next().unwrap()).unwrap();
        let value: i32 = command[1..].parse().unwrap();
        let limits = rig.axis(label).unwrap();
        assert!(
            (limits.min..=limits.max).contains(&value),
            "{command} outside [{}, {}]",
            limits.min,
            limits.max
        );
    }
}

#[test]
fn ack_timeout_faults_only_that_channel() {
    let (channels, handles) = mocks(2);
    handles[0].set_behavior(AckBehavior::Silent);
    let target = Arc::new(ControlTarget::default());
    let mut ctrl = ServoController::new(x_only(), target.clone(), channels);

    target.set_axis(AxisLabel::X, 100);
    let outcome = ctrl.step();
    assert_eq!(outcome.faults, 1);
    assert_eq!(ctrl.faulted_channels(), vec!["mock0"]);

    target.set_axis(AxisLabel::X, 110);
    let outcome = ctrl.step();
    assert_eq!(outcome.faults, 0);
    assert_eq!(outcome.commands_sent, 1);

    assert_eq!(handles[0].commands(), vec!["X100"]);
    assert_eq!(handles[1].commands(), vec!["X100", "X110"]);
    assert_eq!(handles[0].close_count(), 1);
}

#[test]
fn faulted_channel_resumes_after_reconnect() {
    let (channels, handles) = mocks(1);
    handles[0].set_behavior(AckBehavior::Silent);
    let target = Arc::new(ControlTarget::default());
    let mut servo_config = x_only();
    servo_config.reconnect_interval = Duration::ZERO;
    let mut ctrl = ServoController::new(servo_config, target.clone(), channels);

    target.set_axis(AxisLabel::X, 100);
    assert_eq!(ctrl.step().faults, 1);

    handles[0].set_behavior(AckBehavior::Immediate);
    // Unchanged target: reconnect happens, nothing is re-sent.
    let outcome = ctrl.step();
    assert_eq!(outcome.reconnects, 1);
    assert_eq!(outcome.commands_sent, 0);

    target.set_axis(AxisLabel::X, 120);
    assert_eq!(ctrl.step().commands_sent, 1);

    assert_eq!(handles[0].commands(), vec!["X100", "X120"]);
    assert_eq!(handles[0].open_count(), 2);
    assert_eq!(ctrl.stats().reconnects, 1);
    assert_eq!(ctrl.stats().faults, 1);
}

#[test]
fn spawned_loop_follows_target() {
    let (channels, handles) = mocks(1);
    let target = Arc::new(ControlTarget::default());
    let servo = ServoController::new(x_only(), target.clone(), channels)
        .spawn()
        .unwrap();

    for value in [50, 60, 70, 200] {
        target.set_axis(AxisLabel::X, value);
        thread::sleep(Duration::from_millis(5));
    }

    let handle = handles[0].clone();
    assert!(wait_for(Duration::from_secs(2), || {
        handle.commands().last().map(String::as_str) == Some("X140")
    }));

    let stats = servo.shutdown();
    assert!(stats.commands_sent >= 1);
    assert_eq!(handles[0].close_count(), 1);
}

#[test]
fn shutdown_interrupts_blocking_ack() {
    let (channels, handles) = mocks(1);
    handles[0].set_behavior(AckBehavior::Silent);
    let target = Arc::new(ControlTarget::default());
    let mut servo_config = x_only();
    servo_config.ack_timeout = Duration::from_secs(60);
    let servo = ServoController::new(servo_config, target.clone(), channels)
        .spawn()
        .unwrap();

    target.set_axis(AxisLabel::X, 100);
    let handle = handles[0].clone();
    assert!(wait_for(Duration::from_secs(2), || !handle.commands().is_empty()));

    let start = Instant::now();
    let stats = servo.shutdown();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(stats.faults, 0);
    assert_eq!(handles[0].close_count(), 1);
}

#[test]
fn dropping_handle_stops_loop() {
    let (channels, handles) = mocks(1);
    let target = Arc::new(ControlTarget::default());
    let servo = ServoController::new(x_only(), target, channels)
        .spawn()
        .unwrap();
    assert!(servo.is_running());
    drop(servo);
    assert_eq!(handles[0].close_count(), 1);
}
