//! Per-axis command state.

use shared::{AxisLabel, AxisLimits, TargetSnapshot};

/// One servo axis on one channel: its clamp bounds and the last value
/// written to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorAxis {
    limits: AxisLimits,
    last_commanded: i32,
}

impl ActuatorAxis {
    pub fn new(limits: AxisLimits, last_commanded: i32) -> Self {
        Self {
            limits,
            last_commanded,
        }
    }

    pub fn label(&self) -> AxisLabel {
        self.limits.label
    }

    pub fn limits(&self) -> &AxisLimits {
        &self.limits
    }

    pub fn last_commanded(&self) -> i32 {
        self.last_commanded
    }

    pub fn clamp(&self, degrees: i32) -> i32 {
        self.limits.clamp(degrees)
    }

    /// The clamped value to send for this snapshot, or `None` if it matches
    /// what was last sent.
    pub fn pending(&self, snapshot: &TargetSnapshot) -> Option<i32> {
        let value = self.clamp(snapshot.get(self.label()));
        (value != self.last_commanded).then_some(value)
    }

    /// Mark `degrees` as sent. Called once the write succeeds, before the ack.
    pub fn record_sent(&mut self, degrees: i32) {
        self.last_commanded = degrees;
    }

    /// Reset to a raw (unclamped) target value.
    pub fn prime(&mut self, snapshot: &TargetSnapshot) {
        self.last_commanded = snapshot.get(self.label());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn x_axis() -> ActuatorAxis {
        ActuatorAxis::new(AxisLimits::new(AxisLabel::X, 40, 140), 90)
    }

    #[rstest]
    #[case(90, None)]
    #[case(91, Some(91))]
    #[case(200, Some(140))]
    #[case(-5, Some(40))]
    fn test_pending(#[case] target: i32, #[case] expected: Option<i32>) {
        let snap = TargetSnapshot::uniform(90).with(AxisLabel::X, target);
        assert_eq!(x_axis().pending(&snap), expected);
    }

    #[test]
    fn test_record_sent_suppresses_repeat() {
        let mut axis = x_axis();
        let snap = TargetSnapshot::uniform(200);
        let value = axis.pending(&snap).unwrap();
        axis.record_sent(value);
        assert_eq!(axis.pending(&snap), None);
        assert_eq!(axis.last_commanded(), 140);
    }

    #[test]
    fn test_prime_uses_raw_value() {
        let mut axis = x_axis();
        axis.prime(&TargetSnapshot::uniform(10));
        assert_eq!(axis.last_commanded(), 10);
        // Clamped 40 differs from the raw 10, so it is still sent once.
        assert_eq!(axis.pending(&TargetSnapshot::uniform(10)), Some(40));
    }

    #[test]
    fn test_ignores_other_axes() {
        let snap = TargetSnapshot::uniform(90).with(AxisLabel::Y, 10);
        assert_eq!(x_axis().pending(&snap), None);
    }
}
