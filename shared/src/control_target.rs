//! Lock-free shared control target.
//!
//! The tracking pipeline publishes orientation targets once per sensor frame
//! while the servo loop polls them continuously on its own thread. Neither side
//! may block the other, and a reader must never observe half of one publish
//! and half of another. All four axis targets are therefore packed into a
//! single `AtomicU64` (four `i16` lanes) and every read or write is one atomic
//! operation.
//!
//! ```
//! use shared::{AxisLabel, ControlTarget};
//!
//! let target = ControlTarget::default();
//! target.publish_degrees(44.6, 61.2, 13);
//!
//! let snap = target.snapshot();
//! assert_eq!(snap.get(AxisLabel::X), 45);
//! assert_eq!(snap.get(AxisLabel::Y), 61);
//! assert_eq!(snap.get(AxisLabel::A), 32);
//! assert_eq!(snap.get(AxisLabel::B), 48);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use crate::axis::AxisLabel;

/// Slider position every axis starts from before the first estimate arrives.
pub const DEFAULT_TARGET_DEGREES: i32 = 90;

/// Round to the nearest whole degree, halves rounding up.
///
/// Non-finite input saturates (NaN maps to 0) rather than panicking.
pub fn round_half_up(degrees: f64) -> i32 {
    (degrees + 0.5).floor() as i32
}

/// One consistent view of all four axis targets, in whole degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetSnapshot {
    pub x: i16,
    pub y: i16,
    pub a: i16,
    pub b: i16,
}

impl TargetSnapshot {
    /// Snapshot with every axis at the same value.
    pub fn uniform(degrees: i32) -> Self {
        let v = saturate(degrees);
        Self {
            x: v,
            y: v,
            a: v,
            b: v,
        }
    }

    /// Target for one axis.
    pub fn get(&self, label: AxisLabel) -> i32 {
        i32::from(match label {
            AxisLabel::X => self.x,
            AxisLabel::Y => self.y,
            AxisLabel::A => self.a,
            AxisLabel::B => self.b,
        })
    }

    /// Copy with one axis replaced.
    pub fn with(mut self, label: AxisLabel, degrees: i32) -> Self {
        let v = saturate(degrees);
        match label {
            AxisLabel::X => self.x = v,
            AxisLabel::Y => self.y = v,
            AxisLabel::A => self.a = v,
            AxisLabel::B => self.b = v,
        }
        self
    }

    fn pack(&self) -> u64 {
        u64::from(self.x as u16)
            | (u64::from(self.y as u16) << 16)
            | (u64::from(self.a as u16) << 32)
            | (u64::from(self.b as u16) << 48)
    }

    fn unpack(word: u64) -> Self {
        Self {
            x: word as u16 as i16,
            y: (word >> 16) as u16 as i16,
            a: (word >> 32) as u16 as i16,
            b: (word >> 48) as u16 as i16,
        }
    }
}

impl Default for TargetSnapshot {
    fn default() -> Self {
        Self::uniform(DEFAULT_TARGET_DEGREES)
    }
}

fn saturate(degrees: i32) -> i16 {
    degrees.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Process-wide orientation target shared between the tracking pipeline and
/// the servo loop. Last write wins.
#[derive(Debug)]
pub struct ControlTarget {
    packed: AtomicU64,
}

impl ControlTarget {
    /// Create a target holding the given initial values.
    pub fn new(initial: TargetSnapshot) -> Self {
        Self {
            packed: AtomicU64::new(initial.pack()),
        }
    }

    /// Read all four axis targets at once.
    pub fn snapshot(&self) -> TargetSnapshot {
        TargetSnapshot::unpack(self.packed.load(Ordering::Acquire))
    }

    /// Read a single axis target.
    pub fn get(&self, label: AxisLabel) -> i32 {
        self.snapshot().get(label)
    }

    /// Replace all four targets.
    pub fn store(&self, snapshot: TargetSnapshot) {
        self.packed.store(snapshot.pack(), Ordering::Release);
    }

    /// Set a single axis from the external control surface, leaving the
    /// other three untouched.
    pub fn set_axis(&self, label: AxisLabel, degrees: i32) {
        // The closure never returns None, so the update cannot fail.
        let _ = self
            .packed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                Some(TargetSnapshot::unpack(word).with(label, degrees).pack())
            });
    }

    /// Publish an integer pitch/yaw pair.
    ///
    /// The primary pair (`X`, `Y`) receives the values as given; the secondary
    /// pair (`A`, `B`) receives them minus `calibration_offset`.
    pub fn publish(&self, pitch_degrees: i32, yaw_degrees: i32, calibration_offset: i32) {
        let snapshot = TargetSnapshot {
            x: saturate(pitch_degrees),
            y: saturate(yaw_degrees),
            a: saturate(pitch_degrees.saturating_sub(calibration_offset)),
            b: saturate(yaw_degrees.saturating_sub(calibration_offset)),
        };
        self.store(snapshot);
    }

    /// Publish a fractional pitch/yaw estimate, rounding half up first.
    pub fn publish_degrees(&self, pitch_degrees: f64, yaw_degrees: f64, calibration_offset: i32) {
        let pitch = round_half_up(pitch_degrees);
        let yaw = round_half_up(yaw_degrees);
        log::trace!("publish pitch={pitch} yaw={yaw} (offset {calibration_offset})");
        self.publish(pitch, yaw, calibration_offset);
    }
}

impl Default for ControlTarget {
    fn default() -> Self {
        Self::new(TargetSnapshot::default())
    }
}
