//! Actuator axis labels.
//!
//! Each physically driven degree of freedom is identified on the wire by a
//! single ASCII character. `X`/`Y` are the primary pitch/yaw pair, `A`/`B` the
//! secondary pair found on four-axis rigs.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Single-character tag for one actuator axis.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum AxisLabel {
    /// Primary pitch axis
    X,
    /// Primary yaw axis
    Y,
    /// Secondary pitch axis
    A,
    /// Secondary yaw axis
    B,
}

/// Which orientation angle drives an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Angle {
    Pitch,
    Yaw,
}

impl AxisLabel {
    /// All labels in wire order.
    pub const ALL: [AxisLabel; 4] = [AxisLabel::X, AxisLabel::Y, AxisLabel::A, AxisLabel::B];

    /// The command tag sent over the wire.
    pub fn tag(&self) -> char {
        match self {
            AxisLabel::X => 'X',
            AxisLabel::Y => 'Y',
            AxisLabel::A => 'A',
            AxisLabel::B => 'B',
        }
    }

    /// Parse a wire tag back into a label.
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag.to_ascii_uppercase() {
            'X' => Some(AxisLabel::X),
            'Y' => Some(AxisLabel::Y),
            'A' => Some(AxisLabel::A),
            'B' => Some(AxisLabel::B),
            _ => None,
        }
    }

    /// The orientation angle this axis follows.
    pub fn angle(&self) -> Angle {
        match self {
            AxisLabel::X | AxisLabel::A => Angle::Pitch,
            AxisLabel::Y | AxisLabel::B => Angle::Yaw,
        }
    }

    /// True for the calibration-offset pair (`A`, `B`).
    pub fn is_secondary(&self) -> bool {
        matches!(self, AxisLabel::A | AxisLabel::B)
    }
}
