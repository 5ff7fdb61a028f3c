//! Upstream sensor frame types.
//!
//! The depth sensor and its skeleton tracker are external; these types are
//! the boundary the rest of the crate consumes. They are serde-friendly so
//! recorded sessions can be replayed from disk.

use std::collections::BTreeMap;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Skeleton tracking state reported by the sensor for one subject slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    NotTracked,
    /// Subject located but joints not resolved; no face geometry available.
    PositionOnly,
    Tracked,
}

impl TrackingState {
    /// Subjects in either of these states keep their session alive.
    pub fn keeps_session(&self) -> bool {
        matches!(self, TrackingState::Tracked | TrackingState::PositionOnly)
    }
}

/// Named anatomical landmarks from face reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeaturePoint {
    InnerCornerLeftEye,
    InnerCornerRightEye,
    OuterCornerLeftEye,
    OuterCornerRightEye,
    NoseTip,
    MiddleTopOfUpperLip,
    BottomOfChin,
}

/// 3D landmark positions in sensor coordinates (metres).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeaturePoints {
    points: BTreeMap<FeaturePoint, Vector3<f64>>,
}

impl FeaturePoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, point: FeaturePoint, position: Vector3<f64>) -> Self {
        self.insert(point, position);
        self
    }

    pub fn insert(&mut self, point: FeaturePoint, position: Vector3<f64>) {
        self.points.insert(point, position);
    }

    pub fn get(&self, point: FeaturePoint) -> Option<&Vector3<f64>> {
        self.points.get(&point)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// One subject slot in a sensor frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRecord {
    /// Stable for as long as the subject stays in view.
    pub identity: i32,
    pub state: TrackingState,
    /// Recorded reconstruction output, when the source captured one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_points: Option<FeaturePoints>,
}

impl SubjectRecord {
    pub fn new(identity: i32, state: TrackingState) -> Self {
        Self {
            identity,
            state,
            feature_points: None,
        }
    }

    pub fn tracked(identity: i32) -> Self {
        Self::new(identity, TrackingState::Tracked)
    }

    pub fn with_feature_points(mut self, points: FeaturePoints) -> Self {
        self.feature_points = Some(points);
        self
    }
}

/// Color and depth stream resolutions for a frame.
///
/// Face reconstruction state is only valid for the format it was built with,
/// so a change here resets every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameFormat {
    pub color_width: u32,
    pub color_height: u32,
    pub depth_width: u32,
    pub depth_height: u32,
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self {
            color_width: 640,
            color_height: 480,
            depth_width: 320,
            depth_height: 240,
        }
    }
}

/// Everything the sensor delivers for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    /// Monotonic frame counter; wraps.
    pub frame_number: u32,
    #[serde(default)]
    pub format: FrameFormat,
    pub subjects: Vec<SubjectRecord>,
}

impl SensorFrame {
    pub fn new(frame_number: u32, subjects: Vec<SubjectRecord>) -> Self {
        Self {
            frame_number,
            format: FrameFormat::default(),
            subjects,
        }
    }
}
