//! Rig configuration.
//!
//! Everything that differs between physical builds of the mirror rig lives
//! here: which axes exist and their safety bounds, the secondary-pair
//! calibration offset, serial link timing, and the tracking geometry. The
//! values shipped in the presets are hand-tuned for the two rigs that have
//! been built so far.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::axis::AxisLabel;

/// Errors loading, saving or validating a rig configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Inclusive safety bounds for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisLimits {
    pub label: AxisLabel,
    pub min: i32,
    pub max: i32,
}

impl AxisLimits {
    pub fn new(label: AxisLabel, min: i32, max: i32) -> Self {
        Self { label, min, max }
    }

    /// Clamp a target into `[min, max]`.
    pub fn clamp(&self, value: i32) -> i32 {
        value.clamp(self.min, self.max)
    }

    /// Midpoint of the range, rounded down.
    pub fn center(&self) -> i32 {
        self.min + (self.max - self.min) / 2
    }
}

/// Known rig builds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum RigVariant {
    /// Single pan/tilt servo pair driven on `X`/`Y`.
    #[default]
    TwoAxis,
    /// Two servo pairs, the second driven through the calibration offset.
    FourAxis,
}

/// Where the sensor sits relative to the mirror and how the face geometry is
/// interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingGeometry {
    /// Sensor optical axis, in mirror coordinates.
    pub forward_axis: Vector3<f64>,
    /// Vertical axis, in mirror coordinates.
    pub up_axis: Vector3<f64>,
    /// World direction the mirror should reflect into the subject's eye.
    pub reference_direction: Vector3<f64>,
    /// Sensor position relative to the mirror, in metres.
    pub sensor_position: Vector3<f64>,
    /// The sensor reports X mirrored relative to the mirror frame.
    pub mirror_x: bool,
}

/// Sensor offset on the reference bench, relative to the mirror.
pub const SIDE_MOUNT_POSITION: [f64; 3] = [0.3, 0.0, 0.2];

impl TrackingGeometry {
    /// Sensor beside the mirror at [`SIDE_MOUNT_POSITION`], reporting X
    /// mirrored.
    pub fn side_mounted() -> Self {
        Self {
            sensor_position: Vector3::from(SIDE_MOUNT_POSITION),
            mirror_x: true,
            ..Self::default()
        }
    }
}

impl Default for TrackingGeometry {
    /// Sensor co-located with the mirror.
    fn default() -> Self {
        Self {
            forward_axis: Vector3::new(0.0, 0.0, 1.0),
            up_axis: Vector3::new(0.0, 1.0, 0.0),
            reference_direction: Vector3::new(0.0, 0.0, 1.0),
            sensor_position: Vector3::zeros(),
            mirror_x: false,
        }
    }
}

/// Complete description of one rig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigConfig {
    pub variant: RigVariant,
    /// Driven axes in the order they are serviced each loop iteration.
    pub axes: Vec<AxisLimits>,
    /// Subtracted from the primary pair to obtain the secondary pair.
    pub calibration_offset: i32,
    pub baud_rate: u32,
    pub ack_timeout_ms: u64,
    /// Sleep between loop iterations that sent nothing. Zero busy-polls.
    pub idle_delay_us: u64,
    pub reconnect_interval_ms: u64,
    /// Frames a subject may go unseen before its session is evicted.
    pub stale_frame_threshold: u32,
    #[serde(default)]
    pub geometry: TrackingGeometry,
}

impl RigConfig {
    /// Two-axis rig: `X` and `Y` in `[20, 160]`.
    ///
    /// Presets assume the sensor sits at the mirror. Rigs with an offset
    /// sensor set [`RigConfig::geometry`], e.g. to
    /// [`TrackingGeometry::side_mounted`].
    pub fn two_axis() -> Self {
        Self {
            variant: RigVariant::TwoAxis,
            axes: vec![
                AxisLimits::new(AxisLabel::X, 20, 160),
                AxisLimits::new(AxisLabel::Y, 20, 160),
            ],
            ..Self::base()
        }
    }

    /// Four-axis rig: `X`/`A` in `[40, 140]`, `Y`/`B` in `[40, 90]`.
    ///
    /// Same co-located sensor assumption as [`RigConfig::two_axis`].
    pub fn four_axis() -> Self {
        Self {
            variant: RigVariant::FourAxis,
            axes: vec![
                AxisLimits::new(AxisLabel::X, 40, 140),
                AxisLimits::new(AxisLabel::Y, 40, 90),
                AxisLimits::new(AxisLabel::A, 40, 140),
                AxisLimits::new(AxisLabel::B, 40, 90),
            ],
            ..Self::base()
        }
    }

    /// Preset for a variant.
    pub fn preset(variant: RigVariant) -> Self {
        match variant {
            RigVariant::TwoAxis => Self::two_axis(),
            RigVariant::FourAxis => Self::four_axis(),
        }
    }

    fn base() -> Self {
        Self {
            variant: RigVariant::default(),
            axes: Vec::new(),
            calibration_offset: 13,
            baud_rate: 9600,
            ack_timeout_ms: 500,
            idle_delay_us: 1000,
            reconnect_interval_ms: 2000,
            stale_frame_threshold: 100,
            geometry: TrackingGeometry::default(),
        }
    }

    /// Bounds for one axis, if the rig drives it.
    pub fn axis(&self, label: AxisLabel) -> Option<&AxisLimits> {
        self.axes.iter().find(|a| a.label == label)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_micros(self.idle_delay_us)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.axes.is_empty() {
            return Err(ConfigError::Invalid("no axes configured".to_string()));
        }

        let mut seen = HashSet::new();
        for axis in &self.axes {
            if !seen.insert(axis.label) {
                return Err(ConfigError::Invalid(format!(
                    "axis {} configured more than once",
                    axis.label
                )));
            }
            if axis.min > axis.max {
                return Err(ConfigError::Invalid(format!(
                    "axis {}: min {} exceeds max {}",
                    axis.label, axis.min, axis.max
                )));
            }
            if axis.min < i32::from(i16::MIN) || axis.max > i32::from(i16::MAX) {
                return Err(ConfigError::Invalid(format!(
                    "axis {}: bounds [{}, {}] outside the representable range",
                    axis.label, axis.min, axis.max
                )));
            }
        }

        if self.ack_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "ack_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be non-zero".to_string()));
        }

        let g = &self.geometry;
        for (name, v) in [
            ("forward_axis", &g.forward_axis),
            ("up_axis", &g.up_axis),
            ("reference_direction", &g.reference_direction),
        ] {
            if !v.iter().all(|c| c.is_finite()) || v.norm() == 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a finite non-zero vector"
                )));
            }
        }
        if !g.sensor_position.iter().all(|c| c.is_finite()) {
            return Err(ConfigError::Invalid(
                "sensor_position must be finite".to_string(),
            ));
        }

        Ok(())
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file, rejecting invalid configurations.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        log::debug!("Loaded {} rig config from {}", config.variant, path.display());
        Ok(config)
    }
}

impl Default for RigConfig {
    fn default() -> Self {
        Self::preset(RigVariant::default())
    }
}
