//! Sensor placement relative to the mirror.

use nalgebra::Vector3;
use shared::rig_config::TrackingGeometry;

/// Rigid mapping from sensor coordinates into mirror coordinates.
///
/// The sensor reports landmarks in its own frame. Some sensors report X
/// mirrored (image-space convention), and the sensor is rarely mounted at the
/// mirror itself, so positions are optionally reflected in X and then offset by
/// the sensor's position relative to the mirror.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorMount {
    pub position: Vector3<f64>,
    pub mirror_x: bool,
}

impl SensorMount {
    pub fn new(position: Vector3<f64>, mirror_x: bool) -> Self {
        Self { position, mirror_x }
    }

    pub fn from_geometry(geometry: &TrackingGeometry) -> Self {
        Self::new(geometry.sensor_position, geometry.mirror_x)
    }

    /// Map a sensor-frame point into the mirror frame.
    pub fn to_mirror_frame(&self, point: &Vector3<f64>) -> Vector3<f64> {
        let mut p = *point;
        if self.mirror_x {
            p.x = -p.x;
        }
        p + self.position
    }
}

impl Default for SensorMount {
    /// Sensor co-located with the mirror, same handedness.
    fn default() -> Self {
        Self::new(Vector3::zeros(), false)
    }
}
