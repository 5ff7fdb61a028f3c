//! Mirror orientation from eye position.
//!
//! The mirror has to reflect a fixed reference direction into the subject's
//! eye. Its normal is approximated by the bisector of the two unit
//! directions: normalise both, average them, normalise again. The two output
//! angles are the angles between that bisector and the sensor's forward and
//! up axes.
//!
//! This is a first-order bisector, not an exact law-of-reflection solve.

use nalgebra::{Unit, Vector3};
use thiserror::Error;

/// Vectors shorter than this are treated as zero length.
const MIN_NORM: f64 = 1e-12;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimateError {
    /// Input could not be normalised (zero length or non-finite).
    #[error("Degenerate {0} vector")]
    DegenerateVector(&'static str),
}

/// Orientation angles in radians, each in `[0, π]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    /// Angle between the mirror normal and the forward axis.
    pub pitch: f64,
    /// Angle between the mirror normal and the up axis.
    pub yaw: f64,
}

impl Orientation {
    /// `(pitch, yaw)` in degrees.
    pub fn to_degrees(&self) -> (f64, f64) {
        (self.pitch.to_degrees(), self.yaw.to_degrees())
    }
}

fn normalize(v: &Vector3<f64>, what: &'static str) -> Result<Unit<Vector3<f64>>, EstimateError> {
    // Finite components can still overflow the norm, and dividing by an
    // infinite norm yields a zero vector instead of an error.
    if !v.iter().all(|c| c.is_finite()) || !v.norm().is_finite() {
        return Err(EstimateError::DegenerateVector(what));
    }
    Unit::try_new(*v, MIN_NORM).ok_or(EstimateError::DegenerateVector(what))
}

/// Reference axes the orientation angles are measured against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorAxes {
    forward: Unit<Vector3<f64>>,
    up: Unit<Vector3<f64>>,
}

impl EstimatorAxes {
    pub fn new(forward: Vector3<f64>, up: Vector3<f64>) -> Result<Self, EstimateError> {
        Ok(Self {
            forward: normalize(&forward, "forward axis")?,
            up: normalize(&up, "up axis")?,
        })
    }

    pub fn forward(&self) -> &Unit<Vector3<f64>> {
        &self.forward
    }

    pub fn up(&self) -> &Unit<Vector3<f64>> {
        &self.up
    }
}

impl Default for EstimatorAxes {
    /// Forward along the optical axis `+Z`, up along `+Y`.
    fn default() -> Self {
        Self {
            forward: Vector3::z_axis(),
            up: Vector3::y_axis(),
        }
    }
}

/// Stateless orientation estimator bound to a pair of reference axes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrientationEstimator {
    axes: EstimatorAxes,
}

impl OrientationEstimator {
    pub fn new(axes: EstimatorAxes) -> Self {
        Self { axes }
    }

    pub fn axes(&self) -> &EstimatorAxes {
        &self.axes
    }

    /// Estimate the mirror orientation for an eye position and a reference
    /// direction, both in mirror coordinates.
    ///
    /// # Errors
    ///
    /// [`EstimateError::DegenerateVector`] if either input has zero length or
    /// non-finite components, or if they point in exactly opposite directions
    /// (the bisector is undefined).
    pub fn estimate(
        &self,
        eye_position: &Vector3<f64>,
        reference_direction: &Vector3<f64>,
    ) -> Result<Orientation, EstimateError> {
        let eye = normalize(eye_position, "eye position")?;
        let reference = normalize(reference_direction, "reference direction")?;
        let midpoint = (eye.into_inner() + reference.into_inner()) / 2.0;
        let normal = normalize(&midpoint, "mirror normal")?;

        // Clamp so rounding past ±1 never turns into NaN.
        let pitch = normal.dot(&self.axes.forward).clamp(-1.0, 1.0).acos();
        let yaw = normal.dot(&self.axes.up).clamp(-1.0, 1.0).acos();

        Ok(Orientation { pitch, yaw })
    }
}

/// Estimate with the default axes.
pub fn estimate(
    eye_position: &Vector3<f64>,
    reference_direction: &Vector3<f64>,
) -> Result<Orientation, EstimateError> {
    OrientationEstimator::default().estimate(eye_position, reference_direction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use rstest::rstest;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    fn random_unit(rng: &mut ChaCha8Rng) -> Vector3<f64> {
        loop {
            let v = Vector3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            );
            if v.norm() > 0.1 {
                return v.normalize();
            }
        }
    }

    #[test]
    fn test_aligned_with_forward_gives_zero_pitch() {
        let o = estimate(&Vector3::new(0.0, 0.0, 1.0), &Vector3::new(0.0, 0.0, 1.0)).unwrap();
        assert_relative_eq!(o.pitch, 0.0, epsilon = 1e-12);
        assert_relative_eq!(o.yaw, FRAC_PI_2, epsilon = 1e-12);
    }

    #[rstest]
    #[case(Vector3::new(0.0, 1.0, 0.0), 45.0, 45.0)]
    #[case(Vector3::new(1.0, 0.0, 0.0), 45.0, 90.0)]
    #[case(Vector3::new(0.0, -1.0, 0.0), 45.0, 135.0)]
    #[case(Vector3::new(0.0, 0.0, 3.5), 0.0, 90.0)]
    fn test_known_geometry(#[case] eye: Vector3<f64>, #[case] pitch: f64, #[case] yaw: f64) {
        let o = estimate(&eye, &Vector3::z()).unwrap();
        let (p, y) = o.to_degrees();
        assert_relative_eq!(p, pitch, epsilon = 1e-9);
        assert_relative_eq!(y, yaw, epsilon = 1e-9);
    }

    #[test]
    fn test_bisector_of_tilted_eye() {
        // Eye 45° above the optical axis: bisector sits at 22.5°.
        let eye = Vector3::new(0.0, 1.0, 1.0);
        let o = estimate(&eye, &Vector3::z()).unwrap();
        assert_relative_eq!(o.pitch, FRAC_PI_4 / 2.0, epsilon = 1e-12);
        assert_relative_eq!(o.yaw, FRAC_PI_2 - FRAC_PI_4 / 2.0, epsilon = 1e-12);
    }

    #[rstest]
    #[case(Vector3::zeros(), Vector3::z())]
    #[case(Vector3::new(0.1, 0.2, 1.0), Vector3::zeros())]
    #[case(Vector3::new(f64::NAN, 0.0, 1.0), Vector3::z())]
    #[case(Vector3::new(0.0, 0.0, f64::INFINITY), Vector3::z())]
    #[case(Vector3::new(0.0, 0.0, -2.0), Vector3::z())]
    #[case(Vector3::new(1e200, 0.0, 0.0), Vector3::z())]
    #[case(Vector3::new(0.0, 1.0, 0.0), Vector3::new(0.0, 1e300, 1e300))]
    fn test_degenerate_inputs(#[case] eye: Vector3<f64>, #[case] reference: Vector3<f64>) {
        assert!(matches!(
            estimate(&eye, &reference),
            Err(EstimateError::DegenerateVector(_))
        ));
    }

    #[test]
    fn test_angles_in_range_for_unit_vectors() {
        let mut rng = ChaCha8Rng::seed_from_u64(12345);
        for _ in 0..2000 {
            let e = random_unit(&mut rng);
            let r = random_unit(&mut rng);
            match estimate(&e, &r) {
                Ok(o) => {
                    assert!((0.0..=PI).contains(&o.pitch), "pitch {}", o.pitch);
                    assert!((0.0..=PI).contains(&o.yaw), "yaw {}", o.yaw);
                }
                // Only exactly opposite pairs may fail.
                Err(_) => assert!((e + r).norm() < 1e-9),
            }
        }
    }

    #[test]
    fn test_scale_invariance() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..500 {
            let e = random_unit(&mut rng);
            let r = random_unit(&mut rng);
            if (e + r).norm() < 1e-3 {
                continue;
            }
            let k = rng.gen_range(0.01..100.0);
            let m = rng.gen_range(0.01..100.0);
            let base = estimate(&e, &r).unwrap();
            let scaled = estimate(&(e * k), &(r * m)).unwrap();
            assert_relative_eq!(base.pitch, scaled.pitch, epsilon = 1e-9);
            assert_relative_eq!(base.yaw, scaled.yaw, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_custom_axes() {
        // Forward along +X as on rigs where the sensor looks sideways.
        let axes = EstimatorAxes::new(Vector3::x(), Vector3::y()).unwrap();
        let estimator = OrientationEstimator::new(axes);
        let o = estimator
            .estimate(&Vector3::new(1.0, 0.0, 0.0), &Vector3::new(1.0, 0.0, 0.0))
            .unwrap();
        assert_relative_eq!(o.pitch, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_axes_reject_zero() {
        assert!(EstimatorAxes::new(Vector3::zeros(), Vector3::y()).is_err());
        let axes = EstimatorAxes::new(Vector3::new(0.0, 0.0, 5.0), Vector3::y()).unwrap();
        assert_relative_eq!(axes.forward().into_inner(), Vector3::z(), epsilon = 1e-12);
    }
}
