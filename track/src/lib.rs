//! Face tracking and mirror orientation estimation.
//!
//! Sensor frames arrive as lists of [`SubjectRecord`]s. The
//! [`TrackingRegistry`] keeps one session per subject, runs face
//! reconstruction through a [`FaceModelFactory`], turns the inner eye corner
//! into a mirror orientation with the [`OrientationEstimator`], and publishes
//! the result into the shared [`ControlTarget`](shared::ControlTarget).

pub mod estimator;
pub mod face_model;
pub mod mount;
pub mod registry;
pub mod replay;
pub mod sensor;

pub use estimator::{estimate, EstimateError, EstimatorAxes, Orientation, OrientationEstimator};
pub use face_model::{FaceModel, FaceModelError, FaceModelFactory};
pub use mount::SensorMount;
pub use registry::{FrameReport, SessionView, TrackingConfig, TrackingRegistry};
pub use replay::{FrameReplay, ReplayError, ReplayFaceModel, ReplayFaceModelFactory};
pub use sensor::{FeaturePoint, FeaturePoints, FrameFormat, SensorFrame, SubjectRecord, TrackingState};
