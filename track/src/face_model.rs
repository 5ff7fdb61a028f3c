//! Face reconstruction collaborator interface.
//!
//! Fitting a face mesh to color and depth data is done by vendor code outside
//! this crate. The registry only needs two things from it: a per-subject
//! model handle, and a way to turn a subject record into 3D landmarks.
//! Releasing the vendor handle is the model's `Drop`.

use thiserror::Error;

use crate::sensor::{FeaturePoints, SubjectRecord};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FaceModelError {
    /// The vendor tracker could not be instantiated (device going away,
    /// shutdown in progress). Transient; retried on the next frame.
    #[error("Face model unavailable for subject {identity}: {reason}")]
    Unavailable { identity: i32, reason: String },

    /// Reconstruction ran but did not converge on a face this frame.
    #[error("Reconstruction failed: {0}")]
    ReconstructionFailed(String),
}

/// Per-subject face reconstruction handle.
pub trait FaceModel {
    /// Reconstruct landmarks for this frame's record of the subject.
    fn reconstruct(&mut self, subject: &SubjectRecord) -> Result<FeaturePoints, FaceModelError>;
}

/// Creates face models bound to a subject identity.
pub trait FaceModelFactory {
    type Model: FaceModel;

    /// Acquire a model for `identity`.
    ///
    /// Failure is expected during device hot-plug and shutdown and must not be
    /// treated as fatal by callers.
    fn create(&mut self, identity: i32) -> Result<Self::Model, FaceModelError>;
}
