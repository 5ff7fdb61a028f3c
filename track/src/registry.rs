//! Per-subject tracking sessions.
//!
//! The sensor reports a fixed number of subject slots every frame. Subjects
//! come and go, tracking drops out for a few frames at a time under
//! occlusion, and face reconstruction fails intermittently. The registry keeps
//! one [`TrackingSession`] per identity, feeds it every frame the identity is
//! seen, and evicts it once it has been unseen for longer than the stale
//! threshold. Evicting a session drops its face model, which releases the
//! vendor handle exactly once.
//!
//! # Frame cycle
//!
//! ```text
//! process_frame(frame)
//!   ├─ format changed? ──► teardown()
//!   ├─ observe(frame_number, subjects)   create / update sessions, publish
//!   └─ evict_stale(frame_number)         drop sessions unseen > threshold
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace, warn};
use nalgebra::Vector3;
use shared::rig_config::RigConfig;
use shared::ControlTarget;

use crate::estimator::{EstimateError, EstimatorAxes, Orientation, OrientationEstimator};
use crate::face_model::{FaceModel, FaceModelFactory};
use crate::mount::SensorMount;
use crate::sensor::{FeaturePoint, FrameFormat, SensorFrame, SubjectRecord, TrackingState};

/// Frames a subject may go unseen before eviction.
pub const DEFAULT_STALE_FRAME_THRESHOLD: u32 = 100;

/// Tuning for the registry and the publish step.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingConfig {
    pub stale_frame_threshold: u32,
    /// Subtracted from the primary pair to form the secondary pair.
    pub calibration_offset: i32,
    /// World direction the mirror reflects into the eye.
    pub reference_direction: Vector3<f64>,
    /// Landmark used as the eye position.
    pub eye_landmark: FeaturePoint,
    pub mount: SensorMount,
    pub axes: EstimatorAxes,
}

impl TrackingConfig {
    /// Build from a rig configuration.
    pub fn from_rig(config: &RigConfig) -> Result<Self, EstimateError> {
        let geometry = &config.geometry;
        Ok(Self {
            stale_frame_threshold: config.stale_frame_threshold,
            calibration_offset: config.calibration_offset,
            reference_direction: geometry.reference_direction,
            eye_landmark: FeaturePoint::InnerCornerLeftEye,
            mount: SensorMount::from_geometry(geometry),
            axes: EstimatorAxes::new(geometry.forward_axis, geometry.up_axis)?,
        })
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            stale_frame_threshold: DEFAULT_STALE_FRAME_THRESHOLD,
            calibration_offset: 13,
            reference_direction: Vector3::z(),
            eye_landmark: FeaturePoint::InnerCornerLeftEye,
            mount: SensorMount::default(),
            axes: EstimatorAxes::default(),
        }
    }
}

/// Tracking state for one subject. Owned exclusively by the registry.
struct TrackingSession<M> {
    identity: i32,
    last_observed_frame: u32,
    last_estimate_succeeded: bool,
    last_state: TrackingState,
    last_orientation: Option<Orientation>,
    face_model: Option<M>,
}

impl<M> TrackingSession<M> {
    fn new(identity: i32, frame_number: u32) -> Self {
        Self {
            identity,
            last_observed_frame: frame_number,
            last_estimate_succeeded: false,
            last_state: TrackingState::NotTracked,
            last_orientation: None,
            face_model: None,
        }
    }

    fn view(&self) -> SessionView {
        SessionView {
            identity: self.identity,
            last_observed_frame: self.last_observed_frame,
            last_estimate_succeeded: self.last_estimate_succeeded,
            last_state: self.last_state,
            last_orientation: self.last_orientation,
            has_face_model: self.face_model.is_some(),
        }
    }
}

/// Read-only copy of a session's state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionView {
    pub identity: i32,
    pub last_observed_frame: u32,
    pub last_estimate_succeeded: bool,
    pub last_state: TrackingState,
    pub last_orientation: Option<Orientation>,
    pub has_face_model: bool,
}

/// What one call to [`TrackingRegistry::process_frame`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Sessions torn down because the frame format changed.
    pub reset: usize,
    /// Successful estimates published to the control target.
    pub published: usize,
    /// Sessions evicted as stale.
    pub evicted: usize,
}

/// Identity-keyed session registry.
pub struct TrackingRegistry<F: FaceModelFactory> {
    sessions: HashMap<i32, TrackingSession<F::Model>>,
    factory: F,
    estimator: OrientationEstimator,
    config: TrackingConfig,
    target: Arc<ControlTarget>,
    last_format: Option<FrameFormat>,
}

impl<F: FaceModelFactory> TrackingRegistry<F> {
    pub fn new(factory: F, config: TrackingConfig, target: Arc<ControlTarget>) -> Self {
        Self {
            sessions: HashMap::new(),
            factory,
            estimator: OrientationEstimator::new(config.axes),
            config,
            target,
            last_format: None,
        }
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn target(&self) -> &Arc<ControlTarget> {
        &self.target
    }

    /// Run one full frame cycle: reset on format change, observe, evict.
    pub fn process_frame(&mut self, frame: &SensorFrame) -> FrameReport {
        let mut report = FrameReport::default();

        if self.last_format.is_some_and(|f| f != frame.format) {
            debug!(
                "Frame format changed to {:?}, resetting face tracking",
                frame.format
            );
            report.reset = self.teardown();
        }
        self.last_format = Some(frame.format);

        report.published = self.observe(frame.frame_number, &frame.subjects);
        report.evicted = self.evict_stale(frame.frame_number);
        report
    }

    /// Update sessions for every subject that is tracked or position-only.
    ///
    /// Creates sessions for unseen identities and stamps each observed session
    /// with `frame_number`. Never evicts. Returns the number of estimates
    /// published; when several subjects succeed, the last one in record order
    /// wins the control target.
    pub fn observe(&mut self, frame_number: u32, subjects: &[SubjectRecord]) -> usize {
        let mut published = 0;

        for subject in subjects.iter().filter(|s| s.state.keeps_session()) {
            let session = self.sessions.entry(subject.identity).or_insert_with(|| {
                debug!("New tracking session for subject {}", subject.identity);
                TrackingSession::new(subject.identity, frame_number)
            });

            if update_session(
                session,
                subject,
                &mut self.factory,
                &self.estimator,
                &self.config,
                &self.target,
            ) {
                published += 1;
            }
            session.last_observed_frame = frame_number;
        }

        published
    }

    /// Evict every session unseen for more than the stale threshold.
    ///
    /// The age is the wrapping unsigned difference, so a frame counter that
    /// wraps around does not strand sessions. Returns the number evicted.
    pub fn evict_stale(&mut self, current_frame: u32) -> usize {
        let threshold = self.config.stale_frame_threshold;
        let stale: Vec<i32> = self
            .sessions
            .values()
            .filter(|s| current_frame.wrapping_sub(s.last_observed_frame) > threshold)
            .map(|s| s.identity)
            .collect();

        for identity in &stale {
            self.remove(*identity);
        }
        stale.len()
    }

    /// Evict every session unconditionally.
    pub fn teardown(&mut self) -> usize {
        let identities: Vec<i32> = self.sessions.keys().copied().collect();
        for identity in &identities {
            self.remove(*identity);
        }
        identities.len()
    }

    /// The upstream sensor went away; nothing it reported is valid any more.
    pub fn sensor_detached(&mut self) -> usize {
        self.last_format = None;
        self.teardown()
    }

    fn remove(&mut self, identity: i32) {
        // Dropping the session drops its face model.
        if let Some(session) = self.sessions.remove(&identity) {
            trace!(
                "Evicted session {} (last seen frame {})",
                identity,
                session.last_observed_frame
            );
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, identity: i32) -> bool {
        self.sessions.contains_key(&identity)
    }

    pub fn session(&self, identity: i32) -> Option<SessionView> {
        self.sessions.get(&identity).map(TrackingSession::view)
    }

    /// Views of all sessions, sorted by identity.
    pub fn sessions(&self) -> Vec<SessionView> {
        let mut views: Vec<SessionView> = self.sessions.values().map(TrackingSession::view).collect();
        views.sort_by_key(|v| v.identity);
        views
    }
}

/// Per-frame update for one session. Returns true if an estimate was
/// published.
fn update_session<F: FaceModelFactory>(
    session: &mut TrackingSession<F::Model>,
    subject: &SubjectRecord,
    factory: &mut F,
    estimator: &OrientationEstimator,
    config: &TrackingConfig,
    target: &ControlTarget,
) -> bool {
    session.last_state = subject.state;

    if subject.state != TrackingState::Tracked {
        session.last_estimate_succeeded = false;
        return false;
    }

    if session.face_model.is_none() {
        match factory.create(subject.identity) {
            Ok(model) => session.face_model = Some(model),
            Err(e) => {
                warn!("Skipping estimate for subject {}: {e}", subject.identity);
                session.last_estimate_succeeded = false;
                return false;
            }
        }
    }
    let Some(model) = session.face_model.as_mut() else {
        return false;
    };

    let points = match model.reconstruct(subject) {
        Ok(points) => points,
        Err(e) => {
            trace!("Subject {}: {e}", subject.identity);
            session.last_estimate_succeeded = false;
            return false;
        }
    };

    let Some(eye) = points.get(config.eye_landmark) else {
        debug!(
            "Subject {}: reconstruction missing {:?}",
            subject.identity, config.eye_landmark
        );
        session.last_estimate_succeeded = false;
        return false;
    };

    let eye = config.mount.to_mirror_frame(eye);
    match estimator.estimate(&eye, &config.reference_direction) {
        Ok(orientation) => {
            let (pitch, yaw) = orientation.to_degrees();
            debug!(
                "Subject {}: pitch {pitch:.2}°, yaw {yaw:.2}°",
                subject.identity
            );
            target.publish_degrees(pitch, yaw, config.calibration_offset);
            session.last_orientation = Some(orientation);
            session.last_estimate_succeeded = true;
            true
        }
        Err(e) => {
            debug!("Subject {}: {e}", subject.identity);
            session.last_estimate_succeeded = false;
            false
        }
    }
}
