//! Pipeline lifecycle.

use std::sync::Arc;

use hardware::servo::{ActuatorChannel, ServoConfig, ServoController, ServoHandle, ServoStats};
use log::{debug, info};
use shared::{ConfigError, ControlTarget, RigConfig};
use thiserror::Error;
use track::{EstimateError, FaceModelFactory, FrameReport, SensorFrame, TrackingConfig, TrackingRegistry};

#[derive(Error, Debug)]
pub enum RigError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid tracking geometry: {0}")]
    Geometry(#[from] EstimateError),

    #[error("Failed to start servo loop: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A running rig: tracking on the caller's thread, servos on their own.
pub struct MirrorRig<F: FaceModelFactory> {
    config: RigConfig,
    target: Arc<ControlTarget>,
    registry: TrackingRegistry<F>,
    servo: Option<ServoHandle>,
}

impl<F: FaceModelFactory> MirrorRig<F> {
    /// Validate `config`, build the registry and start the servo loop over
    /// `channels`.
    pub fn start(
        config: RigConfig,
        factory: F,
        channels: Vec<Box<dyn ActuatorChannel>>,
    ) -> Result<Self, RigError> {
        config.validate()?;
        let tracking = TrackingConfig::from_rig(&config)?;

        let target = Arc::new(ControlTarget::default());
        let registry = TrackingRegistry::new(factory, tracking, target.clone());

        let channel_count = channels.len();
        let servo =
            ServoController::new(ServoConfig::from_rig(&config), target.clone(), channels).spawn()?;

        info!(
            "Mirror rig started: {} variant, {} channel(s)",
            config.variant, channel_count
        );

        Ok(Self {
            config,
            target,
            registry,
            servo: Some(servo),
        })
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    pub fn target(&self) -> &Arc<ControlTarget> {
        &self.target
    }

    pub fn registry(&self) -> &TrackingRegistry<F> {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.servo.as_ref().is_some_and(ServoHandle::is_running)
    }

    /// Feed one sensor frame through tracking.
    pub fn process_frame(&mut self, frame: &SensorFrame) -> FrameReport {
        let report = self.registry.process_frame(frame);
        if report.reset > 0 || report.evicted > 0 {
            debug!(
                "Frame {}: reset {}, evicted {}, {} session(s) active",
                frame.frame_number,
                report.reset,
                report.evicted,
                self.registry.len()
            );
        }
        report
    }

    /// The sensor went away; drop every session.
    pub fn sensor_detached(&mut self) -> usize {
        self.registry.sensor_detached()
    }

    /// Stop the servo loop, close its channels, then tear down tracking.
    pub fn shutdown(mut self) -> ServoStats {
        self.stop()
    }

    fn stop(&mut self) -> ServoStats {
        let stats = self
            .servo
            .take()
            .map(ServoHandle::shutdown)
            .unwrap_or_default();
        let released = self.registry.teardown();
        info!(
            "Mirror rig stopped: {} commands sent, {} session(s) released",
            stats.commands_sent, released
        );
        stats
    }
}

impl<F: FaceModelFactory> Drop for MirrorRig<F> {
    fn drop(&mut self) {
        if self.servo.is_some() {
            self.stop();
        }
    }
}
