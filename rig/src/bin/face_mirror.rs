//! Face-tracking mirror driver.
//!
//! Replays a recorded sensor session (JSON lines, one frame per line) through
//! the tracking pipeline at a fixed frame rate and drives the servo boards
//! from the result. Stops at the end of the recording or on Ctrl+C.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use hardware::servo::{available_ports, ActuatorChannel, MockChannel, SerialChannel};
use rig::MirrorRig;
use shared::config_storage::ConfigStorage;
use shared::rig_config::TrackingGeometry;
use shared::{RigConfig, RigVariant};
use tracing::{debug, info, warn};
use track::{FrameReplay, ReplayFaceModelFactory};

/// Steer a mirror to follow a tracked face
#[derive(Parser, Debug)]
#[command(name = "face_mirror")]
#[command(about = "Drive the steering mirror from recorded face-tracking frames")]
#[command(version)]
struct Args {
    /// Recorded frames (JSON lines)
    #[arg(short, long)]
    frames: PathBuf,

    /// Replay rate in frames per second
    #[arg(long, default_value = "30")]
    fps: f64,

    /// Rig configuration file (defaults to the stored configuration)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Preset used when no configuration is stored
    #[arg(long, default_value_t = RigVariant::default())]
    variant: RigVariant,

    /// Serial ports to drive (defaults to every available port)
    #[arg(short, long)]
    port: Vec<String>,

    /// Override the configured baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Override the configured calibration offset
    #[arg(long)]
    calibration_offset: Option<i32>,

    /// Sensor mounted beside the mirror with X mirrored
    #[arg(long)]
    side_mounted: bool,

    /// Log commands instead of opening serial ports
    #[arg(long)]
    dry_run: bool,

    /// Store the effective configuration for next time
    #[arg(long)]
    save_config: bool,
}

fn load_config(args: &Args) -> Result<RigConfig> {
    let mut config = match &args.config {
        Some(path) => RigConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            let storage = ConfigStorage::new()?;
            match storage.get_rig_config() {
                Some(stored) => stored.with_context(|| {
                    format!("loading {}", storage.rig_config_path().display())
                })?,
                None => {
                    info!("No stored configuration, using {} preset", args.variant);
                    RigConfig::preset(args.variant)
                }
            }
        }
    };

    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    if let Some(offset) = args.calibration_offset {
        config.calibration_offset = offset;
    }
    if args.side_mounted {
        config.geometry = TrackingGeometry::side_mounted();
    }
    config.validate()?;

    if args.save_config {
        let path = ConfigStorage::new()?.save_rig_config(&config)?;
        info!("Saved configuration to {}", path.display());
    }
    Ok(config)
}

fn open_channels(args: &Args, config: &RigConfig) -> Result<Vec<Box<dyn ActuatorChannel>>> {
    if args.dry_run {
        // Commands are already traced at debug level; keep nothing in memory.
        let channel = MockChannel::new("dry-run").with_log_capacity(0);
        return Ok(vec![Box::new(channel) as Box<dyn ActuatorChannel>]);
    }

    let ports = if args.port.is_empty() {
        available_ports()?
    } else {
        args.port.clone()
    };
    if ports.is_empty() {
        bail!("no serial ports found; pass --port or --dry-run");
    }

    Ok(ports
        .into_iter()
        .map(|p| Box::new(SerialChannel::new(p, config.baud_rate)) as Box<dyn ActuatorChannel>)
        .collect())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    if !(args.fps > 0.0 && args.fps.is_finite()) {
        bail!("--fps must be positive");
    }

    let config = load_config(&args)?;
    let mut frames = FrameReplay::open(&args.frames)
        .with_context(|| format!("opening {}", args.frames.display()))?;
    let channels = open_channels(&args, &config)?;

    let mut mirror = MirrorRig::start(config, ReplayFaceModelFactory, channels)?;

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / args.fps));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut frame_count = 0u64;
    let mut published = 0u64;
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!("Signal handler failed: {e}");
                }
                info!("Shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                match frames.next() {
                    None => {
                        info!("End of recording");
                        break;
                    }
                    Some(Ok(frame)) => {
                        let report = mirror.process_frame(&frame);
                        frame_count += 1;
                        published += report.published as u64;
                        debug!("Frame {}: target {:?}", frame.frame_number, mirror.target().snapshot());
                    }
                    Some(Err(e)) => warn!("Skipping frame: {e}"),
                }
            }
        }
    }

    let stats = mirror.shutdown();
    info!(
        "Processed {frame_count} frames ({published} estimates), sent {} commands with {} faults",
        stats.commands_sent, stats.faults
    );
    Ok(())
}
