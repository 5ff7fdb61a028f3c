//! Command-line tool for servo boards on serial ports.
//!
//! Subcommands:
//! - `ports`: List serial ports
//! - `send`: Send a raw command and wait for the ack
//! - `move`: Move one axis to a clamped position
//! - `sweep`: Step an axis back and forth between its bounds

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hardware::servo::{
    available_ports, format_command, ActuatorChannel, SerialChannel, ServoConfig, ServoController,
};
use shared::{AxisLabel, ControlTarget, RigConfig, RigVariant};
use strum::IntoEnumIterator;
use tracing::info;

/// Servo board control tool
#[derive(Parser, Debug)]
#[command(name = "servo_tool")]
#[command(about = "Drive mirror servo boards over serial")]
#[command(version)]
struct Args {
    /// Serial port path (defaults to the first available port)
    #[arg(long, global = true)]
    port: Option<String>,

    /// Baud rate (defaults to the rig configuration's)
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Rig preset used for axis bounds
    #[arg(long, global = true, default_value_t = RigVariant::default())]
    variant: RigVariant,

    /// Rig configuration file, overrides --variant
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports
    Ports,

    /// Send a raw command string and wait for the ack byte
    Send {
        /// Command text, e.g. X90
        command: String,
    },

    /// Move one axis to a position, clamped to its bounds
    Move {
        /// Axis label (X, Y, A or B)
        #[arg(short, long)]
        axis: AxisLabel,

        /// Target angle in degrees
        #[arg(short, long)]
        degrees: i32,
    },

    /// Sweep an axis between its bounds
    Sweep {
        /// Axis label (X, Y, A or B)
        #[arg(short, long, default_value = "X")]
        axis: AxisLabel,

        /// Degrees per step
        #[arg(short, long, default_value = "2")]
        step: i32,

        /// Delay between steps in milliseconds
        #[arg(long, default_value = "20")]
        delay_ms: u64,

        /// Number of full sweeps (0 = infinite)
        #[arg(short, long, default_value = "1")]
        count: u32,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let rig = match &args.config {
        Some(path) => RigConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RigConfig::preset(args.variant),
    };

    match &args.command {
        Command::Ports => cmd_ports(),
        Command::Send { command } => {
            let mut channel = open_channel(&args, &rig)?;
            cmd_send(&mut channel, command, &rig)
        }
        Command::Move { axis, degrees } => {
            let mut channel = open_channel(&args, &rig)?;
            cmd_move(&mut channel, *axis, *degrees, &rig)
        }
        Command::Sweep {
            axis,
            step,
            delay_ms,
            count,
        } => {
            let channel = open_channel(&args, &rig)?;
            cmd_sweep(channel, *axis, *step, *delay_ms, *count, &rig)
        }
    }
}

fn open_channel(args: &Args, rig: &RigConfig) -> Result<SerialChannel> {
    let path = match &args.port {
        Some(p) => p.clone(),
        None => available_ports()?
            .into_iter()
            .next()
            .context("no serial ports found; pass --port")?,
    };
    let mut channel = SerialChannel::new(path, args.baud.unwrap_or(rig.baud_rate));
    channel.open()?;
    Ok(channel)
}

fn cmd_ports() -> Result<()> {
    let ports = available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(())
}

fn send_and_wait(channel: &mut SerialChannel, command: &str, rig: &RigConfig) -> Result<()> {
    let cancel = AtomicBool::new(false);
    let start = Instant::now();
    channel.write(command)?;
    let ack = channel.read_ack(rig.ack_timeout(), &cancel)?;
    info!(
        "{} -> {:?}, ack {:#04x} after {:.1} ms",
        channel.name(),
        command,
        ack,
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(())
}

fn cmd_send(channel: &mut SerialChannel, command: &str, rig: &RigConfig) -> Result<()> {
    if command.is_empty() {
        bail!("command must not be empty");
    }
    send_and_wait(channel, command, rig)
}

fn cmd_move(
    channel: &mut SerialChannel,
    axis: AxisLabel,
    degrees: i32,
    rig: &RigConfig,
) -> Result<()> {
    let Some(limits) = rig.axis(axis) else {
        let available: Vec<String> = AxisLabel::iter()
            .filter(|l| rig.axis(*l).is_some())
            .map(|l| l.to_string())
            .collect();
        bail!(
            "axis {axis} not configured on {} rig (available: {})",
            rig.variant,
            available.join(", ")
        );
    };

    let clamped = limits.clamp(degrees);
    if clamped != degrees {
        info!(
            "Clamped {degrees} to {clamped} (bounds [{}, {}])",
            limits.min, limits.max
        );
    }
    send_and_wait(channel, &format_command(axis, clamped), rig)
}

fn cmd_sweep(
    channel: SerialChannel,
    axis: AxisLabel,
    step: i32,
    delay_ms: u64,
    count: u32,
    rig: &RigConfig,
) -> Result<()> {
    if step <= 0 {
        bail!("--step must be positive");
    }
    let Some(limits) = rig.axis(axis).copied() else {
        bail!("axis {axis} not configured on {} rig", rig.variant);
    };

    // Primed just below the bound, so the sweep's opening `min` is sent.
    let target = Arc::new(ControlTarget::default());
    target.set_axis(axis, limits.min - 1);

    let mut servo_config = ServoConfig::from_rig(rig);
    servo_config.axes.retain(|l| l.label == axis);
    let channels: Vec<Box<dyn ActuatorChannel>> = vec![Box::new(channel)];
    let mut ctrl = ServoController::new(servo_config, target.clone(), channels);

    let delay = Duration::from_millis(delay_ms);
    let mut sweeps = 0;
    while count == 0 || sweeps < count {
        let ascending = (limits.min..=limits.max).step_by(step as usize);
        let descending = (limits.min..=limits.max).rev().step_by(step as usize);
        for degrees in ascending.chain(descending) {
            target.set_axis(axis, degrees);
            let outcome = ctrl.step();
            if outcome.faults > 0 {
                ctrl.close_all();
                bail!("channel faulted during sweep");
            }
            thread::sleep(delay);
        }
        sweeps += 1;
        info!("Sweep {sweeps} complete");
    }

    ctrl.close_all();
    let stats = ctrl.stats();
    info!("{} commands sent", stats.commands_sent);
    Ok(())
}
