use anyhow::{Context, Result, bail};
use axpose_lib::constants::{DEFAULT_BAUD, MAX_DEVICE_ID};
use axpose_lib::device::Driver;
use axpose_lib::pose::{PoseFrame, PoseProject};
use axpose_lib::transport::Transport;
use chrono::Utc;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Record and replay pose sequences on a daisy-chained set of servos.
#[derive(Parser, Debug)]
#[command(name = "axpose", author, version, about)]
struct Cli {
    /// Serial port of the controller board, e.g. /dev/ttyACM0
    #[arg(short = 's', long)]
    port: String,

    #[arg(short, long, default_value_t = DEFAULT_BAUD)]
    baud: u32,

    /// Per-byte read timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Delay between pose frames in milliseconds
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,

    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sample servo positions until Ctrl-C, then save them to a project file
    Record {
        /// Highest servo ID in the chain; IDs 1 through this are sampled
        #[arg(short, long)]
        max_servo: u8,

        /// Sample all servos with one synchronized read per frame, using this
        /// per-servo group width (firmware-dependent, typically 2 or 3).
        /// Without it each servo is read individually.
        #[arg(long)]
        sync_width: Option<usize>,

        /// Project file to write
        file: PathBuf,
    },
    /// Replay a previously recorded project file
    Play {
        /// Project file to read
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(cli.verbose.tracing_level_filter().into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut driver = Driver::open(
        &cli.port,
        cli.baud,
        Duration::from_millis(cli.timeout_ms),
    )
    .with_context(|| format!("unable to open port {}", cli.port))?;

    let interval = Duration::from_millis(cli.interval_ms);
    match cli.command {
        Command::Record {
            max_servo,
            sync_width,
            file,
        } => record(&mut driver, max_servo, sync_width, &file, interval),
        Command::Play { file } => play(&mut driver, &file, interval),
    }
}

fn record<T: Transport>(
    driver: &mut Driver<T>,
    max_servo: u8,
    sync_width: Option<usize>,
    file: &Path,
    interval: Duration,
) -> Result<()> {
    if max_servo == 0 {
        bail!("max servo id needs to be > 0");
    }
    if max_servo > MAX_DEVICE_ID {
        bail!("max servo id cannot exceed {MAX_DEVICE_ID}");
    }
    let servo_ids: Vec<u8> = (1..=max_servo).collect();
    info!(?servo_ids, "recording");

    // relax the chain so it can be posed by hand
    for &id in &servo_ids {
        if let Err(e) = driver.torque_off(id) {
            warn!(id, error = %e, "torque off failed");
        }
    }

    let mut project = PoseProject::new(servo_ids.clone());

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))?;
    info!("sampling; press Ctrl-C to stop and save");

    while running.load(Ordering::SeqCst) {
        if let Some(frame) = sample_frame(driver, &servo_ids, sync_width) {
            println!(
                "{} {}",
                frame.timestamp_ms,
                frame
                    .positions
                    .iter()
                    .map(u16::to_string)
                    .collect::<Vec<_>>()
                    .join(" ")
            );
            project.push_frame(frame)?;
        }
        thread::sleep(interval);
    }

    info!(file = %file.display(), frames = project.frames.len(), "saving");
    project.save(file)?;
    Ok(())
}

/// Sample one pose, or None if any servo failed this tick. A failed tick is
/// skipped rather than aborting the whole recording.
fn sample_frame<T: Transport>(
    driver: &mut Driver<T>,
    servo_ids: &[u8],
    sync_width: Option<usize>,
) -> Option<PoseFrame> {
    match sync_width {
        Some(width) => match driver.sync_read(servo_ids, width) {
            Ok(result) => Some(PoseFrame {
                timestamp_ms: u64::from(result.timestamp_ms),
                positions: result.positions,
            }),
            Err(e) => {
                warn!(error = %e, "sync read failed, skipping frame");
                None
            }
        },
        None => {
            let mut positions = Vec::with_capacity(servo_ids.len());
            for &id in servo_ids {
                match driver.read_position(id) {
                    Ok(position) => positions.push(position),
                    Err(e) => {
                        warn!(id, error = %e, "position read failed, skipping frame");
                        return None;
                    }
                }
            }
            Some(PoseFrame {
                timestamp_ms: Utc::now().timestamp_millis() as u64,
                positions,
            })
        }
    }
}

fn play<T: Transport>(driver: &mut Driver<T>, file: &Path, interval: Duration) -> Result<()> {
    let project =
        PoseProject::load(file).with_context(|| format!("unable to load {}", file.display()))?;
    info!(servo_ids = ?project.servo_ids, frames = project.frames.len(), "replaying");

    for &id in &project.servo_ids {
        driver
            .torque_on(id)
            .with_context(|| format!("torque on failed for servo {id}"))?;
    }

    for frame in &project.frames {
        for (&id, &position) in project.servo_ids.iter().zip(&frame.positions) {
            driver
                .set_position(id, position)
                .with_context(|| format!("set position failed for servo {id}"))?;
        }
        thread::sleep(interval);
    }
    Ok(())
}
