//! icue-link CLI: read and log iCUE LINK hub telemetry.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use icue_link_core::comm::LinkStatus;
use icue_link_core::config::SessionConfig;
use icue_link_core::telemetry::{self, CsvLog, TelemetrySample};
use icue_link_core::{Session, SessionState};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Granularity of the stop-flag check while waiting between polls.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(
    name = "icue-link",
    version,
    about = "Read and log telemetry from a Corsair iCUE LINK System Hub"
)]
struct Cli {
    /// Show protocol traffic (overrides RUST_LOG).
    #[arg(short, long, global = true)]
    debug: bool,

    /// JSON file with session timing settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Pause after each command, in milliseconds.
    #[arg(long, global = true)]
    command_delay_ms: Option<u64>,

    /// Response timeout, in milliseconds.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List connected iCUE LINK hubs.
    ListDevices,
    /// Take a single reading.
    Read {
        /// Print the sample as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Poll continuously until Ctrl+C.
    Monitor {
        /// Polling interval in seconds.
        #[arg(short, long, default_value_t = 2.0)]
        interval: f64,
        /// Write samples to this CSV file instead of the console.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Stop after this many samples.
        #[arg(long)]
        count: Option<u64>,
    },
}

fn init_logging(debug: bool) {
    let filter = if debug {
        tracing_subscriber::EnvFilter::new("icue_link_core=trace,icue_link_cli=debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<SessionConfig> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if let Some(ms) = cli.command_delay_ms {
        config.command_delay_ms = ms;
    }
    if let Some(ms) = cli.timeout_ms {
        config.response_timeout_ms = ms;
    }
    config.validate()?;
    Ok(config)
}

/// Connect to the first hub and switch it to software mode.
fn bring_up(session: &mut Session) -> icue_link_core::Result<()> {
    session.connect()?;
    session.enter_software_mode()
}

fn open_session(config: SessionConfig) -> Result<Session> {
    let mut session = Session::new(config);
    bring_up(&mut session).context("failed to open iCUE LINK hub")?;
    Ok(session)
}

fn run_list_devices() -> Result<()> {
    let devices = icue_link_core::device::discover_devices()?;
    if devices.is_empty() {
        println!("No iCUE LINK System Hub found.");
        println!("Ensure the hub is connected and you have permission to access it.");
        return Ok(());
    }

    for dev in &devices {
        println!(
            "{} (VID: 0x{:04X}, PID: 0x{:04X}, interface: {}, serial: {}, path: {})",
            dev.product.as_deref().unwrap_or("iCUE LINK System Hub"),
            dev.vid,
            dev.pid,
            dev.interface_number,
            dev.serial.as_deref().unwrap_or("-"),
            dev.path_str()
        );
    }
    Ok(())
}

fn run_read(config: SessionConfig, json: bool) -> Result<()> {
    let mut session = open_session(config)?;
    let sampled = telemetry::sample(&mut session);

    if json {
        println!("{}", serde_json::to_string_pretty(&sampled.sample)?);
    } else {
        println!("{}", sampled.sample.format_line());
    }

    match sampled.fault {
        Some(fault) => Err(fault).context("telemetry read incomplete"),
        None => Ok(()),
    }
}

/// Sleep for `duration`, returning early once `stop` is set.
fn wait_or_stop(duration: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + duration;
    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(STOP_CHECK_INTERVAL));
    }
}

/// Convert the `--interval` seconds into a poll period.
fn parse_interval(secs: f64) -> Result<Duration> {
    if !(secs.is_finite() && secs > 0.0) {
        bail!("interval must be positive, got {secs}");
    }
    Duration::try_from_secs_f64(secs)
        .with_context(|| format!("interval of {secs} seconds is out of range"))
}

fn create_csv_log(path: &Path, device_path: &str) -> Result<CsvLog<BufWriter<File>>> {
    let file = File::create(path)
        .with_context(|| format!("failed to create output file '{}'", path.display()))?;
    CsvLog::new(BufWriter::new(file), device_path)
        .with_context(|| format!("failed to write CSV header to '{}'", path.display()))
}

fn run_monitor(
    config: SessionConfig,
    interval: f64,
    output: Option<&Path>,
    count: Option<u64>,
) -> Result<()> {
    let interval = parse_interval(interval)?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop_clone = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop_clone.store(true, Ordering::Relaxed);
        })
        .context("failed to install Ctrl-C handler")?;
    }

    let mut session = open_session(config)?;
    println!("--- Starting Telemetry Capture (Press Ctrl+C to exit) ---");

    let mut csv = match output {
        Some(path) => {
            println!("Logging telemetry data to: {}", path.display());
            Some(create_csv_log(path, session.device_path().unwrap_or_default())?)
        }
        None => None,
    };

    let mut taken: u64 = 0;
    while !stop.load(Ordering::Relaxed) && count.map_or(true, |limit| taken < limit) {
        if session.state() != SessionState::SoftwareMode {
            match bring_up(&mut session) {
                Ok(()) => {
                    info!(path = session.device_path().unwrap_or_default(), "Reconnected");
                    if let Some(log) = csv.as_mut() {
                        log.set_device_path(session.device_path().unwrap_or_default());
                    }
                }
                Err(e) => warn!(error = %e, "Reconnect failed"),
            }
        }

        let sample = if session.state() == SessionState::SoftwareMode {
            let sampled = telemetry::sample(&mut session);
            if LinkStatus::from_fault(sampled.fault.as_ref()) == LinkStatus::Broken {
                warn!("Link broken, reconnecting before the next poll");
                session.disconnect();
            }
            sampled.sample
        } else {
            TelemetrySample::unavailable()
        };

        match csv.as_mut() {
            Some(log) => log.append(&sample).context("failed to write CSV row")?,
            None => println!("{}", sample.format_line()),
        }
        taken += 1;

        if count.map_or(true, |limit| taken < limit) {
            wait_or_stop(interval, &stop);
        }
    }

    println!("Stopping telemetry capture...");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match &cli.command {
        Commands::ListDevices => run_list_devices(),
        Commands::Read { json } => run_read(load_config(&cli)?, *json),
        Commands::Monitor {
            interval,
            output,
            count,
        } => run_monitor(load_config(&cli)?, *interval, output.as_deref(), *count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_interval_accepts_fractional_seconds() {
        assert_eq!(parse_interval(2.0).unwrap(), Duration::from_secs(2));
        assert_eq!(parse_interval(0.25).unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn parse_interval_rejects_non_positive() {
        assert!(parse_interval(0.0).is_err());
        assert!(parse_interval(-1.0).is_err());
        assert!(parse_interval(f64::NAN).is_err());
        assert!(parse_interval(f64::INFINITY).is_err());
    }

    #[test]
    fn parse_interval_rejects_out_of_range() {
        let err = parse_interval(1e20).unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");
    }
}
