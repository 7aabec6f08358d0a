use std::path::PathBuf;
use std::process::exit;

use anyhow::{Context, Result};
use clap::Parser;
use log::error;

use aqsensor_rs::logging::init_logging;
use aqsensor_rs::{DriverConfig, LogSink, Poller, SerialConnector};

#[derive(Parser, Debug)]
#[command(
    name = "aqsensor-poll",
    about = "Poll an aqsensor controller over serial and log its reports"
)]
struct Args {
    /// Serial port (e.g., /dev/ttyACM0)
    #[arg(short, long)]
    port: Option<String>,
    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,
    /// JSON config file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Seconds between polls
    #[arg(long)]
    interval: Option<f64>,
    /// Milliseconds to wait for each reply
    #[arg(long)]
    read_timeout_ms: Option<u64>,
    /// Offsets to keep on the device (e.g., t-1.4b0000p0000h000000e000000)
    #[arg(long)]
    offsets: Option<String>,
    /// Give up after this many failed opens in a row
    #[arg(long)]
    max_attempts: Option<u32>,
    /// Log level (overrides AQSENSOR_LOG / RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    if let Err(e) = run(args) {
        error!("{e:#}");
        exit(1);
    }
}

fn load_config(args: &Args) -> Result<DriverConfig> {
    let mut config = match &args.config {
        Some(path) => DriverConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => DriverConfig::default(),
    };

    if let Some(port) = &args.port {
        config.port = port.clone();
    }
    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    if let Some(secs) = args.interval {
        anyhow::ensure!(secs >= 0.0, "interval must not be negative");
        config.poll_interval_ms = (secs * 1000.0) as u64;
    }
    if let Some(ms) = args.read_timeout_ms {
        config.read_timeout_ms = ms;
    }
    if let Some(offsets) = &args.offsets {
        config.offsets = Some(offsets.clone());
    }
    if args.max_attempts.is_some() {
        config.max_connect_attempts = args.max_attempts;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let connector = SerialConnector::new(&config.port, config.baud_rate, config.io_slice());
    let mut poller = Poller::from_config(connector, &config)?;

    poller
        .run(&mut LogSink::default())
        .context("Polling stopped")?;
    Ok(())
}
