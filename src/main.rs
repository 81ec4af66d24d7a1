// src/main.rs - drift monitor runner
use std::path::{Path, PathBuf};

use clap::Parser;
use drift_monitor::config::{self, Config};
use drift_monitor::serial::{line_stream, open_port};
use drift_monitor::{DriftMonitor, FileLogSink};
use tokio::io::BufReader;

const DEFAULT_CONFIG_PATH: &str = "drift-monitor.toml";

/// Measure device clock drift from serial timestamp reports
#[derive(Parser, Debug)]
#[command(name = "drift-monitor", version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port (overrides config)
    #[arg(long)]
    port: Option<String>,

    /// Baud rate (overrides config)
    #[arg(long)]
    baud: Option<u32>,

    /// Delta log path (overrides config)
    #[arg(long)]
    delta_log: Option<PathBuf>,

    /// Drift log path (overrides config)
    #[arg(long)]
    drift_log: Option<PathBuf>,

    /// Read lines from stdin instead of the serial port
    #[arg(long)]
    stdin: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(port) = &self.port {
            config.serial.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.serial.baud = baud;
        }
        if let Some(path) = &self.delta_log {
            config.logs.delta_path = path.clone();
        }
        if let Some(path) = &self.drift_log {
            config.logs.drift_path = path.clone();
        }
    }
}

fn load(cli: &Cli) -> Result<Config, config::ConfigError> {
    match &cli.config {
        Some(path) => config::load_config(&path.to_string_lossy()),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => config::load_config(DEFAULT_CONFIG_PATH),
        None => Ok(Config::default()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    // stdout carries the observations; diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let mut config = load(&cli).map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    tracing::info!("Delta log: {}", config.logs.delta_path.display());
    tracing::info!("Drift log: {}", config.logs.drift_path.display());
    tracing::info!("Time source: {:?}", config.time_source.kind);

    let time_source = config.time_source.build()?;
    let sink = FileLogSink::open(&config.logs.delta_path, &config.logs.drift_path)?;
    let mut monitor = DriftMonitor::new(time_source, sink);
    let observe = |outcome: &drift_monitor::Outcome| println!("{}", outcome);

    if cli.stdin {
        tracing::info!("Reading lines from stdin");
        let lines = line_stream(BufReader::new(tokio::io::stdin()));
        monitor.run(lines, observe).await?;
    } else {
        let port = open_port(&config.serial)?;
        let lines = line_stream(BufReader::new(port));
        monitor.run(lines, observe).await?;
    }

    Ok(())
}
