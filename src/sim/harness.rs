//! CLI entry point for the device simulator: prints the serial protocol a
//! drifting device would emit, for piping into `drift-monitor --stdin`.

use std::io::Write;
use std::time::Duration;

use clap::Parser;
use drift_monitor::simulator::{DeviceClockConfig, SimulatedDevice};
use drift_monitor::time_source::{SystemTimeSource, TimeSource};

/// Device simulator CLI
#[derive(Parser, Debug)]
#[command(name = "drift-sim", about = "Emit simulated device timestamp and drift report lines.")]
pub struct Cli {
    /// Crystal rate error in ppm (positive runs fast)
    #[arg(long, default_value_t = 50.0, allow_negative_numbers = true)]
    drift_ppm: f64,

    /// Per-second random walk of the rate error, in ppm
    #[arg(long, default_value_t = 0.0)]
    wander_ppm: f64,

    /// Seconds between device resyncs
    #[arg(long, default_value_t = 300)]
    sync_interval: u32,

    /// Number of simulated seconds to emit
    #[arg(long, default_value_t = 3600)]
    seconds: u64,

    /// Device clock minus reference at start, in seconds
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    start_offset: f64,

    /// Correction in effect before the first sync (raw Q1.31)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    initial_drift: i32,

    /// Random seed for the rate wander
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Sleep one second between emitted seconds
    #[arg(long)]
    realtime: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = DeviceClockConfig {
        rate_error_ppm: cli.drift_ppm,
        wander_ppm: cli.wander_ppm,
        sync_interval: cli.sync_interval,
        start_offset: cli.start_offset,
        initial_correction: cli.initial_drift,
        seed: cli.seed,
        ..Default::default()
    };

    let reference = SystemTimeSource.now()?.to_fixed()?;
    let mut device = SimulatedDevice::new(config, reference);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for _ in 0..cli.seconds {
        for line in device.step() {
            write!(out, "{}\r\n", line)?;
        }
        out.flush()?;
        if cli.realtime {
            std::thread::sleep(Duration::from_secs(1));
        }
    }
    tracing::info!(
        "Simulated {}s, final correction {}",
        cli.seconds,
        device.drift_correction()
    );
    Ok(())
}
