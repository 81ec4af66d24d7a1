//! Simulated device: a drifting free-running clock that periodically
//! resyncs against a perfect reference and reports its drift correction.
//!
//! The update rule matches the device firmware:
//!
//! ```text
//! time_error = reference - device_time            (Q32.32 ticks)
//! time_drift = time_error / seconds_since_last_sync
//! correction = (180 * correction) / 255 + (75 * time_drift) / 255
//! ```
//!
//! and `correction << 1` ticks are added to the device clock every second.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::fixed_point::{FixedTime, TICKS_PER_SECOND};
use crate::protocol::DRIFT_MARKER;

const SMOOTHING_MAX: i64 = u8::MAX as i64;

#[derive(Debug, Clone)]
pub struct DeviceClockConfig {
    /// Crystal rate error in parts per million; positive runs fast.
    pub rate_error_ppm: f64,
    /// Maximum per-second random walk of the rate error, in ppm.
    pub wander_ppm: f64,
    /// Seconds between resyncs against the reference.
    pub sync_interval: u32,
    /// Finite response filter weight out of 255 given to the old correction.
    pub smoothing_factor: u8,
    /// Device clock minus reference at start, in seconds.
    pub start_offset: f64,
    /// Correction in effect before the first sync, raw Q1.31.
    pub initial_correction: i32,
    pub seed: u64,
}

impl Default for DeviceClockConfig {
    fn default() -> Self {
        Self {
            rate_error_ppm: 50.0,
            wander_ppm: 0.0,
            sync_interval: 300,
            smoothing_factor: 180,
            start_offset: 0.0,
            initial_correction: 0,
            seed: 0,
        }
    }
}

pub struct SimulatedDevice {
    config: DeviceClockConfig,
    reference: FixedTime,
    device_time: FixedTime,
    rate_error_ppm: f64,
    residual_ticks: f64,
    drift_correction: i32,
    last_sync_sec: u32,
    next_sync_sec: u32,
    rng: StdRng,
}

impl SimulatedDevice {
    /// Start a device whose reference clock reads `reference` and which
    /// syncs immediately on its first step.
    pub fn new(config: DeviceClockConfig, reference: FixedTime) -> Self {
        let offset_ticks = (config.start_offset * TICKS_PER_SECOND) as i64;
        let device_time = reference.offset_by(offset_ticks);
        tracing::info!(
            "Simulated device starting at {} ({} ppm, sync every {}s)",
            device_time,
            config.rate_error_ppm,
            config.sync_interval
        );
        Self {
            rate_error_ppm: config.rate_error_ppm,
            drift_correction: config.initial_correction,
            rng: StdRng::seed_from_u64(config.seed),
            next_sync_sec: device_time.whole_seconds(),
            config,
            reference,
            device_time,
            residual_ticks: 0.0,
            last_sync_sec: 0,
        }
    }

    pub fn device_time(&self) -> FixedTime {
        self.device_time
    }

    pub fn reference_time(&self) -> FixedTime {
        self.reference
    }

    pub fn drift_correction(&self) -> i32 {
        self.drift_correction
    }

    /// Advance one reference second and return the lines the device prints:
    /// a drift report if a sync happened, then the current time in hex.
    pub fn step(&mut self) -> Vec<String> {
        self.advance_one_second();
        let mut lines = Vec::with_capacity(2);
        if self.device_time.whole_seconds() >= self.next_sync_sec {
            if let Some(report) = self.resync() {
                lines.push(report);
            }
        }
        lines.push(self.device_time.to_string());
        lines
    }

    fn advance_one_second(&mut self) {
        if self.config.wander_ppm > 0.0 {
            let w = self.config.wander_ppm;
            self.rate_error_ppm += self.rng.random_range(-w..=w);
        }
        self.reference = self.reference.offset_by(1 << 32);

        let error_ticks = self.rate_error_ppm * 1e-6 * TICKS_PER_SECOND + self.residual_ticks;
        let whole = error_ticks.trunc();
        self.residual_ticks = error_ticks - whole;
        let correction_ticks = i64::from(self.drift_correction) << 1;
        self.device_time = self
            .device_time
            .offset_by((1 << 32) + whole as i64 + correction_ticks);
    }

    /// Snap to the reference and update the correction. Returns the drift
    /// report line, or `None` on the very first sync.
    fn resync(&mut self) -> Option<String> {
        let t = self.reference;
        let t_sec = t.whole_seconds();
        let unsynced = self.device_time;
        self.device_time = t;
        self.next_sync_sec = t_sec.saturating_add(self.config.sync_interval);

        let report = if self.last_sync_sec > 0 && t_sec > self.last_sync_sec {
            let time_error = t.ticks_since(unsynced);
            let time_drift = (time_error / i128::from(t_sec - self.last_sync_sec)) as i32;
            let keep = i64::from(self.config.smoothing_factor);
            let mut correction = (keep * i64::from(self.drift_correction) / SMOOTHING_MAX) as i32;
            correction += ((SMOOTHING_MAX - keep) * i64::from(time_drift) / SMOOTHING_MAX) as i32;
            tracing::debug!(time_drift, correction, "device resynced");
            self.drift_correction = correction;
            Some(format!("{} correction {}", DRIFT_MARKER, correction))
        } else {
            None
        };
        self.last_sync_sec = t_sec;
        report
    }
}

impl Iterator for SimulatedDevice {
    type Item = Vec<String>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.step())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{LineKind, RawLine, classify, decode_drift};

    fn device(config: DeviceClockConfig) -> SimulatedDevice {
        SimulatedDevice::new(config, FixedTime::from_secs(1_700_000_000))
    }

    #[test]
    fn test_first_step_syncs_without_report() {
        let mut dev = device(DeviceClockConfig {
            start_offset: 2.0,
            ..Default::default()
        });
        let lines = dev.step();
        assert_eq!(lines.len(), 1);
        assert_eq!(dev.device_time(), dev.reference_time());
    }

    #[test]
    fn test_every_line_classifies() {
        let mut dev = device(DeviceClockConfig {
            sync_interval: 5,
            ..Default::default()
        });
        for lines in dev.by_ref().take(30) {
            for line in lines {
                let raw = RawLine::from(format!("{}\r\n", line));
                match classify(&raw) {
                    LineKind::Timestamp(_) => {}
                    LineKind::DriftReport { remainder } => {
                        assert!(decode_drift(&remainder).is_ok());
                    }
                    LineKind::Unrecognized => panic!("unrecognized sim line {:?}", line),
                }
            }
        }
    }

    #[test]
    fn test_fast_crystal_gets_negative_correction() {
        let mut dev = device(DeviceClockConfig {
            rate_error_ppm: 100.0,
            sync_interval: 10,
            ..Default::default()
        });
        for _ in 0..25 {
            dev.step();
        }
        assert!(dev.drift_correction() < 0);
    }

    #[test]
    fn test_perfect_crystal_keeps_zero_correction() {
        let mut dev = device(DeviceClockConfig {
            rate_error_ppm: 0.0,
            sync_interval: 10,
            ..Default::default()
        });
        for _ in 0..50 {
            dev.step();
        }
        assert_eq!(dev.drift_correction(), 0);
    }

    #[test]
    fn test_timestamp_lines_advance_by_about_a_second() {
        let mut dev = device(DeviceClockConfig {
            rate_error_ppm: 0.0,
            ..Default::default()
        });
        dev.step();
        let before = dev.device_time();
        dev.step();
        assert_eq!(dev.device_time().seconds_since(before), 1.0);
    }
}
