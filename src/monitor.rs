//! Dispatch loop: classify each line, decode it, gate persistence on the
//! session state, and report what happened.

use std::fmt;
use std::io;

use futures_core::Stream;
use futures_util::{StreamExt, pin_mut};
use thiserror::Error;

use crate::fixed_point::{DeviceTimestamp, HostTimestamp};
use crate::protocol::{
    ClockDelta, DriftCoefficient, DriftDecodeError, LineKind, RawLine, classify, clock_delta,
    decode_drift,
};
use crate::session::SessionState;
use crate::sink::{LogSink, SinkError};
use crate::time_source::{TimeSource, TimeSourceError};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("serial boundary read failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to open serial port {port}: {source}")]
    Serial {
        port: String,
        #[source]
        source: io::Error,
    },
}

/// What processing one line produced. Its `Display` form is the console
/// observation for that line.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Delta {
        delta: ClockDelta,
        persisted: bool,
    },
    /// A valid timestamp arrived but the host clock could not be sampled.
    DeltaUnavailable {
        device: DeviceTimestamp,
        error: TimeSourceError,
    },
    Drift {
        line: String,
        coefficient: Result<DriftCoefficient, DriftDecodeError>,
        persisted: bool,
    },
    Unrecognized,
}

impl Outcome {
    pub fn persisted(&self) -> bool {
        match self {
            Outcome::Delta { persisted, .. } | Outcome::Drift { persisted, .. } => *persisted,
            Outcome::DeltaUnavailable { .. } | Outcome::Unrecognized => false,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Delta { delta, .. } => write!(f, "{}", delta),
            Outcome::DeltaUnavailable { device, error } => {
                write!(f, "device time {} (host time unavailable: {})", device, error)
            }
            Outcome::Drift {
                line,
                coefficient: Ok(c),
                ..
            } => write!(f, "{}\ndrift: {}", line, c),
            Outcome::Drift { line, .. } => write!(f, "{}", line),
            Outcome::Unrecognized => f.write_str("not a hex string"),
        }
    }
}

/// Per-session counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub lines: u64,
    pub timestamps: u64,
    pub drift_reports: u64,
    pub drift_decode_failures: u64,
    pub unrecognized: u64,
    pub time_source_failures: u64,
    pub deltas_persisted: u64,
    pub drifts_persisted: u64,
    pub sink_errors: u64,
}

/// One monitoring session over a single serial connection.
pub struct DriftMonitor<T: TimeSource, S: LogSink> {
    time_source: T,
    sink: S,
    session: SessionState,
    stats: MonitorStats,
}

impl<T: TimeSource, S: LogSink> DriftMonitor<T, S> {
    pub fn new(time_source: T, sink: S) -> Self {
        Self {
            time_source,
            sink,
            session: SessionState::new(),
            stats: MonitorStats::default(),
        }
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Sample the host clock in Q32.32.
    pub fn sample_host(&self) -> Result<HostTimestamp, TimeSourceError> {
        self.time_source.now().and_then(|sample| sample.to_fixed())
    }

    /// Sample the host clock and process `line` against it.
    pub fn process(&mut self, line: &RawLine) -> Outcome {
        let host = self.sample_host();
        self.process_line(line, host)
    }

    /// Process one line given the host time sampled when it arrived.
    ///
    /// Persistence is gated on the session state from before this line, so
    /// the first line of a session is reported but never logged.
    pub fn process_line(
        &mut self,
        line: &RawLine,
        host: Result<HostTimestamp, TimeSourceError>,
    ) -> Outcome {
        let armed = self.session.is_armed();
        self.stats.lines += 1;

        let kind = classify(line);
        tracing::trace!(kind = kind.label(), len = line.len(), "classified line");

        let outcome = match kind {
            LineKind::Timestamp(device) => self.handle_timestamp(device, host, armed),
            LineKind::DriftReport { remainder } => self.handle_drift(line, &remainder, armed),
            LineKind::Unrecognized => {
                self.stats.unrecognized += 1;
                tracing::debug!(line = %line, "unrecognized line");
                Outcome::Unrecognized
            }
        };

        if self.session.mark_processed() {
            tracing::info!("session armed; first line was not persisted");
        }
        outcome
    }

    fn handle_timestamp(
        &mut self,
        device: DeviceTimestamp,
        host: Result<HostTimestamp, TimeSourceError>,
        armed: bool,
    ) -> Outcome {
        self.stats.timestamps += 1;
        let host = match host {
            Ok(host) => host,
            Err(error) => {
                self.stats.time_source_failures += 1;
                tracing::warn!(%device, %error, "host time unavailable; sample skipped");
                return Outcome::DeltaUnavailable { device, error };
            }
        };

        let delta = clock_delta(host, device);
        let persisted = armed && self.persist(|sink| sink.append_delta(delta));
        if persisted {
            self.stats.deltas_persisted += 1;
        }
        Outcome::Delta { delta, persisted }
    }

    fn handle_drift(&mut self, line: &RawLine, remainder: &str, armed: bool) -> Outcome {
        self.stats.drift_reports += 1;
        let coefficient = decode_drift(remainder);

        let persisted = match &coefficient {
            Ok(c) => {
                let c = *c;
                if !(-1.0..=1.0).contains(&c.value()) {
                    tracing::warn!(coefficient = c.value(), "drift coefficient outside [-1, 1]");
                }
                armed && self.persist(|sink| sink.append_drift(c))
            }
            Err(e) => {
                self.stats.drift_decode_failures += 1;
                tracing::debug!(error = %e, "drift report not decoded");
                false
            }
        };

        if persisted {
            self.stats.drifts_persisted += 1;
            self.persist(|sink| sink.mark_epoch());
        }

        Outcome::Drift {
            line: line.to_string(),
            coefficient,
            persisted,
        }
    }

    /// Run one sink write. Failures are reported and counted, never retried.
    fn persist(&mut self, write: impl FnOnce(&mut S) -> Result<(), SinkError>) -> bool {
        match write(&mut self.sink) {
            Ok(()) => true,
            Err(e) => {
                self.stats.sink_errors += 1;
                tracing::error!(error = %e, "log write failed");
                false
            }
        }
    }

    /// Process every line from `lines` until the stream ends.
    ///
    /// The host clock is sampled immediately after each line arrives. Each
    /// outcome is handed to `observe` before the next read.
    pub async fn run<L>(&mut self, lines: L, mut observe: impl FnMut(&Outcome)) -> Result<(), MonitorError>
    where
        L: Stream<Item = io::Result<RawLine>>,
    {
        pin_mut!(lines);
        while let Some(line) = lines.next().await {
            let line = line?;
            let host = self.sample_host();
            let outcome = self.process_line(&line, host);
            observe(&outcome);
        }
        tracing::info!(stats = ?self.stats, "line stream ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_point::FixedTime;
    use crate::sink::MemoryLogSink;
    use crate::time_source::{FixedTimeSource, HostSample};

    fn monitor_at(secs: i64) -> DriftMonitor<FixedTimeSource, MemoryLogSink> {
        DriftMonitor::new(FixedTimeSource(HostSample::new(secs, 0)), MemoryLogSink::new())
    }

    #[test]
    fn test_first_timestamp_is_observed_not_persisted() {
        let mut monitor = monitor_at(2);
        let outcome = monitor.process(&RawLine::from("0000000100000000\n"));
        assert_eq!(
            outcome,
            Outcome::Delta {
                delta: ClockDelta(1.0),
                persisted: false
            }
        );
        assert_eq!(monitor.sink().delta_text(), "");
        assert!(monitor.session().is_armed());
    }

    #[test]
    fn test_second_timestamp_is_persisted() {
        let mut monitor = monitor_at(2);
        monitor.process(&RawLine::from("garbage\n"));
        let outcome = monitor.process(&RawLine::from("0000000300000000\n"));
        assert!(outcome.persisted());
        assert_eq!(monitor.sink().delta_text(), "-1,");
        assert_eq!(monitor.stats().deltas_persisted, 1);
    }

    #[test]
    fn test_drift_report_writes_both_streams() {
        let mut monitor = monitor_at(0);
        monitor.process(&RawLine::from("00\n"));
        let outcome = monitor.process(&RawLine::from("uC drift correction 1073741824\r\n"));
        assert_eq!(outcome.to_string(), "uC drift correction 1073741824\ndrift: 0.5");
        assert_eq!(monitor.sink().drift_text(), "0.5\n");
        assert_eq!(monitor.sink().delta_text(), "\n");
    }

    #[test]
    fn test_undecodable_drift_report_is_echoed_only() {
        let mut monitor = monitor_at(0);
        monitor.process(&RawLine::from("x\n"));
        monitor.process(&RawLine::from("00\n"));
        let outcome = monitor.process(&RawLine::from("uC drift\n"));
        assert_eq!(outcome.to_string(), "uC drift");
        assert!(!outcome.persisted());
        assert_eq!(monitor.sink().drift_text(), "");
        assert_eq!(monitor.sink().delta_text(), "0,");
        assert_eq!(monitor.stats().drift_decode_failures, 1);
    }

    #[test]
    fn test_drift_value_glued_to_marker_is_not_persisted() {
        let mut monitor = monitor_at(0);
        monitor.process(&RawLine::from("x\n"));
        let outcome = monitor.process(&RawLine::from("uC drift1073741824\r\n"));
        assert!(matches!(
            outcome,
            Outcome::Drift { coefficient: Err(DriftDecodeError::MissingToken), persisted: false, .. }
        ));
        assert_eq!(monitor.sink().drift_text(), "");
        assert_eq!(monitor.sink().delta_text(), "");
    }

    #[test]
    fn test_time_source_failure_skips_sample() {
        let mut monitor = monitor_at(0);
        monitor.process(&RawLine::from("x\n"));
        let outcome = monitor.process_line(
            &RawLine::from("10\n"),
            Err(TimeSourceError::Clock("gone".to_string())),
        );
        assert!(matches!(
            outcome,
            Outcome::DeltaUnavailable { device, .. } if device == FixedTime::from_raw(0x10)
        ));
        assert_eq!(monitor.sink().delta_text(), "");
        assert_eq!(monitor.stats().time_source_failures, 1);
    }

    #[test]
    fn test_unrecognized_outcome_text() {
        let mut monitor = monitor_at(0);
        let outcome = monitor.process(&RawLine::from("hello world\n"));
        assert_eq!(outcome, Outcome::Unrecognized);
        assert_eq!(outcome.to_string(), "not a hex string");
    }
}
