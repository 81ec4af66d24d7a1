//! Append-only log streams for decoded values.
//!
//! Two streams are kept:
//!
//! - the delta log: `<delta>,` per timestamp, and a line break at each drift
//!   correction so samples from different drift epochs land on separate lines
//! - the drift log: `<coefficient>\n` per drift report
//!
//! Each entry goes out in a single `write_all`, so a stream never holds a
//! partial entry interleaved with another.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use thiserror::Error;

use crate::protocol::{ClockDelta, DriftCoefficient};

/// Written to the delta log to close a drift epoch.
pub const EPOCH_DELIMITER: &str = "\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Delta,
    Drift,
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogStream::Delta => f.write_str("delta"),
            LogStream::Drift => f.write_str("drift"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to append to {stream} log: {source}")]
    Io {
        stream: LogStream,
        #[source]
        source: std::io::Error,
    },
}

pub trait LogSink: Send {
    fn append_delta(&mut self, delta: ClockDelta) -> Result<(), SinkError>;
    fn append_drift(&mut self, coefficient: DriftCoefficient) -> Result<(), SinkError>;
    /// Close the current drift epoch in the delta log.
    fn mark_epoch(&mut self) -> Result<(), SinkError>;
}

impl<S: LogSink + ?Sized> LogSink for Box<S> {
    fn append_delta(&mut self, delta: ClockDelta) -> Result<(), SinkError> {
        (**self).append_delta(delta)
    }

    fn append_drift(&mut self, coefficient: DriftCoefficient) -> Result<(), SinkError> {
        (**self).append_drift(coefficient)
    }

    fn mark_epoch(&mut self) -> Result<(), SinkError> {
        (**self).mark_epoch()
    }
}

pub fn format_delta_entry(delta: ClockDelta) -> String {
    format!("{},", delta)
}

pub fn format_drift_entry(coefficient: DriftCoefficient) -> String {
    format!("{}\n", coefficient)
}

/// A pair of writers, one per stream.
#[derive(Debug)]
pub struct StreamLogSink<W: Write + Send> {
    delta: W,
    drift: W,
}

pub type FileLogSink = StreamLogSink<File>;
pub type MemoryLogSink = StreamLogSink<Vec<u8>>;

impl<W: Write + Send> StreamLogSink<W> {
    pub fn from_writers(delta: W, drift: W) -> Self {
        Self { delta, drift }
    }

    fn write_entry(&mut self, stream: LogStream, entry: &str) -> Result<(), SinkError> {
        let writer = match stream {
            LogStream::Delta => &mut self.delta,
            LogStream::Drift => &mut self.drift,
        };
        writer
            .write_all(entry.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|source| SinkError::Io { stream, source })
    }
}

impl<W: Write + Send> LogSink for StreamLogSink<W> {
    fn append_delta(&mut self, delta: ClockDelta) -> Result<(), SinkError> {
        self.write_entry(LogStream::Delta, &format_delta_entry(delta))
    }

    fn append_drift(&mut self, coefficient: DriftCoefficient) -> Result<(), SinkError> {
        self.write_entry(LogStream::Drift, &format_drift_entry(coefficient))
    }

    fn mark_epoch(&mut self) -> Result<(), SinkError> {
        self.write_entry(LogStream::Delta, EPOCH_DELIMITER)
    }
}

impl FileLogSink {
    /// Open both logs for appending, creating them if missing.
    pub fn open(delta_path: &Path, drift_path: &Path) -> Result<Self, SinkError> {
        let delta = open_append(delta_path, LogStream::Delta)?;
        let drift = open_append(drift_path, LogStream::Drift)?;
        tracing::info!(
            delta = %delta_path.display(),
            drift = %drift_path.display(),
            "opened log streams"
        );
        Ok(Self::from_writers(delta, drift))
    }
}

fn open_append(path: &Path, stream: LogStream) -> Result<File, SinkError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SinkError::Io { stream, source })
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::from_writers(Vec::new(), Vec::new())
    }

    pub fn delta_text(&self) -> String {
        String::from_utf8_lossy(&self.delta).into_owned()
    }

    pub fn drift_text(&self) -> String {
        String::from_utf8_lossy(&self.drift).into_owned()
    }
}

impl Default for MemoryLogSink {
    fn default() -> Self {
        Self::new()
    }
}
