//! Host time sources.
//!
//! A [`TimeSource`] is sampled once per received line, as soon as the read
//! completes. Any latency between the two shows up as bias in every clock
//! delta, so implementations should be cheap to call.

use std::collections::VecDeque;
use std::process::Command;
use std::sync::Mutex;

use thiserror::Error;

use crate::fixed_point::{FixedTime, HostTimestamp};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeSourceError {
    #[error("clock unavailable: {0}")]
    Clock(String),
    #[error("time command failed: {0}")]
    Command(String),
    #[error("could not parse time {0:?}")]
    Parse(String),
    #[error("time {0}s is outside the 32-bit seconds range")]
    OutOfRange(i64),
}

/// Wall-clock reading: whole seconds since the Unix epoch plus nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostSample {
    pub secs: i64,
    pub nanos: u32,
}

impl HostSample {
    pub fn new(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    /// Convert to Q32.32: `secs << 32` plus `nanos * 2^32 / 10^9`.
    pub fn to_fixed(self) -> Result<HostTimestamp, TimeSourceError> {
        let secs = u32::try_from(self.secs).map_err(|_| TimeSourceError::OutOfRange(self.secs))?;
        FixedTime::from_parts(secs, self.nanos).ok_or(TimeSourceError::OutOfRange(self.secs))
    }
}

pub trait TimeSource: Send + Sync {
    fn now(&self) -> Result<HostSample, TimeSourceError>;
}

impl<T: TimeSource + ?Sized> TimeSource for Box<T> {
    fn now(&self) -> Result<HostSample, TimeSourceError> {
        (**self).now()
    }
}

/// Wall clock of the host this process runs on.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Result<HostSample, TimeSourceError> {
        let now = chrono::Utc::now();
        Ok(HostSample::new(now.timestamp(), now.timestamp_subsec_nanos()))
    }
}

/// Runs an external command printing `<seconds>.<fraction>`, such as
/// `date +%s.%N`. Spawning a process per sample adds milliseconds of bias;
/// prefer [`SystemTimeSource`] unless the reference clock lives elsewhere.
#[derive(Debug, Clone)]
pub struct CommandTimeSource {
    program: String,
    args: Vec<String>,
}

impl CommandTimeSource {
    pub fn new(argv: &[String]) -> Result<Self, TimeSourceError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| TimeSourceError::Command("empty command".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl TimeSource for CommandTimeSource {
    fn now(&self) -> Result<HostSample, TimeSourceError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|e| TimeSourceError::Command(format!("{}: {}", self.program, e)))?;
        if !output.status.success() {
            return Err(TimeSourceError::Command(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_epoch_seconds(&stdout)
    }
}

/// Parse `<seconds>[.<fraction>]`. Fractions are read as decimal digits and
/// scaled to nanoseconds; digits past the ninth are dropped.
pub fn parse_epoch_seconds(text: &str) -> Result<HostSample, TimeSourceError> {
    let text = text.trim();
    let parse_err = || TimeSourceError::Parse(text.to_string());
    let (secs, frac) = text.split_once('.').unwrap_or((text, ""));
    let secs: i64 = secs.parse().map_err(|_| parse_err())?;
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(parse_err());
    }
    let mut nanos: u32 = 0;
    for i in 0..9 {
        let digit = frac.as_bytes().get(i).map_or(0, |b| u32::from(b - b'0'));
        nanos = nanos * 10 + digit;
    }
    Ok(HostSample::new(secs, nanos))
}

/// Always returns the same sample.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource(pub HostSample);

impl TimeSource for FixedTimeSource {
    fn now(&self) -> Result<HostSample, TimeSourceError> {
        Ok(self.0)
    }
}

/// Replays a queue of results, then reports the clock as unavailable.
#[derive(Debug, Default)]
pub struct ScriptedTimeSource {
    samples: Mutex<VecDeque<Result<HostSample, TimeSourceError>>>,
}

impl ScriptedTimeSource {
    pub fn new(samples: impl IntoIterator<Item = Result<HostSample, TimeSourceError>>) -> Self {
        Self {
            samples: Mutex::new(samples.into_iter().collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.samples.lock().map(|q| q.len()).unwrap_or(0)
    }
}

impl TimeSource for ScriptedTimeSource {
    fn now(&self) -> Result<HostSample, TimeSourceError> {
        let mut queue = self
            .samples
            .lock()
            .map_err(|_| TimeSourceError::Clock("scripted source poisoned".to_string()))?;
        queue
            .pop_front()
            .unwrap_or_else(|| Err(TimeSourceError::Clock("script exhausted".to_string())))
    }
}
