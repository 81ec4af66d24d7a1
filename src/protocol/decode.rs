//! Decoders for classified lines.

use std::fmt;

use thiserror::Error;

use crate::fixed_point::{DeviceTimestamp, HostTimestamp, q31_to_f64};

/// Host time minus device time, in seconds. Negative when the device leads.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ClockDelta(pub f64);

impl ClockDelta {
    pub fn seconds(self) -> f64 {
        self.0
    }
}

impl fmt::Display for ClockDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Device-reported correction per resync interval, nominally in [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct DriftCoefficient(pub f64);

impl DriftCoefficient {
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for DriftCoefficient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriftDecodeError {
    #[error("drift report has no trailing value")]
    MissingToken,
    #[error("drift value {0:?} is not numeric")]
    NotNumeric(String),
    #[error("drift value {0:?} is not finite")]
    NonFinite(String),
    #[error("drift report suffix {0:?} has more than one numeric segment")]
    AmbiguousSuffix(String),
}

/// Compute `(host - device) / 2^32` with 128-bit intermediate arithmetic.
pub fn clock_delta(host: HostTimestamp, device: DeviceTimestamp) -> ClockDelta {
    ClockDelta(host.seconds_since(device))
}

/// Decode the text following the drift marker.
///
/// The value is the token after the last whitespace; a value glued to the
/// marker with no whitespace before it is missing. If the text before it
/// also ends in a digit (`"t=5 000"`), the split point is ambiguous and the
/// report is rejected instead of guessed at.
pub fn decode_drift(remainder: &str) -> Result<DriftCoefficient, DriftDecodeError> {
    let trimmed = remainder.trim_end();
    let Some((head, token)) = trimmed.rsplit_once(char::is_whitespace) else {
        return Err(DriftDecodeError::MissingToken);
    };
    if token.is_empty() {
        return Err(DriftDecodeError::MissingToken);
    }
    let raw: f64 = token
        .parse()
        .map_err(|_| DriftDecodeError::NotNumeric(token.to_string()))?;
    if !raw.is_finite() {
        return Err(DriftDecodeError::NonFinite(token.to_string()));
    }
    if head.trim_end().ends_with(|c: char| c.is_ascii_digit()) {
        return Err(DriftDecodeError::AmbiguousSuffix(trimmed.trim_start().to_string()));
    }
    Ok(DriftCoefficient(q31_to_f64(raw)))
}
