//! Line protocol spoken by the device over the serial link.
//!
//! The device emits two kinds of lines:
//!
//! - a bare hexadecimal Q32.32 timestamp, e.g. `0000000F80000000`
//! - a drift report starting with `uC drift`, ending in the raw Q1.31
//!   correction, e.g. `uC drift correction -10737418`
//!
//! Everything else is unrecognized. Classification happens before any
//! decoding so the decoders only ever see validated payloads.

pub mod decode;

use std::borrow::Cow;
use std::fmt;

use crate::fixed_point::{DeviceTimestamp, FixedTime};

pub use decode::{ClockDelta, DriftCoefficient, DriftDecodeError, clock_delta, decode_drift};

/// Prefix identifying a drift report line.
pub const DRIFT_MARKER: &str = "uC drift";

/// One line as received from the serial boundary, terminator included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    bytes: Vec<u8>,
}

impl RawLine {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self { bytes: bytes.into() }
    }

    /// Line contents as text. Invalid UTF-8 is replaced, never rejected.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<&str> for RawLine {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl From<String> for RawLine {
    fn from(s: String) -> Self {
        Self::new(s.into_bytes())
    }
}

impl fmt::Display for RawLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text().trim())
    }
}

/// Result of classifying a [`RawLine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// The whole line is a hexadecimal device timestamp.
    Timestamp(DeviceTimestamp),
    /// The line starts with [`DRIFT_MARKER`]; carries the text after it.
    DriftReport { remainder: String },
    Unrecognized,
}

impl LineKind {
    pub fn label(&self) -> &'static str {
        match self {
            LineKind::Timestamp(_) => "timestamp",
            LineKind::DriftReport { .. } => "drift_report",
            LineKind::Unrecognized => "unrecognized",
        }
    }
}

/// Classify one line. Pure: no decoding past the hex parse, no side effects.
pub fn classify(line: &RawLine) -> LineKind {
    let text = line.text();
    if let Some(timestamp) = parse_hex_timestamp(text.trim()) {
        return LineKind::Timestamp(timestamp);
    }
    match text.strip_prefix(DRIFT_MARKER) {
        Some(remainder) => LineKind::DriftReport {
            remainder: remainder.to_string(),
        },
        None => LineKind::Unrecognized,
    }
}

/// Parse a bare, case-insensitive hex literal into a device timestamp.
///
/// No `0x` prefix, sign, or separators are accepted. Leading zeros are fine
/// as long as the value fits in 64 bits.
pub fn parse_hex_timestamp(s: &str) -> Option<DeviceTimestamp> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(s, 16).ok().map(FixedTime::from_raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_uppercase_device_timestamp() {
        let line = RawLine::from("0000000F80000000\r\n");
        assert_eq!(
            classify(&line),
            LineKind::Timestamp(FixedTime::from_raw(0x0000_000F_8000_0000))
        );
    }

    #[test]
    fn test_classify_lowercase_hex() {
        let line = RawLine::from("deadbeef\n");
        assert_eq!(classify(&line), LineKind::Timestamp(FixedTime::from_raw(0xdead_beef)));
    }

    #[test]
    fn test_hex_round_trip_edges() {
        for v in [0u64, 1, 0xffff_ffff, 1 << 32, u64::MAX - 1, u64::MAX] {
            let encoded = format!("{:x}", v);
            assert_eq!(parse_hex_timestamp(&encoded), Some(FixedTime::from_raw(v)));
        }
    }

    #[test]
    fn test_hex_rejects_prefix_sign_and_overflow() {
        assert_eq!(parse_hex_timestamp("0x10"), None);
        assert_eq!(parse_hex_timestamp("+10"), None);
        assert_eq!(parse_hex_timestamp("1_0"), None);
        assert_eq!(parse_hex_timestamp("1ffffffffffffffff"), None);
        assert_eq!(parse_hex_timestamp(""), None);
    }

    #[test]
    fn test_hex_allows_redundant_leading_zeros() {
        assert_eq!(
            parse_hex_timestamp("00000000000000000001"),
            Some(FixedTime::from_raw(1))
        );
    }

    #[test]
    fn test_classify_drift_report_keeps_remainder() {
        let line = RawLine::from("uC drift correction 1073741824\r\n");
        assert_eq!(
            classify(&line),
            LineKind::DriftReport {
                remainder: " correction 1073741824\r\n".to_string()
            }
        );
    }

    #[test]
    fn test_classify_bare_marker() {
        let line = RawLine::from("uC drift");
        assert_eq!(
            classify(&line),
            LineKind::DriftReport {
                remainder: String::new()
            }
        );
    }

    #[test]
    fn test_marker_is_case_sensitive() {
        assert_eq!(classify(&RawLine::from("UC DRIFT 12\n")), LineKind::Unrecognized);
    }

    #[test]
    fn test_classify_unrecognized() {
        assert_eq!(classify(&RawLine::from("hello world\n")), LineKind::Unrecognized);
        assert_eq!(classify(&RawLine::from("Transmit NTP Request\r\n")), LineKind::Unrecognized);
    }

    #[test]
    fn test_classify_empty_and_whitespace() {
        assert_eq!(classify(&RawLine::from("")), LineKind::Unrecognized);
        assert_eq!(classify(&RawLine::from("\r\n")), LineKind::Unrecognized);
        assert_eq!(classify(&RawLine::from("   \t ")), LineKind::Unrecognized);
    }

    #[test]
    fn test_classify_invalid_utf8_does_not_panic() {
        let line = RawLine::new(vec![0xff, 0xfe, b'1', b'\n']);
        assert_eq!(classify(&line), LineKind::Unrecognized);
    }

    #[test]
    fn test_truncated_fragment_still_parses_as_hex() {
        // A fragment caught mid-transmission is still valid hex; gating, not
        // classification, keeps it out of the logs.
        assert_eq!(
            classify(&RawLine::from("80000000\r\n")),
            LineKind::Timestamp(FixedTime::from_raw(0x8000_0000))
        );
    }

    #[test]
    fn test_raw_line_display_trims_both_ends() {
        assert_eq!(RawLine::from("uC drift x 1\r\n").to_string(), "uC drift x 1");
        assert_eq!(RawLine::from("  hello\t\r\n").to_string(), "hello");
    }
}
