//! Fixed-point time values exchanged with the device.
//!
//! The device reports time as an unsigned Q32.32 value: the high 32 bits are
//! whole seconds, the low 32 bits a binary fraction of a second. Drift
//! corrections are signed Q1.31 values.

use std::fmt;

/// Ticks per second in a Q32.32 value (2^32).
pub const TICKS_PER_SECOND: f64 = 4_294_967_296.0;

/// Scale of a signed Q1.31 drift correction (2^31).
pub const DRIFT_SCALE: f64 = 2_147_483_648.0;

const FRAC_BITS: u32 = 32;
const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Unsigned Q32.32 seconds value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FixedTime(u64);

/// Time as reported by the device, relative to its own epoch.
pub type DeviceTimestamp = FixedTime;

/// Host wall-clock time, relative to the Unix epoch.
pub type HostTimestamp = FixedTime;

impl FixedTime {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn from_secs(secs: u32) -> Self {
        Self((secs as u64) << FRAC_BITS)
    }

    /// Builds a value from whole seconds and nanoseconds.
    ///
    /// Nanoseconds past one second carry into the seconds field. Returns
    /// `None` when the carried seconds no longer fit in 32 bits.
    pub fn from_parts(secs: u32, nanos: u32) -> Option<Self> {
        let nanos = u64::from(nanos);
        let secs = u64::from(secs) + nanos / NANOS_PER_SECOND;
        if secs > u64::from(u32::MAX) {
            return None;
        }
        Some(Self((secs << FRAC_BITS) + nanos_to_fraction(nanos % NANOS_PER_SECOND)))
    }

    pub const fn whole_seconds(self) -> u32 {
        (self.0 >> FRAC_BITS) as u32
    }

    pub const fn fraction(self) -> u32 {
        self.0 as u32
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / TICKS_PER_SECOND
    }

    /// Signed difference `self - earlier`, in seconds.
    pub fn seconds_since(self, earlier: FixedTime) -> f64 {
        let ticks = i128::from(self.0) - i128::from(earlier.0);
        ticks as f64 / TICKS_PER_SECOND
    }

    /// Signed difference `self - earlier`, in ticks.
    pub fn ticks_since(self, earlier: FixedTime) -> i128 {
        i128::from(self.0) - i128::from(earlier.0)
    }

    /// Adds a signed tick offset, wrapping like the device's own counter.
    pub fn offset_by(self, ticks: i64) -> Self {
        Self(self.0.wrapping_add_signed(ticks))
    }
}

impl fmt::Display for FixedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

// nanos < 10^9 < 2^30, so the shifted value stays below 2^62.
fn nanos_to_fraction(nanos: u64) -> u64 {
    (nanos << FRAC_BITS) / NANOS_PER_SECOND
}

/// Converts a raw Q1.31 correction into a real coefficient.
pub fn q31_to_f64(raw: f64) -> f64 {
    raw / DRIFT_SCALE
}
