//! Poll durations in a serialization-friendly unit.
//!
//! Durations are carried as whole microseconds so they serialize as a
//! plain integer in every format.

use core::fmt;
use core::time::Duration;

/// Duration in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Microseconds(pub u64);

impl Microseconds {
    pub const ZERO: Self = Self(0);

    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1000))
    }

    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Whole milliseconds (truncated).
    pub const fn as_millis(&self) -> u64 {
        self.0 / 1000
    }

    /// Fractional milliseconds, for display.
    pub fn as_millis_f64(&self) -> f64 {
        self.0 as f64 / 1000.0
    }

    pub const fn to_duration(&self) -> Duration {
        Duration::from_micros(self.0)
    }
}

impl From<Duration> for Microseconds {
    fn from(d: Duration) -> Self {
        // Saturate rather than wrap for absurdly long durations.
        Self(u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
    }
}

impl From<Microseconds> for Duration {
    fn from(m: Microseconds) -> Self {
        m.to_duration()
    }
}

impl fmt::Display for Microseconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let micros = self.0;
        if micros < 1_000 {
            write!(f, "{}µs", micros)
        } else if micros < 1_000_000 {
            write!(f, "{:.2}ms", micros as f64 / 1_000.0)
        } else {
            write!(f, "{:.2}s", micros as f64 / 1_000_000.0)
        }
    }
}
