//! # Tide Offset Tracker Core Library
//!
//! This library turns the high/low tide extrema published for a NOAA reference
//! station into a continuously queryable tide level for a nearby location whose
//! tides are a known time-shifted and scaled copy of the reference station.
//!
//! ## Data Flow
//! 1. **Fetch**: [`noaa::NoaaClient`] requests hi/lo predictions for a window around "now"
//! 2. **Adjust**: [`offset::TideOffset`] shifts each extremum's time and scales its level,
//!    choosing the low or high branch by the extremum's kind
//! 3. **Cache**: [`cache::PredictionCache`] swaps the adjusted window in atomically
//! 4. **Refresh**: [`scheduler::RefreshScheduler`] ticks in the background and renews the
//!    window once its lookahead margin runs short
//! 5. **Query**: [`cache::TideReader`] finds the bracketing extrema for a timestamp and
//!    interpolates the level along a half-period sine curve
//!
//! ## Core Types
//! - [`Extremum`]: one predicted high or low tide
//! - [`TideReading`]: the interpolated level at a query time plus its bracket
//! - [`Sample`]: a single point on a sampled tide curve

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// Module declarations
pub mod cache;
pub mod config;
pub mod error;
pub mod interpolate;
pub mod noaa;
pub mod offset;
pub mod scheduler;

#[cfg(test)]
mod tests;

pub use error::TideError;

/// Minute-resolution timestamp format used for logging and NOAA request parameters.
pub const MINUTE_FORMAT: &str = "%Y%m%d %H:%M";

/// Whether an extremum is a tide peak or trough.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtremumKind {
    /// Local maximum (NOAA type code `H`)
    High,
    /// Local minimum (NOAA type code `L`)
    Low,
}

impl ExtremumKind {
    /// Parse a NOAA hi/lo type code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "H" => Some(ExtremumKind::High),
            "L" => Some(ExtremumKind::Low),
            _ => None,
        }
    }

    /// The provider's one-letter code, `"H"` or `"L"`.
    pub fn code(self) -> &'static str {
        match self {
            ExtremumKind::High => "H",
            ExtremumKind::Low => "L",
        }
    }
}

/// One predicted high or low tide.
///
/// Extrema are created by a provider fetch and never mutated afterwards;
/// applying an offset always produces a new value.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use tide_offset_lib::{Extremum, ExtremumKind};
///
/// let low = Extremum::new(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(), 2.0, ExtremumKind::Low);
/// assert!(!low.is_high());
/// assert_eq!(low.to_string(), "time=20240301 00:00, level=2, type=L");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Extremum {
    /// Predicted instant, UTC, minute resolution
    pub time: DateTime<Utc>,
    /// Predicted level in the provider's units and datum
    pub level: f64,
    pub kind: ExtremumKind,
}

impl Extremum {
    /// Creates a new extremum
    pub fn new(time: DateTime<Utc>, level: f64, kind: ExtremumKind) -> Self {
        Self { time, level, kind }
    }

    /// True for a high tide
    pub fn is_high(&self) -> bool {
        self.kind == ExtremumKind::High
    }
}

impl fmt::Display for Extremum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "time={}, level={}, type={}",
            self.time.format(MINUTE_FORMAT),
            self.level,
            self.kind.code()
        )
    }
}

/// Interpolated tide level at a query time, together with the bracketing extrema.
///
/// Computed per query and never stored.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TideReading {
    pub prev: Extremum,
    pub next: Extremum,
    pub time: DateTime<Utc>,
    pub level: f64,
}

impl TideReading {
    /// True while the tide is heading towards a high.
    pub fn is_rising(&self) -> bool {
        self.next.is_high()
    }
}

impl fmt::Display for TideReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "prev_tide=[{}], next_tide=[{}], level={:.3}, time={}",
            self.prev,
            self.next,
            self.level,
            self.time.format(MINUTE_FORMAT)
        )
    }
}

/// A single point on a sampled tide curve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: DateTime<Utc>,
    pub level: f64,
}
