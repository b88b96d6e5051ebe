//! # Tide Level Interpolation
//!
//! Tide level between a low and the following high (or vice versa) does not
//! change linearly: water moves slowest near the turn of the tide and fastest
//! half way between. The level at a time `t` inside a bracket is therefore
//! shaped by half a sine period:
//!
//! ```text
//! fraction = (t - prev.time) / (next.time - prev.time)
//! shaped   = (1 + sin((fraction - 0.5) * π)) / 2
//! level    = prev.level + (next.level - prev.level) * shaped
//! ```
//!
//! `shaped` is 0 at the previous extremum, 0.5 at the midpoint and 1 at the
//! next extremum.

use crate::{Extremum, Sample, TideError, TideReading};
use chrono::{DateTime, Duration, Utc};
use std::f64::consts::PI;

/// First adjacent pair `(prev, next)` with `prev.time <= t <= next.time`.
///
/// Scans left to right, so when `t` sits exactly on an extremum shared by two
/// pairs the earlier pair wins. Returns `None` for fewer than two extrema or a
/// `t` outside the covered range.
pub fn find_bracket(extrema: &[Extremum], t: DateTime<Utc>) -> Option<(&Extremum, &Extremum)> {
    extrema
        .windows(2)
        .find(|w| w[0].time <= t && t <= w[1].time)
        .map(|w| (&w[0], &w[1]))
}

/// S-curve mapping a bracket fraction in `[0, 1]` onto `[0, 1]`.
pub fn sine_shape(fraction: f64) -> f64 {
    (1.0 + ((fraction - 0.5) * PI).sin()) / 2.0
}

/// Interpolated level at `t` between `prev` and `next`.
///
/// `t` is expected inside `[prev.time, next.time]`; values outside are not
/// rejected but extrapolate along the same sine. Equal endpoint timestamps
/// are reported as [`TideError::DegenerateInterval`].
pub fn tide_level(prev: &Extremum, next: &Extremum, t: DateTime<Utc>) -> Result<f64, TideError> {
    let range_ms = (next.time - prev.time).num_milliseconds();
    if range_ms == 0 {
        return Err(TideError::DegenerateInterval { at: prev.time });
    }

    let fraction = (t - prev.time).num_milliseconds() as f64 / range_ms as f64;
    let level_range = next.level - prev.level;
    Ok(prev.level + level_range * sine_shape(fraction))
}

/// Bracket search plus interpolation for one query time.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use tide_offset_lib::interpolate::read_tide;
/// use tide_offset_lib::{Extremum, ExtremumKind};
///
/// let day = |h| Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap();
/// let window = [
///     Extremum::new(day(0), 2.0, ExtremumKind::Low),
///     Extremum::new(day(6), 8.0, ExtremumKind::High),
/// ];
/// let reading = read_tide(&window, day(3)).unwrap();
/// assert!((reading.level - 5.0).abs() < 1e-9);
/// assert!(reading.is_rising());
/// ```
pub fn read_tide(extrema: &[Extremum], t: DateTime<Utc>) -> Result<TideReading, TideError> {
    let (prev, next) = find_bracket(extrema, t).ok_or(TideError::NoBracketFound { at: t })?;
    let level = tide_level(prev, next, t)?;
    Ok(TideReading {
        prev: *prev,
        next: *next,
        time: t,
        level,
    })
}

/// Samples the interpolated curve from `from` to `to` (inclusive) every `step`.
///
/// Instants outside the covered range are skipped rather than failing the
/// whole curve; a degenerate bracket still fails.
pub fn sample_curve(
    extrema: &[Extremum],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    step: Duration,
) -> Result<Vec<Sample>, TideError> {
    if step <= Duration::zero() {
        return Err(TideError::config("sample step must be positive"));
    }

    let mut samples = Vec::new();
    let mut ts = from;
    while ts <= to {
        match read_tide(extrema, ts) {
            Ok(reading) => samples.push(Sample {
                time: ts,
                level: reading.level,
            }),
            Err(TideError::NoBracketFound { .. }) => {}
            Err(e) => return Err(e),
        }
        ts += step;
    }
    Ok(samples)
}
