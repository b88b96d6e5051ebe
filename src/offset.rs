//! # Station Offset Model
//!
//! Tides at a subordinate location are described relative to a reference
//! station by a pair of corrections per quantity: one applied to low tides and
//! one applied to high tides. Time corrections are added (minutes later or
//! earlier), level corrections are either added or used as a ratio.
//!
//! Every offset computes both branches for a value and the extremum's kind
//! picks which one is kept. Nothing here fails or mutates its input.

use crate::{Extremum, ExtremumKind};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul};

/// A low/high correction pair applicable to values of type `X`.
pub trait Offset<X> {
    /// Returns `(low_result, high_result)` for `value`.
    fn apply(&self, value: X) -> (X, X);

    /// Keeps the branch matching `kind`.
    fn apply_for(&self, value: X, kind: ExtremumKind) -> X {
        let (low, high) = self.apply(value);
        match kind {
            ExtremumKind::Low => low,
            ExtremumKind::High => high,
        }
    }
}

/// `apply(x) = (low + x, high + x)`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Additive<V> {
    pub low: V,
    pub high: V,
}

/// `apply(x) = (low * x, high * x)`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Multiplicative<V> {
    pub low: V,
    pub high: V,
}

impl<V> Additive<V> {
    pub fn new(low: V, high: V) -> Self {
        Self { low, high }
    }
}

impl<V> Multiplicative<V> {
    pub fn new(low: V, high: V) -> Self {
        Self { low, high }
    }
}

impl<X, V> Offset<X> for Additive<V>
where
    X: Copy + Add<V, Output = X>,
    V: Copy,
{
    fn apply(&self, value: X) -> (X, X) {
        (value + self.low, value + self.high)
    }
}

impl<X, V> Offset<X> for Multiplicative<V>
where
    X: Copy + Mul<V, Output = X>,
    V: Copy,
{
    fn apply(&self, value: X) -> (X, X) {
        (value * self.low, value * self.high)
    }
}

/// Runtime choice between the two offset flavours, for value types that
/// support both operators (levels).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum OffsetSpec<V> {
    Additive(Additive<V>),
    Multiplicative(Multiplicative<V>),
}

impl<V> OffsetSpec<V> {
    pub fn additive(low: V, high: V) -> Self {
        OffsetSpec::Additive(Additive::new(low, high))
    }

    pub fn multiplicative(low: V, high: V) -> Self {
        OffsetSpec::Multiplicative(Multiplicative::new(low, high))
    }
}

impl<X, V> Offset<X> for OffsetSpec<V>
where
    X: Copy + Add<V, Output = X> + Mul<V, Output = X>,
    V: Copy,
{
    fn apply(&self, value: X) -> (X, X) {
        match self {
            OffsetSpec::Additive(a) => a.apply(value),
            OffsetSpec::Multiplicative(m) => m.apply(value),
        }
    }
}

impl<V: fmt::Display> fmt::Display for Additive<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "low=+{}, high=+{}", self.low, self.high)
    }
}

impl<V: fmt::Display> fmt::Display for Multiplicative<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "low=x{}, high=x{}", self.low, self.high)
    }
}

impl<V: fmt::Display> fmt::Display for OffsetSpec<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffsetSpec::Additive(a) => a.fmt(f),
            OffsetSpec::Multiplicative(m) => m.fmt(f),
        }
    }
}

/// Time correction plus level correction for one subordinate location.
///
/// Configured once at startup and immutable afterwards.
///
/// # Example
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use tide_offset_lib::offset::{Additive, OffsetSpec, TideOffset};
/// use tide_offset_lib::{Extremum, ExtremumKind};
///
/// let offset = TideOffset::new(
///     Additive::new(Duration::minutes(179), Duration::minutes(131)),
///     OffsetSpec::multiplicative(0.82, 1.15),
/// );
/// let raw = Extremum::new(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(), 2.0, ExtremumKind::Low);
/// let adjusted = offset.apply(&raw);
/// assert_eq!(adjusted.time, Utc.with_ymd_and_hms(2024, 3, 1, 2, 59, 0).unwrap());
/// assert!((adjusted.level - 1.64).abs() < 1e-9);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TideOffset<T = Additive<Duration>, L = OffsetSpec<f64>> {
    pub time: T,
    pub level: L,
}

impl<T, L> TideOffset<T, L>
where
    T: Offset<DateTime<Utc>>,
    L: Offset<f64>,
{
    pub fn new(time: T, level: L) -> Self {
        Self { time, level }
    }

    /// New extremum with shifted time and corrected level; kind unchanged.
    pub fn apply(&self, extremum: &Extremum) -> Extremum {
        Extremum {
            time: self.time.apply_for(extremum.time, extremum.kind),
            level: self.level.apply_for(extremum.level, extremum.kind),
            kind: extremum.kind,
        }
    }

    /// Maps [`apply`](Self::apply) over `extrema`. Count and order are preserved;
    /// nothing is re-sorted.
    pub fn apply_all(&self, extrema: &[Extremum]) -> Vec<Extremum> {
        extrema.iter().map(|e| self.apply(e)).collect()
    }
}

impl TideOffset {
    /// Identity offset: zero time shift, unit level ratio.
    pub fn identity() -> Self {
        Self::new(
            Additive::new(Duration::zero(), Duration::zero()),
            OffsetSpec::multiplicative(1.0, 1.0),
        )
    }
}

impl<T: fmt::Display, L: fmt::Display> fmt::Display for TideOffset<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "time=[{}], level=[{}]", self.time, self.level)
    }
}
