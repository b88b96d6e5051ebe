//! # Error Types
//!
//! Transient provider failures are absorbed at the refresh boundary by the
//! scheduler. Everything else (no bracket, degenerate interval, bad ordering,
//! short answers, bad configuration) propagates to whoever asked.

use crate::noaa::ProviderError;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the offset, interpolation, cache and scheduler layers.
#[derive(Error, Debug)]
pub enum TideError {
    /// Fetching raw predictions failed (network, status, payload)
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Bracketing extrema share a timestamp, so no fraction can be computed
    #[error("degenerate interval: bracket endpoints both at {at}")]
    DegenerateInterval { at: DateTime<Utc> },

    /// Query time outside the cached window, or fewer than two extrema cached
    #[error("no bracketing extrema for {at}")]
    NoBracketFound { at: DateTime<Utc> },

    /// A refresh returned too few extrema to bracket any instant
    #[error("refresh returned {count} extrema, at least two are needed")]
    TooFewExtrema { count: usize },

    /// Offset-adjusted extrema are not strictly increasing in time
    #[error("offset predictions out of order at index {index}: {previous} then {next}")]
    NonMonotonic {
        index: usize,
        previous: DateTime<Utc>,
        next: DateTime<Utc>,
    },

    /// Invalid offsets, intervals or thresholds supplied at construction
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Waiting for data covering `at` exceeded the caller's deadline
    #[error("timed out after {waited:?} waiting for tide data covering {at}")]
    Timeout { at: DateTime<Utc>, waited: Duration },

    /// The cache writer was dropped while a reader was waiting
    #[error("prediction cache closed")]
    Closed,
}

impl TideError {
    pub fn config(msg: impl Into<String>) -> Self {
        TideError::Configuration(msg.into())
    }
}
