//! # Prediction Cache
//!
//! Holds the current window of offset-adjusted extrema and hands out cheap,
//! read-only handles for querying it.
//!
//! ## Sharing Model
//! The window lives behind a `tokio::sync::watch` channel as an
//! `Arc<PredictionWindow>`:
//! - **Writer**: [`PredictionCache`] owns the sender; a refresh builds the new
//!   window completely and then swaps the `Arc` in one step
//! - **Readers**: [`TideReader`] clones the current `Arc` out of the channel and
//!   releases the channel immediately, so a reader never sees a half-built
//!   window and never holds the channel across an await
//! - **Waiting**: readers waiting for coverage are woken by the swap itself
//!   rather than polling
//!
//! ## Staleness
//! The window is stale when it is empty or its last extremum is earlier than
//! `now + renew_threshold`, i.e. the lookahead margin has run short.

use crate::config::{Config, MAX_TIME_OFFSET_MINUTES, MAX_WINDOW_HOURS};
use crate::interpolate::{self, read_tide};
use crate::noaa::TideProvider;
use crate::offset::TideOffset;
use crate::{Extremum, Sample, TideError, TideReading, MINUTE_FORMAT};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Instrument, Span};

/// Extrema a refresh must yield before it replaces the current window.
pub const MIN_EXTREMA: usize = 2;

/// Ordered, offset-adjusted extrema from one successful refresh.
///
/// Timestamps are strictly increasing; construction rejects anything else.
/// A window is never modified after it is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionWindow {
    extrema: Vec<Extremum>,
    fetched_at: Option<DateTime<Utc>>,
}

impl PredictionWindow {
    /// The startup window: no extrema, always stale.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate ordering and wrap `extrema` fetched at `fetched_at`.
    pub fn new(extrema: Vec<Extremum>, fetched_at: DateTime<Utc>) -> Result<Self, TideError> {
        ensure_strictly_increasing(&extrema)?;
        Ok(Self {
            extrema,
            fetched_at: Some(fetched_at),
        })
    }

    pub fn extrema(&self) -> &[Extremum] {
        &self.extrema
    }

    pub fn len(&self) -> usize {
        self.extrema.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extrema.is_empty()
    }

    pub fn first(&self) -> Option<&Extremum> {
        self.extrema.first()
    }

    pub fn last(&self) -> Option<&Extremum> {
        self.extrema.last()
    }

    /// When the refresh that produced this window ran.
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    /// True if empty or the last extremum is before `now + renew_threshold`.
    pub fn is_stale(&self, now: DateTime<Utc>, renew_threshold: Duration) -> bool {
        match self.extrema.last() {
            None => true,
            Some(last) => last.time < now + renew_threshold,
        }
    }

    /// True if `t` lies within `[first.time, last.time]` of at least two extrema.
    pub fn covers(&self, t: DateTime<Utc>) -> bool {
        interpolate::find_bracket(&self.extrema, t).is_some()
    }

    pub fn read(&self, t: DateTime<Utc>) -> Result<TideReading, TideError> {
        read_tide(&self.extrema, t)
    }

    pub fn sample_curve(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<Sample>, TideError> {
        interpolate::sample_curve(&self.extrema, from, to, step)
    }
}

/// Fails with [`TideError::NonMonotonic`] at the first pair that does not
/// strictly increase in time.
pub fn ensure_strictly_increasing(extrema: &[Extremum]) -> Result<(), TideError> {
    match extrema.windows(2).position(|w| w[0].time >= w[1].time) {
        None => Ok(()),
        Some(i) => Err(TideError::NonMonotonic {
            index: i + 1,
            previous: extrema[i].time,
            next: extrema[i + 1].time,
        }),
    }
}

/// Station and window parameters for a [`PredictionCache`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub station_id: String,
    /// History requested before "now"
    pub lookback: Duration,
    /// Predictions requested after "now"
    pub lookahead: Duration,
    /// Minimum remaining lookahead before a refresh is due
    pub renew_threshold: Duration,
}

impl CacheSettings {
    pub fn from_config(config: &Config) -> Result<Self, TideError> {
        let hours = |h: i64| {
            Duration::try_hours(h)
                .ok_or_else(|| TideError::config(format!("{h} hours is out of range")))
        };
        let settings = Self {
            station_id: config.station.id.clone(),
            lookback: hours(config.cache.lookback_hours)?,
            lookahead: hours(config.cache.lookahead_hours)?,
            renew_threshold: hours(config.cache.renew_threshold_hours)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), TideError> {
        if self.station_id.trim().is_empty() {
            return Err(TideError::config("station id must not be empty"));
        }
        if self.lookback < Duration::zero() {
            return Err(TideError::config("lookback must not be negative"));
        }
        if self.lookahead <= Duration::zero() {
            return Err(TideError::config("lookahead must be positive"));
        }
        if self.renew_threshold <= Duration::zero() {
            return Err(TideError::config("renew threshold must be positive"));
        }
        if self.renew_threshold >= self.lookahead {
            return Err(TideError::config(
                "renew threshold must be smaller than lookahead",
            ));
        }
        let max = Duration::hours(MAX_WINDOW_HOURS);
        if self.lookback > max || self.lookahead > max {
            return Err(TideError::config(format!(
                "lookback and lookahead must not exceed {MAX_WINDOW_HOURS} hours"
            )));
        }
        Ok(())
    }
}

fn validate_offset(offset: &TideOffset) -> Result<(), TideError> {
    let max = Duration::minutes(MAX_TIME_OFFSET_MINUTES);
    if offset.time.low.abs() > max || offset.time.high.abs() > max {
        return Err(TideError::config(format!(
            "time offsets must be within {MAX_TIME_OFFSET_MINUTES} minutes"
        )));
    }
    Ok(())
}

/// Sole owner and writer of the prediction window.
pub struct PredictionCache<P> {
    provider: P,
    offset: TideOffset,
    settings: CacheSettings,
    tx: watch::Sender<Arc<PredictionWindow>>,
    span: Span,
}

impl<P: TideProvider> PredictionCache<P> {
    /// Empty cache for `settings.station_id`; fails fast on invalid settings
    /// or time offsets.
    pub fn new(provider: P, offset: TideOffset, settings: CacheSettings) -> Result<Self, TideError> {
        settings.validate()?;
        validate_offset(&offset)?;
        let span = tracing::info_span!("prediction_cache", station = %settings.station_id);
        let (tx, _rx) = watch::channel(Arc::new(PredictionWindow::empty()));
        Ok(Self {
            provider,
            offset,
            settings,
            tx,
            span,
        })
    }

    /// Emit this cache's log events inside `span` instead of the default one.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn offset(&self) -> &TideOffset {
        &self.offset
    }

    /// New read-only handle onto the current and all future windows.
    pub fn reader(&self) -> TideReader {
        TideReader {
            rx: self.tx.subscribe(),
        }
    }

    pub fn snapshot(&self) -> Arc<PredictionWindow> {
        self.tx.borrow().clone()
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.snapshot().is_stale(now, self.settings.renew_threshold)
    }

    /// Fetch `[now - lookback, now + lookahead]`, apply the offset and swap the
    /// result in. On any error the current window is left untouched.
    ///
    /// An answer with fewer than two extrema cannot bracket anything and fails
    /// with [`TideError::TooFewExtrema`].
    pub async fn refresh(&mut self, now: DateTime<Utc>) -> Result<usize, TideError> {
        let from = now - self.settings.lookback;
        let to = now + self.settings.lookahead;

        let raw = self
            .provider
            .request_predictions(&self.settings.station_id, from, to)
            .instrument(self.span.clone())
            .await?;

        if raw.len() < MIN_EXTREMA {
            return Err(TideError::TooFewExtrema { count: raw.len() });
        }

        let adjusted = self.offset.apply_all(&raw);
        let window = PredictionWindow::new(adjusted, now)?;
        let count = window.len();

        self.span.in_scope(|| {
            tracing::info!(
                count,
                first = %format_bound(window.first()),
                last = %format_bound(window.last()),
                "renewed tide predictions"
            );
        });

        self.tx.send_replace(Arc::new(window));
        Ok(count)
    }

    /// Snapshot read; never triggers a refresh.
    pub fn query(&self, t: DateTime<Utc>) -> Result<TideReading, TideError> {
        self.snapshot().read(t)
    }
}

fn format_bound(extremum: Option<&Extremum>) -> String {
    extremum
        .map(|e| e.time.format(MINUTE_FORMAT).to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Cloneable, read-only view of the prediction window.
///
/// Any number of readers may query concurrently with the refresh writer.
#[derive(Debug, Clone)]
pub struct TideReader {
    rx: watch::Receiver<Arc<PredictionWindow>>,
}

impl TideReader {
    /// The current window. Holding the `Arc` does not block the writer.
    pub fn snapshot(&self) -> Arc<PredictionWindow> {
        self.rx.borrow().clone()
    }

    /// Level at `t` against the current window.
    pub fn query(&self, t: DateTime<Utc>) -> Result<TideReading, TideError> {
        self.snapshot().read(t)
    }

    pub fn query_now(&self) -> Result<TideReading, TideError> {
        self.query(Utc::now())
    }

    /// Wait until a window covering `t` is published, for at most `timeout`.
    ///
    /// Re-checks on every window swap. Errors other than a missing bracket are
    /// returned immediately; [`TideError::Timeout`] when the deadline passes,
    /// [`TideError::Closed`] if the cache is dropped first.
    pub async fn await_tide(
        &self,
        t: DateTime<Utc>,
        timeout: std::time::Duration,
    ) -> Result<TideReading, TideError> {
        let mut rx = self.rx.clone();
        let wait = async move {
            loop {
                let window = rx.borrow_and_update().clone();
                match window.read(t) {
                    Err(TideError::NoBracketFound { .. }) => {}
                    other => return other,
                }
                rx.changed().await.map_err(|_| TideError::Closed)?;
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| TideError::Timeout { at: t, waited: timeout })?
    }

    pub async fn await_tide_now(
        &self,
        timeout: std::time::Duration,
    ) -> Result<TideReading, TideError> {
        self.await_tide(Utc::now(), timeout).await
    }
}
