//! # Background Refresh Scheduler
//!
//! A single task owns the [`PredictionCache`] and is therefore its only writer.
//! Every tick it checks staleness and, if needed, refreshes:
//!
//! ```text
//!   tick ──► stale? ──no──► Fresh
//!              │
//!             yes ──► refresh ──ok──► Refreshed (window swapped)
//!                        │
//!                       err ──► Failed (window kept, logged, next tick retries)
//! ```
//!
//! There is no terminal failure state and no retry budget: the loop runs until
//! it is told to stop. Queries never drive a tick.

use crate::cache::{PredictionCache, TideReader};
use crate::noaa::TideProvider;
use crate::TideError;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, Span};

/// Result of a single scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Window still has enough lookahead; nothing fetched
    Fresh,
    /// Window replaced with `count` extrema
    Refreshed { count: usize },
    /// Refresh failed; previous window retained
    Failed,
}

/// Counters for the refresh loop.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub refreshes: u64,
    pub failures: u64,
    pub last_refresh: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Periodic staleness check and refresh over an owned cache.
pub struct RefreshScheduler<P> {
    cache: PredictionCache<P>,
    interval: Duration,
    stats: SchedulerStats,
    span: Span,
}

impl<P: TideProvider + 'static> RefreshScheduler<P> {
    /// Take ownership of `cache`; `interval` is the time between ticks.
    pub fn new(cache: PredictionCache<P>, interval: Duration) -> Result<Self, TideError> {
        if interval.is_zero() {
            return Err(TideError::config("refresh interval must be positive"));
        }
        let span = tracing::info_span!(
            "refresh_scheduler",
            station = %cache.settings().station_id
        );
        Ok(Self {
            cache,
            interval,
            stats: SchedulerStats::default(),
            span,
        })
    }

    /// Emit this scheduler's log events inside `span` instead of the default one.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn reader(&self) -> TideReader {
        self.cache.reader()
    }

    pub fn cache(&self) -> &PredictionCache<P> {
        &self.cache
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// One pass of the state machine at `now`.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        let span = self.span.clone();
        self.tick_inner(now).instrument(span).await
    }

    async fn tick_inner(&mut self, now: DateTime<Utc>) -> TickOutcome {
        self.stats.ticks += 1;

        if !self.cache.is_stale(now) {
            tracing::debug!(tick = self.stats.ticks, "predictions fresh");
            return TickOutcome::Fresh;
        }

        match self.cache.refresh(now).await {
            Ok(count) => {
                self.stats.refreshes += 1;
                self.stats.last_refresh = Some(now);
                self.stats.last_error = None;
                TickOutcome::Refreshed { count }
            }
            Err(e) => {
                self.stats.failures += 1;
                self.stats.last_error = Some(e.to_string());
                tracing::warn!(
                    error = %e,
                    failures = self.stats.failures,
                    retained = self.cache.snapshot().len(),
                    "error occurred refreshing tide predictions"
                );
                TickOutcome::Failed
            }
        }
    }

    /// Tick every `interval` until `shutdown` turns true or its sender is dropped.
    ///
    /// The first tick fires immediately.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SchedulerStats {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.span.in_scope(|| {
            tracing::info!(interval = ?self.interval, "refresh scheduler started");
        });

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Utc::now()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.span.in_scope(|| {
            tracing::info!(
                ticks = self.stats.ticks,
                refreshes = self.stats.refreshes,
                failures = self.stats.failures,
                "refresh scheduler stopped"
            );
        });
        self.stats
    }

    /// Run on the tokio runtime in the background.
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown, rx) = watch::channel(false);
        let reader = self.reader();
        let join = tokio::spawn(self.run(rx));
        SchedulerHandle {
            reader,
            shutdown,
            join,
        }
    }
}

/// Handle to a spawned [`RefreshScheduler`].
pub struct SchedulerHandle {
    reader: TideReader,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<SchedulerStats>,
}

impl SchedulerHandle {
    pub fn reader(&self) -> TideReader {
        self.reader.clone()
    }

    /// Signal the loop to stop and wait for its final statistics.
    pub async fn shutdown(self) -> Result<SchedulerStats, tokio::task::JoinError> {
        let _ = self.shutdown.send(true);
        self.join.await
    }
}
