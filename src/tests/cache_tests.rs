//! Prediction cache refresh, snapshot and waiting behaviour.

use super::{at, generate, high, low, Script, ScriptedProvider};
use crate::cache::{CacheSettings, PredictionCache};
use crate::noaa::{ProviderError, TideProvider};
use crate::offset::{Additive, OffsetSpec, TideOffset};
use crate::{Extremum, TideError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn settings() -> CacheSettings {
    CacheSettings {
        station_id: "9414290".to_string(),
        lookback: Duration::days(1),
        lookahead: Duration::days(7),
        renew_threshold: Duration::days(1),
    }
}

fn cache_with(scripts: Vec<Script>) -> (PredictionCache<Arc<ScriptedProvider>>, Arc<ScriptedProvider>) {
    let provider = Arc::new(ScriptedProvider::new(scripts));
    let cache = PredictionCache::new(provider.clone(), TideOffset::identity(), settings()).unwrap();
    (cache, provider)
}

#[test]
fn new_cache_is_empty_and_stale() {
    let (cache, provider) = cache_with(vec![]);
    assert!(cache.snapshot().is_empty());
    assert!(cache.is_stale(at(0, 0)));
    assert_eq!(provider.calls(), 0);
}

#[test]
fn invalid_settings_fail_fast() {
    let provider = ScriptedProvider::new(vec![]);
    let bad = CacheSettings {
        renew_threshold: Duration::days(8),
        ..settings()
    };
    let result = PredictionCache::new(provider, TideOffset::identity(), bad);
    assert!(matches!(result, Err(TideError::Configuration(_))));
}

#[test]
fn out_of_range_time_offset_fails_fast() {
    let provider = ScriptedProvider::new(vec![]);
    let offset = TideOffset::new(
        Additive::new(Duration::zero(), Duration::days(2)),
        OffsetSpec::multiplicative(1.0, 1.0),
    );
    let result = PredictionCache::new(provider, offset, settings());
    assert!(matches!(result, Err(TideError::Configuration(_))));
}

#[tokio::test]
async fn refresh_requests_configured_window() {
    let (mut cache, provider) = cache_with(vec![Script::Generated {
        spacing: Duration::hours(6),
    }]);
    let now = at(12, 0);

    let count = cache.refresh(now).await.unwrap();

    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, "9414290");
    assert_eq!(requests[0].1, now - Duration::days(1));
    assert_eq!(requests[0].2, now + Duration::days(7));
    assert_eq!(count, cache.snapshot().len());
    assert_eq!(cache.snapshot().fetched_at(), Some(now));
}

#[tokio::test]
async fn refresh_clears_staleness() {
    let (mut cache, _) = cache_with(vec![Script::Generated {
        spacing: Duration::hours(6),
    }]);
    let now = at(12, 0);
    assert!(cache.is_stale(now));

    cache.refresh(now).await.unwrap();

    let last = cache.snapshot().last().unwrap().time;
    assert!(last >= now + Duration::days(1));
    assert!(!cache.is_stale(now));
    // Stale again once the lookahead margin runs out
    assert!(cache.is_stale(last - Duration::days(1) + Duration::minutes(1)));
}

#[tokio::test]
async fn refresh_applies_offset_per_kind() {
    let provider = ScriptedProvider::new(vec![Script::Fixed(vec![low(0, 2.0), high(6, 6.0)])]);
    let offset = TideOffset::new(
        Additive::new(Duration::minutes(179), Duration::minutes(131)),
        OffsetSpec::multiplicative(0.82, 1.15),
    );
    let mut cache = PredictionCache::new(provider, offset, settings()).unwrap();

    cache.refresh(at(0, 0)).await.unwrap();

    let window = cache.snapshot();
    assert_eq!(window.extrema()[0].time, at(2, 59));
    assert!((window.extrema()[0].level - 1.64).abs() < 1e-9);
    assert_eq!(window.extrema()[1].time, at(8, 11));
    assert!((window.extrema()[1].level - 6.9).abs() < 1e-9);
}

#[tokio::test]
async fn failed_refresh_keeps_previous_window() {
    let (mut cache, provider) = cache_with(vec![
        Script::Fixed(vec![low(0, 2.0), high(6, 8.0)]),
        Script::Fail("station offline".to_string()),
    ]);

    cache.refresh(at(0, 0)).await.unwrap();
    let before = cache.snapshot();

    let result = cache.refresh(at(1, 0)).await;
    assert!(matches!(
        result,
        Err(TideError::Provider(ProviderError::Api(_)))
    ));
    assert_eq!(provider.calls(), 2);
    assert!(Arc::ptr_eq(&before, &cache.snapshot()));
}

#[tokio::test]
async fn short_answer_keeps_previous_window() {
    let (mut cache, provider) = cache_with(vec![
        Script::Fixed(vec![low(0, 2.0), high(6, 8.0)]),
        Script::Fixed(vec![]),
        Script::Fixed(vec![low(12, 1.0)]),
    ]);

    cache.refresh(at(0, 0)).await.unwrap();
    let before = cache.snapshot();

    let empty = cache.refresh(at(1, 0)).await;
    assert!(matches!(empty, Err(TideError::TooFewExtrema { count: 0 })));
    let single = cache.refresh(at(2, 0)).await;
    assert!(matches!(single, Err(TideError::TooFewExtrema { count: 1 })));

    assert_eq!(provider.calls(), 3);
    assert!(Arc::ptr_eq(&before, &cache.snapshot()));
}

#[tokio::test]
async fn out_of_order_offsets_are_rejected() {
    // High tides shifted eight hours later overtake the following low
    let provider = ScriptedProvider::new(vec![Script::Fixed(vec![
        low(0, 1.0),
        high(3, 6.0),
        low(6, 1.0),
    ])]);
    let offset = TideOffset::new(
        Additive::new(Duration::zero(), Duration::hours(8)),
        OffsetSpec::multiplicative(1.0, 1.0),
    );
    let mut cache = PredictionCache::new(provider, offset, settings()).unwrap();

    let result = cache.refresh(at(0, 0)).await;

    match result {
        Err(TideError::NonMonotonic { index, previous, next }) => {
            assert_eq!(index, 2);
            assert_eq!(previous, at(11, 0));
            assert_eq!(next, at(6, 0));
        }
        other => panic!("expected NonMonotonic, got {other:?}"),
    }
    assert!(cache.snapshot().is_empty());
}

#[tokio::test]
async fn query_interpolates_midpoint() {
    let (mut cache, _) = cache_with(vec![Script::Fixed(vec![low(0, 2.0), high(6, 8.0)])]);
    cache.refresh(at(0, 0)).await.unwrap();

    let reading = cache.query(at(3, 0)).unwrap();
    assert!((reading.level - 5.0).abs() < 1e-9);
    assert_eq!(reading.prev.time, at(0, 0));
    assert_eq!(reading.next.time, at(6, 0));
    assert!(reading.is_rising());

    let reader = cache.reader();
    assert_eq!(reader.query(at(3, 0)).unwrap(), reading);
}

#[tokio::test]
async fn query_outside_window_has_no_bracket() {
    let (mut cache, _) = cache_with(vec![Script::Fixed(vec![low(0, 2.0)])]);
    cache.refresh(at(0, 0)).await.unwrap();

    assert!(matches!(
        cache.query(at(0, 0)),
        Err(TideError::NoBracketFound { .. })
    ));
    assert!(matches!(
        cache.reader().query(at(5, 0)),
        Err(TideError::NoBracketFound { .. })
    ));
}

#[tokio::test]
async fn old_snapshots_survive_refresh() {
    let (mut cache, _) = cache_with(vec![
        Script::Fixed(vec![low(0, 2.0), high(6, 8.0)]),
        Script::Fixed(vec![low(0, 0.0), high(6, 4.0)]),
    ]);
    let reader = cache.reader();

    cache.refresh(at(0, 0)).await.unwrap();
    let old = reader.snapshot();
    cache.refresh(at(0, 0)).await.unwrap();

    assert!((old.read(at(3, 0)).unwrap().level - 5.0).abs() < 1e-9);
    assert!((reader.query(at(3, 0)).unwrap().level - 2.0).abs() < 1e-9);
}

#[tokio::test]
async fn await_tide_wakes_on_refresh() {
    let (mut cache, _) = cache_with(vec![Script::Fixed(vec![low(0, 2.0), high(6, 8.0)])]);
    let reader = cache.reader();

    let writer = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cache.refresh(at(0, 0)).await.unwrap();
        cache
    });

    let reading = reader
        .await_tide(at(3, 0), std::time::Duration::from_secs(5))
        .await
        .unwrap();
    assert!((reading.level - 5.0).abs() < 1e-9);
    let _cache = writer.await.unwrap();
}

#[tokio::test]
async fn await_tide_returns_immediately_when_covered() {
    let (mut cache, _) = cache_with(vec![Script::Fixed(vec![low(0, 2.0), high(6, 8.0)])]);
    cache.refresh(at(0, 0)).await.unwrap();

    let reading = cache
        .reader()
        .await_tide(at(6, 0), std::time::Duration::from_millis(1))
        .await
        .unwrap();
    assert!((reading.level - 8.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn await_tide_times_out() {
    let (cache, _) = cache_with(vec![]);
    let reader = cache.reader();

    let result = reader
        .await_tide(at(3, 0), std::time::Duration::from_secs(30))
        .await;

    match result {
        Err(TideError::Timeout { at: t, waited }) => {
            assert_eq!(t, at(3, 0));
            assert_eq!(waited, std::time::Duration::from_secs(30));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    drop(cache);
}

#[tokio::test]
async fn await_tide_reports_closed_cache() {
    let (cache, _) = cache_with(vec![]);
    let reader = cache.reader();
    drop(cache);

    let result = reader
        .await_tide(at(3, 0), std::time::Duration::from_secs(5))
        .await;
    assert!(matches!(result, Err(TideError::Closed)));
}

#[tokio::test]
async fn boundary_query_and_degenerate_interval() {
    let (mut cache, _) = cache_with(vec![Script::Fixed(vec![low(0, 2.0), high(6, 8.0)])]);
    cache.refresh(at(0, 0)).await.unwrap();

    // A window can never hold equal timestamps, so check the engine directly
    let reading = cache.query(at(0, 0)).unwrap();
    assert!((reading.level - 2.0).abs() < 1e-9);
    assert!(matches!(
        crate::interpolate::tide_level(&low(6, 1.0), &high(6, 2.0), at(6, 0)),
        Err(TideError::DegenerateInterval { .. })
    ));
}

/// Alternates between two fixed windows on every call.
struct AlternatingProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl TideProvider for AlternatingProvider {
    async fn request_predictions(
        &self,
        _station_id: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<Extremum>, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n % 2 == 0 {
            Ok(vec![low(0, 2.0), high(6, 8.0), low(12, 2.0)])
        } else {
            Ok(vec![low(0, 0.0), high(6, 4.0), low(12, 0.0)])
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_readers_see_whole_windows() {
    let provider = AlternatingProvider {
        calls: AtomicUsize::new(0),
    };
    let mut cache = PredictionCache::new(provider, TideOffset::identity(), settings()).unwrap();
    cache.refresh(at(0, 0)).await.unwrap();

    let mut readers = Vec::new();
    for _ in 0..8 {
        let reader = cache.reader();
        readers.push(tokio::spawn(async move {
            for _ in 0..500 {
                let window = reader.snapshot();
                let morning = window.read(at(3, 0)).unwrap().level;
                let evening = window.read(at(9, 0)).unwrap().level;
                // Both readings must come from the same window
                assert!((morning - evening).abs() < 1e-9, "{morning} vs {evening}");
                assert!((morning - 5.0).abs() < 1e-9 || (morning - 2.0).abs() < 1e-9);
                tokio::task::yield_now().await;
            }
        }));
    }

    for _ in 0..200 {
        cache.refresh(at(0, 0)).await.unwrap();
        tokio::task::yield_now().await;
    }

    for reader in readers {
        reader.await.unwrap();
    }
}

#[test]
fn generated_extrema_alternate() {
    let extrema = generate(at(0, 0), at(18, 0), Duration::hours(6));
    assert_eq!(extrema.len(), 4);
    assert!(!extrema[0].is_high());
    assert!(extrema[1].is_high());
}
