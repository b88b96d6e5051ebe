//! # Scenario Tests
//!
//! Cache, reader and scheduler behaviour driven through an in-memory
//! provider, so no test depends on the NOAA service being reachable.

mod cache_tests;

use crate::noaa::{ProviderError, TideProvider};
use crate::{Extremum, ExtremumKind};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted provider answer.
#[derive(Clone, Debug)]
pub(crate) enum Script {
    /// Return exactly these extrema
    Fixed(Vec<Extremum>),
    /// Alternate Low/High every `spacing` across the requested window
    Generated { spacing: Duration },
    /// Fail with an API error carrying this message
    Fail(String),
}

/// In-memory [`TideProvider`] replaying a queue of answers.
///
/// The final script is repeated once the queue is down to one entry.
pub(crate) struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<(String, DateTime<Utc>, DateTime<Utc>)>>,
}

impl ScriptedProvider {
    pub(crate) fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<(String, DateTime<Utc>, DateTime<Utc>)> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_script(&self) -> Script {
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.len() > 1 {
            scripts.pop_front().unwrap()
        } else {
            scripts
                .front()
                .cloned()
                .unwrap_or_else(|| Script::Fail("no script".to_string()))
        }
    }
}

#[async_trait]
impl TideProvider for ScriptedProvider {
    async fn request_predictions(
        &self,
        station_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Extremum>, ProviderError> {
        self.requests
            .lock()
            .unwrap()
            .push((station_id.to_string(), from, to));

        match self.next_script() {
            Script::Fixed(extrema) => Ok(extrema),
            Script::Generated { spacing } => Ok(generate(from, to, spacing)),
            Script::Fail(message) => Err(ProviderError::Api(message)),
        }
    }
}

/// Alternating Low (1.0) / High (6.0) extrema from `from` through `to`.
pub(crate) fn generate(from: DateTime<Utc>, to: DateTime<Utc>, spacing: Duration) -> Vec<Extremum> {
    let mut extrema = Vec::new();
    let mut t = from;
    let mut high = false;
    while t <= to {
        extrema.push(if high {
            Extremum::new(t, 6.0, ExtremumKind::High)
        } else {
            Extremum::new(t, 1.0, ExtremumKind::Low)
        });
        high = !high;
        t += spacing;
    }
    extrema
}

pub(crate) fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
}

pub(crate) fn low(h: u32, level: f64) -> Extremum {
    Extremum::new(at(h, 0), level, ExtremumKind::Low)
}

pub(crate) fn high(h: u32, level: f64) -> Extremum {
    Extremum::new(at(h, 0), level, ExtremumKind::High)
}
