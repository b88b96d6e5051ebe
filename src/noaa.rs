//! # NOAA Tide Prediction Provider
//!
//! Fetches raw high/low tide predictions for a reference station from the
//! NOAA CO-OPS data API. This is the only module that touches the network.
//!
//! ## Data Source
//!
//! ### CO-OPS API For Data Retrieval
//! - **URL**: https://api.tidesandcurrents.noaa.gov/api/prod/datagetter
//! - **Product**: `predictions` with `interval=hilo` (extrema only)
//! - **Time zone**: `gmt`; request dates as `YYYYMMDD HH:MM`, response times as
//!   `YYYY-MM-DD HH:MM`, both minute resolution
//! - **Datum / units**: configurable, `MLLW` and `english` by default
//!
//! ### Response Shape
//! ```json
//! {"predictions": [
//!   {"t": "2024-03-01 04:12", "v": "1.873", "type": "L"},
//!   {"t": "2024-03-01 10:31", "v": "5.402", "type": "H"}
//! ]}
//! ```
//! A request NOAA rejects still answers 200 with `{"error": {"message": ...}}`.
//!
//! ## Error Handling
//! All failure modes surface as [`ProviderError`]; the refresh scheduler treats
//! every one of them as transient and keeps the previous window.

use crate::config::ProviderConfig;
use crate::{Extremum, ExtremumKind, MINUTE_FORMAT};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Response timestamp format (`2024-03-01 04:12`).
const RESPONSE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Errors raised while requesting predictions.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// HTTP request failed (connect, timeout, protocol)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Server answered with an error document instead of predictions
    #[error("NOAA API error: {0}")]
    Api(String),

    /// Payload, timestamp, level or type code could not be parsed
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Source of raw tide extrema for a station and time window.
#[async_trait]
pub trait TideProvider: Send + Sync {
    /// Extrema for `station_id` between `from` and `to` (UTC), in provider order.
    async fn request_predictions(
        &self,
        station_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Extremum>, ProviderError>;
}

#[async_trait]
impl<P: TideProvider + ?Sized> TideProvider for Arc<P> {
    async fn request_predictions(
        &self,
        station_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Extremum>, ProviderError> {
        (**self).request_predictions(station_id, from, to).await
    }
}

/// HTTP client for the CO-OPS datagetter endpoint.
#[derive(Debug, Clone)]
pub struct NoaaClient {
    http: reqwest::Client,
    base_url: String,
    datum: String,
    units: String,
}

impl NoaaClient {
    /// Build a client from the `[provider]` configuration section.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            datum: config.datum.clone(),
            units: config.units.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TideProvider for NoaaClient {
    async fn request_predictions(
        &self,
        station_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Extremum>, ProviderError> {
        let begin_date = format_request_time(from);
        let end_date = format_request_time(to);
        let params = [
            ("station", station_id),
            ("begin_date", begin_date.as_str()),
            ("end_date", end_date.as_str()),
            ("product", "predictions"),
            ("datum", self.datum.as_str()),
            ("units", self.units.as_str()),
            ("time_zone", "gmt"),
            ("format", "json"),
            ("interval", "hilo"),
        ];

        tracing::debug!(station = station_id, %begin_date, %end_date, "requesting NOAA predictions");

        let response = self.http.get(&self.base_url).query(&params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_predictions(&body)
    }
}

/// `YYYYMMDD HH:MM`, as NOAA expects `begin_date` / `end_date`.
pub fn format_request_time(time: DateTime<Utc>) -> String {
    time.format(MINUTE_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD HH:MM` response timestamp as UTC.
pub fn parse_response_time(text: &str) -> Result<DateTime<Utc>, ProviderError> {
    NaiveDateTime::parse_from_str(text.trim(), RESPONSE_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| ProviderError::Malformed(format!("timestamp {text:?}: {e}")))
}

#[derive(Deserialize)]
struct PredictionsResponse {
    predictions: Option<Vec<RawPrediction>>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
struct RawPrediction {
    t: String,
    v: String,
    #[serde(rename = "type")]
    kind: String,
}

impl RawPrediction {
    fn into_extremum(self) -> Result<Extremum, ProviderError> {
        let time = parse_response_time(&self.t)?;
        let level: f64 = self
            .v
            .trim()
            .parse()
            .map_err(|_| ProviderError::Malformed(format!("level {:?}", self.v)))?;
        let kind = ExtremumKind::from_code(&self.kind)
            .ok_or_else(|| ProviderError::Malformed(format!("type {:?}", self.kind)))?;
        Ok(Extremum { time, level, kind })
    }
}

/// Decode a datagetter JSON body into extrema, keeping response order.
pub fn parse_predictions(body: &str) -> Result<Vec<Extremum>, ProviderError> {
    let response: PredictionsResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    if let Some(error) = response.error {
        return Err(ProviderError::Api(error.message));
    }

    response
        .predictions
        .ok_or_else(|| ProviderError::Malformed("missing predictions".to_string()))?
        .into_iter()
        .map(RawPrediction::into_extremum)
        .collect()
}
