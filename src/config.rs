//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the tide-config.toml file.
//! It covers the reference station, the subordinate-location offsets, the cache
//! window and refresh cadence, and the NOAA provider settings.
//!
//! Unlike display settings, bad values here would leave the background refresh
//! spinning on a window that can never be fresh, so [`Config::validate`] rejects
//! them before anything starts.

use crate::offset::{Additive, OffsetSpec, TideOffset};
use crate::TideError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Largest accepted time correction in either direction.
pub const MAX_TIME_OFFSET_MINUTES: i64 = 24 * 60;

/// Largest accepted lookback, lookahead or renew threshold.
pub const MAX_WINDOW_HOURS: i64 = 2 * 366 * 24;

/// Application configuration loaded from tide-config.toml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// NOAA reference station
    pub station: StationConfig,
    /// Corrections from the reference station to the target location
    pub offset: OffsetConfig,
    /// Prediction window and refresh cadence
    pub cache: CacheConfig,
    /// NOAA API settings
    pub provider: ProviderConfig,
}

/// NOAA reference station configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StationConfig {
    /// NOAA station ID (e.g., "9414290" for San Francisco, CA)
    pub id: String,
    /// Human-readable name of the location the offsets describe
    pub name: String,
}

/// How level corrections combine with the reference level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelMode {
    Additive,
    Multiplicative,
}

/// Subordinate-station corrections, one value per extremum kind
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OffsetConfig {
    /// Minutes added to reference low tide times (may be negative)
    pub time_low_minutes: i64,
    /// Minutes added to reference high tide times (may be negative)
    pub time_high_minutes: i64,
    pub level_mode: LevelMode,
    /// Low tide level correction (ratio or difference per `level_mode`)
    pub level_low: f64,
    /// High tide level correction (ratio or difference per `level_mode`)
    pub level_high: f64,
}

/// Prediction window and refresh cadence
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Hours of history requested before "now"
    pub lookback_hours: i64,
    /// Hours of predictions requested after "now"
    pub lookahead_hours: i64,
    /// Refresh once the last cached extremum is closer than this
    pub renew_threshold_hours: i64,
    /// Seconds between background staleness checks
    pub tick_seconds: u64,
}

/// NOAA CO-OPS API settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Vertical reference, e.g. "MLLW"
    pub datum: String,
    /// "english" (feet) or "metric" (meters)
    pub units: String,
    /// HTTP request timeout
    pub timeout_seconds: u64,
}

impl Default for StationConfig {
    fn default() -> Self {
        StationConfig {
            id: "9414290".to_string(),
            name: "San Francisco Bay, subordinate".to_string(),
        }
    }
}

impl Default for OffsetConfig {
    fn default() -> Self {
        OffsetConfig {
            time_low_minutes: 179,
            time_high_minutes: 131,
            level_mode: LevelMode::Multiplicative,
            level_low: 0.82,
            level_high: 1.15,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            lookback_hours: 24,
            lookahead_hours: 7 * 24,
            renew_threshold_hours: 24,
            tick_seconds: 60,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            base_url: "https://api.tidesandcurrents.noaa.gov/api/prod/datagetter".to_string(),
            datum: "MLLW".to_string(),
            units: "english".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl OffsetConfig {
    /// Build the immutable offset applied to every fetched extremum.
    pub fn tide_offset(&self) -> Result<TideOffset, TideError> {
        let minutes = |m: i64| {
            Duration::try_minutes(m)
                .ok_or_else(|| TideError::config(format!("time offset of {m} minutes is out of range")))
        };
        let time = Additive::new(
            minutes(self.time_low_minutes)?,
            minutes(self.time_high_minutes)?,
        );
        let level = match self.level_mode {
            LevelMode::Additive => OffsetSpec::additive(self.level_low, self.level_high),
            LevelMode::Multiplicative => OffsetSpec::multiplicative(self.level_low, self.level_high),
        };
        Ok(TideOffset::new(time, level))
    }
}

impl CacheConfig {
    pub fn tick(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.tick_seconds)
    }
}

impl Config {
    /// Load configuration from tide-config.toml
    /// Falls back to default configuration if the file doesn't exist
    pub fn load() -> Result<Self, TideError> {
        Self::load_from_path("tide-config.toml")
    }

    /// Load configuration from specified path
    /// A missing file yields the default configuration; a file that exists but
    /// cannot be read or parsed is an error.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, TideError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file found, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| TideError::config(format!("reading {}: {e}", path.display())))?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| TideError::config(format!("parsing {}: {e}", path.display())))?;

        tracing::info!(station = %config.station.id, name = %config.station.name, "loaded configuration");
        Ok(config)
    }

    /// Save current configuration as TOML
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values that would make the refresh loop meaningless.
    pub fn validate(&self) -> Result<(), TideError> {
        if self.station.id.trim().is_empty() {
            return Err(TideError::config("station id must not be empty"));
        }

        let offset = &self.offset;
        let time_range = -MAX_TIME_OFFSET_MINUTES..=MAX_TIME_OFFSET_MINUTES;
        if !time_range.contains(&offset.time_low_minutes)
            || !time_range.contains(&offset.time_high_minutes)
        {
            return Err(TideError::config(format!(
                "time offsets must be within {MAX_TIME_OFFSET_MINUTES} minutes"
            )));
        }
        if !offset.level_low.is_finite() || !offset.level_high.is_finite() {
            return Err(TideError::config("level offsets must be finite"));
        }
        if offset.level_mode == LevelMode::Multiplicative
            && (offset.level_low <= 0.0 || offset.level_high <= 0.0)
        {
            return Err(TideError::config("level ratios must be positive"));
        }

        let cache = &self.cache;
        if cache.tick_seconds == 0 {
            return Err(TideError::config("tick_seconds must be positive"));
        }
        if cache.lookback_hours < 0 {
            return Err(TideError::config("lookback_hours must not be negative"));
        }
        if cache.lookahead_hours <= 0 {
            return Err(TideError::config("lookahead_hours must be positive"));
        }
        if cache.renew_threshold_hours <= 0 {
            return Err(TideError::config("renew_threshold_hours must be positive"));
        }
        if [cache.lookback_hours, cache.lookahead_hours, cache.renew_threshold_hours]
            .iter()
            .any(|&h| h > MAX_WINDOW_HOURS)
        {
            return Err(TideError::config(format!(
                "cache hours must not exceed {MAX_WINDOW_HOURS}"
            )));
        }
        if cache.renew_threshold_hours >= cache.lookahead_hours {
            return Err(TideError::config(
                "renew_threshold_hours must be smaller than lookahead_hours",
            ));
        }

        if self.provider.timeout_seconds == 0 {
            return Err(TideError::config("provider timeout_seconds must be positive"));
        }
        if self.provider.base_url.trim().is_empty() {
            return Err(TideError::config("provider base_url must not be empty"));
        }
        Ok(())
    }
}
