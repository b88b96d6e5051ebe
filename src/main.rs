//! # Tide Offset Tracker Entry Point
//!
//! Loads the configuration, starts the background refresh loop and prints the
//! current tide level at the configured location once predictions arrive.
//!
//! Usage: `tide-offset-tracker [--config PATH] [--curve] [--watch]`
//! - `--config PATH`: configuration file (default `tide-config.toml`)
//! - `--curve`: also print the next 24 hours in 30-minute steps
//! - `--watch`: keep running and print a reading every refresh interval until Ctrl+C

use anyhow::Context;
use chrono::{Duration, Utc};
use std::env;
use tide_offset_lib::cache::{CacheSettings, PredictionCache, TideReader};
use tide_offset_lib::config::Config;
use tide_offset_lib::noaa::NoaaClient;
use tide_offset_lib::scheduler::RefreshScheduler;
use tide_offset_lib::{Sample, MINUTE_FORMAT};
use tracing_subscriber::EnvFilter;

/// How long to wait for the first successful refresh before giving up.
const FIRST_READING_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

struct Args {
    config_path: String,
    curve: bool,
    watch: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        config_path: "tide-config.toml".to_string(),
        curve: false,
        watch: false,
    };

    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                args.config_path = iter.next().context("--config needs a path")?;
            }
            "--curve" => args.curve = true,
            "--watch" => args.watch = true,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(args)
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let config = Config::load_from_path(&args.config_path)?;
    config.validate()?;

    // Create Tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, args))
}

async fn run(config: Config, args: Args) -> anyhow::Result<()> {
    let client = NoaaClient::new(&config.provider).context("building NOAA client")?;
    let offset = config.offset.tide_offset()?;
    tracing::info!(station = %config.station.id, %offset, "starting tide offset tracker");

    let cache = PredictionCache::new(client, offset, CacheSettings::from_config(&config)?)?;
    let scheduler = RefreshScheduler::new(cache, config.cache.tick())?;
    let handle = scheduler.spawn();
    let reader = handle.reader();

    let reading = reader
        .await_tide_now(FIRST_READING_TIMEOUT)
        .await
        .context("waiting for first tide predictions")?;
    println!("{}: {}", config.station.name, reading);
    println!(
        "{:.2} and {}",
        reading.level,
        if reading.is_rising() { "rising" } else { "falling" }
    );

    if args.curve {
        print_curve(&reader)?;
    }

    if args.watch {
        let mut ticker = tokio::time::interval(config.cache.tick());
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match reader.query_now() {
                        Ok(reading) => println!("{reading}"),
                        Err(e) => tracing::warn!(error = %e, "no reading available"),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("received Ctrl+C");
                    break;
                }
            }
        }
    }

    let stats = handle.shutdown().await?;
    tracing::info!(
        refreshes = stats.refreshes,
        failures = stats.failures,
        "shutdown complete"
    );
    Ok(())
}

/// Text bar chart of the next 24 hours.
fn print_curve(reader: &TideReader) -> anyhow::Result<()> {
    const WIDTH: f64 = 50.0;

    let now = Utc::now();
    let samples: Vec<Sample> = reader.snapshot().sample_curve(
        now,
        now + Duration::hours(24),
        Duration::minutes(30),
    )?;

    let (min, max) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
            (lo.min(s.level), hi.max(s.level))
        });
    let span = (max - min).max(f64::EPSILON);

    for sample in &samples {
        let bar = (((sample.level - min) / span) * WIDTH).round() as usize;
        println!(
            "{} {:>6.2} {}",
            sample.time.format(MINUTE_FORMAT),
            sample.level,
            "#".repeat(bar)
        );
    }
    Ok(())
}
