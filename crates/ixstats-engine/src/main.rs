//! Command-line driver for the IxStats growth engine.
//!
//! Loads configuration and a fleet file, brings every country up to the
//! current virtual time, and prints the clock status, the batch report,
//! fleet aggregates, and per-country forecasts as JSON on stdout.
//!
//! # Startup Sequence
//!
//! 1. Load configuration (`IXSTATS_CONFIG`, else `ixstats-config.yaml`,
//!    else defaults) and validate it
//! 2. Initialize structured logging (tracing)
//! 3. Create the virtual clock authority on the system time source
//! 4. Load the fleet file (`IXSTATS_FLEET`) into an in-memory repository
//! 5. Recompute every country to "now"
//! 6. Aggregate the fleet and forecast each country
//! 7. Print the report

mod error;
mod fleet_file;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use ixstats_core::clock::{self, ClockAuthority, SystemTimeSource};
use ixstats_core::config::{EngineConfig, LoggingConfig};
use ixstats_core::fleet::FleetAggregator;
use ixstats_core::growth::{GrowthCalculator, GrowthInputs};
use ixstats_core::overrides::OverrideSet;
use ixstats_core::series::SeriesGenerator;
use ixstats_core::sync::{self, BatchReport, CountryRepository, InMemoryRepository};
use ixstats_types::{ClockStatus, CountryId, GlobalStats, HistoricalDataPoint};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::fleet_file::FleetFile;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "ixstats-config.yaml";

/// Virtual years covered by each country's forecast.
const FORECAST_YEARS: f64 = 5.0;

/// Points per country forecast.
const FORECAST_POINTS: u32 = 10;

/// Everything printed on stdout.
#[derive(Debug, Serialize)]
struct Report {
    clock: ClockStatus,
    batch: BatchReport,
    stats: GlobalStats,
    forecasts: Vec<CountryForecast>,
}

/// Forecast points for one country.
#[derive(Debug, Serialize)]
struct CountryForecast {
    country_id: CountryId,
    name: String,
    points: Vec<HistoricalDataPoint>,
}

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, the fleet file, or the clock cannot
/// be loaded. Per-country failures are reported, not fatal.
fn main() -> anyhow::Result<()> {
    // 1. Load configuration.
    let config = load_config().context("loading engine configuration")?;
    config.validate().context("validating engine configuration")?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!(
        multiplier = config.clock.multiplier,
        virtual_epoch = %config.clock.virtual_epoch,
        max_series_points = config.limits.max_series_points,
        max_fleet_size = config.limits.max_fleet_size,
        "ixstats-engine starting"
    );

    // 3. Create the clock authority.
    let clock = ClockAuthority::new(&config.clock, Arc::new(SystemTimeSource))
        .context("creating virtual clock")?;
    let status = clock.status().context("sampling virtual clock")?;
    info!(
        virtual_time = %status.virtual_time,
        game_year = status.game_year,
        paused = status.paused,
        "Virtual clock initialized"
    );

    // 4. Load the fleet.
    let fleet = load_fleet().context("loading fleet file")?;
    let mut repo = InMemoryRepository::new(fleet.global_growth_factor)
        .context("invalid global growth factor in fleet file")?;
    for baseline in fleet.countries {
        repo.insert_country(baseline);
    }
    for input in fleet.overrides {
        repo.add_override(input);
    }
    info!(
        countries = repo.country_ids()?.len(),
        overrides = repo.overrides().len(),
        "Fleet loaded"
    );

    // 5. Recompute every country to now.
    let calculator = GrowthCalculator::new(&config)?;
    let now = status.virtual_time;
    let batch = sync::recompute_all(&repo, &calculator, now, config.limits.max_fleet_size)?;

    // 6. Aggregate and forecast.
    let factor = repo.global_growth_factor()?;
    let aggregator = FleetAggregator::new(&calculator, config.limits.max_fleet_size);
    let stats = aggregator
        .aggregate_at(&repo.records(), &repo.overrides(), factor, now, now)
        .context("aggregating fleet")?;
    let forecasts = forecast_all(&repo, &calculator, &config, now)?;

    // 7. Print the report.
    let report = Report {
        clock: status,
        batch,
        stats,
        forecasts,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    info!("ixstats-engine finished");
    Ok(())
}

fn load_config() -> Result<EngineConfig, EngineError> {
    if let Ok(path) = std::env::var("IXSTATS_CONFIG") {
        return Ok(EngineConfig::from_file(Path::new(&path))?);
    }
    let default_path = Path::new(DEFAULT_CONFIG_PATH);
    if default_path.exists() {
        Ok(EngineConfig::from_file(default_path)?)
    } else {
        let mut config = EngineConfig::default();
        config.apply_env_overrides()?;
        Ok(config)
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_fleet() -> Result<FleetFile, EngineError> {
    match std::env::var("IXSTATS_FLEET") {
        Ok(path) => FleetFile::load(&PathBuf::from(path)),
        Err(_) => {
            warn!("IXSTATS_FLEET not set, starting with an empty fleet");
            Ok(FleetFile {
                global_growth_factor: 1.0,
                ..FleetFile::default()
            })
        }
    }
}

/// Forecast every stored country from its current state.
fn forecast_all(
    repo: &InMemoryRepository,
    calculator: &GrowthCalculator,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Result<Vec<CountryForecast>, EngineError> {
    let series = SeriesGenerator::new(calculator, config.limits.max_series_points);
    let end = clock::years_to_millis(FORECAST_YEARS)
        .and_then(|ms| now.checked_add_signed(chrono::Duration::milliseconds(ms)))
        .unwrap_or(now);
    let factor = repo.global_growth_factor()?;
    let mut forecasts = Vec::new();
    for id in repo.country_ids()? {
        let row = repo.load(id)?;
        let Some(current) = row.state else {
            continue;
        };
        let overrides = OverrideSet::for_country(id, &repo.active_overrides(id)?);
        let inputs = GrowthInputs::new(&row.baseline, &overrides).with_global_factor(factor);
        match series.forecast_series(&inputs, &current, end, FORECAST_POINTS) {
            Ok(points) => forecasts.push(CountryForecast {
                country_id: id,
                name: row.baseline.name.clone(),
                points,
            }),
            Err(err) => warn!(country = %id, error = %err, "forecast failed"),
        }
    }
    Ok(forecasts)
}
