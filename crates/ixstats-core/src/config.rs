//! Configuration loading and typed config structures for the growth engine.
//!
//! The canonical configuration lives in `ixstats-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure, a loader that reads the file, and a validator that rejects
//! configurations the engine must refuse to start with.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use ixstats_types::{EconomicTier, PopulationTier};
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but holds values the engine cannot run with.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration.
///
/// Mirrors the structure of `ixstats-config.yaml`. Every field has a default
/// so a partial (or empty) file is valid.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Virtual clock settings.
    #[serde(default)]
    pub clock: ClockConfig,

    /// Economic and population tier tables.
    #[serde(default)]
    pub tiers: TierConfig,

    /// Growth-rate bounds and value floors.
    #[serde(default)]
    pub growth: GrowthConfig,

    /// Caps on series length and fleet size.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `IXSTATS_TIME_MULTIPLIER` overrides `clock.multiplier`
    /// - `IXSTATS_LOG_LEVEL` overrides `logging.level`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if an environment override does not parse.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, applying environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Override values with environment variables when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `IXSTATS_TIME_MULTIPLIER` is not a
    /// number.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("IXSTATS_TIME_MULTIPLIER") {
            self.clock.multiplier = val.trim().parse().map_err(|e| ConfigError::Invalid {
                reason: format!("IXSTATS_TIME_MULTIPLIER={val}: {e}"),
            })?;
        }
        if let Ok(val) = std::env::var("IXSTATS_LOG_LEVEL") {
            self.logging.level = val;
        }
        Ok(())
    }

    /// Check every section for values the engine must refuse to start with.
    ///
    /// Component constructors repeat their own checks; this is the single
    /// entry point used at startup so all problems surface before any work.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        crate::clock::VirtualClock::new(&self.clock).map_err(|e| ConfigError::Invalid {
            reason: e.to_string(),
        })?;
        crate::growth::GrowthCalculator::new(self).map_err(|e| ConfigError::Invalid {
            reason: e.to_string(),
        })?;
        if self.limits.max_series_points == 0 {
            return Err(ConfigError::Invalid {
                reason: "limits.max_series_points must be at least 1".to_owned(),
            });
        }
        if self.limits.max_fleet_size == 0 {
            return Err(ConfigError::Invalid {
                reason: "limits.max_fleet_size must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

/// Virtual clock configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClockConfig {
    /// Real wall-clock instant at which virtual time equals `virtual_epoch`.
    #[serde(default = "default_real_epoch")]
    pub real_epoch: DateTime<Utc>,

    /// Virtual instant corresponding to `real_epoch`.
    #[serde(default = "default_virtual_epoch")]
    pub virtual_epoch: DateTime<Utc>,

    /// Virtual time elapsed per unit of real time. Must be positive.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Whether the clock starts paused at `virtual_epoch`.
    #[serde(default)]
    pub start_paused: bool,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            real_epoch: default_real_epoch(),
            virtual_epoch: default_virtual_epoch(),
            multiplier: default_multiplier(),
            start_paused: false,
        }
    }
}

/// One row of the economic tier table.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct EconomicTierThreshold {
    /// Tier this row describes.
    pub tier: EconomicTier,
    /// Inclusive lower bound on GDP per capita.
    pub min_gdp_per_capita: f64,
    /// Maximum annual GDP growth rate allowed within the tier.
    pub max_growth_rate: f64,
}

/// One row of the population tier table.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PopulationTierThreshold {
    /// Tier this row describes.
    pub tier: PopulationTier,
    /// Inclusive lower bound on population.
    pub min_population: f64,
}

/// Tier threshold tables, ascending.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TierConfig {
    /// Economic tiers by GDP per capita, with growth ceilings.
    #[serde(default = "default_economic_tiers")]
    pub economic: Vec<EconomicTierThreshold>,

    /// Population tiers by total population.
    #[serde(default = "default_population_tiers")]
    pub population: Vec<PopulationTierThreshold>,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            economic: default_economic_tiers(),
            population: default_population_tiers(),
        }
    }
}

/// Growth-rate bounds and value floors.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GrowthConfig {
    /// Global floor on any effective growth rate. Must be greater than -1.
    #[serde(default = "default_min_growth_rate")]
    pub min_growth_rate: f64,

    /// Ceiling on the effective population growth rate.
    #[serde(default = "default_max_population_growth_rate")]
    pub max_population_growth_rate: f64,

    /// Smallest population a calculation may produce.
    #[serde(default = "default_min_population")]
    pub min_population: f64,

    /// Smallest GDP per capita a calculation may produce.
    #[serde(default = "default_min_gdp_per_capita")]
    pub min_gdp_per_capita: f64,

    /// Maximum constant-rate segments a single advance may walk through.
    #[serde(default = "default_max_segments")]
    pub max_segments: u32,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            min_growth_rate: default_min_growth_rate(),
            max_population_growth_rate: default_max_population_growth_rate(),
            min_population: default_min_population(),
            min_gdp_per_capita: default_min_gdp_per_capita(),
            max_segments: default_max_segments(),
        }
    }
}

/// Caps on generated output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LimitsConfig {
    /// Maximum points a historical or forecast series may contain.
    #[serde(default = "default_max_series_points")]
    pub max_series_points: u32,

    /// Maximum countries a single aggregation or batch may process.
    #[serde(default = "default_max_fleet_size")]
    pub max_fleet_size: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_series_points: default_max_series_points(),
            max_fleet_size: default_max_fleet_size(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON-formatted log lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_real_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 10, 4, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn default_virtual_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2028, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

const fn default_multiplier() -> f64 {
    4.0
}

fn default_economic_tiers() -> Vec<EconomicTierThreshold> {
    let rows = [
        (EconomicTier::Impoverished, 0.0, 0.10),
        (EconomicTier::Developing, 10_000.0, 0.075),
        (EconomicTier::Developed, 25_000.0, 0.05),
        (EconomicTier::Healthy, 35_000.0, 0.035),
        (EconomicTier::Strong, 45_000.0, 0.0275),
        (EconomicTier::VeryStrong, 55_000.0, 0.015),
        (EconomicTier::Extravagant, 65_000.0, 0.005),
    ];
    rows.iter()
        .map(|&(tier, min_gdp_per_capita, max_growth_rate)| EconomicTierThreshold {
            tier,
            min_gdp_per_capita,
            max_growth_rate,
        })
        .collect()
}

fn default_population_tiers() -> Vec<PopulationTierThreshold> {
    let rows = [
        (PopulationTier::Tier1, 0.0),
        (PopulationTier::Tier2, 9_500_000.0),
        (PopulationTier::Tier3, 29_500_000.0),
        (PopulationTier::Tier4, 49_500_000.0),
        (PopulationTier::Tier5, 79_500_000.0),
        (PopulationTier::Tier6, 119_500_000.0),
        (PopulationTier::Tier7, 349_500_000.0),
        (PopulationTier::TierX, 500_000_000.0),
    ];
    rows.iter()
        .map(|&(tier, min_population)| PopulationTierThreshold {
            tier,
            min_population,
        })
        .collect()
}

const fn default_min_growth_rate() -> f64 {
    -0.05
}

const fn default_max_population_growth_rate() -> f64 {
    0.05
}

const fn default_min_population() -> f64 {
    1.0
}

const fn default_min_gdp_per_capita() -> f64 {
    1.0
}

const fn default_max_segments() -> u32 {
    10_000
}

const fn default_max_series_points() -> u32 {
    10_000
}

const fn default_max_fleet_size() -> u32 {
    50_000
}

fn default_log_level() -> String {
    "info".to_owned()
}
