//! Tier classification from GDP per capita and population.
//!
//! Both tables are ascending lists of inclusive lower bounds: a value lands
//! in the highest tier whose bound it meets, so a value exactly at a
//! threshold belongs to the higher tier. The lowest bound is always zero,
//! which makes classification total over the non-negative reals.

use ixstats_types::{EconomicTier, PopulationTier};

use crate::config::TierConfig;

/// Errors from tier table construction and classification.
#[derive(Debug, thiserror::Error)]
pub enum TierError {
    /// The threshold table is malformed.
    #[error("invalid tier table: {reason}")]
    InvalidTable {
        /// Explanation of what is wrong with the table.
        reason: String,
    },

    /// The value to classify is NaN, infinite, or negative.
    #[error("cannot classify {metric} value {value}")]
    InvalidInput {
        /// Which metric was being classified.
        metric: &'static str,
        /// The rejected value.
        value: f64,
    },
}

/// One validated economic tier band.
#[derive(Debug, Clone, Copy, PartialEq)]
struct EconomicBand {
    tier: EconomicTier,
    min_gdp_per_capita: f64,
    max_growth_rate: f64,
}

/// Validated economic and population tier tables.
#[derive(Debug, Clone, PartialEq)]
pub struct TierTables {
    economic: Vec<EconomicBand>,
    population: Vec<(PopulationTier, f64)>,
}

impl TierTables {
    /// Build tables from configuration.
    ///
    /// Each table must list every tier exactly once in ascending order,
    /// start at zero, and have strictly ascending finite bounds. Economic
    /// growth ceilings must be finite and strictly decreasing.
    ///
    /// # Errors
    ///
    /// Returns [`TierError::InvalidTable`] describing the first problem.
    pub fn from_config(config: &TierConfig) -> Result<Self, TierError> {
        let economic_tiers: Vec<EconomicTier> = config.economic.iter().map(|r| r.tier).collect();
        if economic_tiers != EconomicTier::ALL {
            return Err(invalid_table(
                "economic table must list every tier once, in ascending order",
            ));
        }
        let economic_bounds: Vec<f64> = config
            .economic
            .iter()
            .map(|r| r.min_gdp_per_capita)
            .collect();
        check_bounds("economic", &economic_bounds)?;

        for pair in config.economic.windows(2) {
            if let [lower, upper] = pair {
                if !upper.max_growth_rate.is_finite()
                    || !lower.max_growth_rate.is_finite()
                    || upper.max_growth_rate >= lower.max_growth_rate
                {
                    return Err(invalid_table(format!(
                        "growth ceiling for {} must be finite and below {}",
                        upper.tier, lower.tier
                    )));
                }
            }
        }

        let population_tiers: Vec<PopulationTier> =
            config.population.iter().map(|r| r.tier).collect();
        if population_tiers != PopulationTier::ALL {
            return Err(invalid_table(
                "population table must list every tier once, in ascending order",
            ));
        }
        let population_bounds: Vec<f64> = config
            .population
            .iter()
            .map(|r| r.min_population)
            .collect();
        check_bounds("population", &population_bounds)?;

        Ok(Self {
            economic: config
                .economic
                .iter()
                .map(|r| EconomicBand {
                    tier: r.tier,
                    min_gdp_per_capita: r.min_gdp_per_capita,
                    max_growth_rate: r.max_growth_rate,
                })
                .collect(),
            population: config
                .population
                .iter()
                .map(|r| (r.tier, r.min_population))
                .collect(),
        })
    }

    /// Economic tier for a GDP-per-capita value.
    ///
    /// # Errors
    ///
    /// Returns [`TierError::InvalidInput`] for NaN, infinite, or negative
    /// values.
    pub fn classify_economic_tier(&self, gdp_per_capita: f64) -> Result<EconomicTier, TierError> {
        check_value("gdp_per_capita", gdp_per_capita)?;
        Ok(self
            .economic
            .iter()
            .rev()
            .find(|band| gdp_per_capita >= band.min_gdp_per_capita)
            .map_or(EconomicTier::Impoverished, |band| band.tier))
    }

    /// Population tier for a population value.
    ///
    /// # Errors
    ///
    /// Returns [`TierError::InvalidInput`] for NaN, infinite, or negative
    /// values.
    pub fn classify_population_tier(&self, population: f64) -> Result<PopulationTier, TierError> {
        check_value("population", population)?;
        Ok(self
            .population
            .iter()
            .rev()
            .find(|(_, min)| population >= *min)
            .map_or(PopulationTier::Tier1, |(tier, _)| *tier))
    }

    /// Maximum annual GDP growth rate allowed within `tier`.
    pub fn max_growth_rate(&self, tier: EconomicTier) -> f64 {
        self.economic
            .iter()
            .find(|band| band.tier == tier)
            .map_or(0.0, |band| band.max_growth_rate)
    }

    /// The lowest growth ceiling across all economic tiers.
    pub fn lowest_ceiling(&self) -> f64 {
        self.economic
            .iter()
            .map(|band| band.max_growth_rate)
            .fold(f64::INFINITY, f64::min)
    }
}

impl Default for TierTables {
    fn default() -> Self {
        let config = TierConfig::default();
        Self {
            economic: config
                .economic
                .iter()
                .map(|r| EconomicBand {
                    tier: r.tier,
                    min_gdp_per_capita: r.min_gdp_per_capita,
                    max_growth_rate: r.max_growth_rate,
                })
                .collect(),
            population: config
                .population
                .iter()
                .map(|r| (r.tier, r.min_population))
                .collect(),
        }
    }
}

fn invalid_table(reason: impl Into<String>) -> TierError {
    TierError::InvalidTable {
        reason: reason.into(),
    }
}

fn check_bounds(table: &str, bounds: &[f64]) -> Result<(), TierError> {
    match bounds.first() {
        Some(first) if *first == 0.0 => {}
        _ => return Err(invalid_table(format!("{table} table must start at 0"))),
    }
    if bounds.iter().any(|b| !b.is_finite()) {
        return Err(invalid_table(format!("{table} table has a non-finite bound")));
    }
    if bounds.windows(2).any(|w| matches!(w, [a, b] if b <= a)) {
        return Err(invalid_table(format!(
            "{table} table bounds must be strictly ascending"
        )));
    }
    Ok(())
}

fn check_value(metric: &'static str, value: f64) -> Result<(), TierError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(TierError::InvalidInput { metric, value })
    }
}
