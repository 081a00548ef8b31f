//! Growth-rate resolution: global scaling, tier ceilings, and the floor.
//!
//! Every function here is pure so the calculator can resolve rates at
//! arbitrary intermediate instants without carrying state between calls.

use ixstats_types::EconomicTier;

use crate::config::GrowthConfig;
use crate::error::GrowthError;
use crate::tiers::TierTables;

/// Scale `configured_rate` by the global factor, then clamp it to
/// `[min_rate, max_rate_for_tier]`.
///
/// The ceiling is hard; the floor only stops runaway contraction. Callers
/// guarantee `min_rate <= max_rate_for_tier`.
pub fn resolve_effective_rate(
    configured_rate: f64,
    global_growth_factor: f64,
    max_rate_for_tier: f64,
    min_rate: f64,
) -> f64 {
    (configured_rate * global_growth_factor)
        .min(max_rate_for_tier)
        .max(min_rate)
}

/// Validated rate bounds shared by every resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateBounds {
    /// Global floor on any effective rate.
    pub min_growth_rate: f64,
    /// Ceiling on the effective population growth rate.
    pub max_population_growth_rate: f64,
}

impl RateBounds {
    /// Build bounds from configuration, checking them against the tier
    /// ceilings.
    ///
    /// # Errors
    ///
    /// Returns [`GrowthError::Configuration`] if the floor is not above -1,
    /// is not below every tier ceiling, or exceeds the population ceiling.
    pub fn from_config(config: &GrowthConfig, tables: &TierTables) -> Result<Self, GrowthError> {
        let floor = config.min_growth_rate;
        if !floor.is_finite() || floor <= -1.0 {
            return Err(GrowthError::Configuration {
                reason: format!("min_growth_rate must be finite and above -1, got {floor}"),
            });
        }
        if floor >= tables.lowest_ceiling() {
            return Err(GrowthError::Configuration {
                reason: format!(
                    "min_growth_rate {floor} must be below every tier ceiling (lowest {})",
                    tables.lowest_ceiling()
                ),
            });
        }
        let population_ceiling = config.max_population_growth_rate;
        if !population_ceiling.is_finite() || population_ceiling <= floor {
            return Err(GrowthError::Configuration {
                reason: format!(
                    "max_population_growth_rate must be finite and above {floor}, got {population_ceiling}"
                ),
            });
        }
        Ok(Self {
            min_growth_rate: floor,
            max_population_growth_rate: population_ceiling,
        })
    }
}

/// Resolves effective GDP and population growth rates.
#[derive(Debug, Clone, Copy)]
pub struct RateResolver<'a> {
    tables: &'a TierTables,
    bounds: RateBounds,
}

impl<'a> RateResolver<'a> {
    /// Create a resolver over validated tables and bounds.
    pub const fn new(tables: &'a TierTables, bounds: RateBounds) -> Self {
        Self { tables, bounds }
    }

    /// Effective GDP-per-capita growth rate for a country in `tier`.
    ///
    /// The ceiling is the tier's ceiling, lowered further by the country's
    /// own maximum when that is smaller.
    pub fn resolve_gdp_rate(
        &self,
        configured_rate: f64,
        tier: EconomicTier,
        global_growth_factor: f64,
        country_max_rate: f64,
    ) -> f64 {
        let ceiling = self.tables.max_growth_rate(tier).min(country_max_rate);
        resolve_effective_rate(
            configured_rate,
            global_growth_factor,
            ceiling,
            self.bounds.min_growth_rate,
        )
    }

    /// Effective population growth rate. The global factor does not apply.
    pub fn resolve_population_rate(&self, configured_rate: f64) -> f64 {
        resolve_effective_rate(
            configured_rate,
            1.0,
            self.bounds.max_population_growth_rate,
            self.bounds.min_growth_rate,
        )
    }

    /// The validated bounds.
    pub const fn bounds(&self) -> RateBounds {
        self.bounds
    }
}

/// Check a global growth factor.
///
/// # Errors
///
/// Returns [`GrowthError::InvalidInput`] unless the factor is finite and
/// non-negative.
pub fn validate_global_factor(factor: f64) -> Result<(), GrowthError> {
    if factor.is_finite() && factor >= 0.0 {
        Ok(())
    } else {
        Err(GrowthError::invalid(format!(
            "global growth factor must be finite and non-negative, got {factor}"
        )))
    }
}
