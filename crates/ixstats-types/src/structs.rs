//! Core data structs for the IxStats growth engine.
//!
//! Baselines and DM inputs are inputs to the engine; current states,
//! historical points, and global stats are its outputs. All timestamps are
//! virtual (in-simulation) time.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{EconomicTier, OverrideKind, PopulationTier};
use crate::ids::{CountryId, DmInputId};

// ---------------------------------------------------------------------------
// CountryBaseline
// ---------------------------------------------------------------------------

/// Immutable anchor statistics for a country at its baseline epoch.
///
/// Created once when the country is created. The engine never mutates a
/// baseline; administrative corrections replace it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CountryBaseline {
    /// Country identifier.
    pub id: CountryId,
    /// Display name.
    pub name: String,
    /// Population at the baseline epoch.
    pub population: f64,
    /// GDP per capita at the baseline epoch.
    pub gdp_per_capita: f64,
    /// Per-country ceiling on the annual GDP growth rate.
    pub max_gdp_growth_rate: f64,
    /// Configured (adjusted) annual GDP growth rate.
    pub adjusted_gdp_growth_rate: f64,
    /// Configured annual population growth rate.
    pub population_growth_rate: f64,
    /// Land area in square kilometres, when known.
    #[serde(default)]
    pub land_area: Option<f64>,
    /// Virtual timestamp the baseline statistics describe.
    pub epoch: DateTime<Utc>,
}

impl CountryBaseline {
    /// Total GDP at the baseline epoch.
    pub fn total_gdp(&self) -> f64 {
        self.population * self.gdp_per_capita
    }
}

// ---------------------------------------------------------------------------
// CountryCurrentState
// ---------------------------------------------------------------------------

/// The point from which values inside a constant-rate segment are compounded.
///
/// Holds organic values: population and GDP per capita before the level
/// shift from value overrides. The anchor moves only where the growth rates
/// change: at override window boundaries that change them and at
/// economic-tier crossings. Advancing from the same anchor to the same
/// instant always yields the same values, regardless of how many
/// intermediate samples were taken.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GrowthAnchor {
    /// Virtual timestamp of the anchor.
    pub time: DateTime<Utc>,
    /// Organic population at the anchor.
    pub population: f64,
    /// Organic GDP per capita at the anchor.
    pub gdp_per_capita: f64,
}

/// Derived snapshot of a country at `last_calculated`.
///
/// Fields are private: total GDP and densities are always derived from
/// population, GDP per capita and land area inside [`Self::derive`], so
/// `total_gdp == population * gdp_per_capita` holds for every value of this
/// type built through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CountryCurrentState {
    population: f64,
    gdp_per_capita: f64,
    total_gdp: f64,
    economic_tier: EconomicTier,
    population_tier: PopulationTier,
    population_density: Option<f64>,
    gdp_density: Option<f64>,
    last_calculated: DateTime<Utc>,
    anchor: GrowthAnchor,
}

impl CountryCurrentState {
    /// Build a state, deriving total GDP and densities.
    ///
    /// Densities are `None` when the land area is missing, zero, or not
    /// finite. The tiers must already be classified from `population` and
    /// `gdp_per_capita` by the caller; the growth calculator rejects states
    /// whose tiers disagree with its tables.
    pub fn derive(
        population: f64,
        gdp_per_capita: f64,
        economic_tier: EconomicTier,
        population_tier: PopulationTier,
        land_area: Option<f64>,
        last_calculated: DateTime<Utc>,
        anchor: GrowthAnchor,
    ) -> Self {
        let total_gdp = population * gdp_per_capita;
        let area = land_area.filter(|a| a.is_finite() && *a > 0.0);
        Self {
            population,
            gdp_per_capita,
            total_gdp,
            economic_tier,
            population_tier,
            population_density: area.map(|a| population / a),
            gdp_density: area.map(|a| total_gdp / a),
            last_calculated,
            anchor,
        }
    }

    /// Current population.
    pub const fn population(&self) -> f64 {
        self.population
    }

    /// Current GDP per capita.
    pub const fn gdp_per_capita(&self) -> f64 {
        self.gdp_per_capita
    }

    /// Current total GDP.
    pub const fn total_gdp(&self) -> f64 {
        self.total_gdp
    }

    /// Current economic tier.
    pub const fn economic_tier(&self) -> EconomicTier {
        self.economic_tier
    }

    /// Current population tier.
    pub const fn population_tier(&self) -> PopulationTier {
        self.population_tier
    }

    /// People per square kilometre, when land area is known.
    pub const fn population_density(&self) -> Option<f64> {
        self.population_density
    }

    /// GDP per square kilometre, when land area is known.
    pub const fn gdp_density(&self) -> Option<f64> {
        self.gdp_density
    }

    /// Virtual timestamp this state was calculated for.
    pub const fn last_calculated(&self) -> DateTime<Utc> {
        self.last_calculated
    }

    /// Growth anchor the state was compounded from.
    pub const fn anchor(&self) -> GrowthAnchor {
        self.anchor
    }
}

// ---------------------------------------------------------------------------
// DmInput
// ---------------------------------------------------------------------------

/// A time-scoped manual override ("DM input").
///
/// The window is `[activation_time, activation_time + duration_years)`;
/// without a duration the input is permanent from activation onward.
/// Inputs are soft-deactivated through `is_active`, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DmInput {
    /// Override identifier.
    pub id: DmInputId,
    /// Target country, or `None` for a global override.
    #[serde(default)]
    pub country_id: Option<CountryId>,
    /// Override kind.
    pub kind: OverrideKind,
    /// Magnitude, interpreted per kind.
    pub value: f64,
    /// Window length in virtual years, or `None` for permanent.
    #[serde(default)]
    pub duration_years: Option<f64>,
    /// Virtual timestamp the override takes effect.
    pub activation_time: DateTime<Utc>,
    /// Virtual timestamp the override was authored; orders composition.
    pub created_at: DateTime<Utc>,
    /// Soft-delete flag.
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Free-form description for the audit trail.
    #[serde(default)]
    pub description: Option<String>,
}

impl DmInput {
    /// Whether this override applies to `country`.
    pub fn targets(&self, country: CountryId) -> bool {
        self.country_id.is_none_or(|id| id == country)
    }
}

const fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Rates and history
// ---------------------------------------------------------------------------

/// Effective annual growth rates used to produce a state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GrowthRates {
    /// Effective population growth rate.
    pub population: f64,
    /// Effective GDP-per-capita growth rate.
    pub gdp_per_capita: f64,
}

/// Immutable snapshot of a country's state at a virtual timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct HistoricalDataPoint {
    /// Country the point belongs to.
    pub country_id: CountryId,
    /// Virtual timestamp the point represents.
    pub timestamp: DateTime<Utc>,
    /// Population.
    pub population: f64,
    /// GDP per capita.
    pub gdp_per_capita: f64,
    /// Total GDP.
    pub total_gdp: f64,
    /// Economic tier.
    pub economic_tier: EconomicTier,
    /// Population tier.
    pub population_tier: PopulationTier,
    /// People per square kilometre, when land area is known.
    pub population_density: Option<f64>,
    /// GDP per square kilometre, when land area is known.
    pub gdp_density: Option<f64>,
    /// Rates in effect when the point was produced.
    pub rates: GrowthRates,
}

impl HistoricalDataPoint {
    /// Snapshot `state` for `country_id`.
    pub fn from_state(country_id: CountryId, state: &CountryCurrentState, rates: GrowthRates) -> Self {
        Self {
            country_id,
            timestamp: state.last_calculated(),
            population: state.population(),
            gdp_per_capita: state.gdp_per_capita(),
            total_gdp: state.total_gdp(),
            economic_tier: state.economic_tier(),
            population_tier: state.population_tier(),
            population_density: state.population_density(),
            gdp_density: state.gdp_density(),
            rates,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// An input the engine skipped instead of failing the whole operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SkippedItem {
    /// Country the skipped record belongs to, when known.
    pub country_id: Option<CountryId>,
    /// DM input that was skipped, when the record is an override.
    pub dm_input_id: Option<DmInputId>,
    /// Why the record was skipped.
    pub reason: String,
}

/// Fleet-wide statistics at a single virtual timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GlobalStats {
    /// Virtual timestamp the statistics describe.
    pub timestamp: DateTime<Utc>,
    /// Number of countries included.
    pub country_count: u32,
    /// Sum of populations.
    pub total_population: f64,
    /// Sum of total GDP.
    pub total_gdp: f64,
    /// Population-weighted mean GDP per capita (0 for an empty fleet).
    pub average_gdp_per_capita: f64,
    /// Area-weighted population density over countries with land area.
    pub average_population_density: Option<f64>,
    /// Area-weighted GDP density over countries with land area.
    pub average_gdp_density: Option<f64>,
    /// Country count per economic tier.
    pub economic_tier_counts: BTreeMap<EconomicTier, u32>,
    /// Country count per population tier.
    pub population_tier_counts: BTreeMap<PopulationTier, u32>,
    /// Number of countries skipped.
    pub skipped: u32,
    /// Details for each skipped country.
    pub skipped_items: Vec<SkippedItem>,
}

// ---------------------------------------------------------------------------
// Clock status
// ---------------------------------------------------------------------------

/// Process-wide status of the virtual clock, for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ClockStatus {
    /// Current virtual time.
    pub virtual_time: DateTime<Utc>,
    /// Real time the status was sampled at.
    pub real_time: DateTime<Utc>,
    /// Virtual time elapsed per unit of real time.
    pub multiplier: f64,
    /// Whether the clock is paused.
    pub paused: bool,
    /// Whether an administrative override pins virtual time.
    pub overridden: bool,
    /// Calendar year of the current virtual time.
    pub game_year: i32,
    /// Long-form rendering of the current virtual time.
    pub formatted: String,
}
