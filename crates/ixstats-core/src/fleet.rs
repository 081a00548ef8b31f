//! Fleet-wide aggregation.
//!
//! Per-country states are computed in parallel on the `rayon` pool; the
//! reduction into [`GlobalStats`] runs on the calling thread in input order
//! so sums are reproducible.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ixstats_types::{
    CountryBaseline, CountryCurrentState, DmInput, EconomicTier, GlobalStats, PopulationTier,
    SkippedItem,
};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::GrowthError;
use crate::growth::{GrowthCalculator, GrowthInputs};
use crate::overrides::{self, OverrideSet};
use crate::rates;

/// A country as the aggregator sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryRecord {
    /// Immutable baseline.
    pub baseline: CountryBaseline,
    /// Stored state, if the country has been calculated before.
    pub state: Option<CountryCurrentState>,
}

impl CountryRecord {
    /// A record with no stored state.
    pub const fn new(baseline: CountryBaseline) -> Self {
        Self {
            baseline,
            state: None,
        }
    }
}

/// Computes [`GlobalStats`] across a set of countries.
#[derive(Debug, Clone, Copy)]
pub struct FleetAggregator<'a> {
    calculator: &'a GrowthCalculator,
    max_countries: u32,
}

impl<'a> FleetAggregator<'a> {
    /// An aggregator that refuses fleets larger than `max_countries`.
    pub const fn new(calculator: &'a GrowthCalculator, max_countries: u32) -> Self {
        Self {
            calculator,
            max_countries,
        }
    }

    /// Aggregate every country at `target`.
    ///
    /// A stored state already calculated at `now` is used as is when
    /// `target == now`, provided its tiers agree with the calculator's
    /// tables. Countries that fail to compute are counted in
    /// `skipped` and described in `skipped_items`, together with any
    /// malformed overrides.
    ///
    /// # Errors
    ///
    /// Returns [`GrowthError::FleetLimitExceeded`] for oversized fleets and
    /// [`GrowthError::InvalidInput`] for an invalid global factor.
    pub fn aggregate_at(
        &self,
        countries: &[CountryRecord],
        dm_inputs: &[DmInput],
        global_growth_factor: f64,
        target: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<GlobalStats, GrowthError> {
        if countries.len() > usize::try_from(self.max_countries).unwrap_or(usize::MAX) {
            return Err(GrowthError::FleetLimitExceeded {
                requested: countries.len(),
                limit: self.max_countries,
            });
        }
        rates::validate_global_factor(global_growth_factor)?;

        let (valid_inputs, skipped_inputs) = overrides::validate_overrides(dm_inputs);
        for item in &skipped_inputs {
            warn!(override_id = ?item.dm_input_id, reason = %item.reason, "skipping override");
        }

        let outcomes: Vec<Result<(CountryCurrentState, Option<f64>), SkippedItem>> = countries
            .par_iter()
            .map(|record| {
                self.state_at(record, &valid_inputs, global_growth_factor, target, now)
                    .map(|state| (state, record.baseline.land_area))
                    .map_err(|err| SkippedItem {
                        country_id: Some(record.baseline.id),
                        dm_input_id: None,
                        reason: err.to_string(),
                    })
            })
            .collect();

        let mut totals = Totals::default();
        let mut skipped_items = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok((state, land_area)) => totals.add(&state, land_area),
                Err(item) => {
                    warn!(country = ?item.country_id, reason = %item.reason, "skipping country");
                    skipped_items.push(item);
                }
            }
        }
        let skipped = u32::try_from(skipped_items.len()).unwrap_or(u32::MAX);
        skipped_items.extend(skipped_inputs);

        let stats = totals.finish(target, skipped, skipped_items);
        debug!(
            %target,
            countries = stats.country_count,
            skipped = stats.skipped,
            total_population = stats.total_population,
            "aggregated fleet"
        );
        Ok(stats)
    }

    fn state_at(
        &self,
        record: &CountryRecord,
        dm_inputs: &[DmInput],
        global_growth_factor: f64,
        target: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<CountryCurrentState, GrowthError> {
        let baseline = &record.baseline;
        if target < baseline.epoch {
            return Err(GrowthError::TemporalInvariantViolation {
                last_calculated: baseline.epoch,
                target,
            });
        }
        let start = match &record.state {
            Some(state) if target == now && state.last_calculated() == now => {
                self.calculator.verify_state(state)?;
                return Ok(state.clone());
            }
            Some(state) if state.last_calculated() <= target => state.clone(),
            _ => self.calculator.initial_state(baseline)?,
        };
        let set = OverrideSet::for_country(baseline.id, dm_inputs);
        let inputs = GrowthInputs::new(baseline, &set).with_global_factor(global_growth_factor);
        Ok(self.calculator.advance(&inputs, &start, target)?.0)
    }
}

/// Running sums for the reduction.
#[derive(Debug)]
struct Totals {
    country_count: u32,
    population: f64,
    gdp: f64,
    area: f64,
    area_population: f64,
    area_gdp: f64,
    economic: BTreeMap<EconomicTier, u32>,
    population_tiers: BTreeMap<PopulationTier, u32>,
}

impl Default for Totals {
    fn default() -> Self {
        Self {
            country_count: 0,
            population: 0.0,
            gdp: 0.0,
            area: 0.0,
            area_population: 0.0,
            area_gdp: 0.0,
            economic: EconomicTier::ALL.iter().map(|t| (*t, 0)).collect(),
            population_tiers: PopulationTier::ALL.iter().map(|t| (*t, 0)).collect(),
        }
    }
}

impl Totals {
    fn add(&mut self, state: &CountryCurrentState, land_area: Option<f64>) {
        self.country_count = self.country_count.saturating_add(1);
        self.population += state.population();
        self.gdp += state.total_gdp();
        if let Some(area) = land_area.filter(|a| a.is_finite() && *a > 0.0) {
            self.area += area;
            self.area_population += state.population();
            self.area_gdp += state.total_gdp();
        }
        if let Some(count) = self.economic.get_mut(&state.economic_tier()) {
            *count = count.saturating_add(1);
        }
        if let Some(count) = self.population_tiers.get_mut(&state.population_tier()) {
            *count = count.saturating_add(1);
        }
    }

    fn finish(self, timestamp: DateTime<Utc>, skipped: u32, skipped_items: Vec<SkippedItem>) -> GlobalStats {
        let has_area = self.area > 0.0 && self.area.is_finite();
        GlobalStats {
            timestamp,
            country_count: self.country_count,
            total_population: self.population,
            total_gdp: self.gdp,
            average_gdp_per_capita: if self.population > 0.0 {
                self.gdp / self.population
            } else {
                0.0
            },
            average_population_density: has_area.then(|| self.area_population / self.area),
            average_gdp_density: has_area.then(|| self.area_gdp / self.area),
            economic_tier_counts: self.economic,
            population_tier_counts: self.population_tiers,
            skipped,
            skipped_items,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use ixstats_types::{CountryId, DmInputId, OverrideKind};

    use super::*;
    use crate::config::EngineConfig;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2028, 1, 1, 0, 0, 0).single().unwrap()
    }

    fn baseline(population: f64, gdp_per_capita: f64, land_area: Option<f64>) -> CountryBaseline {
        CountryBaseline {
            id: CountryId::new(),
            name: "Kiravia".to_owned(),
            population,
            gdp_per_capita,
            max_gdp_growth_rate: 0.05,
            adjusted_gdp_growth_rate: 0.03,
            population_growth_rate: 0.01,
            land_area,
            epoch: epoch(),
        }
    }

    fn calculator() -> GrowthCalculator {
        GrowthCalculator::new(&EngineConfig::default()).unwrap()
    }

    #[test]
    fn empty_fleet_is_all_zero() {
        let calc = calculator();
        let fleet = FleetAggregator::new(&calc, 10);
        let stats = fleet.aggregate_at(&[], &[], 1.0, epoch(), epoch()).unwrap();
        assert_eq!(stats.country_count, 0);
        assert!(stats.total_population.abs() < f64::EPSILON);
        assert!(stats.total_gdp.abs() < f64::EPSILON);
        assert!(stats.average_gdp_per_capita.abs() < f64::EPSILON);
        assert_eq!(stats.average_population_density, None);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.economic_tier_counts.len(), EconomicTier::ALL.len());
        assert!(stats.economic_tier_counts.values().all(|c| *c == 0));
        assert!(stats.population_tier_counts.values().all(|c| *c == 0));
    }

    #[test]
    fn totals_and_weighted_averages() {
        let calc = calculator();
        let fleet = FleetAggregator::new(&calc, 10);
        let countries = vec![
            CountryRecord::new(baseline(1_000_000.0, 10_000.0, Some(1_000.0))),
            CountryRecord::new(baseline(3_000_000.0, 30_000.0, Some(3_000.0))),
            CountryRecord::new(baseline(2_000_000.0, 50_000.0, None)),
        ];
        let stats = fleet.aggregate_at(&countries, &[], 1.0, epoch(), epoch()).unwrap();
        assert_eq!(stats.country_count, 3);
        assert!((stats.total_population - 6_000_000.0).abs() < 1e-6);
        assert!((stats.total_gdp - 2.0e11).abs() < 1.0);
        assert!((stats.average_gdp_per_capita - 2.0e11 / 6.0e6).abs() < 1e-6);
        // Area-weighted over the two countries with land area.
        assert!((stats.average_population_density.unwrap() - 1_000.0).abs() < 1e-9);
        assert!((stats.average_gdp_density.unwrap() - 1.0e11 / 4_000.0).abs() < 1e-3);
        assert_eq!(stats.economic_tier_counts.get(&EconomicTier::Developing), Some(&1));
        assert_eq!(stats.economic_tier_counts.get(&EconomicTier::Developed), Some(&1));
        assert_eq!(stats.economic_tier_counts.get(&EconomicTier::Extravagant), Some(&0));
        assert_eq!(stats.economic_tier_counts.get(&EconomicTier::Strong), Some(&1));
        assert_eq!(stats.population_tier_counts.get(&PopulationTier::Tier1), Some(&3));
    }

    #[test]
    fn invalid_country_is_skipped() {
        let calc = calculator();
        let fleet = FleetAggregator::new(&calc, 10);
        let bad = baseline(f64::NAN, 10_000.0, None);
        let bad_id = bad.id;
        let countries = vec![
            CountryRecord::new(baseline(1_000_000.0, 10_000.0, None)),
            CountryRecord::new(bad),
        ];
        let stats = fleet.aggregate_at(&countries, &[], 1.0, epoch(), epoch()).unwrap();
        assert_eq!(stats.country_count, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.skipped_items.first().and_then(|s| s.country_id), Some(bad_id));
    }

    #[test]
    fn malformed_override_is_reported_not_counted() {
        let calc = calculator();
        let fleet = FleetAggregator::new(&calc, 10);
        let countries = vec![CountryRecord::new(baseline(1_000_000.0, 10_000.0, None))];
        let bad = DmInput {
            id: DmInputId::new(),
            country_id: None,
            kind: OverrideKind::SpecialEvent,
            value: f64::NAN,
            duration_years: None,
            activation_time: epoch(),
            created_at: epoch(),
            is_active: true,
            description: None,
        };
        let stats = fleet
            .aggregate_at(&countries, std::slice::from_ref(&bad), 1.0, epoch(), epoch())
            .unwrap();
        assert_eq!(stats.country_count, 1);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.skipped_items.len(), 1);
        assert_eq!(stats.skipped_items.first().and_then(|s| s.dm_input_id), Some(bad.id));
    }

    #[test]
    fn stored_state_at_now_is_reused() {
        let calc = calculator();
        let fleet = FleetAggregator::new(&calc, 10);
        let base = baseline(1_000_000.0, 10_000.0, None);
        let later = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).single().unwrap();
        let set = OverrideSet::empty();
        let inputs = GrowthInputs::new(&base, &set);
        let initial = calc.initial_state(&base).unwrap();
        let (stored, _) = calc.advance(&inputs, &initial, later).unwrap();

        let record = CountryRecord {
            baseline: base,
            state: Some(stored.clone()),
        };
        // A different global factor would change a recomputation.
        let stats = fleet.aggregate_at(&[record], &[], 2.0, later, later).unwrap();
        assert!((stats.total_population - stored.population()).abs() < f64::EPSILON);
        assert!((stats.total_gdp - stored.total_gdp()).abs() < f64::EPSILON);
    }

    #[test]
    fn stored_state_with_foreign_tiers_is_skipped() {
        let calc = calculator();
        let fleet = FleetAggregator::new(&calc, 10);
        let base = baseline(1_000_000.0, 10_000.0, None);
        let initial = calc.initial_state(&base).unwrap();
        let forged = CountryCurrentState::derive(
            initial.population(),
            initial.gdp_per_capita(),
            EconomicTier::Extravagant,
            PopulationTier::TierX,
            None,
            initial.last_calculated(),
            initial.anchor(),
        );
        let record = CountryRecord {
            baseline: base,
            state: Some(forged),
        };
        let stats = fleet.aggregate_at(&[record], &[], 1.0, epoch(), epoch()).unwrap();
        assert_eq!(stats.country_count, 0);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.economic_tier_counts.get(&EconomicTier::Extravagant), Some(&0));
    }

    #[test]
    fn past_target_recomputes_from_baseline() {
        let calc = calculator();
        let fleet = FleetAggregator::new(&calc, 10);
        let base = baseline(1_000_000.0, 10_000.0, None);
        let later = Utc.with_ymd_and_hms(2040, 1, 1, 0, 0, 0).single().unwrap();
        let set = OverrideSet::empty();
        let inputs = GrowthInputs::new(&base, &set);
        let initial = calc.initial_state(&base).unwrap();
        let (stored, _) = calc.advance(&inputs, &initial, later).unwrap();

        let record = CountryRecord {
            baseline: base,
            state: Some(stored),
        };
        let stats = fleet.aggregate_at(&[record], &[], 1.0, epoch(), later).unwrap();
        assert!((stats.total_population - 1_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn fleet_limit_is_enforced() {
        let calc = calculator();
        let fleet = FleetAggregator::new(&calc, 1);
        let countries = vec![
            CountryRecord::new(baseline(1.0e6, 1.0e4, None)),
            CountryRecord::new(baseline(1.0e6, 1.0e4, None)),
        ];
        assert!(matches!(
            fleet.aggregate_at(&countries, &[], 1.0, epoch(), epoch()),
            Err(GrowthError::FleetLimitExceeded { requested: 2, limit: 1 })
        ));
    }
}
