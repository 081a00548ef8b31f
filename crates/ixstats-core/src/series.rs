//! Historical and forecast series.
//!
//! Both generators thread each output state into the next advance, so a
//! series is a replay of the same deterministic walk the live engine
//! performs. Grid instants are `start + round(k * interval * ms_per_year)`;
//! halving the interval only multiplies by powers of two, so the finer grid
//! lands on exactly the same milliseconds as the coarser one.

use chrono::{DateTime, Utc};
use ixstats_types::{CountryCurrentState, HistoricalDataPoint};
use tracing::debug;

use crate::clock::{self, MILLIS_PER_VIRTUAL_YEAR_F64};
use crate::error::GrowthError;
use crate::growth::{GrowthCalculator, GrowthInputs};

/// Produces point series from a calculator.
#[derive(Debug, Clone, Copy)]
pub struct SeriesGenerator<'a> {
    calculator: &'a GrowthCalculator,
    max_points: u32,
}

impl<'a> SeriesGenerator<'a> {
    /// A generator that refuses series longer than `max_points`.
    pub const fn new(calculator: &'a GrowthCalculator, max_points: u32) -> Self {
        Self {
            calculator,
            max_points,
        }
    }

    /// Points from `start` to `end` every `interval_years`, replayed from
    /// the baseline epoch. `end` is appended when it is not on the grid.
    ///
    /// # Errors
    ///
    /// - [`GrowthError::InvalidInput`] if the interval is not positive or
    ///   is shorter than one millisecond.
    /// - [`GrowthError::TemporalInvariantViolation`] if `start` precedes the
    ///   baseline epoch or `end` precedes `start`.
    /// - [`GrowthError::SeriesLimitExceeded`] if the grid has too many
    ///   points.
    pub fn historical_series(
        &self,
        inputs: &GrowthInputs<'_>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_years: f64,
    ) -> Result<Vec<HistoricalDataPoint>, GrowthError> {
        let step = interval_years * MILLIS_PER_VIRTUAL_YEAR_F64;
        if !step.is_finite() || step < 1.0 {
            return Err(GrowthError::invalid(format!(
                "series interval must be at least one millisecond, got {interval_years} years"
            )));
        }
        let epoch = inputs.baseline.epoch;
        if start < epoch {
            return Err(GrowthError::TemporalInvariantViolation {
                last_calculated: epoch,
                target: start,
            });
        }
        if end < start {
            return Err(GrowthError::TemporalInvariantViolation {
                last_calculated: start,
                target: end,
            });
        }

        let instants = self.grid(start, end, step)?;
        debug!(
            country = %inputs.baseline.id,
            points = instants.len(),
            %start,
            %end,
            "generating historical series"
        );

        let initial = self.calculator.initial_state(inputs.baseline)?;
        self.walk(inputs, initial, &instants)
    }

    /// `point_count` evenly spaced points after `current` up to and
    /// including `end`.
    ///
    /// # Errors
    ///
    /// - [`GrowthError::InvalidInput`] if `point_count` is zero.
    /// - [`GrowthError::TemporalInvariantViolation`] if `end` precedes the
    ///   current state's last calculation.
    /// - [`GrowthError::SeriesLimitExceeded`] if `point_count` exceeds the
    ///   configured maximum.
    pub fn forecast_series(
        &self,
        inputs: &GrowthInputs<'_>,
        current: &CountryCurrentState,
        end: DateTime<Utc>,
        point_count: u32,
    ) -> Result<Vec<HistoricalDataPoint>, GrowthError> {
        if point_count == 0 {
            return Err(GrowthError::invalid("forecast needs at least one point"));
        }
        if point_count > self.max_points {
            return Err(GrowthError::SeriesLimitExceeded {
                requested: u64::from(point_count),
                limit: self.max_points,
            });
        }
        let from = current.last_calculated();
        if end < from {
            return Err(GrowthError::TemporalInvariantViolation {
                last_calculated: from,
                target: end,
            });
        }

        let from_ms = i128::from(from.timestamp_millis());
        let span = i128::from(end.timestamp_millis()).saturating_sub(from_ms);
        let count = i128::from(point_count);
        let instants = (1..=count)
            .map(|k| {
                span.checked_mul(k)
                    .and_then(|scaled| scaled.checked_div(count))
                    .and_then(|offset| from_ms.checked_add(offset))
                    .and_then(|ms| i64::try_from(ms).ok())
                    .ok_or_else(|| GrowthError::invalid("forecast instant out of range"))
                    .and_then(|ms| clock::from_millis(ms).map_err(GrowthError::from))
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            country = %inputs.baseline.id,
            points = instants.len(),
            %end,
            "generating forecast series"
        );
        self.walk(inputs, current.clone(), &instants)
    }

    /// Advance through `instants` in order, snapshotting each state.
    fn walk(
        &self,
        inputs: &GrowthInputs<'_>,
        mut state: CountryCurrentState,
        instants: &[DateTime<Utc>],
    ) -> Result<Vec<HistoricalDataPoint>, GrowthError> {
        let mut points = Vec::with_capacity(instants.len());
        for instant in instants {
            let (next, rates) = self.calculator.advance(inputs, &state, *instant)?;
            points.push(HistoricalDataPoint::from_state(
                inputs.baseline.id,
                &next,
                rates,
            ));
            state = next;
        }
        Ok(points)
    }

    /// Grid instants in `[start, end]`, plus `end` when off-grid.
    fn grid(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: f64,
    ) -> Result<Vec<DateTime<Utc>>, GrowthError> {
        let start_ms = start.timestamp_millis();
        let span = end.timestamp_millis().saturating_sub(start_ms);
        let limit = usize::try_from(self.max_points).unwrap_or(usize::MAX);
        let mut offsets = Vec::new();
        let mut k: u32 = 0;
        loop {
            let Some(offset) = clock::f64_to_millis(f64::from(k) * step) else {
                break;
            };
            if offset > span {
                break;
            }
            offsets.push(offset);
            if offsets.len() > limit {
                return Err(self.limit_exceeded(offsets.len()));
            }
            let Some(next) = k.checked_add(1) else {
                break;
            };
            k = next;
        }
        if offsets.last() != Some(&span) {
            offsets.push(span);
            if offsets.len() > limit {
                return Err(self.limit_exceeded(offsets.len()));
            }
        }
        offsets
            .into_iter()
            .map(|offset| {
                start_ms
                    .checked_add(offset)
                    .ok_or_else(|| GrowthError::invalid("series instant out of range"))
                    .and_then(|ms| clock::from_millis(ms).map_err(GrowthError::from))
            })
            .collect()
    }

    fn limit_exceeded(&self, requested: usize) -> GrowthError {
        GrowthError::SeriesLimitExceeded {
            requested: u64::try_from(requested).unwrap_or(u64::MAX),
            limit: self.max_points,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use chrono::TimeZone;
    use ixstats_types::{CountryBaseline, CountryId, DmInput, DmInputId, OverrideKind};

    use super::*;
    use crate::clock::MILLIS_PER_VIRTUAL_YEAR;
    use crate::config::EngineConfig;
    use crate::overrides::OverrideSet;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2028, 1, 1, 0, 0, 0).single().unwrap()
    }

    fn at_years(years: f64) -> DateTime<Utc> {
        let offset = clock::years_to_millis(years).unwrap();
        DateTime::from_timestamp_millis(epoch().timestamp_millis() + offset).unwrap()
    }

    fn baseline() -> CountryBaseline {
        CountryBaseline {
            id: CountryId::new(),
            name: "Urcea".to_owned(),
            population: 10_000_000.0,
            gdp_per_capita: 9_500.0,
            max_gdp_growth_rate: 0.10,
            adjusted_gdp_growth_rate: 0.06,
            population_growth_rate: 0.01,
            land_area: None,
            epoch: epoch(),
        }
    }

    fn calculator() -> GrowthCalculator {
        GrowthCalculator::new(&EngineConfig::default()).unwrap()
    }

    #[test]
    fn grid_includes_start_and_off_grid_end() {
        let calc = calculator();
        let base = baseline();
        let overrides = OverrideSet::empty();
        let inputs = GrowthInputs::new(&base, &overrides);
        let series = SeriesGenerator::new(&calc, 100);
        let points = series
            .historical_series(&inputs, epoch(), at_years(2.5), 1.0)
            .unwrap();
        let stamps: Vec<DateTime<Utc>> = points.iter().map(|p| p.timestamp).collect();
        assert_eq!(
            stamps,
            vec![epoch(), at_years(1.0), at_years(2.0), at_years(2.5)]
        );
    }

    #[test]
    fn halved_interval_agrees_at_shared_instants() {
        let calc = calculator();
        let base = baseline();
        let records = vec![DmInput {
            id: DmInputId::new(),
            country_id: None,
            kind: OverrideKind::EconomicPolicy,
            value: 0.02,
            duration_years: Some(1.3),
            activation_time: at_years(0.7),
            created_at: epoch(),
            is_active: true,
            description: None,
        }];
        let overrides = OverrideSet::for_country(base.id, &records);
        let inputs = GrowthInputs::new(&base, &overrides);
        let series = SeriesGenerator::new(&calc, 1_000);

        let coarse = series
            .historical_series(&inputs, epoch(), at_years(6.0), 0.5)
            .unwrap();
        let fine = series
            .historical_series(&inputs, epoch(), at_years(6.0), 0.25)
            .unwrap();
        assert_eq!(fine.len(), coarse.len() * 2 - 1);
        for point in &coarse {
            let twin = fine.iter().find(|p| p.timestamp == point.timestamp).unwrap();
            assert_eq!(twin, point);
        }
    }

    #[test]
    fn start_before_epoch_is_rejected() {
        let calc = calculator();
        let base = baseline();
        let overrides = OverrideSet::empty();
        let inputs = GrowthInputs::new(&base, &overrides);
        let series = SeriesGenerator::new(&calc, 100);
        let before = epoch() - chrono::Duration::days(1);
        assert!(matches!(
            series.historical_series(&inputs, before, at_years(1.0), 1.0),
            Err(GrowthError::TemporalInvariantViolation { .. })
        ));
        assert!(matches!(
            series.historical_series(&inputs, at_years(2.0), at_years(1.0), 1.0),
            Err(GrowthError::TemporalInvariantViolation { .. })
        ));
    }

    #[test]
    fn bad_interval_is_rejected() {
        let calc = calculator();
        let base = baseline();
        let overrides = OverrideSet::empty();
        let inputs = GrowthInputs::new(&base, &overrides);
        let series = SeriesGenerator::new(&calc, 100);
        for interval in [0.0, -1.0, f64::NAN, 1.0e-12] {
            assert!(matches!(
                series.historical_series(&inputs, epoch(), at_years(1.0), interval),
                Err(GrowthError::InvalidInput { .. })
            ));
        }
    }

    #[test]
    fn point_limit_is_enforced() {
        let calc = calculator();
        let base = baseline();
        let overrides = OverrideSet::empty();
        let inputs = GrowthInputs::new(&base, &overrides);
        let series = SeriesGenerator::new(&calc, 5);
        assert!(matches!(
            series.historical_series(&inputs, epoch(), at_years(10.0), 1.0),
            Err(GrowthError::SeriesLimitExceeded { limit: 5, .. })
        ));
        let current = calc.initial_state(&base).unwrap();
        assert!(matches!(
            series.forecast_series(&inputs, &current, at_years(10.0), 6),
            Err(GrowthError::SeriesLimitExceeded { requested: 6, .. })
        ));
    }

    #[test]
    fn forecast_is_evenly_spaced_and_matches_history() {
        let calc = calculator();
        let base = baseline();
        let overrides = OverrideSet::empty();
        let inputs = GrowthInputs::new(&base, &overrides);
        let series = SeriesGenerator::new(&calc, 100);
        let current = calc.initial_state(&base).unwrap();

        let forecast = series
            .forecast_series(&inputs, &current, at_years(4.0), 4)
            .unwrap();
        let stamps: Vec<i64> = forecast.iter().map(|p| p.timestamp.timestamp_millis()).collect();
        let origin = epoch().timestamp_millis();
        assert_eq!(
            stamps,
            (1..=4).map(|k| origin + k * MILLIS_PER_VIRTUAL_YEAR).collect::<Vec<_>>()
        );

        let history = series
            .historical_series(&inputs, epoch(), at_years(4.0), 1.0)
            .unwrap();
        assert_eq!(history.last(), forecast.last());
    }

    #[test]
    fn forecast_rejects_past_end_and_zero_points() {
        let calc = calculator();
        let base = baseline();
        let overrides = OverrideSet::empty();
        let inputs = GrowthInputs::new(&base, &overrides);
        let series = SeriesGenerator::new(&calc, 100);
        let current = calc.initial_state(&base).unwrap();
        let (later, _) = calc.advance(&inputs, &current, at_years(2.0)).unwrap();
        assert!(matches!(
            series.forecast_series(&inputs, &later, at_years(1.0), 3),
            Err(GrowthError::TemporalInvariantViolation { .. })
        ));
        assert!(series.forecast_series(&inputs, &later, at_years(3.0), 0).is_err());
    }
}
