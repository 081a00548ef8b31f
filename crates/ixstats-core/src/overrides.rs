//! DM input (override) selection and application.
//!
//! Each [`DmInput`] has a window `[activation, activation + duration)`, or is
//! permanent from activation when it has no duration. Its kind maps to a
//! typed [`OverrideEffect`] through an exhaustive match:
//!
//! - value deltas (population, GDP per capita) are spread across the window
//!   in proportion to the fraction of the window that has elapsed, and
//!   apply in full just after activation when the override is permanent.
//!   They shift the level of a trajectory and never compound;
//! - rate deltas add to the configured rate for as long as the override is
//!   active, before the resolver clamps it.
//!
//! Rate deltas are summed in creation order (insertion order breaks ties).
//! Floating-point summation is not associative, so this order is part of
//! the reproducibility contract for historical replays.

use chrono::{DateTime, Utc};
use ixstats_types::{CountryId, DmInput, DmInputId, OverrideKind, SkippedItem};
use tracing::warn;

use crate::clock::{self, MILLIS_PER_VIRTUAL_YEAR_F64};

/// Why an override record was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OverrideError {
    /// The value is NaN or infinite.
    #[error("override {id} has a non-finite value")]
    NonFiniteValue {
        /// The rejected override.
        id: DmInputId,
    },

    /// The duration is not a positive, finite number of years.
    #[error("override {id} has invalid duration {duration}")]
    InvalidDuration {
        /// The rejected override.
        id: DmInputId,
        /// The rejected duration.
        duration: f64,
    },

    /// The window end cannot be represented as a timestamp.
    #[error("override {id} window ends outside the representable range")]
    WindowOutOfRange {
        /// The rejected override.
        id: DmInputId,
    },
}

impl OverrideError {
    /// The override the error refers to.
    pub const fn id(&self) -> DmInputId {
        match self {
            Self::NonFiniteValue { id }
            | Self::InvalidDuration { id, .. }
            | Self::WindowOutOfRange { id } => *id,
        }
    }
}

/// What an override does, independent of when it is active.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OverrideEffect {
    /// Added to the configured population growth rate while active.
    pub population_rate_delta: f64,
    /// Added to the configured GDP growth rate while active.
    pub gdp_rate_delta: f64,
    /// Total change in population across the window.
    pub population_delta: f64,
    /// Total change in GDP per capita across the window.
    pub gdp_per_capita_delta: f64,
}

/// Typed effect of an override kind with the given value.
pub const fn effect_of(kind: OverrideKind, value: f64) -> OverrideEffect {
    let none = OverrideEffect {
        population_rate_delta: 0.0,
        gdp_rate_delta: 0.0,
        population_delta: 0.0,
        gdp_per_capita_delta: 0.0,
    };
    match kind {
        OverrideKind::PopulationAdjustment => OverrideEffect {
            population_delta: value,
            ..none
        },
        OverrideKind::GdpAdjustment => OverrideEffect {
            gdp_per_capita_delta: value,
            ..none
        },
        OverrideKind::GrowthRateModifier
        | OverrideKind::SpecialEvent
        | OverrideKind::TradeAgreement
        | OverrideKind::EconomicPolicy => OverrideEffect {
            gdp_rate_delta: value,
            ..none
        },
        OverrideKind::NaturalDisaster => OverrideEffect {
            population_rate_delta: value,
            gdp_rate_delta: value,
            ..none
        },
    }
}

/// A validated override with its window resolved to milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreparedOverride {
    /// Source record identifier.
    pub id: DmInputId,
    /// Source record kind.
    pub kind: OverrideKind,
    /// When the source record was created.
    pub created_at: DateTime<Utc>,
    /// Window start (inclusive), in milliseconds.
    pub start_ms: i64,
    /// Window end (exclusive), in milliseconds; `None` when permanent.
    pub end_ms: Option<i64>,
    /// What the override does.
    pub effect: OverrideEffect,
}

impl PreparedOverride {
    /// Validate a record and resolve its window.
    ///
    /// # Errors
    ///
    /// Returns an [`OverrideError`] for a non-finite value, a duration that
    /// is not positive and finite (or rounds to zero milliseconds), or a
    /// window end outside the timestamp range.
    pub fn prepare(input: &DmInput) -> Result<Self, OverrideError> {
        if !input.value.is_finite() {
            return Err(OverrideError::NonFiniteValue { id: input.id });
        }
        let start_ms = input.activation_time.timestamp_millis();
        let end_ms = match input.duration_years {
            None => None,
            Some(duration) => {
                if !duration.is_finite() || duration <= 0.0 {
                    return Err(OverrideError::InvalidDuration {
                        id: input.id,
                        duration,
                    });
                }
                let span = clock::years_to_millis(duration)
                    .filter(|ms| *ms > 0)
                    .ok_or(OverrideError::InvalidDuration {
                        id: input.id,
                        duration,
                    })?;
                let end = start_ms
                    .checked_add(span)
                    .ok_or(OverrideError::WindowOutOfRange { id: input.id })?;
                clock::from_millis(end)
                    .map_err(|_err| OverrideError::WindowOutOfRange { id: input.id })?;
                Some(end)
            }
        };
        Ok(Self {
            id: input.id,
            kind: input.kind,
            created_at: input.created_at,
            start_ms,
            end_ms,
            effect: effect_of(input.kind, input.value),
        })
    }

    /// Whether the window contains the instant `at_ms`.
    pub fn is_active_at(&self, at_ms: i64) -> bool {
        at_ms >= self.start_ms && self.end_ms.is_none_or(|end| at_ms < end)
    }

    /// Fraction of the window elapsed at `at_ms`, in `[0, 1]`.
    ///
    /// Permanent overrides jump from 0 to 1 immediately after activation,
    /// so a delta activated exactly at a baseline epoch still applies.
    pub fn fraction_elapsed(&self, at_ms: i64) -> f64 {
        if at_ms <= self.start_ms {
            return 0.0;
        }
        match self.end_ms {
            None => 1.0,
            Some(end) if at_ms >= end => 1.0,
            Some(end) => {
                let done = clock::years_between_millis(self.start_ms, at_ms);
                let total = clock::years_between_millis(self.start_ms, end);
                (done / total).clamp(0.0, 1.0)
            }
        }
    }

    /// Window length in virtual years; `None` when permanent.
    pub fn duration_years(&self) -> Option<f64> {
        self.end_ms
            .map(|end| clock::years_between_millis(self.start_ms, end))
    }
}

/// Base inputs to a compounding step before overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BaseInputs {
    /// Configured population growth rate.
    pub population_rate: f64,
    /// Configured GDP growth rate.
    pub gdp_rate: f64,
}

/// Inputs after overrides, ready for the resolver and compounding.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AdjustedInputs {
    /// Population growth rate before clamping.
    pub population_rate: f64,
    /// GDP growth rate before clamping.
    pub gdp_rate: f64,
    /// Population level shift, added after compounding.
    pub population_delta: f64,
    /// GDP-per-capita level shift, added after compounding.
    pub gdp_per_capita_delta: f64,
}

/// Apply overrides to base inputs over the window `(from_ms, to_ms]`.
///
/// Rate deltas come from overrides active at `from_ms`. Value deltas are
/// the portion of each override's total delta that elapses between
/// `from_ms` and `to_ms`.
pub fn apply_overrides(
    base: BaseInputs,
    overrides: &[PreparedOverride],
    from_ms: i64,
    to_ms: i64,
) -> AdjustedInputs {
    let mut adjusted = AdjustedInputs {
        population_rate: base.population_rate,
        gdp_rate: base.gdp_rate,
        population_delta: 0.0,
        gdp_per_capita_delta: 0.0,
    };
    for entry in overrides {
        if entry.is_active_at(from_ms) {
            adjusted.population_rate += entry.effect.population_rate_delta;
            adjusted.gdp_rate += entry.effect.gdp_rate_delta;
        }
        let share = entry.fraction_elapsed(to_ms) - entry.fraction_elapsed(from_ms);
        if share > 0.0 {
            adjusted.population_delta += entry.effect.population_delta * share;
            adjusted.gdp_per_capita_delta += entry.effect.gdp_per_capita_delta * share;
        }
    }
    adjusted
}

/// The validated overrides that apply to one country, in composition order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideSet {
    entries: Vec<PreparedOverride>,
    skipped: Vec<SkippedItem>,
}

impl OverrideSet {
    /// An empty set.
    pub const fn empty() -> Self {
        Self {
            entries: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Select and validate the active-flag overrides targeting `country`
    /// (including global ones), ordered by creation time.
    ///
    /// Malformed records are skipped and reported through
    /// [`Self::skipped`].
    pub fn for_country(country: CountryId, inputs: &[DmInput]) -> Self {
        let mut entries = Vec::new();
        let mut skipped = Vec::new();
        for input in inputs.iter().filter(|i| i.is_active && i.targets(country)) {
            match PreparedOverride::prepare(input) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    warn!(country = %country, override_id = %err.id(), error = %err, "skipping override");
                    skipped.push(SkippedItem {
                        country_id: Some(country),
                        dm_input_id: Some(err.id()),
                        reason: err.to_string(),
                    });
                }
            }
        }
        // Stable sort keeps insertion order among equal creation times.
        entries.sort_by_key(|e| e.created_at);
        Self { entries, skipped }
    }

    /// Validated overrides in composition order.
    pub fn entries(&self) -> &[PreparedOverride] {
        &self.entries
    }

    /// Records that failed validation.
    pub fn skipped(&self) -> &[SkippedItem] {
        &self.skipped
    }

    /// Whether no override applies.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overrides whose window contains `at_ms`, in composition order.
    pub fn active_at(&self, at_ms: i64) -> impl Iterator<Item = &PreparedOverride> {
        self.entries.iter().filter(move |e| e.is_active_at(at_ms))
    }

    /// Earliest window boundary strictly after `after_ms`.
    pub fn next_boundary_after(&self, after_ms: i64) -> Option<i64> {
        self.entries
            .iter()
            .flat_map(|e| [Some(e.start_ms), e.end_ms])
            .flatten()
            .filter(|b| *b > after_ms)
            .min()
    }

    /// Whether any window boundary lies in `(from_ms, to_ms]`.
    pub fn has_boundary_in(&self, from_ms: i64, to_ms: i64) -> bool {
        self.next_boundary_after(from_ms).is_some_and(|b| b <= to_ms)
    }

    /// Apply this set to `base` over `(from_ms, to_ms]`.
    pub fn apply(&self, base: BaseInputs, from_ms: i64, to_ms: i64) -> AdjustedInputs {
        apply_overrides(base, &self.entries, from_ms, to_ms)
    }
}

/// Active, valid overrides for `country` whose window contains `target`,
/// in creation order.
pub fn active_overrides_at(
    country: CountryId,
    target: DateTime<Utc>,
    inputs: &[DmInput],
) -> Vec<&DmInput> {
    let at_ms = target.timestamp_millis();
    let mut active: Vec<&DmInput> = inputs
        .iter()
        .filter(|i| i.is_active && i.targets(country))
        .filter(|i| PreparedOverride::prepare(i).is_ok_and(|p| p.is_active_at(at_ms)))
        .collect();
    active.sort_by_key(|i| i.created_at);
    active
}

/// Whether an override's window closed before `target`.
pub fn is_expired(input: &DmInput, target: DateTime<Utc>) -> bool {
    input.duration_years.is_some_and(|years| {
        clock::years_to_millis(years)
            .and_then(|span| input.activation_time.timestamp_millis().checked_add(span))
            .is_some_and(|end| end < target.timestamp_millis())
    })
}

/// Split records into those that validate and skipped-item reports.
pub fn validate_overrides(inputs: &[DmInput]) -> (Vec<DmInput>, Vec<SkippedItem>) {
    let mut valid = Vec::new();
    let mut skipped = Vec::new();
    for input in inputs {
        match PreparedOverride::prepare(input) {
            Ok(_) => valid.push(input.clone()),
            Err(err) => skipped.push(SkippedItem {
                country_id: input.country_id,
                dm_input_id: Some(input.id),
                reason: err.to_string(),
            }),
        }
    }
    (valid, skipped)
}

/// Milliseconds in `fraction` of a virtual year, for tests and callers that
/// build windows by hand.
pub fn fraction_of_year_millis(fraction: f64) -> Option<i64> {
    clock::f64_to_millis(fraction * MILLIS_PER_VIRTUAL_YEAR_F64)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn utc(y: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).single().unwrap()
    }

    fn input(kind: OverrideKind, value: f64, duration: Option<f64>, year: i32) -> DmInput {
        DmInput {
            id: DmInputId::new(),
            country_id: None,
            kind,
            value,
            duration_years: duration,
            activation_time: utc(year),
            created_at: utc(year),
            is_active: true,
            description: None,
        }
    }

    fn base() -> BaseInputs {
        BaseInputs {
            population_rate: 0.01,
            gdp_rate: 0.03,
        }
    }

    #[test]
    fn every_kind_has_an_effect() {
        let kinds = [
            OverrideKind::PopulationAdjustment,
            OverrideKind::GdpAdjustment,
            OverrideKind::GrowthRateModifier,
            OverrideKind::SpecialEvent,
            OverrideKind::TradeAgreement,
            OverrideKind::NaturalDisaster,
            OverrideKind::EconomicPolicy,
        ];
        for kind in kinds {
            assert_ne!(effect_of(kind, 1.0), OverrideEffect::default(), "{kind}");
        }
        let disaster = effect_of(OverrideKind::NaturalDisaster, -0.02);
        assert!((disaster.population_rate_delta + 0.02).abs() < f64::EPSILON);
        assert!((disaster.gdp_rate_delta + 0.02).abs() < f64::EPSILON);
    }

    #[test]
    fn window_is_half_open() {
        let record = input(OverrideKind::TradeAgreement, 0.01, Some(1.0), 2030);
        let prepared = PreparedOverride::prepare(&record).unwrap();
        let end = prepared.end_ms.unwrap();
        assert!(prepared.is_active_at(prepared.start_ms));
        assert!(prepared.is_active_at(end - 1));
        assert!(!prepared.is_active_at(end));
        assert!(!prepared.is_active_at(prepared.start_ms - 1));
    }

    #[test]
    fn permanent_override_never_expires() {
        let record = input(OverrideKind::EconomicPolicy, 0.01, None, 2030);
        let prepared = PreparedOverride::prepare(&record).unwrap();
        assert!(prepared.is_active_at(utc(2500).timestamp_millis()));
        assert!(!is_expired(&record, utc(2500)));
    }

    #[test]
    fn expiry_uses_window_end() {
        let record = input(OverrideKind::SpecialEvent, 0.01, Some(1.0), 2030);
        assert!(!is_expired(&record, utc(2030)));
        assert!(is_expired(&record, utc(2032)));
    }

    #[test]
    fn invalid_records_are_rejected() {
        let nan = input(OverrideKind::GdpAdjustment, f64::NAN, None, 2030);
        assert!(matches!(
            PreparedOverride::prepare(&nan),
            Err(OverrideError::NonFiniteValue { .. })
        ));
        let zero = input(OverrideKind::GdpAdjustment, 1.0, Some(0.0), 2030);
        assert!(matches!(
            PreparedOverride::prepare(&zero),
            Err(OverrideError::InvalidDuration { .. })
        ));
        let negative = input(OverrideKind::GdpAdjustment, 1.0, Some(-2.0), 2030);
        assert!(PreparedOverride::prepare(&negative).is_err());
    }

    #[test]
    fn fraction_elapsed_ramps_linearly() {
        let record = input(OverrideKind::PopulationAdjustment, 1_000.0, Some(2.0), 2030);
        let prepared = PreparedOverride::prepare(&record).unwrap();
        let half = prepared.start_ms + fraction_of_year_millis(1.0).unwrap();
        assert!(prepared.fraction_elapsed(prepared.start_ms).abs() < f64::EPSILON);
        assert!((prepared.fraction_elapsed(half) - 0.5).abs() < 1e-12);
        assert!((prepared.fraction_elapsed(prepared.end_ms.unwrap()) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rate_deltas_sum_into_base() {
        let records = vec![
            input(OverrideKind::GrowthRateModifier, 0.01, None, 2030),
            input(OverrideKind::TradeAgreement, 0.005, None, 2030),
            input(OverrideKind::NaturalDisaster, -0.002, None, 2030),
        ];
        let set = OverrideSet::for_country(CountryId::new(), &records);
        let at = utc(2031).timestamp_millis();
        let adjusted = set.apply(base(), at, at + 1);
        assert!((adjusted.gdp_rate - (0.03 + 0.01 + 0.005 - 0.002)).abs() < 1e-15);
        assert!((adjusted.population_rate - (0.01 - 0.002)).abs() < 1e-15);
    }

    #[test]
    fn value_delta_scales_with_window_share() {
        let record = input(OverrideKind::PopulationAdjustment, 1_000.0, Some(2.0), 2030);
        let set = OverrideSet::for_country(CountryId::new(), &[record]);
        let start = utc(2030).timestamp_millis();
        let one_year = start + fraction_of_year_millis(1.0).unwrap();
        let first = set.apply(base(), start, one_year);
        assert!((first.population_delta - 500.0).abs() < 1e-6);
        let whole = set.apply(base(), start - 1, utc(2040).timestamp_millis());
        assert!((whole.population_delta - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn permanent_value_delta_applies_at_activation() {
        let record = input(OverrideKind::PopulationAdjustment, 500_000.0, None, 2030);
        let set = OverrideSet::for_country(CountryId::new(), &[record]);
        let activation = utc(2030).timestamp_millis();
        let before = set.apply(base(), activation - 10, activation);
        assert!(before.population_delta.abs() < f64::EPSILON);
        let across = set.apply(base(), activation, activation + 1);
        assert!((across.population_delta - 500_000.0).abs() < f64::EPSILON);
        let after = set.apply(base(), activation + 1, activation + 10);
        assert!(after.population_delta.abs() < f64::EPSILON);
    }

    #[test]
    fn set_filters_targets_inactive_and_orders_by_creation() {
        let country = CountryId::new();
        let mut late = input(OverrideKind::TradeAgreement, 0.01, None, 2030);
        late.created_at = utc(2035);
        late.country_id = Some(country);
        let early = input(OverrideKind::SpecialEvent, 0.02, None, 2030);
        let mut inactive = input(OverrideKind::EconomicPolicy, 0.03, None, 2030);
        inactive.is_active = false;
        let mut other = input(OverrideKind::EconomicPolicy, 0.04, None, 2030);
        other.country_id = Some(CountryId::new());

        let set = OverrideSet::for_country(country, &[late.clone(), early.clone(), inactive, other]);
        let ids: Vec<DmInputId> = set.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);
    }

    #[test]
    fn equal_creation_times_keep_insertion_order() {
        let a = input(OverrideKind::GrowthRateModifier, 0.01, None, 2030);
        let b = input(OverrideKind::GrowthRateModifier, 0.02, None, 2030);
        let set = OverrideSet::for_country(CountryId::new(), &[b.clone(), a.clone()]);
        let ids: Vec<DmInputId> = set.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[test]
    fn malformed_records_are_reported() {
        let bad = input(OverrideKind::GdpAdjustment, f64::INFINITY, None, 2030);
        let good = input(OverrideKind::GdpAdjustment, 10.0, None, 2030);
        let set = OverrideSet::for_country(CountryId::new(), &[bad.clone(), good]);
        assert_eq!(set.entries().len(), 1);
        assert_eq!(set.skipped().len(), 1);
        assert_eq!(set.skipped().first().and_then(|s| s.dm_input_id), Some(bad.id));

        let (valid, skipped) = validate_overrides(&[bad]);
        assert!(valid.is_empty());
        assert_eq!(skipped.len(), 1);
    }

    #[test]
    fn boundaries_are_found_in_order() {
        let a = input(OverrideKind::TradeAgreement, 0.01, Some(1.0), 2030);
        let b = input(OverrideKind::TradeAgreement, 0.01, None, 2032);
        let set = OverrideSet::for_country(CountryId::new(), &[a, b]);
        let start_a = utc(2030).timestamp_millis();
        let end_a = start_a + fraction_of_year_millis(1.0).unwrap();
        assert_eq!(set.next_boundary_after(start_a - 1), Some(start_a));
        assert_eq!(set.next_boundary_after(start_a), Some(end_a));
        assert_eq!(set.next_boundary_after(end_a), Some(utc(2032).timestamp_millis()));
        assert_eq!(set.next_boundary_after(utc(2033).timestamp_millis()), None);
        assert!(set.has_boundary_in(start_a - 1, start_a));
        assert!(!set.has_boundary_in(start_a, start_a + 1));
    }

    #[test]
    fn active_overrides_at_selects_window() {
        let country = CountryId::new();
        let a = input(OverrideKind::TradeAgreement, 0.01, Some(1.0), 2030);
        let b = input(OverrideKind::EconomicPolicy, 0.02, None, 2032);
        let inputs = [a.clone(), b.clone()];
        let in_2030: Vec<DmInputId> = active_overrides_at(country, utc(2030), &inputs)
            .iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(in_2030, vec![a.id]);
        let in_2033: Vec<DmInputId> = active_overrides_at(country, utc(2033), &inputs)
            .iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(in_2033, vec![b.id]);
    }
}
