//! The growth calculator: advances a country's state to a target instant.
//!
//! A country's values are an organic trajectory plus a level shift. The
//! organic trajectory compounds from the state's [`GrowthAnchor`] at
//! constant rates; the level shift is the accumulated population and GDP
//! per capita deltas from value overrides since the baseline epoch, and
//! does not compound:
//!
//! ```text
//! population(t) = anchor.population * (1 + pop_rate)^years(anchor, t) + shift(t)
//! ```
//!
//! The anchor moves only where the rates change: at an override window
//! boundary that changes the active rate deltas, and at an economic-tier
//! crossing. Boundaries that leave the rates alone do not move it, so an
//! override with no effect leaves the trajectory bit-identical, and
//! advancing `a -> b -> c` produces the same values as advancing `a -> c`.
//! Tier crossings are located by bisection over whole milliseconds, which
//! makes the crossing instant independent of how the window was sampled.
//!
//! Crossing detection assumes values move monotonically within a segment.
//! A ramped delta pulling against the compounding direction can hide a
//! round trip through a tier; such a crossing is still picked up at the
//! next boundary.

use chrono::{DateTime, Utc};
use ixstats_types::{CountryBaseline, CountryCurrentState, EconomicTier, GrowthAnchor, GrowthRates};
use tracing::debug;

use crate::clock;
use crate::config::EngineConfig;
use crate::error::GrowthError;
use crate::overrides::{BaseInputs, OverrideSet};
use crate::rates::{self, RateBounds, RateResolver};
use crate::tiers::TierTables;

/// Everything besides the state that determines an advance.
#[derive(Debug, Clone, Copy)]
pub struct GrowthInputs<'a> {
    /// The country's immutable baseline.
    pub baseline: &'a CountryBaseline,
    /// Validated overrides targeting the country.
    pub overrides: &'a OverrideSet,
    /// Multiplier applied to configured GDP growth rates.
    pub global_growth_factor: f64,
}

impl<'a> GrowthInputs<'a> {
    /// Inputs with a global factor of 1.0.
    pub const fn new(baseline: &'a CountryBaseline, overrides: &'a OverrideSet) -> Self {
        Self {
            baseline,
            overrides,
            global_growth_factor: 1.0,
        }
    }

    /// Replace the global growth factor.
    #[must_use]
    pub const fn with_global_factor(self, global_growth_factor: f64) -> Self {
        Self {
            global_growth_factor,
            ..self
        }
    }
}

/// A constant-rate stretch of the timeline starting at `anchor`.
#[derive(Debug, Clone, Copy)]
struct Segment {
    anchor: GrowthAnchor,
    anchor_ms: i64,
    tier: EconomicTier,
    rates: GrowthRates,
}

/// Adjusted and organic values at one instant.
#[derive(Debug, Clone, Copy)]
struct Values {
    population: f64,
    gdp_per_capita: f64,
    organic_population: f64,
    organic_gdp_per_capita: f64,
}

/// Deterministic compounding engine.
#[derive(Debug, Clone)]
pub struct GrowthCalculator {
    tables: TierTables,
    bounds: RateBounds,
    min_population: f64,
    min_gdp_per_capita: f64,
    max_segments: u32,
}

impl GrowthCalculator {
    /// Build a calculator from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GrowthError::Configuration`] if the tier tables, rate
    /// bounds, value floors, or segment limit are invalid.
    pub fn new(config: &EngineConfig) -> Result<Self, GrowthError> {
        let tables = TierTables::from_config(&config.tiers)?;
        let bounds = RateBounds::from_config(&config.growth, &tables)?;
        let growth = &config.growth;
        for (name, floor) in [
            ("min_population", growth.min_population),
            ("min_gdp_per_capita", growth.min_gdp_per_capita),
        ] {
            if !floor.is_finite() || floor <= 0.0 {
                return Err(GrowthError::Configuration {
                    reason: format!("growth.{name} must be finite and positive, got {floor}"),
                });
            }
        }
        if growth.max_segments == 0 {
            return Err(GrowthError::Configuration {
                reason: "growth.max_segments must be at least 1".to_owned(),
            });
        }
        Ok(Self {
            tables,
            bounds,
            min_population: growth.min_population,
            min_gdp_per_capita: growth.min_gdp_per_capita,
            max_segments: growth.max_segments,
        })
    }

    /// The validated tier tables.
    pub const fn tables(&self) -> &TierTables {
        &self.tables
    }

    /// Check that a baseline can be compounded.
    ///
    /// # Errors
    ///
    /// Returns [`GrowthError::InvalidInput`] naming the first bad field.
    pub fn validate_baseline(baseline: &CountryBaseline) -> Result<(), GrowthError> {
        let non_negative = [
            ("population", baseline.population),
            ("gdp_per_capita", baseline.gdp_per_capita),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(GrowthError::invalid(format!(
                    "country {} has invalid {field} {value}",
                    baseline.id
                )));
            }
        }
        let rates = [
            ("max_gdp_growth_rate", baseline.max_gdp_growth_rate),
            ("adjusted_gdp_growth_rate", baseline.adjusted_gdp_growth_rate),
            ("population_growth_rate", baseline.population_growth_rate),
        ];
        for (field, value) in rates {
            if !value.is_finite() {
                return Err(GrowthError::invalid(format!(
                    "country {} has non-finite {field}",
                    baseline.id
                )));
            }
        }
        if let Some(area) = baseline.land_area {
            if !area.is_finite() || area < 0.0 {
                return Err(GrowthError::invalid(format!(
                    "country {} has invalid land area {area}",
                    baseline.id
                )));
            }
        }
        Ok(())
    }

    /// Check that a stored state agrees with the tier tables.
    ///
    /// States normally come from this calculator, but a stored or
    /// deserialized one may have been built against other tables.
    ///
    /// # Errors
    ///
    /// Returns [`GrowthError::InvalidInput`] when a value is not finite or
    /// a stored tier differs from the one its value classifies into.
    pub fn verify_state(&self, state: &CountryCurrentState) -> Result<(), GrowthError> {
        let economic = self.tables.classify_economic_tier(state.gdp_per_capita())?;
        let population = self.tables.classify_population_tier(state.population())?;
        if economic != state.economic_tier() || population != state.population_tier() {
            return Err(GrowthError::invalid(format!(
                "stored tiers {}/{} disagree with the tier tables ({economic}/{population})",
                state.economic_tier(),
                state.population_tier()
            )));
        }
        Ok(())
    }

    /// The state at the baseline epoch, anchored there.
    ///
    /// # Errors
    ///
    /// Returns [`GrowthError::InvalidInput`] if the baseline is invalid.
    pub fn initial_state(&self, baseline: &CountryBaseline) -> Result<CountryCurrentState, GrowthError> {
        Self::validate_baseline(baseline)?;
        let anchor = GrowthAnchor {
            time: baseline.epoch,
            population: baseline.population.max(self.min_population),
            gdp_per_capita: baseline.gdp_per_capita.max(self.min_gdp_per_capita),
        };
        self.state_from(
            anchor.population,
            anchor.gdp_per_capita,
            baseline,
            baseline.epoch,
            anchor,
        )
    }

    /// Advance `state` to `target`.
    ///
    /// A target at or before the state's last calculation returns the state
    /// unchanged. The returned rates are those of the final segment.
    ///
    /// # Errors
    ///
    /// Returns [`GrowthError::InvalidInput`] for invalid baselines, global
    /// factors, states whose tiers disagree with the tables, or values that
    /// overflow, and [`GrowthError::SegmentLimitExceeded`] when the walk
    /// needs more segments than configured.
    pub fn advance(
        &self,
        inputs: &GrowthInputs<'_>,
        state: &CountryCurrentState,
        target: DateTime<Utc>,
    ) -> Result<(CountryCurrentState, GrowthRates), GrowthError> {
        Self::validate_baseline(inputs.baseline)?;
        rates::validate_global_factor(inputs.global_growth_factor)?;
        self.verify_state(state)?;

        let mut segment = self.resume_segment(inputs, state)?;
        if target <= state.last_calculated() {
            return Ok((state.clone(), segment.rates));
        }

        let target_ms = target.timestamp_millis();
        let mut cursor_ms = state.last_calculated().timestamp_millis();
        let mut walked: u32 = 0;
        loop {
            walked = walked.saturating_add(1);
            if walked > self.max_segments {
                return Err(GrowthError::SegmentLimitExceeded {
                    limit: self.max_segments,
                });
            }

            let boundary = inputs.overrides.next_boundary_after(cursor_ms);
            let end_ms = boundary.map_or(target_ms, |b| b.min(target_ms));
            let end = self.values_at(inputs, &segment, end_ms);
            let end_tier = self.tables.classify_economic_tier(end.gdp_per_capita)?;

            if end_tier != segment.tier {
                cursor_ms = self.first_crossing(inputs, &segment, cursor_ms, end_ms)?;
                segment = self.reanchor(inputs, &segment, cursor_ms)?;
            } else if end_ms == target_ms && boundary != Some(target_ms) {
                cursor_ms = target_ms;
            } else {
                // A window boundary moves the anchor only if it changes the
                // rates; otherwise the segment simply continues.
                let next = self.reanchor(inputs, &segment, end_ms)?;
                if next.rates != segment.rates || next.tier != segment.tier {
                    segment = next;
                }
                cursor_ms = end_ms;
            }

            if cursor_ms >= target_ms {
                let at_target = self.values_at(inputs, &segment, target_ms);
                debug!(
                    country = %inputs.baseline.id,
                    segments = walked,
                    population = at_target.population,
                    gdp_per_capita = at_target.gdp_per_capita,
                    "advanced country"
                );
                let state = self.state_from(
                    at_target.population,
                    at_target.gdp_per_capita,
                    inputs.baseline,
                    target,
                    segment.anchor,
                )?;
                return Ok((state, segment.rates));
            }
        }
    }

    /// Effective rates that apply from `state` onward.
    ///
    /// # Errors
    ///
    /// Returns [`GrowthError::InvalidInput`] for invalid baselines or
    /// global factors.
    pub fn rates_at(
        &self,
        inputs: &GrowthInputs<'_>,
        state: &CountryCurrentState,
    ) -> Result<GrowthRates, GrowthError> {
        Self::validate_baseline(inputs.baseline)?;
        rates::validate_global_factor(inputs.global_growth_factor)?;
        Ok(self.resume_segment(inputs, state)?.rates)
    }

    /// The segment a stored state continues in.
    ///
    /// The stored anchor is reused only if it reproduces the stored values
    /// exactly and no rate change or tier crossing lies between it and
    /// `last_calculated` under the current inputs. Otherwise overrides, the
    /// global factor, or the baseline changed since the last calculation
    /// and the walk re-anchors at `last_calculated`.
    fn resume_segment(
        &self,
        inputs: &GrowthInputs<'_>,
        state: &CountryCurrentState,
    ) -> Result<Segment, GrowthError> {
        let anchor = state.anchor();
        let anchor_ms = anchor.time.timestamp_millis();
        let last_ms = state.last_calculated().timestamp_millis();

        if anchor_ms <= last_ms {
            let segment = self.segment_from(inputs, anchor)?;
            let at_last = self.values_at(inputs, &segment, last_ms);
            #[allow(clippy::float_cmp)]
            let reproduces = at_last.population == state.population()
                && at_last.gdp_per_capita == state.gdp_per_capita();
            if reproduces && self.holds_through(inputs, &segment, last_ms)? {
                return Ok(segment);
            }
        }

        debug!(
            country = %inputs.baseline.id,
            anchor = %anchor.time,
            last_calculated = %state.last_calculated(),
            "re-anchoring at last calculation"
        );
        let (population_shift, gdp_shift) = level_shift(inputs, last_ms);
        self.segment_from(
            inputs,
            GrowthAnchor {
                time: state.last_calculated(),
                population: (state.population() - population_shift).max(self.min_population),
                gdp_per_capita: (state.gdp_per_capita() - gdp_shift).max(self.min_gdp_per_capita),
            },
        )
    }

    /// Whether `segment` stays in force from its anchor through `last_ms`:
    /// no tier change at `last_ms` and no window boundary on the way that
    /// would change its rates.
    fn holds_through(
        &self,
        inputs: &GrowthInputs<'_>,
        segment: &Segment,
        last_ms: i64,
    ) -> Result<bool, GrowthError> {
        let at_last = self.values_at(inputs, segment, last_ms);
        if self.tables.classify_economic_tier(at_last.gdp_per_capita)? != segment.tier {
            return Ok(false);
        }
        let mut cursor_ms = segment.anchor_ms;
        let mut checked: u32 = 0;
        while let Some(boundary) = inputs
            .overrides
            .next_boundary_after(cursor_ms)
            .filter(|b| *b <= last_ms)
        {
            checked = checked.saturating_add(1);
            if checked > self.max_segments {
                return Ok(false);
            }
            let next = self.reanchor(inputs, segment, boundary)?;
            if next.rates != segment.rates || next.tier != segment.tier {
                return Ok(false);
            }
            cursor_ms = boundary;
        }
        Ok(true)
    }

    /// A segment compounding from the organic values in `anchor`, with the
    /// tier of the adjusted values and the rates in force at its start.
    fn segment_from(
        &self,
        inputs: &GrowthInputs<'_>,
        anchor: GrowthAnchor,
    ) -> Result<Segment, GrowthError> {
        let anchor_ms = anchor.time.timestamp_millis();
        let (_, gdp_shift) = level_shift(inputs, anchor_ms);
        let gdp_per_capita = (anchor.gdp_per_capita + gdp_shift).max(self.min_gdp_per_capita);
        let tier = self.tables.classify_economic_tier(gdp_per_capita)?;
        let adjusted = inputs.overrides.apply(
            BaseInputs {
                population_rate: inputs.baseline.population_growth_rate,
                gdp_rate: inputs.baseline.adjusted_gdp_growth_rate,
            },
            anchor_ms,
            anchor_ms,
        );
        let resolver = RateResolver::new(&self.tables, self.bounds);
        let rates = GrowthRates {
            population: resolver.resolve_population_rate(adjusted.population_rate),
            gdp_per_capita: resolver.resolve_gdp_rate(
                adjusted.gdp_rate,
                tier,
                inputs.global_growth_factor,
                inputs.baseline.max_gdp_growth_rate,
            ),
        };
        Ok(Segment {
            anchor,
            anchor_ms,
            tier,
            rates,
        })
    }

    /// The segment that starts at `at_ms`, anchored on the organic values
    /// the `previous` segment reaches there.
    fn reanchor(
        &self,
        inputs: &GrowthInputs<'_>,
        previous: &Segment,
        at_ms: i64,
    ) -> Result<Segment, GrowthError> {
        let values = self.values_at(inputs, previous, at_ms);
        self.segment_from(
            inputs,
            GrowthAnchor {
                time: clock::from_millis(at_ms)?,
                population: values.organic_population,
                gdp_per_capita: values.organic_gdp_per_capita,
            },
        )
    }

    /// Values at `at_ms` within `segment`, floored.
    ///
    /// The organic values compound from the anchor; the level shift from
    /// value overrides is added on top and never compounds.
    fn values_at(&self, inputs: &GrowthInputs<'_>, segment: &Segment, at_ms: i64) -> Values {
        let years = clock::years_between_millis(segment.anchor_ms, at_ms);
        let organic_population = (segment.anchor.population
            * (1.0 + segment.rates.population).powf(years))
        .max(self.min_population);
        let organic_gdp_per_capita = (segment.anchor.gdp_per_capita
            * (1.0 + segment.rates.gdp_per_capita).powf(years))
        .max(self.min_gdp_per_capita);
        let (population_shift, gdp_shift) = level_shift(inputs, at_ms);
        Values {
            population: (organic_population + population_shift).max(self.min_population),
            gdp_per_capita: (organic_gdp_per_capita + gdp_shift).max(self.min_gdp_per_capita),
            organic_population,
            organic_gdp_per_capita,
        }
    }

    /// First millisecond in `(from_ms, end_ms]` whose economic tier differs
    /// from the segment's. The tier at `end_ms` must differ.
    fn first_crossing(
        &self,
        inputs: &GrowthInputs<'_>,
        segment: &Segment,
        from_ms: i64,
        end_ms: i64,
    ) -> Result<i64, GrowthError> {
        let mut lo = from_ms;
        let mut hi = end_ms;
        while let Some(mid) = midpoint(lo, hi) {
            let values = self.values_at(inputs, segment, mid);
            if self.tables.classify_economic_tier(values.gdp_per_capita)? == segment.tier {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        debug!(
            country = %inputs.baseline.id,
            from = %segment.tier,
            at_ms = hi,
            "economic tier crossing"
        );
        Ok(hi)
    }

    /// Build a state, classifying tiers and deriving totals and densities.
    fn state_from(
        &self,
        population: f64,
        gdp_per_capita: f64,
        baseline: &CountryBaseline,
        at: DateTime<Utc>,
        anchor: GrowthAnchor,
    ) -> Result<CountryCurrentState, GrowthError> {
        let economic_tier = self.tables.classify_economic_tier(gdp_per_capita)?;
        let population_tier = self.tables.classify_population_tier(population)?;
        Ok(CountryCurrentState::derive(
            population,
            gdp_per_capita,
            economic_tier,
            population_tier,
            baseline.land_area,
            at,
            anchor,
        ))
    }
}

/// Population and GDP-per-capita shift from value overrides that has
/// accumulated between the baseline epoch and `at_ms`.
fn level_shift(inputs: &GrowthInputs<'_>, at_ms: i64) -> (f64, f64) {
    let shift = inputs.overrides.apply(
        BaseInputs::default(),
        inputs.baseline.epoch.timestamp_millis(),
        at_ms,
    );
    (shift.population_delta, shift.gdp_per_capita_delta)
}

/// Midpoint strictly between `lo` and `hi`, or `None` when they are adjacent.
fn midpoint(lo: i64, hi: i64) -> Option<i64> {
    let gap = hi.checked_sub(lo)?;
    if gap <= 1 {
        return None;
    }
    lo.checked_add(gap / 2)
}
