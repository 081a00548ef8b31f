//! Transactional read-compute-write against a country store.
//!
//! The engine itself is pure; persistence sits behind [`CountryRepository`].
//! Every update runs inside [`CountryRepository::transact`], which holds the
//! country's lock for the whole read-compute-write sequence and commits only
//! when the closure succeeds. Two callers advancing the same country to the
//! same instant therefore apply growth exactly once.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use ixstats_types::{
    CountryBaseline, CountryCurrentState, CountryId, DmInput, DmInputId, GrowthRates,
    HistoricalDataPoint, SkippedItem,
};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::ClockAuthority;
use crate::error::GrowthError;
use crate::fleet::CountryRecord;
use crate::growth::{GrowthCalculator, GrowthInputs};
use crate::overrides::OverrideSet;
use crate::rates;

/// Errors at the store boundary.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// No country with this identifier exists.
    #[error("country not found: {0}")]
    CountryNotFound(CountryId),

    /// No override with this identifier exists.
    #[error("override not found: {0}")]
    OverrideNotFound(DmInputId),

    /// The backing store failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description from the backing store.
        message: String,
    },

    /// Growth calculation failed; nothing was written.
    #[error(transparent)]
    Growth(#[from] GrowthError),
}

/// Everything stored for one country.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryRow {
    /// Immutable baseline.
    pub baseline: CountryBaseline,
    /// Last calculated state, if any.
    pub state: Option<CountryCurrentState>,
    /// Append-only history of calculated states.
    pub history: Vec<HistoricalDataPoint>,
}

/// A country store with per-country transactions.
pub trait CountryRepository: Send + Sync {
    /// Identifiers of every stored country, in a stable order.
    fn country_ids(&self) -> Result<Vec<CountryId>, RepositoryError>;

    /// The current global growth factor.
    fn global_growth_factor(&self) -> Result<f64, RepositoryError>;

    /// Every override with the active flag set that targets `country`,
    /// including global ones.
    fn active_overrides(&self, country: CountryId) -> Result<Vec<DmInput>, RepositoryError>;

    /// Run `f` against the country's row under its lock. Changes made by
    /// `f` are committed only if it returns `Ok`.
    fn transact<R, F>(&self, country: CountryId, f: F) -> Result<R, RepositoryError>
    where
        F: FnOnce(&mut CountryRow) -> Result<R, RepositoryError>;

    /// A consistent copy of the country's row.
    fn load(&self, country: CountryId) -> Result<CountryRow, RepositoryError> {
        self.transact(country, |row| Ok(row.clone()))
    }
}

/// Process-local [`CountryRepository`] backed by locks.
#[derive(Debug)]
pub struct InMemoryRepository {
    countries: BTreeMap<CountryId, Mutex<CountryRow>>,
    overrides: RwLock<Vec<DmInput>>,
    global_growth_factor: RwLock<f64>,
}

impl InMemoryRepository {
    /// An empty store with the given global growth factor.
    ///
    /// # Errors
    ///
    /// Returns [`GrowthError::InvalidInput`] for a negative or non-finite
    /// factor.
    pub fn new(global_growth_factor: f64) -> Result<Self, RepositoryError> {
        rates::validate_global_factor(global_growth_factor)?;
        Ok(Self {
            countries: BTreeMap::new(),
            overrides: RwLock::new(Vec::new()),
            global_growth_factor: RwLock::new(global_growth_factor),
        })
    }

    /// Add a country with no calculated state, replacing any existing row
    /// with the same id.
    pub fn insert_country(&mut self, baseline: CountryBaseline) {
        self.countries.insert(
            baseline.id,
            Mutex::new(CountryRow {
                baseline,
                state: None,
                history: Vec::new(),
            }),
        );
    }

    /// Record a new override.
    pub fn add_override(&self, input: DmInput) {
        info!(override_id = %input.id, kind = %input.kind, "override added");
        self.overrides
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(input);
    }

    /// Soft-delete an override by clearing its active flag.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::OverrideNotFound`] for unknown ids.
    pub fn deactivate_override(&self, id: DmInputId) -> Result<(), RepositoryError> {
        let mut overrides = self.overrides.write().unwrap_or_else(PoisonError::into_inner);
        let input = overrides
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(RepositoryError::OverrideNotFound(id))?;
        input.is_active = false;
        info!(override_id = %id, "override deactivated");
        Ok(())
    }

    /// Every stored override, active or not.
    pub fn overrides(&self) -> Vec<DmInput> {
        self.overrides
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the global growth factor.
    ///
    /// # Errors
    ///
    /// Returns [`GrowthError::InvalidInput`] for a negative or non-finite
    /// factor.
    pub fn set_global_growth_factor(&self, factor: f64) -> Result<(), RepositoryError> {
        rates::validate_global_factor(factor)?;
        *self
            .global_growth_factor
            .write()
            .unwrap_or_else(PoisonError::into_inner) = factor;
        info!(factor, "global growth factor changed");
        Ok(())
    }

    /// Baseline and stored state for every country, for aggregation.
    pub fn records(&self) -> Vec<CountryRecord> {
        self.countries
            .values()
            .map(|row| {
                let row = row.lock().unwrap_or_else(PoisonError::into_inner);
                CountryRecord {
                    baseline: row.baseline.clone(),
                    state: row.state.clone(),
                }
            })
            .collect()
    }
}

impl CountryRepository for InMemoryRepository {
    fn country_ids(&self) -> Result<Vec<CountryId>, RepositoryError> {
        Ok(self.countries.keys().copied().collect())
    }

    fn global_growth_factor(&self) -> Result<f64, RepositoryError> {
        Ok(*self
            .global_growth_factor
            .read()
            .unwrap_or_else(PoisonError::into_inner))
    }

    fn active_overrides(&self, country: CountryId) -> Result<Vec<DmInput>, RepositoryError> {
        Ok(self
            .overrides
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|i| i.is_active && i.targets(country))
            .cloned()
            .collect())
    }

    fn transact<R, F>(&self, country: CountryId, f: F) -> Result<R, RepositoryError>
    where
        F: FnOnce(&mut CountryRow) -> Result<R, RepositoryError>,
    {
        let slot = self
            .countries
            .get(&country)
            .ok_or(RepositoryError::CountryNotFound(country))?;
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let mut working = guard.clone();
        let result = f(&mut working)?;
        *guard = working;
        Ok(result)
    }
}

/// What [`advance_country`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    /// Growth was applied and a history point appended.
    Updated {
        /// The new stored state.
        state: CountryCurrentState,
        /// Rates of the final segment.
        rates: GrowthRates,
    },
    /// The stored state was already calculated at the target.
    Unchanged {
        /// The stored state.
        state: CountryCurrentState,
    },
}

impl AdvanceOutcome {
    /// The stored state after the call.
    pub const fn state(&self) -> &CountryCurrentState {
        match self {
            Self::Updated { state, .. } | Self::Unchanged { state } => state,
        }
    }
}

/// Result of a [`recompute_all`] batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    /// The instant every country was advanced to.
    pub target: DateTime<Utc>,
    /// Countries whose state changed.
    pub updated: u32,
    /// Countries already calculated at the target.
    pub unchanged: u32,
    /// Countries that failed, with reasons.
    pub skipped: Vec<SkippedItem>,
}

/// Advance one stored country to `target` and persist the result.
///
/// A country with no stored state starts from its baseline. Growth between
/// the stored state and `target` is applied exactly once.
///
/// # Errors
///
/// - [`GrowthError::TemporalInvariantViolation`] if `target` precedes the
///   stored state; the row is left untouched.
/// - [`RepositoryError::CountryNotFound`] for unknown countries.
/// - Any calculation error; nothing is written.
pub fn advance_country<R: CountryRepository>(
    repo: &R,
    calculator: &GrowthCalculator,
    country: CountryId,
    target: DateTime<Utc>,
) -> Result<AdvanceOutcome, RepositoryError> {
    let factor = repo.global_growth_factor()?;
    let dm_inputs = repo.active_overrides(country)?;
    let overrides = OverrideSet::for_country(country, &dm_inputs);

    repo.transact(country, |row| {
        let current = match &row.state {
            Some(state) => state.clone(),
            None => calculator.initial_state(&row.baseline)?,
        };
        let last = current.last_calculated();
        if target < last {
            return Err(GrowthError::TemporalInvariantViolation {
                last_calculated: last,
                target,
            }
            .into());
        }
        if target == last && row.state.is_some() {
            return Ok(AdvanceOutcome::Unchanged { state: current });
        }

        let inputs = GrowthInputs::new(&row.baseline, &overrides).with_global_factor(factor);
        let (state, rates) = calculator.advance(&inputs, &current, target)?;
        row.history
            .push(HistoricalDataPoint::from_state(country, &state, rates));
        row.state = Some(state.clone());
        debug!(
            country = %country,
            %target,
            population = state.population(),
            gdp_per_capita = state.gdp_per_capita(),
            "country advanced"
        );
        Ok(AdvanceOutcome::Updated { state, rates })
    })
}

/// Advance one stored country to the clock's current virtual time.
///
/// # Errors
///
/// Same as [`advance_country`], plus clock errors.
pub fn advance_country_to_now<R: CountryRepository>(
    repo: &R,
    calculator: &GrowthCalculator,
    clock: &ClockAuthority,
    country: CountryId,
) -> Result<AdvanceOutcome, RepositoryError> {
    let now = clock.current_virtual_time().map_err(GrowthError::from)?;
    advance_country(repo, calculator, country, now)
}

/// Advance every stored country to `target` in parallel.
///
/// Per-country failures are collected into the report instead of aborting
/// the batch.
///
/// # Errors
///
/// Returns [`GrowthError::FleetLimitExceeded`] when the store holds more
/// than `max_countries` countries, and an error if the country list cannot
/// be read. Nothing is advanced in either case.
pub fn recompute_all<R: CountryRepository>(
    repo: &R,
    calculator: &GrowthCalculator,
    target: DateTime<Utc>,
    max_countries: u32,
) -> Result<BatchReport, RepositoryError> {
    let ids = repo.country_ids()?;
    if ids.len() > usize::try_from(max_countries).unwrap_or(usize::MAX) {
        return Err(GrowthError::FleetLimitExceeded {
            requested: ids.len(),
            limit: max_countries,
        }
        .into());
    }
    let outcomes: Vec<(CountryId, Result<AdvanceOutcome, RepositoryError>)> = ids
        .par_iter()
        .map(|id| (*id, advance_country(repo, calculator, *id, target)))
        .collect();

    let mut report = BatchReport {
        target,
        updated: 0,
        unchanged: 0,
        skipped: Vec::new(),
    };
    for (id, outcome) in outcomes {
        match outcome {
            Ok(AdvanceOutcome::Updated { .. }) => report.updated = report.updated.saturating_add(1),
            Ok(AdvanceOutcome::Unchanged { .. }) => {
                report.unchanged = report.unchanged.saturating_add(1);
            }
            Err(err) => {
                warn!(country = %id, error = %err, "recompute failed");
                report.skipped.push(SkippedItem {
                    country_id: Some(id),
                    dm_input_id: None,
                    reason: err.to_string(),
                });
            }
        }
    }
    info!(
        %target,
        updated = report.updated,
        unchanged = report.unchanged,
        skipped = report.skipped.len(),
        "recompute complete"
    );
    Ok(report)
}
