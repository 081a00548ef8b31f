//! Virtual clock and time tracking for the growth engine.
//!
//! The clock maps real wall-clock time onto an accelerated virtual timeline.
//! It is the single authority for "now" in virtual time; every other
//! component receives timestamps from it or from the caller.
//!
//! # Design Principles
//!
//! - Real time is read through the [`TimeSource`] trait, never directly, so
//!   tests inject a [`FixedTimeSource`] and stay deterministic.
//! - All timestamp arithmetic is done in whole milliseconds with checked
//!   operations.
//! - Pausing freezes virtual time at the instant of the pause. Resuming and
//!   changing the multiplier re-anchor the mapping, so virtual time never
//!   jumps.

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Datelike, Utc};
use ixstats_types::ClockStatus;
use tracing::info;

use crate::config::ClockConfig;

/// Milliseconds in one virtual year (365.25 days).
pub const MILLIS_PER_VIRTUAL_YEAR: i64 = 31_557_600_000;

/// [`MILLIS_PER_VIRTUAL_YEAR`] as a float, for compounding.
pub const MILLIS_PER_VIRTUAL_YEAR_F64: f64 = 31_557_600_000.0;

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Invalid clock configuration (e.g. a non-positive multiplier).
    #[error("invalid clock configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },

    /// An elapsed-time query ran backwards.
    #[error("time regression: {to} is earlier than {from}")]
    TimeRegression {
        /// Start of the requested span.
        from: DateTime<Utc>,
        /// End of the requested span.
        to: DateTime<Utc>,
    },

    /// A computed timestamp falls outside the representable range.
    #[error("virtual timestamp out of range")]
    OutOfRange,
}

// ---------------------------------------------------------------------------
// Time sources
// ---------------------------------------------------------------------------

/// Source of real wall-clock time.
pub trait TimeSource: Debug + Send + Sync {
    /// The current real time.
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually controlled time source for tests and replays.
#[derive(Debug)]
pub struct FixedTimeSource {
    millis: AtomicI64,
}

impl FixedTimeSource {
    /// Create a source pinned at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(now.timestamp_millis()),
        }
    }

    /// Move the source to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        self.millis.store(now.timestamp_millis(), Ordering::Release);
    }

    /// Move the source forward by `millis` milliseconds.
    pub fn advance_millis(&self, millis: i64) {
        let _ = self
            .millis
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |m| m.checked_add(millis));
    }
}

impl TimeSource for FixedTimeSource {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::Acquire))
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}

// ---------------------------------------------------------------------------
// Elapsed-time helpers
// ---------------------------------------------------------------------------

/// Virtual years between two timestamps.
///
/// # Errors
///
/// Returns [`ClockError::TimeRegression`] if `to` is earlier than `from`.
pub fn years_elapsed(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<f64, ClockError> {
    if to < from {
        return Err(ClockError::TimeRegression { from, to });
    }
    Ok(years_between_millis(from.timestamp_millis(), to.timestamp_millis()))
}

/// Virtual years between two millisecond timestamps; negative when reversed.
pub fn years_between_millis(from_ms: i64, to_ms: i64) -> f64 {
    let delta = i128::from(to_ms).saturating_sub(i128::from(from_ms));
    delta as f64 / MILLIS_PER_VIRTUAL_YEAR_F64
}

/// Convert a span in virtual years into whole milliseconds (rounded).
///
/// Returns `None` for non-finite input or a result outside `i64`.
pub fn years_to_millis(years: f64) -> Option<i64> {
    f64_to_millis(years * MILLIS_PER_VIRTUAL_YEAR_F64)
}

/// Round a float millisecond count to `i64`, rejecting non-finite or
/// out-of-range values.
pub(crate) fn f64_to_millis(value: f64) -> Option<i64> {
    let rounded = value.round();
    // i64::MAX is not exactly representable; stay strictly inside.
    if !rounded.is_finite() || rounded >= 9.2e18 || rounded <= -9.2e18 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    Some(rounded as i64)
}

/// Build a timestamp from milliseconds since the Unix epoch.
pub(crate) fn from_millis(millis: i64) -> Result<DateTime<Utc>, ClockError> {
    DateTime::from_timestamp_millis(millis).ok_or(ClockError::OutOfRange)
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// How to render a virtual timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFormat {
    /// `2031-03-14`
    Short,
    /// `Friday, March 14, 2031 09:30 ILT`
    Long,
    /// `2031`
    YearOnly,
}

/// Render a virtual timestamp.
pub fn format_virtual(time: DateTime<Utc>, style: TimeFormat) -> String {
    match style {
        TimeFormat::Short => time.format("%Y-%m-%d").to_string(),
        TimeFormat::Long => time.format("%A, %B %-d, %Y %H:%M ILT").to_string(),
        TimeFormat::YearOnly => time.format("%Y").to_string(),
    }
}

/// Calendar year of a virtual timestamp.
pub fn game_year(time: DateTime<Utc>) -> i32 {
    time.year()
}

// ---------------------------------------------------------------------------
// VirtualClock
// ---------------------------------------------------------------------------

/// Operating mode of the virtual clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    /// Virtual time advances with real time.
    Running,
    /// Virtual time is frozen where it was when the clock was paused.
    Paused {
        /// The frozen virtual time.
        frozen_at: DateTime<Utc>,
    },
    /// Virtual time is pinned by an administrator.
    Override {
        /// The pinned virtual time.
        virtual_time: DateTime<Utc>,
    },
}

/// Mapping from real time to virtual time.
///
/// `virtual = virtual_anchor + (real - real_anchor) * multiplier` while
/// running. The anchors move on resume and on multiplier changes; the
/// configured `virtual_epoch` never moves and is the origin for
/// [`Self::years_since_epoch`].
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualClock {
    real_anchor: DateTime<Utc>,
    virtual_anchor: DateTime<Utc>,
    virtual_epoch: DateTime<Utc>,
    multiplier: f64,
    mode: ClockMode,
}

impl VirtualClock {
    /// Create a clock from configuration.
    ///
    /// A clock configured with `start_paused` is frozen at the virtual
    /// epoch.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if the multiplier is zero,
    /// negative, or not finite.
    pub fn new(config: &ClockConfig) -> Result<Self, ClockError> {
        validate_multiplier(config.multiplier)?;
        let mode = if config.start_paused {
            ClockMode::Paused {
                frozen_at: config.virtual_epoch,
            }
        } else {
            ClockMode::Running
        };
        Ok(Self {
            real_anchor: config.real_epoch,
            virtual_anchor: config.virtual_epoch,
            virtual_epoch: config.virtual_epoch,
            multiplier: config.multiplier,
            mode,
        })
    }

    /// Virtual time corresponding to the real instant `real`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::OutOfRange`] if the mapped instant cannot be
    /// represented.
    pub fn virtual_time_at(&self, real: DateTime<Utc>) -> Result<DateTime<Utc>, ClockError> {
        match self.mode {
            ClockMode::Paused { frozen_at } => Ok(frozen_at),
            ClockMode::Override { virtual_time } => Ok(virtual_time),
            ClockMode::Running => self.running_time_at(real),
        }
    }

    fn running_time_at(&self, real: DateTime<Utc>) -> Result<DateTime<Utc>, ClockError> {
        let real_delta = real
            .timestamp_millis()
            .checked_sub(self.real_anchor.timestamp_millis())
            .ok_or(ClockError::OutOfRange)?;
        let virtual_delta =
            f64_to_millis(real_delta as f64 * self.multiplier).ok_or(ClockError::OutOfRange)?;
        let millis = self
            .virtual_anchor
            .timestamp_millis()
            .checked_add(virtual_delta)
            .ok_or(ClockError::OutOfRange)?;
        from_millis(millis)
    }

    /// Whether virtual time is frozen by a pause.
    pub const fn is_paused(&self) -> bool {
        matches!(self.mode, ClockMode::Paused { .. })
    }

    /// Whether virtual time is pinned by an override.
    pub const fn is_overridden(&self) -> bool {
        matches!(self.mode, ClockMode::Override { .. })
    }

    /// Current operating mode.
    pub const fn mode(&self) -> ClockMode {
        self.mode
    }

    /// Virtual time per unit of real time.
    pub const fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// The configured virtual epoch.
    pub const fn virtual_epoch(&self) -> DateTime<Utc> {
        self.virtual_epoch
    }

    /// Virtual years from the configured epoch to `time` (negative before).
    pub fn years_since_epoch(&self, time: DateTime<Utc>) -> f64 {
        years_between_millis(self.virtual_epoch.timestamp_millis(), time.timestamp_millis())
    }

    /// Freeze virtual time at its value for `real_now`.
    ///
    /// Pausing a paused clock is a no-op. Pausing an overridden clock
    /// freezes it at the override value.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::OutOfRange`] if the current time cannot be
    /// computed.
    pub fn pause(&mut self, real_now: DateTime<Utc>) -> Result<(), ClockError> {
        if self.is_paused() {
            return Ok(());
        }
        let frozen_at = self.virtual_time_at(real_now)?;
        self.mode = ClockMode::Paused { frozen_at };
        Ok(())
    }

    /// Resume from a pause, continuing from the frozen instant.
    ///
    /// Has no effect unless the clock is paused.
    pub fn resume(&mut self, real_now: DateTime<Utc>) {
        if let ClockMode::Paused { frozen_at } = self.mode {
            self.real_anchor = real_now;
            self.virtual_anchor = frozen_at;
            self.mode = ClockMode::Running;
        }
    }

    /// Pin virtual time to `virtual_time` until cleared.
    pub fn set_override(&mut self, virtual_time: DateTime<Utc>) {
        self.mode = ClockMode::Override { virtual_time };
    }

    /// Drop an override and return to the anchored, running timeline.
    pub fn clear_override(&mut self) {
        if self.is_overridden() {
            self.mode = ClockMode::Running;
        }
    }

    /// Change the speed of virtual time, re-anchoring at `real_now` so the
    /// current virtual time is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] for a non-positive or
    /// non-finite multiplier, or [`ClockError::OutOfRange`] if the current
    /// time cannot be computed.
    pub fn set_multiplier(
        &mut self,
        multiplier: f64,
        real_now: DateTime<Utc>,
    ) -> Result<(), ClockError> {
        validate_multiplier(multiplier)?;
        let current = self.running_time_at(real_now)?;
        self.real_anchor = real_now;
        self.virtual_anchor = current;
        self.multiplier = multiplier;
        Ok(())
    }
}

fn validate_multiplier(multiplier: f64) -> Result<(), ClockError> {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return Err(ClockError::InvalidConfig {
            reason: format!("multiplier must be positive and finite, got {multiplier}"),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ClockAuthority
// ---------------------------------------------------------------------------

/// Process-wide owner of the virtual clock.
///
/// Initialized once at startup from configuration, mutated only by
/// administrative actions (pause, resume, override, speed change), and read
/// by every calculation that needs "now".
#[derive(Debug)]
pub struct ClockAuthority {
    clock: RwLock<VirtualClock>,
    source: Arc<dyn TimeSource>,
}

impl ClockAuthority {
    /// Create the authority from configuration and a real-time source.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if the configuration is invalid.
    pub fn new(config: &ClockConfig, source: Arc<dyn TimeSource>) -> Result<Self, ClockError> {
        let clock = VirtualClock::new(config)?;
        Ok(Self {
            clock: RwLock::new(clock),
            source,
        })
    }

    /// Snapshot of the underlying clock.
    pub fn clock(&self) -> VirtualClock {
        self.read().clone()
    }

    /// The current virtual time.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::OutOfRange`] if the mapped instant cannot be
    /// represented.
    pub fn current_virtual_time(&self) -> Result<DateTime<Utc>, ClockError> {
        let real_now = self.source.now();
        self.read().virtual_time_at(real_now)
    }

    /// Whether virtual time is frozen by a pause.
    pub fn is_paused(&self) -> bool {
        self.read().is_paused()
    }

    /// Pause the clock at the current virtual time.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::OutOfRange`] if the current time cannot be
    /// computed.
    pub fn pause(&self) -> Result<(), ClockError> {
        let real_now = self.source.now();
        let mut clock = self.write();
        clock.pause(real_now)?;
        info!(virtual_time = ?clock.mode(), "virtual clock paused");
        Ok(())
    }

    /// Resume a paused clock.
    pub fn resume(&self) {
        let real_now = self.source.now();
        let mut clock = self.write();
        clock.resume(real_now);
        info!(real_anchor = %real_now, "virtual clock resumed");
    }

    /// Pin virtual time.
    pub fn set_override(&self, virtual_time: DateTime<Utc>) {
        self.write().set_override(virtual_time);
        info!(virtual_time = %virtual_time, "virtual clock override set");
    }

    /// Remove a virtual time override.
    pub fn clear_override(&self) {
        self.write().clear_override();
        info!("virtual clock override cleared");
    }

    /// Change the clock speed without moving current virtual time.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] for an invalid multiplier.
    pub fn set_multiplier(&self, multiplier: f64) -> Result<(), ClockError> {
        let real_now = self.source.now();
        self.write().set_multiplier(multiplier, real_now)?;
        info!(multiplier, "virtual clock multiplier changed");
        Ok(())
    }

    /// Status object for presentation layers.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::OutOfRange`] if the current time cannot be
    /// computed.
    pub fn status(&self) -> Result<ClockStatus, ClockError> {
        let real_time = self.source.now();
        let clock = self.read();
        let virtual_time = clock.virtual_time_at(real_time)?;
        Ok(ClockStatus {
            virtual_time,
            real_time,
            multiplier: clock.multiplier(),
            paused: clock.is_paused(),
            overridden: clock.is_overridden(),
            game_year: game_year(virtual_time),
            formatted: format_virtual(virtual_time, TimeFormat::Long),
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, VirtualClock> {
        // A poisoned lock still holds a consistent clock: every mutation is a
        // single assignment after validation.
        self.clock.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, VirtualClock> {
        self.clock.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).single().unwrap()
    }

    fn config() -> ClockConfig {
        ClockConfig {
            real_epoch: utc(2020, 1, 1),
            virtual_epoch: utc(2028, 1, 1),
            multiplier: 4.0,
            start_paused: false,
        }
    }

    fn authority_at(real: DateTime<Utc>) -> (ClockAuthority, Arc<FixedTimeSource>) {
        let source = Arc::new(FixedTimeSource::new(real));
        let authority = ClockAuthority::new(&config(), Arc::clone(&source) as Arc<dyn TimeSource>)
            .unwrap();
        (authority, source)
    }

    #[test]
    fn epoch_maps_to_virtual_epoch() {
        let clock = VirtualClock::new(&config()).unwrap();
        assert_eq!(clock.virtual_time_at(utc(2020, 1, 1)).unwrap(), utc(2028, 1, 1));
    }

    #[test]
    fn multiplier_scales_elapsed_time() {
        let clock = VirtualClock::new(&config()).unwrap();
        // One real day at 4x is four virtual days.
        let real = utc(2020, 1, 2);
        assert_eq!(clock.virtual_time_at(real).unwrap(), utc(2028, 1, 5));
    }

    #[test]
    fn zero_multiplier_is_rejected() {
        let mut cfg = config();
        cfg.multiplier = 0.0;
        assert!(matches!(
            VirtualClock::new(&cfg),
            Err(ClockError::InvalidConfig { .. })
        ));
        cfg.multiplier = -1.0;
        assert!(VirtualClock::new(&cfg).is_err());
        cfg.multiplier = f64::INFINITY;
        assert!(VirtualClock::new(&cfg).is_err());
    }

    #[test]
    fn years_elapsed_rejects_regression() {
        let err = years_elapsed(utc(2030, 1, 1), utc(2029, 1, 1));
        assert!(matches!(err, Err(ClockError::TimeRegression { .. })));
    }

    #[test]
    fn years_elapsed_counts_julian_years() {
        let from = utc(2028, 1, 1);
        let to = from + chrono::Duration::milliseconds(MILLIS_PER_VIRTUAL_YEAR * 3);
        let years = years_elapsed(from, to).unwrap();
        assert!((years - 3.0).abs() < 1e-12);
        assert!(years_elapsed(from, from).unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn pause_freezes_virtual_time() {
        let (authority, source) = authority_at(utc(2020, 1, 2));
        let before = authority.current_virtual_time().unwrap();
        authority.pause().unwrap();
        assert!(authority.is_paused());

        source.set(utc(2020, 6, 1));
        assert_eq!(authority.current_virtual_time().unwrap(), before);
    }

    #[test]
    fn resume_continues_from_frozen_instant() {
        let (authority, source) = authority_at(utc(2020, 1, 2));
        authority.pause().unwrap();
        let frozen = authority.current_virtual_time().unwrap();

        source.set(utc(2020, 6, 1));
        authority.resume();
        assert!(!authority.is_paused());
        assert_eq!(authority.current_virtual_time().unwrap(), frozen);

        // One real day later, four virtual days have passed.
        source.set(utc(2020, 6, 2));
        let now = authority.current_virtual_time().unwrap();
        assert_eq!(now - frozen, chrono::Duration::days(4));
    }

    #[test]
    fn override_pins_and_clears() {
        let (authority, source) = authority_at(utc(2020, 1, 2));
        let natural = authority.current_virtual_time().unwrap();
        authority.set_override(utc(2040, 7, 4));
        source.set(utc(2020, 1, 3));
        assert_eq!(authority.current_virtual_time().unwrap(), utc(2040, 7, 4));
        assert!(authority.status().unwrap().overridden);

        authority.clear_override();
        let after = authority.current_virtual_time().unwrap();
        assert_eq!(after - natural, chrono::Duration::days(4));
    }

    #[test]
    fn multiplier_change_does_not_jump() {
        let (authority, source) = authority_at(utc(2020, 1, 11));
        let before = authority.current_virtual_time().unwrap();
        authority.set_multiplier(1.0).unwrap();
        assert_eq!(authority.current_virtual_time().unwrap(), before);

        source.advance_millis(86_400_000);
        let after = authority.current_virtual_time().unwrap();
        assert_eq!(after - before, chrono::Duration::days(1));
        assert!(authority.set_multiplier(0.0).is_err());
    }

    #[test]
    fn status_reports_game_year_and_format() {
        let (authority, _source) = authority_at(utc(2020, 1, 1));
        let status = authority.status().unwrap();
        assert_eq!(status.game_year, 2028);
        assert!((status.multiplier - 4.0).abs() < f64::EPSILON);
        assert_eq!(status.formatted, "Saturday, January 1, 2028 00:00 ILT");
    }

    #[test]
    fn formats_render_expected_strings() {
        let t = utc(2031, 3, 14);
        assert_eq!(format_virtual(t, TimeFormat::Short), "2031-03-14");
        assert_eq!(format_virtual(t, TimeFormat::YearOnly), "2031");
        assert_eq!(game_year(t), 2031);
    }

    #[test]
    fn start_paused_freezes_at_epoch() {
        let mut cfg = config();
        cfg.start_paused = true;
        let clock = VirtualClock::new(&cfg).unwrap();
        assert!(clock.is_paused());
        assert_eq!(clock.virtual_time_at(utc(2024, 1, 1)).unwrap(), utc(2028, 1, 1));
    }

    #[test]
    fn years_since_epoch_is_signed() {
        let clock = VirtualClock::new(&config()).unwrap();
        assert!(clock.years_since_epoch(utc(2027, 1, 1)) < 0.0);
        assert!(clock.years_since_epoch(utc(2029, 1, 1)) > 0.0);
    }
}
