//! Virtual clock, tier tables, and growth calculation for the IxStats engine.
//!
//! This crate advances countries along an accelerated virtual timeline:
//! it maps real time to virtual time, compounds population and GDP per
//! capita under tier-dependent growth ceilings and DM overrides, replays
//! series, and aggregates the whole fleet.
//!
//! # Modules
//!
//! - [`clock`] -- Virtual clock authority, time sources, and formatting.
//! - [`config`] -- Configuration loading from `ixstats-config.yaml` into
//!   strongly-typed structs.
//! - [`error`] -- [`GrowthError`] and its categories.
//! - [`tiers`] -- Economic and population tier classification.
//! - [`rates`] -- Effective growth-rate resolution.
//! - [`overrides`] -- DM input selection and application.
//! - [`growth`] -- The segmented compounding calculator.
//! - [`series`] -- Historical and forecast series.
//! - [`fleet`] -- Parallel fleet aggregation.
//! - [`sync`] -- [`CountryRepository`] trait and transactional updates.
//!
//! [`GrowthError`]: error::GrowthError
//! [`CountryRepository`]: sync::CountryRepository

pub mod clock;
pub mod config;
pub mod error;
pub mod fleet;
pub mod growth;
pub mod overrides;
pub mod rates;
pub mod series;
pub mod sync;
pub mod tiers;
