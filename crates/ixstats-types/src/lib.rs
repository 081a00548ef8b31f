//! Shared type definitions for the IxStats growth engine.
//!
//! This crate is the single source of truth for the data model consumed and
//! produced by the engine. Types flow downstream to `TypeScript` via `ts-rs`
//! for presentation layers.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for country and override identifiers
//! - [`enums`] -- Economic tiers, population tiers, and override kinds
//! - [`structs`] -- Baselines, current states, DM inputs, history, aggregates

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{EconomicTier, OverrideKind, PopulationTier};
pub use ids::{CountryId, DmInputId};
pub use structs::{
    ClockStatus, CountryBaseline, CountryCurrentState, DmInput, GlobalStats, GrowthAnchor,
    GrowthRates, HistoricalDataPoint, SkippedItem,
};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation for presentation layers.

    #[test]
    fn export_bindings() {
        // Calling export_all writes each type into `bindings/` relative to
        // the crate root.
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::CountryId::export_all();
        let _ = crate::ids::DmInputId::export_all();

        // Enums
        let _ = crate::enums::EconomicTier::export_all();
        let _ = crate::enums::PopulationTier::export_all();
        let _ = crate::enums::OverrideKind::export_all();

        // Structs
        let _ = crate::structs::CountryBaseline::export_all();
        let _ = crate::structs::GrowthAnchor::export_all();
        let _ = crate::structs::CountryCurrentState::export_all();
        let _ = crate::structs::DmInput::export_all();
        let _ = crate::structs::GrowthRates::export_all();
        let _ = crate::structs::HistoricalDataPoint::export_all();
        let _ = crate::structs::SkippedItem::export_all();
        let _ = crate::structs::GlobalStats::export_all();
        let _ = crate::structs::ClockStatus::export_all();
    }
}
