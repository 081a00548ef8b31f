//! Enumeration types for the IxStats growth engine.
//!
//! Tier enums are ordered from least to most developed so that `Ord`
//! matches the ascending threshold tables they are classified from.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Economic tiers
// ---------------------------------------------------------------------------

/// Economic classification derived from GDP per capita.
///
/// Higher tiers carry strictly lower maximum growth-rate ceilings,
/// modelling diminishing returns at higher development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum EconomicTier {
    /// Lowest tier.
    Impoverished,
    /// Emerging economy.
    Developing,
    /// Established economy.
    Developed,
    /// Healthy economy.
    Healthy,
    /// Strong economy.
    Strong,
    /// Very strong economy.
    VeryStrong,
    /// Highest tier.
    Extravagant,
}

impl EconomicTier {
    /// Every economic tier in ascending order.
    pub const ALL: [Self; 7] = [
        Self::Impoverished,
        Self::Developing,
        Self::Developed,
        Self::Healthy,
        Self::Strong,
        Self::VeryStrong,
        Self::Extravagant,
    ];

    /// Human-readable label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Impoverished => "Impoverished",
            Self::Developing => "Developing",
            Self::Developed => "Developed",
            Self::Healthy => "Healthy",
            Self::Strong => "Strong",
            Self::VeryStrong => "Very Strong",
            Self::Extravagant => "Extravagant",
        }
    }
}

impl core::fmt::Display for EconomicTier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Population tiers
// ---------------------------------------------------------------------------

/// Population classification derived from total population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum PopulationTier {
    /// Smallest populations.
    Tier1,
    /// Tier 2.
    Tier2,
    /// Tier 3.
    Tier3,
    /// Tier 4.
    Tier4,
    /// Tier 5.
    Tier5,
    /// Tier 6.
    Tier6,
    /// Tier 7.
    Tier7,
    /// Largest populations.
    TierX,
}

impl PopulationTier {
    /// Every population tier in ascending order.
    pub const ALL: [Self; 8] = [
        Self::Tier1,
        Self::Tier2,
        Self::Tier3,
        Self::Tier4,
        Self::Tier5,
        Self::Tier6,
        Self::Tier7,
        Self::TierX,
    ];

    /// Human-readable label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Tier1 => "Tier 1",
            Self::Tier2 => "Tier 2",
            Self::Tier3 => "Tier 3",
            Self::Tier4 => "Tier 4",
            Self::Tier5 => "Tier 5",
            Self::Tier6 => "Tier 6",
            Self::Tier7 => "Tier 7",
            Self::TierX => "Tier X",
        }
    }
}

impl core::fmt::Display for PopulationTier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// DM input kinds
// ---------------------------------------------------------------------------

/// The kind of a DM input (manual, time-scoped override).
///
/// The set is closed: adding a kind forces every `match` over it to be
/// revisited, including the effect mapping in the override engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum OverrideKind {
    /// One-time additive change to population.
    PopulationAdjustment,
    /// One-time additive change to GDP per capita.
    GdpAdjustment,
    /// Additive change to the GDP growth rate while active.
    GrowthRateModifier,
    /// Scripted event expressed as a GDP growth-rate delta.
    SpecialEvent,
    /// Trade agreement expressed as a GDP growth-rate delta.
    TradeAgreement,
    /// Disaster expressed as a population and GDP growth-rate delta.
    NaturalDisaster,
    /// Policy effect expressed as a GDP growth-rate delta.
    EconomicPolicy,
}

impl OverrideKind {
    /// Stable snake-case name, matching the serialized form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PopulationAdjustment => "population_adjustment",
            Self::GdpAdjustment => "gdp_adjustment",
            Self::GrowthRateModifier => "growth_rate_modifier",
            Self::SpecialEvent => "special_event",
            Self::TradeAgreement => "trade_agreement",
            Self::NaturalDisaster => "natural_disaster",
            Self::EconomicPolicy => "economic_policy",
        }
    }
}

impl core::fmt::Display for OverrideKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_ordered_ascending() {
        assert!(EconomicTier::ALL.windows(2).all(|w| matches!(w, [a, b] if a < b)));
        assert!(PopulationTier::ALL.windows(2).all(|w| matches!(w, [a, b] if a < b)));
    }

    #[test]
    fn override_kind_serializes_snake_case() {
        let json = serde_json::to_string(&OverrideKind::NaturalDisaster).ok();
        assert_eq!(json.as_deref(), Some("\"natural_disaster\""));
        let parsed: Option<OverrideKind> = serde_json::from_str("\"gdp_adjustment\"").ok();
        assert_eq!(parsed, Some(OverrideKind::GdpAdjustment));
    }

    #[test]
    fn labels_are_human_readable() {
        assert_eq!(EconomicTier::VeryStrong.to_string(), "Very Strong");
        assert_eq!(PopulationTier::TierX.to_string(), "Tier X");
    }
}
