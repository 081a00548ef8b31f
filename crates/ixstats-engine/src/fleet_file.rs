//! The JSON fleet file: baselines, overrides, and the global growth factor.
//!
//! ```json
//! {
//!   "global_growth_factor": 1.0,
//!   "countries": [ { "id": "...", "name": "...", "population": 1.0e7, ... } ],
//!   "overrides": []
//! }
//! ```

use std::path::Path;

use ixstats_types::{CountryBaseline, DmInput};
use serde::Deserialize;

use crate::error::EngineError;

/// Everything the engine needs to know about the fleet at startup.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FleetFile {
    /// Multiplier applied to every country's GDP growth rate.
    #[serde(default = "default_global_growth_factor")]
    pub global_growth_factor: f64,

    /// Country baselines.
    #[serde(default)]
    pub countries: Vec<CountryBaseline>,

    /// DM inputs, active or not.
    #[serde(default)]
    pub overrides: Vec<DmInput>,
}

impl FleetFile {
    /// Read and parse a fleet file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::FleetFile`] if the file cannot be read and
    /// [`EngineError::Json`] if it does not parse.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let contents = std::fs::read_to_string(path).map_err(|source| EngineError::FleetFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse a fleet file from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Json`] if the string is not a valid fleet.
    pub fn parse(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }
}

const fn default_global_growth_factor() -> f64 {
    1.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_fleet() {
        let fleet = FleetFile::parse(r#"{ "countries": [] }"#).unwrap();
        assert!(fleet.countries.is_empty());
        assert!((fleet.global_growth_factor - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_country_and_override() {
        let json = r#"{
            "global_growth_factor": 0.9,
            "countries": [{
                "id": "01890a5d-ac96-774b-bcce-b302099a8057",
                "name": "Caphiria",
                "population": 10000000.0,
                "gdp_per_capita": 20000.0,
                "max_gdp_growth_rate": 0.05,
                "adjusted_gdp_growth_rate": 0.03,
                "population_growth_rate": 0.01,
                "land_area": 120000.0,
                "epoch": "2028-01-01T00:00:00Z"
            }],
            "overrides": [{
                "id": "01890a5d-ac96-774b-bcce-b302099a8058",
                "country_id": "01890a5d-ac96-774b-bcce-b302099a8057",
                "kind": "trade_agreement",
                "value": 0.005,
                "duration_years": 2.0,
                "activation_time": "2029-01-01T00:00:00Z",
                "created_at": "2028-06-01T00:00:00Z"
            }]
        }"#;
        let fleet = FleetFile::parse(json).unwrap();
        assert_eq!(fleet.countries.len(), 1);
        let input = fleet.overrides.first().unwrap();
        assert!(input.is_active);
        assert_eq!(input.country_id, fleet.countries.first().map(|c| c.id));
    }

    #[test]
    fn rejects_unknown_override_kind() {
        let json = r#"{ "overrides": [{
            "id": "01890a5d-ac96-774b-bcce-b302099a8058",
            "kind": "alien_invasion",
            "value": 1.0,
            "activation_time": "2029-01-01T00:00:00Z",
            "created_at": "2028-06-01T00:00:00Z"
        }] }"#;
        assert!(matches!(FleetFile::parse(json), Err(EngineError::Json { .. })));
    }
}
