//! Error types for the engine binary.
//!
//! [`EngineError`] covers loading configuration and the fleet file, and
//! reading back the store. Clock and calculation failures reach `main`
//! directly and get their context there through `anyhow`.

use std::path::PathBuf;

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ixstats_core::config::ConfigError,
    },

    /// The country store rejected an operation.
    #[error("repository error: {source}")]
    Repository {
        /// The underlying repository error.
        #[from]
        source: ixstats_core::sync::RepositoryError,
    },

    /// The fleet file could not be read.
    #[error("cannot read fleet file {path}: {source}")]
    FleetFile {
        /// Path that was read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The fleet file or report is not valid JSON.
    #[error("JSON error: {source}")]
    Json {
        /// The underlying `serde_json` error.
        #[from]
        source: serde_json::Error,
    },
}
