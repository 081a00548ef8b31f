//! Error types for growth calculation, series generation, and aggregation.
//!
//! [`GrowthError`] is the umbrella returned by the calculator and everything
//! built on it. Clock and tier errors convert into it with `?`. Each variant
//! belongs to one [`ErrorCategory`] so callers can decide whether to abort
//! startup, skip an entity, or reject a request.

use chrono::{DateTime, Utc};

use crate::clock::ClockError;
use crate::tiers::TierError;

/// Broad classes of engine failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Invalid configuration. Fatal: the engine must not start.
    Configuration,
    /// A malformed entity or override. Recovered per entity.
    InvalidInput,
    /// A target time earlier than the last calculation.
    TemporalInvariant,
    /// A request exceeded a configured bound.
    LimitExceeded,
}

/// Errors produced by the growth engine.
#[derive(Debug, thiserror::Error)]
pub enum GrowthError {
    /// Configuration values the engine cannot run with.
    #[error("configuration error: {reason}")]
    Configuration {
        /// Explanation of what is wrong.
        reason: String,
    },

    /// An entity or parameter failed validation.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// Explanation of what is wrong.
        reason: String,
    },

    /// The requested target precedes the state's last calculation.
    #[error("target {target} precedes last calculation at {last_calculated}")]
    TemporalInvariantViolation {
        /// When the state was last calculated.
        last_calculated: DateTime<Utc>,
        /// The rejected target time.
        target: DateTime<Utc>,
    },

    /// A series request would produce more points than allowed.
    #[error("series of {requested} points exceeds the limit of {limit}")]
    SeriesLimitExceeded {
        /// Points the request would produce (at least).
        requested: u64,
        /// Configured maximum.
        limit: u32,
    },

    /// A fleet request covers more countries than allowed.
    #[error("fleet of {requested} countries exceeds the limit of {limit}")]
    FleetLimitExceeded {
        /// Countries in the request.
        requested: usize,
        /// Configured maximum.
        limit: u32,
    },

    /// An advance walked through more constant-rate segments than allowed.
    #[error("advance exceeded {limit} growth segments")]
    SegmentLimitExceeded {
        /// Configured maximum.
        limit: u32,
    },
}

impl GrowthError {
    /// The category this error belongs to.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::InvalidInput { .. } => ErrorCategory::InvalidInput,
            Self::TemporalInvariantViolation { .. } => ErrorCategory::TemporalInvariant,
            Self::SeriesLimitExceeded { .. }
            | Self::FleetLimitExceeded { .. }
            | Self::SegmentLimitExceeded { .. } => ErrorCategory::LimitExceeded,
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }
}

impl From<ClockError> for GrowthError {
    fn from(err: ClockError) -> Self {
        match err {
            ClockError::InvalidConfig { reason } => Self::Configuration { reason },
            ClockError::TimeRegression { from, to } => Self::TemporalInvariantViolation {
                last_calculated: from,
                target: to,
            },
            ClockError::OutOfRange => Self::InvalidInput {
                reason: err.to_string(),
            },
        }
    }
}

impl From<TierError> for GrowthError {
    fn from(err: TierError) -> Self {
        match err {
            TierError::InvalidTable { reason } => Self::Configuration { reason },
            TierError::InvalidInput { .. } => Self::InvalidInput {
                reason: err.to_string(),
            },
        }
    }
}
