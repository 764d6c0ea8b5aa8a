//! Setup errors for the combination engine.
//!
//! All of these are raised before any document is clustered.

use thiserror::Error;

/// Configuration inconsistencies detected when building the engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CombineError {
    #[error("No ranked services configured: ROVER needs at least one voter")]
    EmptyRanking,

    #[error("Ranked service '{service}' has no configured weight")]
    MissingWeight { service: String },

    #[error("Weight for service '{service}' is not a finite number: {value}")]
    NonFiniteWeight { service: String, value: f64 },

    #[error("Rank spacer is not a finite number: {0}")]
    NonFiniteSpacer(f64),

    #[error("Mutually exclusive services are both active: '{first}' and '{second}'")]
    ExclusiveServices { first: String, second: String },

    #[error("Attempt to combine {supplied} services, but the ranking expects {ranked}")]
    ServiceCountMismatch { supplied: usize, ranked: usize },

    #[error("Service '{0}' is not part of the ranking")]
    UnrankedService(String),

    #[error("Mention selection mode '{0}' is not implemented")]
    UnsupportedMentionSelection(String),

    #[error("Unknown weighting scheme: {0}")]
    UnknownScheme(String),

    #[error("Scheme '{scheme}' has no weights for evaluation mode '{mode}'")]
    UnknownEvalMode { scheme: String, mode: String },
}
