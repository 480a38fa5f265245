use thiserror::Error;

use super::config::ConfigError;
use crate::core::error::{ShapeMismatch, WeightError};
use crate::core::matching::graph::MatchingError;
use crate::core::models::transform::TransformError;
use crate::core::superposition::SuperpositionError;

#[derive(Debug, Error)]
pub enum AlignError {
    #[error(transparent)]
    DimensionMismatch(#[from] ShapeMismatch),

    #[error("Invalid atom weights: {source}")]
    Weights {
        #[from]
        source: WeightError,
    },

    #[error("Superposition failed: {source}")]
    Superposition {
        #[from]
        source: SuperpositionError,
    },

    #[error("Atom count differs: reference has {reference}, moving has {moving}")]
    AtomCountMismatch { reference: usize, moving: usize },

    #[error("Atom classes differ:\n  reference: {reference}\n  moving:    {moving}")]
    AtomClassMismatch { reference: String, moving: String },

    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Invalid alignment transform: {source}")]
    Transform {
        #[from]
        source: TransformError,
    },

    #[error("Matching enumeration failed: {source}")]
    Matching {
        #[from]
        source: MatchingError,
    },

    #[error("Round-trip verification failed: {0}")]
    Verification(String),

    #[error("Internal logic error: {0}")]
    Internal(String),
}
