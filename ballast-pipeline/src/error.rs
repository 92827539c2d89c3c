//! Per-item enrichment errors.

use ballast_core::BallastError;
use thiserror::Error;

/// Why one item could not be enriched. Recorded per item, never fatal to the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnrichError {
    #[error(transparent)]
    Upstream(#[from] BallastError),

    #[error("Model chose unknown subject '{answer}'")]
    UnknownSubject { answer: String },

    #[error("Missing required characteristic '{name}'")]
    MissingCharacteristic { name: String },

    #[error("Value '{value}' is not allowed for characteristic '{name}'")]
    DisallowedValue { name: String, value: String },
}
