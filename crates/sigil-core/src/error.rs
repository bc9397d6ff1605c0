//! Shared error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the core primitives
#[derive(Debug, Error)]
pub enum CoreError {
    /// Canonical (JCS) serialization of a hash preimage failed
    #[error("Canonical serialization failed: {0}")]
    Canonical(#[from] serde_json::Error),

    /// A hex string could not be decoded into a fixed-size value
    #[error("Invalid hex: {0}")]
    InvalidHex(String),
}

/// Coarse classification of every protocol error.
///
/// Nothing is retried inside the protocol; the class tells the caller whether
/// resubmitting with different parameters can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Commit-reveal failures; a fresh commitment is required
    Admission,
    /// Ceilings and page bounds; retry with adjusted parameters
    Capacity,
    /// Stake and duplicate-response failures; caller-correctable
    Economic,
    /// The caller's view of entity state is stale
    Lifecycle,
    /// The caller lacks the right to perform the transition
    Authorization,
    /// Malformed input (keys, proofs, metadata, configuration)
    Validation,
    /// Value conservation or arithmetic overflow; the transition aborts
    Integrity,
}

impl ErrorClass {
    /// Whether a resubmission with adjusted parameters can succeed
    pub fn is_caller_correctable(&self) -> bool {
        !matches!(self, Self::Integrity)
    }
}
