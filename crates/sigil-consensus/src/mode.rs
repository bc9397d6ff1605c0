//! Validation modes
//!
//! Each mode answers which kinds of submissions are authoritative for a
//! request; the engine asks the mode instead of branching on it.

use serde::{Deserialize, Serialize};

/// How a validation request may be decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Staked re-execution by a quorum of validators
    Stake,
    /// A single TEE attestation accepted by the trusted-key oracle
    Attestation,
    /// Either of the above; a valid attestation short-circuits
    Hybrid,
}

impl ValidationMode {
    /// Whether staked responses count toward the outcome
    pub fn admits_stake(&self) -> bool {
        matches!(self, Self::Stake | Self::Hybrid)
    }

    /// Whether an attestation can decide the outcome
    pub fn admits_attestation(&self) -> bool {
        matches!(self, Self::Attestation | Self::Hybrid)
    }
}
