//! Trusted-key oracle seam for TEE attestations

use parking_lot::RwLock;
use sigil_core::Hash;
use std::collections::HashSet;

/// Decides whether an attestation comes from a trusted enclave key.
///
/// How trust is established is outside the protocol; the engine only
/// consumes the boolean.
pub trait TrustedKeyOracle: Send + Sync {
    fn is_trustworthy(&self, attestation_hash: &Hash) -> bool;
}

/// Oracle backed by an explicit allow-list of attestation hashes
#[derive(Debug, Default)]
pub struct StaticKeyOracle {
    trusted: RwLock<HashSet<Hash>>,
}

impl StaticKeyOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trusted(hashes: impl IntoIterator<Item = Hash>) -> Self {
        Self {
            trusted: RwLock::new(hashes.into_iter().collect()),
        }
    }

    pub fn trust(&self, hash: Hash) {
        self.trusted.write().insert(hash);
    }

    pub fn distrust(&self, hash: &Hash) {
        self.trusted.write().remove(hash);
    }
}

impl TrustedKeyOracle for StaticKeyOracle {
    fn is_trustworthy(&self, attestation_hash: &Hash) -> bool {
        self.trusted.read().contains(attestation_hash)
    }
}
