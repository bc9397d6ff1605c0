//! Identifier newtypes shared across components

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

use crate::hash::Hash;

/// Value amounts (smallest indivisible unit)
pub type Amount = u128;

/// Host-provided, monotonically non-decreasing time in seconds
pub type Timestamp = u64;

/// Identifier of an external participant (requester, validator, committer, owner)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Agent identifier, a pure function of the agent's DID string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub Hash);

impl AgentId {
    /// Derive the identifier for a decentralized identifier string
    pub fn from_did(did: &str) -> Self {
        Self(Hash::digest(did.as_bytes()))
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Hash of a typed public key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyHash(pub Hash);

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Identifier of a task whose result is authorized or validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Hash);

impl TaskId {
    /// Derive a task identifier from a human-readable label
    pub fn from_label(label: &str) -> Self {
        Self(Hash::tagged(b"sigil-task:", label.as_bytes()))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Derive a deterministic UUID from seed material.
///
/// Uses the first 16 bytes of the SHA-256 of the seed, so identifiers are
/// reproducible by every replica of the host.
fn derived_uuid(parts: &[&[u8]]) -> Uuid {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    let hash = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);
    Uuid::from_bytes(bytes)
}

/// Identifier of a validation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn derive(domain_id: u64, requester: &AccountId, task: &TaskId, nonce: u64) -> Self {
        Self(derived_uuid(&[
            b"sigil-request",
            &domain_id.to_be_bytes(),
            requester.as_str().as_bytes(),
            task.0.as_bytes(),
            &nonce.to_be_bytes(),
        ]))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Identifier of a single validator response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(pub Uuid);

impl ResponseId {
    pub fn derive(request: &RequestId, validator: &AccountId) -> Self {
        Self(derived_uuid(&[
            b"sigil-response",
            request.0.as_bytes(),
            validator.as_str().as_bytes(),
        ]))
    }
}

impl fmt::Display for ResponseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_is_pure_function_of_did() {
        assert_eq!(AgentId::from_did("did:sigil:agent:7"), AgentId::from_did("did:sigil:agent:7"));
        assert_ne!(AgentId::from_did("did:sigil:agent:7"), AgentId::from_did("did:sigil:agent:8"));
    }

    #[test]
    fn test_request_id_depends_on_every_part() {
        let alice = AccountId::from("alice");
        let task = TaskId::from_label("summarize");
        let base = RequestId::derive(1, &alice, &task, 0);

        assert_eq!(base, RequestId::derive(1, &alice, &task, 0));
        assert_ne!(base, RequestId::derive(2, &alice, &task, 0));
        assert_ne!(base, RequestId::derive(1, &AccountId::from("bob"), &task, 0));
        assert_ne!(base, RequestId::derive(1, &alice, &task, 1));
    }

    #[test]
    fn test_account_id_serializes_transparently() {
        let id = AccountId::from("validator-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"validator-1\"");
    }
}
