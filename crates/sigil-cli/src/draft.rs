//! Human-editable registration and task-authorization drafts
//!
//! Drafts name keys by seed instead of carrying raw key material, so a
//! scenario file stays readable. Turning a draft into protocol params signs
//! every signing key's ownership proof for the given owner and domain.

use anyhow::{Context, Result};
use serde::Deserialize;
use sigil_admission::TaskAuthorizationParams;
use sigil_core::{AccountId, AgentId, Hash, KeyHash, TaskId, Timestamp};
use sigil_registry::{AgentKey, AgentMetadata, RegistrationParams};

/// A key derived from a seed string
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySpec {
    Ed25519(String),
    Ecdsa(String),
    X25519(String),
}

/// 32 bytes of key material: the seed itself when it is 64 hex digits,
/// otherwise the SHA-256 of the seed text
pub fn seed_bytes(seed: &str) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    match hex::decode_to_slice(seed.strip_prefix("0x").unwrap_or(seed), &mut bytes) {
        Ok(()) => bytes,
        Err(_) => Hash::digest(seed.as_bytes()).0,
    }
}

impl KeySpec {
    /// Build the key, signing its ownership proof when it is a signing key
    pub fn build(&self, domain_id: u64, owner: &AccountId, did: &str) -> Result<AgentKey> {
        let key = match self {
            Self::Ed25519(seed) => {
                let signing_key = ed25519_dalek::SigningKey::from_bytes(&seed_bytes(seed));
                AgentKey::signed_ed25519(&signing_key, domain_id, owner, did)?
            }
            Self::Ecdsa(seed) => {
                let signing_key = k256::ecdsa::SigningKey::from_slice(&seed_bytes(seed))
                    .with_context(|| format!("Seed '{}' is not a valid secp256k1 scalar", seed))?;
                AgentKey::signed_ecdsa(&signing_key, domain_id, owner, did)?
            }
            Self::X25519(seed) => AgentKey::x25519(seed_bytes(seed)),
        };
        Ok(key)
    }
}

/// An agent registration before signing
#[derive(Debug, Clone, Deserialize)]
pub struct AgentDraft {
    pub did: String,
    #[serde(default)]
    pub metadata: AgentMetadata,
    pub keys: Vec<KeySpec>,
}

impl AgentDraft {
    pub fn agent_id(&self) -> AgentId {
        AgentId::from_did(&self.did)
    }

    pub fn params(&self, domain_id: u64, owner: &AccountId) -> Result<RegistrationParams> {
        let keys = self
            .keys
            .iter()
            .map(|key| key.build(domain_id, owner, &self.did))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Failed to build keys for {}", self.did))?;
        Ok(RegistrationParams {
            did: self.did.clone(),
            metadata: self.metadata.clone(),
            keys,
        })
    }

    /// Hash of the key at `index`
    pub fn key_hash(&self, index: usize, domain_id: u64, owner: &AccountId) -> Result<KeyHash> {
        let key = self
            .keys
            .get(index)
            .with_context(|| format!("{} has no key #{}", self.did, index))?;
        Ok(key.build(domain_id, owner, &self.did)?.hash())
    }
}

/// A task authorization before hashing
#[derive(Debug, Clone, Deserialize)]
pub struct TaskDraft {
    /// Label the task id is derived from
    pub task: String,
    /// DID of the authorized agent
    pub agent: String,
    #[serde(default)]
    pub scope: String,
    pub valid_for: Timestamp,
}

impl TaskDraft {
    pub fn task_id(&self) -> TaskId {
        TaskId::from_label(&self.task)
    }

    pub fn params(&self) -> TaskAuthorizationParams {
        TaskAuthorizationParams {
            task_id: self.task_id(),
            agent_id: AgentId::from_did(&self.agent),
            scope: self.scope.clone(),
            valid_for: self.valid_for,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_bytes_accepts_hex_or_text() {
        let hex_seed = "07".repeat(32);
        assert_eq!(seed_bytes(&hex_seed), [7u8; 32]);
        assert_eq!(seed_bytes(&format!("0x{}", hex_seed)), [7u8; 32]);
        assert_eq!(seed_bytes("alice"), Hash::digest(b"alice").0);
    }

    #[test]
    fn test_draft_keys_carry_valid_proofs() {
        let draft: AgentDraft = serde_json::from_str(
            r#"{
                "did": "did:sigil:worker",
                "metadata": { "name": "worker" },
                "keys": [ { "ed25519": "worker-signing" }, { "ecdsa": "worker-ecdsa" }, { "x25519": "worker-kex" } ]
            }"#,
        )
        .unwrap();
        let owner = AccountId::from("alice");
        let params = draft.params(3, &owner).unwrap();

        assert_eq!(params.keys.len(), 3);
        for key in &params.keys {
            key.verify(3, &owner, &draft.did).unwrap();
        }
        // Proofs are bound to the owner
        assert!(params.keys[0].verify(3, &AccountId::from("mallory"), &draft.did).is_err());
        assert_eq!(draft.key_hash(1, 3, &owner).unwrap(), params.keys[1].hash());
        assert!(draft.key_hash(3, 3, &owner).is_err());
    }

    #[test]
    fn test_task_draft_derives_ids() {
        let draft = TaskDraft {
            task: "nightly-report".into(),
            agent: "did:sigil:worker".into(),
            scope: "read:reports".into(),
            valid_for: 600,
        };
        let params = draft.params();
        assert_eq!(params.task_id, TaskId::from_label("nightly-report"));
        assert_eq!(params.agent_id, AgentId::from_did("did:sigil:worker"));
    }
}
