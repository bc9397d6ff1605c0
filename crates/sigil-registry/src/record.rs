//! Agent records and registration parameters

use serde::{Deserialize, Serialize};
use sigil_core::{AccountId, AgentId, KeyHash, RegistryConfig, Timestamp};

use crate::error::RegistryError;
use crate::keys::{AgentKey, KeyType};

/// Descriptive metadata published with an agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub endpoint: String,
    /// Free-form capability descriptor, typically JSON
    #[serde(default)]
    pub capabilities: String,
}

impl AgentMetadata {
    /// Enforce the configured byte limits
    pub fn validate(&self, config: &RegistryConfig) -> Result<(), RegistryError> {
        let fields = [
            ("name", &self.name, config.max_name_length),
            ("description", &self.description, config.max_description_length),
            ("endpoint", &self.endpoint, config.max_endpoint_length),
            ("capabilities", &self.capabilities, config.max_capabilities_length),
        ];
        for (field, value, max) in fields {
            if value.len() > max {
                return Err(RegistryError::MetadataTooLong {
                    field,
                    max,
                    actual: value.len(),
                });
            }
        }
        Ok(())
    }
}

/// Plaintext revealed for a registration commitment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationParams {
    pub did: String,
    pub metadata: AgentMetadata,
    pub keys: Vec<AgentKey>,
}

/// Check the shape of a decentralized identifier
pub fn validate_did(did: &str, max_len: usize) -> Result<(), RegistryError> {
    if !did.starts_with("did:") || did.len() <= "did:".len() {
        return Err(RegistryError::InvalidDid(format!("'{}' must start with 'did:'", did)));
    }
    if did.len() > max_len {
        return Err(RegistryError::InvalidDid(format!(
            "{} bytes exceeds the limit of {}",
            did.len(),
            max_len
        )));
    }
    Ok(())
}

/// Agent lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Registered, waiting for the activation time-lock
    Pending,
    Active,
    /// A key of the record was revoked
    Revoked,
    /// Retired by its owner
    Deactivated,
}

/// A key as stored on a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredKey {
    pub key_type: KeyType,
    pub key_hash: KeyHash,
    #[serde(with = "hex::serde")]
    pub key_data: Vec<u8>,
    pub revoked: bool,
}

/// A registered identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub did: String,
    pub owner: AccountId,
    pub metadata: AgentMetadata,
    pub keys: Vec<RegisteredKey>,
    pub status: AgentStatus,
    pub registered_at: Timestamp,
    pub unlock_at: Timestamp,
    pub updated_at: Timestamp,
    /// Bumped by every metadata update
    pub nonce: u64,
}

impl AgentRecord {
    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }

    pub fn has_key(&self, key_hash: &KeyHash) -> bool {
        self.keys.iter().any(|k| &k.key_hash == key_hash)
    }
}
