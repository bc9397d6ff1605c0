//! Registry error types

use sigil_core::{AccountId, AgentId, CoreError, ErrorClass, GuardError, KeyHash, Timestamp};
use thiserror::Error;

use crate::keys::KeyType;

/// Errors raised by the identity registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Invalid DID: {0}")]
    InvalidDid(String),

    #[error("Metadata field '{field}' is {actual} bytes (max {max})")]
    MetadataTooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("Identity already registered: {0}")]
    DuplicateIdentity(AgentId),

    #[error("Owner {owner} already holds the maximum of {max} agents")]
    TooManyAgents { owner: AccountId, max: usize },

    #[error("Registration rate limit reached, retry after {retry_after}s")]
    RateLimited { retry_after: Timestamp },

    #[error("{actual} keys supplied (1..={max} allowed)")]
    KeyCount { max: usize, actual: usize },

    #[error("Key supplied twice: {0}")]
    DuplicateKey(KeyHash),

    #[error("Key has been revoked: {0}")]
    RevokedKey(KeyHash),

    #[error("At least one signing key (Ed25519 or ECDSA) is required")]
    MissingSigningKey,

    #[error("Invalid {key_type:?} key: {reason}")]
    InvalidKey { key_type: KeyType, reason: String },

    #[error("Ownership proof rejected for key {0}")]
    InvalidOwnershipProof(KeyHash),

    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("{caller} does not own agent {agent_id}")]
    NotOwner { agent_id: AgentId, caller: AccountId },

    #[error("Agent is not pending: {0}")]
    AgentNotPending(AgentId),

    #[error("Agent is not active: {0}")]
    AgentNotActive(AgentId),

    #[error("Agent locked until {unlock_at}, now {now}")]
    StillLocked { unlock_at: Timestamp, now: Timestamp },

    #[error("No live key {0} owned by caller")]
    KeyNotFound(KeyHash),

    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error("Hashing error: {0}")]
    Hashing(String),
}

impl From<CoreError> for RegistryError {
    fn from(e: CoreError) -> Self {
        Self::Hashing(e.to_string())
    }
}

impl RegistryError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidDid(_)
            | Self::MetadataTooLong { .. }
            | Self::KeyCount { .. }
            | Self::DuplicateKey(_)
            | Self::RevokedKey(_)
            | Self::MissingSigningKey
            | Self::InvalidKey { .. }
            | Self::InvalidOwnershipProof(_)
            | Self::Hashing(_) => ErrorClass::Validation,
            Self::TooManyAgents { .. } | Self::RateLimited { .. } => ErrorClass::Capacity,
            Self::Guard(e) => e.class(),
            Self::NotOwner { .. } => ErrorClass::Authorization,
            Self::DuplicateIdentity(_)
            | Self::AgentNotFound(_)
            | Self::AgentNotPending(_)
            | Self::AgentNotActive(_)
            | Self::StillLocked { .. }
            | Self::KeyNotFound(_) => ErrorClass::Lifecycle,
        }
    }
}
