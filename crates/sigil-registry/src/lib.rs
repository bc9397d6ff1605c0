//! # Sigil Registry
//!
//! Agent identities admitted through commit-reveal.
//!
//! - [`IdentityRegistry`] - pending/active/revoked records with a key index for cascading revocation
//! - [`AgentKey`] - Ed25519, secp256k1 ECDSA and X25519 keys with proof of possession
//! - [`RegistrationParams`] - the plaintext a registration commitment hides

pub mod error;
pub mod keys;
pub mod rate;
pub mod record;
pub mod registry;

pub use error::RegistryError;
pub use keys::{canonical_key_data, key_hash, ownership_challenge, AgentKey, KeyType, OWNERSHIP_PURPOSE};
pub use rate::RegistrationLimiter;
pub use record::{AgentMetadata, AgentRecord, AgentStatus, RegisteredKey, RegistrationParams};
pub use registry::{IdentityRegistry, Revocation};
