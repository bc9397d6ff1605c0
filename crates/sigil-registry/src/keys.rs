//! Typed agent keys and proof of possession
//!
//! Signature-bearing keys (Ed25519, secp256k1 ECDSA) must carry a signature
//! over an ownership challenge that binds the key to the deployment domain,
//! the registering owner and the DID. Key-exchange keys (X25519) cannot sign
//! and are accepted on format alone.

use serde::{Deserialize, Serialize};
use sigil_core::{AccountId, Hash, KeyHash};
use std::borrow::Cow;

use crate::error::RegistryError;

/// Purpose string mixed into every ownership challenge
pub const OWNERSHIP_PURPOSE: &str = "sigil-key-ownership";

/// Supported key algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    /// secp256k1 ECDSA, SEC1-encoded public key
    Ecdsa,
    Ed25519,
    /// Key exchange only; carries no signature
    X25519,
}

impl KeyType {
    fn tag(&self) -> u8 {
        match self {
            Self::Ecdsa => 0,
            Self::Ed25519 => 1,
            Self::X25519 => 2,
        }
    }

    /// Whether keys of this type prove possession with a signature
    pub fn is_signing(&self) -> bool {
        !matches!(self, Self::X25519)
    }
}

/// A key supplied at registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentKey {
    pub key_type: KeyType,
    #[serde(with = "hex::serde")]
    pub key_data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_hex")]
    pub signature: Option<Vec<u8>>,
}

mod opt_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// The stored form of a key. A secp256k1 point has a compressed and an
/// uncompressed SEC1 encoding; both map to the compressed one so a key has a
/// single identity. Unparseable data is returned as is and fails `verify`.
pub fn canonical_key_data(key_type: KeyType, key_data: &[u8]) -> Cow<'_, [u8]> {
    if key_type == KeyType::Ecdsa {
        if let Ok(point) = k256::ecdsa::VerifyingKey::from_sec1_bytes(key_data) {
            return Cow::Owned(point.to_encoded_point(true).as_bytes().to_vec());
        }
    }
    Cow::Borrowed(key_data)
}

/// Compute the hash identifying a typed key, over its canonical encoding
pub fn key_hash(key_type: KeyType, key_data: &[u8]) -> KeyHash {
    KeyHash(Hash::tagged(
        &[key_type.tag()],
        &canonical_key_data(key_type, key_data),
    ))
}

#[derive(Serialize)]
struct ChallengeKey {
    key_type: KeyType,
    key_data: String,
}

#[derive(Serialize)]
struct OwnershipChallenge<'a> {
    purpose: &'static str,
    domain_id: u64,
    owner: &'a AccountId,
    did: &'a str,
    key: ChallengeKey,
}

/// The message a key must sign to prove possession
pub fn ownership_challenge(
    domain_id: u64,
    owner: &AccountId,
    did: &str,
    key_type: KeyType,
    key_data: &[u8],
) -> Result<Hash, RegistryError> {
    Ok(Hash::canonical(&OwnershipChallenge {
        purpose: OWNERSHIP_PURPOSE,
        domain_id,
        owner,
        did,
        key: ChallengeKey {
            key_type,
            key_data: hex::encode(key_data),
        },
    })?)
}

impl AgentKey {
    pub fn hash(&self) -> KeyHash {
        key_hash(self.key_type, &self.key_data)
    }

    pub fn canonical_data(&self) -> Cow<'_, [u8]> {
        canonical_key_data(self.key_type, &self.key_data)
    }

    /// An Ed25519 key with its ownership proof
    pub fn signed_ed25519(
        signing_key: &ed25519_dalek::SigningKey,
        domain_id: u64,
        owner: &AccountId,
        did: &str,
    ) -> Result<Self, RegistryError> {
        use ed25519_dalek::Signer;

        let key_data = signing_key.verifying_key().to_bytes().to_vec();
        let challenge = ownership_challenge(domain_id, owner, did, KeyType::Ed25519, &key_data)?;
        let signature = signing_key.sign(challenge.as_bytes());
        Ok(Self {
            key_type: KeyType::Ed25519,
            key_data,
            signature: Some(signature.to_bytes().to_vec()),
        })
    }

    /// A compressed secp256k1 key with its ownership proof
    pub fn signed_ecdsa(
        signing_key: &k256::ecdsa::SigningKey,
        domain_id: u64,
        owner: &AccountId,
        did: &str,
    ) -> Result<Self, RegistryError> {
        use k256::ecdsa::signature::Signer;

        let key_data = signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        let challenge = ownership_challenge(domain_id, owner, did, KeyType::Ecdsa, &key_data)?;
        let signature: k256::ecdsa::Signature = signing_key.sign(challenge.as_bytes());
        Ok(Self {
            key_type: KeyType::Ecdsa,
            key_data,
            signature: Some(signature.to_bytes().to_vec()),
        })
    }

    /// An X25519 key-exchange public key
    pub fn x25519(public: [u8; 32]) -> Self {
        Self {
            key_type: KeyType::X25519,
            key_data: public.to_vec(),
            signature: None,
        }
    }

    /// Check the key format and, for signing keys, the ownership proof
    pub fn verify(&self, domain_id: u64, owner: &AccountId, did: &str) -> Result<(), RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidKey {
            key_type: self.key_type,
            reason: reason.to_string(),
        };

        match self.key_type {
            KeyType::X25519 => {
                if self.key_data.len() != 32 {
                    return Err(invalid("expected 32 bytes"));
                }
                if self.key_data.iter().all(|b| *b == 0) {
                    return Err(invalid("all-zero public key"));
                }
                if self.signature.is_some() {
                    return Err(invalid("key-exchange keys carry no signature"));
                }
                Ok(())
            }
            KeyType::Ed25519 => {
                let bytes: [u8; 32] = self
                    .key_data
                    .as_slice()
                    .try_into()
                    .map_err(|_| invalid("expected 32 bytes"))?;
                let verifying_key =
                    ed25519_dalek::VerifyingKey::from_bytes(&bytes).map_err(|e| invalid(&e.to_string()))?;

                let sig_array: [u8; 64] = self
                    .signature
                    .as_deref()
                    .and_then(|s| s.try_into().ok())
                    .ok_or(RegistryError::InvalidOwnershipProof(self.hash()))?;
                let signature = ed25519_dalek::Signature::from_bytes(&sig_array);

                let challenge = ownership_challenge(domain_id, owner, did, self.key_type, &self.key_data)?;
                verifying_key
                    .verify_strict(challenge.as_bytes(), &signature)
                    .map_err(|_| RegistryError::InvalidOwnershipProof(self.hash()))
            }
            KeyType::Ecdsa => {
                use k256::ecdsa::signature::Verifier;

                if self.key_data.len() != 33 && self.key_data.len() != 65 {
                    return Err(invalid("expected a 33- or 65-byte SEC1 encoding"));
                }
                let verifying_key = k256::ecdsa::VerifyingKey::from_sec1_bytes(&self.key_data)
                    .map_err(|_| invalid("not a point on secp256k1"))?;

                let signature = self
                    .signature
                    .as_deref()
                    .filter(|s| s.len() == 64)
                    .and_then(|s| k256::ecdsa::Signature::from_slice(s).ok())
                    .ok_or(RegistryError::InvalidOwnershipProof(self.hash()))?;

                let challenge = ownership_challenge(domain_id, owner, did, self.key_type, &self.key_data)?;
                verifying_key
                    .verify(challenge.as_bytes(), &signature)
                    .map_err(|_| RegistryError::InvalidOwnershipProof(self.hash()))
            }
        }
    }
}
