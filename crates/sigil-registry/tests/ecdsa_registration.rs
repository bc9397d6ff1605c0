//! Registration with secp256k1 keys, compressed and uncompressed

use sigil_core::{AccountId, GuardConfig, RegistryConfig};
use sigil_registry::{
    AgentKey, AgentMetadata, AgentStatus, IdentityRegistry, KeyType, RegistrationParams, RegistryError,
};

const DOMAIN: u64 = 11;

fn signing_key() -> k256::ecdsa::SigningKey {
    k256::ecdsa::SigningKey::from_slice(&[3u8; 32]).unwrap()
}

/// The key in uncompressed SEC1 form with a proof over those bytes
fn uncompressed_key(sk: &k256::ecdsa::SigningKey, owner: &AccountId, did: &str) -> AgentKey {
    use k256::ecdsa::signature::Signer;

    let key_data = sk.verifying_key().to_encoded_point(false).as_bytes().to_vec();
    let challenge = sigil_registry::ownership_challenge(DOMAIN, owner, did, KeyType::Ecdsa, &key_data).unwrap();
    let signature: k256::ecdsa::Signature = sk.sign(challenge.as_bytes());
    AgentKey {
        key_type: KeyType::Ecdsa,
        key_data,
        signature: Some(signature.to_bytes().to_vec()),
    }
}

fn single_key(did: &str, key: AgentKey) -> RegistrationParams {
    RegistrationParams {
        did: did.into(),
        metadata: AgentMetadata::default(),
        keys: vec![key],
    }
}

#[test]
fn test_registers_with_compressed_ecdsa_key() {
    let owner = AccountId::from("operator");
    let did = "did:sigil:ecdsa-agent";
    let params = RegistrationParams {
        did: did.into(),
        metadata: AgentMetadata {
            name: "ecdsa agent".into(),
            endpoint: "https://agent.example/api".into(),
            ..Default::default()
        },
        keys: vec![AgentKey::signed_ecdsa(&signing_key(), DOMAIN, &owner, did).unwrap()],
    };

    let mut registry = IdentityRegistry::new(DOMAIN, RegistryConfig::default(), GuardConfig::default());
    let record = registry.register(&owner, &params, 0).unwrap();
    assert_eq!(record.keys[0].key_type, KeyType::Ecdsa);
    assert_eq!(record.keys[0].key_data.len(), 33);
}

#[test]
fn test_registers_with_uncompressed_ecdsa_key() {
    let owner = AccountId::from("operator");
    let did = "did:sigil:uncompressed";
    let sk = signing_key();
    let key = uncompressed_key(&sk, &owner, did);
    assert_eq!(key.key_data.len(), 65);

    let params = single_key(did, key);
    let mut registry = IdentityRegistry::new(DOMAIN, RegistryConfig::default(), GuardConfig::default());
    let record = registry.register(&owner, &params, 0).unwrap();
    // Stored in compressed form
    assert_eq!(record.keys[0].key_data, sk.verifying_key().to_encoded_point(true).as_bytes());
}

#[test]
fn test_revocation_covers_both_encodings() {
    let owner = AccountId::from("operator");
    let sk = signing_key();
    let compressed = AgentKey::signed_ecdsa(&sk, DOMAIN, &owner, "did:sigil:a").unwrap();
    let uncompressed = uncompressed_key(&sk, &owner, "did:sigil:b");
    assert_eq!(compressed.hash(), uncompressed.hash());

    let mut registry = IdentityRegistry::new(DOMAIN, RegistryConfig::default(), GuardConfig::default());
    let a = registry.register(&owner, &single_key("did:sigil:a", compressed.clone()), 0).unwrap().id;
    let b = registry.register(&owner, &single_key("did:sigil:b", uncompressed), 0).unwrap().id;

    let revoked = registry.revoke_key(&owner, &compressed.hash(), 100).unwrap();
    assert_eq!(revoked.len(), 2);
    assert_eq!(registry.get(&a).unwrap().status, AgentStatus::Revoked);
    assert_eq!(registry.get(&b).unwrap().status, AgentStatus::Revoked);

    // Neither encoding can back a new registration
    let again = uncompressed_key(&sk, &owner, "did:sigil:c");
    assert_eq!(
        registry.register(&owner, &single_key("did:sigil:c", again), 200).unwrap_err(),
        RegistryError::RevokedKey(compressed.hash())
    );
    let again = AgentKey::signed_ecdsa(&sk, DOMAIN, &owner, "did:sigil:d").unwrap();
    assert_eq!(
        registry.register(&owner, &single_key("did:sigil:d", again), 200).unwrap_err(),
        RegistryError::RevokedKey(compressed.hash())
    );
}

#[test]
fn test_rejects_same_key_in_two_encodings() {
    let owner = AccountId::from("operator");
    let did = "did:sigil:doubled";
    let sk = signing_key();
    let params = RegistrationParams {
        did: did.into(),
        metadata: AgentMetadata::default(),
        keys: vec![
            AgentKey::signed_ecdsa(&sk, DOMAIN, &owner, did).unwrap(),
            uncompressed_key(&sk, &owner, did),
        ],
    };

    let mut registry = IdentityRegistry::new(DOMAIN, RegistryConfig::default(), GuardConfig::default());
    assert!(matches!(
        registry.register(&owner, &params, 0),
        Err(RegistryError::DuplicateKey(_))
    ));
}

#[test]
fn test_rejects_signature_from_another_key() {
    use k256::ecdsa::signature::Signer;

    let owner = AccountId::from("operator");
    let did = "did:sigil:forged";
    let victim = signing_key();
    let attacker = k256::ecdsa::SigningKey::from_slice(&[4u8; 32]).unwrap();

    let key_data = victim.verifying_key().to_encoded_point(true).as_bytes().to_vec();
    let challenge = sigil_registry::ownership_challenge(DOMAIN, &owner, did, KeyType::Ecdsa, &key_data).unwrap();
    let signature: k256::ecdsa::Signature = attacker.sign(challenge.as_bytes());

    let params = RegistrationParams {
        did: did.into(),
        metadata: AgentMetadata::default(),
        keys: vec![AgentKey {
            key_type: KeyType::Ecdsa,
            key_data,
            signature: Some(signature.to_bytes().to_vec()),
        }],
    };
    let mut registry = IdentityRegistry::new(DOMAIN, RegistryConfig::default(), GuardConfig::default());
    assert!(matches!(
        registry.register(&owner, &params, 0),
        Err(RegistryError::InvalidOwnershipProof(_))
    ));
}
