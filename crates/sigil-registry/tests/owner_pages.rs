//! Enumeration of an owner's agents

use proptest::prelude::*;
use sigil_core::{AccountId, GuardConfig, RegistryConfig};
use sigil_registry::{AgentKey, AgentMetadata, IdentityRegistry, RegistrationParams};

const DOMAIN: u64 = 4;

fn registry_with(owner: &AccountId, count: usize) -> (IdentityRegistry, Vec<String>) {
    let config = RegistryConfig {
        registrations_per_window: 1_000,
        max_agents_per_owner: 1_000,
        ..RegistryConfig::default()
    };
    let mut registry = IdentityRegistry::new(DOMAIN, config, GuardConfig::default());
    let mut dids = Vec::with_capacity(count);
    for i in 0..count {
        let did = format!("did:sigil:fleet:{}", i);
        let key = ed25519_dalek::SigningKey::from_bytes(&[i as u8 + 1; 32]);
        let params = RegistrationParams {
            did: did.clone(),
            metadata: AgentMetadata::default(),
            keys: vec![AgentKey::signed_ed25519(&key, DOMAIN, owner, &did).unwrap()],
        };
        registry.register(owner, &params, i as u64).unwrap();
        dids.push(did);
    }
    (registry, dids)
}

#[test]
fn test_pages_reject_oversized_limits() {
    let owner = AccountId::from("fleet-operator");
    let (registry, _) = registry_with(&owner, 3);
    assert!(registry.records_by_owner(&owner, 0, 101).is_err());
    assert!(registry.records_by_owner(&owner, 0, 0).is_err());

    // Nothing to enumerate means every offset is out of bounds
    assert!(registry.records_by_owner(&AccountId::from("nobody"), 0, 10).is_err());
    assert!(registry.records_by_owner(&owner, 3, 10).is_err());
}

proptest! {
    /// Walking the pages visits every record once, in registration order
    #[test]
    fn prop_pages_cover_registration_order(count in 1usize..40, limit in 1usize..=20) {
        let owner = AccountId::from("fleet-operator");
        let (registry, dids) = registry_with(&owner, count);

        let mut seen = Vec::new();
        let mut offset = Some(0);
        while let Some(at) = offset {
            let page = registry.records_by_owner(&owner, at, limit).unwrap();
            prop_assert!(page.items.len() <= limit);
            prop_assert_eq!(page.total_count, count);
            seen.extend(page.items.iter().map(|r| r.did.clone()));
            offset = page.next_offset();
        }
        prop_assert_eq!(seen, dids);
    }
}
