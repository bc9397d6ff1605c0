//! Commit-reveal soundness: a reveal succeeds exactly when the plaintext,
//! salt and timing all match the stored commitment.

use proptest::prelude::*;
use serde::Serialize;
use sigil_admission::{AdmissionError, CommitRevealController, CommitmentScope, Salt};
use sigil_core::{AccountId, AdmissionConfig};

#[derive(Debug, Clone, Serialize)]
struct Params {
    did: String,
    key: Vec<u8>,
}

fn params() -> impl Strategy<Value = Params> {
    ("did:[a-z]{1,12}:[0-9]{1,4}", prop::collection::vec(any::<u8>(), 1..40))
        .prop_map(|(did, key)| Params { did, key })
}

fn accept(_: &Params, _: &sigil_admission::Commitment) -> Result<(), AdmissionError> {
    Ok(())
}

proptest! {
    #[test]
    fn prop_exact_plaintext_inside_window_succeeds(
        p in params(),
        salt in any::<[u8; 32]>(),
        committed_at in 0u64..1_000_000,
        offset in 60u64..=3_600,
    ) {
        let alice = AccountId::from("alice");
        let mut c = CommitRevealController::new(CommitmentScope::Registration, 5, AdmissionConfig::default());
        let salt = Salt(salt);
        let hash = c.hash_for(&p, &alice, &salt).unwrap();
        c.commit(&alice, hash, committed_at).unwrap();

        prop_assert!(c.reveal(&alice, &p, &salt, committed_at + offset, accept).is_ok());
        prop_assert!(c.commitment(&alice).unwrap().revealed);
    }

    #[test]
    fn prop_any_mismatch_is_rejected_without_state_change(
        p in params(),
        salt in any::<[u8; 32]>(),
        flip in 0usize..3,
    ) {
        let alice = AccountId::from("alice");
        let mut c = CommitRevealController::new(CommitmentScope::Registration, 5, AdmissionConfig::default());
        let good_salt = Salt(salt);
        let hash = c.hash_for(&p, &alice, &good_salt).unwrap();
        c.commit(&alice, hash, 0).unwrap();

        let mut bad = p.clone();
        let mut bad_salt = good_salt;
        match flip {
            0 => bad.did.push('x'),
            1 => bad.key[0] ^= 0x01,
            _ => bad_salt.0[31] ^= 0x01,
        }

        prop_assert_eq!(
            c.reveal(&alice, &bad, &bad_salt, 120, accept),
            Err(AdmissionError::InvalidReveal)
        );
        prop_assert!(!c.commitment(&alice).unwrap().revealed);
    }

    #[test]
    fn prop_timing_outside_window_is_rejected(
        p in params(),
        early in 0u64..60,
        late in 3_601u64..100_000,
    ) {
        let alice = AccountId::from("alice");
        let mut c = CommitRevealController::new(CommitmentScope::Registration, 5, AdmissionConfig::default());
        let salt = Salt([7; 32]);
        let hash = c.hash_for(&p, &alice, &salt).unwrap();
        c.commit(&alice, hash, 1_000).unwrap();

        let too_soon = matches!(
            c.reveal(&alice, &p, &salt, 1_000 + early, accept),
            Err(AdmissionError::RevealTooSoon { .. })
        );
        prop_assert!(too_soon);
        let too_late = matches!(
            c.reveal(&alice, &p, &salt, 1_000 + late, accept),
            Err(AdmissionError::RevealTooLate { .. })
        );
        prop_assert!(too_late);
        prop_assert!(!c.commitment(&alice).unwrap().revealed);
    }

    #[test]
    fn prop_other_committer_cannot_reveal(p in params()) {
        let alice = AccountId::from("alice");
        let mallory = AccountId::from("mallory");
        let mut c = CommitRevealController::new(CommitmentScope::Registration, 5, AdmissionConfig::default());
        let salt = Salt([9; 32]);

        // Mallory copies Alice's published hash into her own slot
        let hash = c.hash_for(&p, &alice, &salt).unwrap();
        c.commit(&alice, hash, 0).unwrap();
        c.commit(&mallory, hash, 0).unwrap();

        prop_assert_eq!(
            c.reveal(&mallory, &p, &salt, 120, accept),
            Err(AdmissionError::InvalidReveal)
        );
        prop_assert!(c.reveal(&alice, &p, &salt, 120, accept).is_ok());
    }
}
