//! Commit-reveal admission controller
//!
//! A committer first publishes only `H(scope, params, committer, salt, domain)`.
//! After `min_reveal_delay` and before `max_reveal_delay` they reveal the
//! plaintext; the controller recomputes the hash and, on a match, hands the
//! params to the consuming component. An observer of the commit learns
//! nothing it could use to claim the same resource first.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sigil_core::{AccountId, AdmissionConfig, CommitmentScope, Hash, Timestamp};
use std::collections::HashMap;
use std::fmt;

use crate::error::AdmissionError;

/// 32 bytes of committer-chosen randomness
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Salt(pub [u8; 32]);

impl Salt {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print salts in full
        write!(f, "Salt({}..)", &self.to_hex()[..8])
    }
}

impl Serialize for Salt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Salt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Canonical commitment preimage
#[derive(Serialize)]
struct CommitmentPreimage<'a, P: Serialize> {
    scope: CommitmentScope,
    params: &'a P,
    committer: &'a AccountId,
    salt: &'a Salt,
    domain_id: u64,
}

/// Compute the commitment hash a client publishes before revealing `params`
pub fn commitment_hash<P: Serialize>(
    scope: CommitmentScope,
    params: &P,
    committer: &AccountId,
    salt: &Salt,
    domain_id: u64,
) -> Result<Hash, AdmissionError> {
    Ok(Hash::canonical(&CommitmentPreimage {
        scope,
        params,
        committer,
        salt,
        domain_id,
    })?)
}

/// A stored commitment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub committer: AccountId,
    pub hash: Hash,
    pub committed_at: Timestamp,
    pub revealed: bool,
    pub scope: CommitmentScope,
}

impl Commitment {
    /// Last instant a reveal is accepted
    pub fn expires_at(&self, config: &AdmissionConfig) -> Timestamp {
        self.committed_at.saturating_add(config.max_reveal_delay)
    }

    /// Unrevealed and still inside the reveal window
    pub fn is_live(&self, config: &AdmissionConfig, now: Timestamp) -> bool {
        !self.revealed && now <= self.expires_at(config)
    }
}

/// Commit-reveal state for one scope
#[derive(Debug, Clone)]
pub struct CommitRevealController {
    scope: CommitmentScope,
    domain_id: u64,
    config: AdmissionConfig,
    commitments: HashMap<AccountId, Commitment>,
}

impl CommitRevealController {
    pub fn new(scope: CommitmentScope, domain_id: u64, config: AdmissionConfig) -> Self {
        Self {
            scope,
            domain_id,
            config,
            commitments: HashMap::new(),
        }
    }

    pub fn scope(&self) -> CommitmentScope {
        self.scope
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Install a new configuration version
    pub fn reconfigure(&mut self, domain_id: u64, config: AdmissionConfig) {
        self.domain_id = domain_id;
        self.config = config;
    }

    /// Hash `params` the way this controller will check them on reveal
    pub fn hash_for<P: Serialize>(
        &self,
        params: &P,
        committer: &AccountId,
        salt: &Salt,
    ) -> Result<Hash, AdmissionError> {
        commitment_hash(self.scope, params, committer, salt, self.domain_id)
    }

    pub fn commitment(&self, committer: &AccountId) -> Option<&Commitment> {
        self.commitments.get(committer)
    }

    /// Check that `committer` may commit now.
    ///
    /// Returns the stale commitment a new one would replace, if any.
    pub fn check_commit(&self, committer: &AccountId, now: Timestamp) -> Result<Option<&Commitment>, AdmissionError> {
        match self.commitments.get(committer) {
            Some(existing) if existing.is_live(&self.config, now) => {
                Err(AdmissionError::AlreadyCommitted(committer.clone()))
            }
            other => Ok(other),
        }
    }

    /// Store a commitment, returning the stale one it replaced
    pub fn commit(
        &mut self,
        committer: &AccountId,
        hash: Hash,
        now: Timestamp,
    ) -> Result<Option<Commitment>, AdmissionError> {
        self.check_commit(committer, now)?;

        let replaced = self.commitments.insert(
            committer.clone(),
            Commitment {
                committer: committer.clone(),
                hash,
                committed_at: now,
                revealed: false,
                scope: self.scope,
            },
        );

        tracing::debug!(committer = %committer, scope = ?self.scope, commitment = %hash, "commitment stored");
        metrics::counter!("sigil_commitments_total").increment(1);
        Ok(replaced)
    }

    /// Run every reveal check without consuming the commitment
    pub fn check_reveal<P: Serialize>(
        &self,
        committer: &AccountId,
        params: &P,
        salt: &Salt,
        now: Timestamp,
    ) -> Result<&Commitment, AdmissionError> {
        let commitment = self
            .commitments
            .get(committer)
            .ok_or_else(|| AdmissionError::NoCommitmentFound(committer.clone()))?;

        if commitment.revealed {
            return Err(AdmissionError::CommitmentAlreadyRevealed(committer.clone()));
        }

        let earliest = commitment.committed_at.saturating_add(self.config.min_reveal_delay);
        if now < earliest {
            return Err(AdmissionError::RevealTooSoon { earliest, now });
        }

        let deadline = commitment.expires_at(&self.config);
        if now > deadline {
            return Err(AdmissionError::RevealTooLate { deadline, now });
        }

        if self.hash_for(params, committer, salt)? != commitment.hash {
            tracing::warn!(committer = %committer, scope = ?self.scope, "reveal does not match commitment");
            metrics::counter!("sigil_invalid_reveals_total").increment(1);
            return Err(AdmissionError::InvalidReveal);
        }

        Ok(commitment)
    }

    /// Reveal `params` and pass them to `consume`.
    ///
    /// The commitment is marked revealed only if `consume` succeeds, so a
    /// rejected registration leaves the commitment untouched.
    pub fn reveal<P, T, E, F>(
        &mut self,
        committer: &AccountId,
        params: &P,
        salt: &Salt,
        now: Timestamp,
        consume: F,
    ) -> Result<T, E>
    where
        P: Serialize,
        E: From<AdmissionError>,
        F: FnOnce(&P, &Commitment) -> Result<T, E>,
    {
        let commitment = self.check_reveal(committer, params, salt, now)?;
        let output = consume(params, commitment)?;

        if let Some(stored) = self.commitments.get_mut(committer) {
            stored.revealed = true;
        }

        tracing::debug!(committer = %committer, scope = ?self.scope, "commitment revealed");
        metrics::counter!("sigil_reveals_total").increment(1);
        Ok(output)
    }

    /// Check that the committer holds an unrevealed commitment whose window has closed
    pub fn check_expired(&self, committer: &AccountId, now: Timestamp) -> Result<&Commitment, AdmissionError> {
        let commitment = self
            .commitments
            .get(committer)
            .ok_or_else(|| AdmissionError::NoCommitmentFound(committer.clone()))?;

        if commitment.revealed {
            return Err(AdmissionError::CommitmentAlreadyRevealed(committer.clone()));
        }
        let expires_at = commitment.expires_at(&self.config);
        if now <= expires_at {
            return Err(AdmissionError::CommitmentStillLive {
                committer: committer.clone(),
                expires_at,
            });
        }
        Ok(commitment)
    }

    /// Remove an unrevealed commitment whose reveal window has closed
    pub fn take_expired(&mut self, committer: &AccountId, now: Timestamp) -> Result<Commitment, AdmissionError> {
        self.check_expired(committer, now)?;
        self.commitments
            .remove(committer)
            .ok_or_else(|| AdmissionError::NoCommitmentFound(committer.clone()))
    }

    pub fn len(&self) -> usize {
        self.commitments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commitments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Params {
        did: &'static str,
        key: &'static str,
    }

    const PARAMS: Params = Params {
        did: "agent:7",
        key: "ed25519:aa",
    };

    fn controller() -> CommitRevealController {
        CommitRevealController::new(CommitmentScope::Registration, 5, AdmissionConfig::default())
    }

    fn alice() -> AccountId {
        AccountId::from("alice")
    }

    fn salt() -> Salt {
        Salt([0xAB; 32])
    }

    fn committed(at: Timestamp) -> CommitRevealController {
        let mut c = controller();
        let hash = c.hash_for(&PARAMS, &alice(), &salt()).unwrap();
        c.commit(&alice(), hash, at).unwrap();
        c
    }

    fn ok(_: &Params, _: &Commitment) -> Result<(), AdmissionError> {
        Ok(())
    }

    #[test]
    fn test_reveal_window_scenario() {
        let at = 1_000;

        let mut c = committed(at);
        assert_eq!(
            c.reveal(&alice(), &PARAMS, &salt(), at + 10, ok),
            Err(AdmissionError::RevealTooSoon {
                earliest: at + 60,
                now: at + 10
            })
        );
        assert!(c.reveal(&alice(), &PARAMS, &salt(), at + 61, ok).is_ok());

        let mut late = committed(at);
        assert_eq!(
            late.reveal(&alice(), &PARAMS, &salt(), at + 3_601, ok),
            Err(AdmissionError::RevealTooLate {
                deadline: at + 3_600,
                now: at + 3_601
            })
        );
    }

    #[test]
    fn test_reveal_is_single_use() {
        let mut c = committed(0);
        c.reveal(&alice(), &PARAMS, &salt(), 100, ok).unwrap();
        assert_eq!(
            c.reveal(&alice(), &PARAMS, &salt(), 101, ok),
            Err(AdmissionError::CommitmentAlreadyRevealed(alice()))
        );
    }

    #[test]
    fn test_failed_consumer_keeps_commitment() {
        let mut c = committed(0);
        let rejected: Result<(), AdmissionError> =
            c.reveal(&alice(), &PARAMS, &salt(), 100, |_, _| Err(AdmissionError::InvalidReveal));
        assert!(rejected.is_err());
        assert!(!c.commitment(&alice()).unwrap().revealed);
        assert!(c.reveal(&alice(), &PARAMS, &salt(), 101, ok).is_ok());
    }

    #[test]
    fn test_one_live_commitment_per_committer() {
        let mut c = committed(0);
        assert_eq!(
            c.commit(&alice(), Hash::digest(b"other"), 10),
            Err(AdmissionError::AlreadyCommitted(alice()))
        );

        // After expiry the slot is reusable and the stale commitment is returned
        let replaced = c.commit(&alice(), Hash::digest(b"other"), 3_601).unwrap();
        assert_eq!(replaced.map(|r| r.committed_at), Some(0));
    }

    #[test]
    fn test_revealed_commitment_frees_slot() {
        let mut c = committed(0);
        c.reveal(&alice(), &PARAMS, &salt(), 60, ok).unwrap();
        assert!(c.commit(&alice(), Hash::digest(b"next"), 61).is_ok());
    }

    #[test]
    fn test_domain_binding() {
        let other = CommitRevealController::new(CommitmentScope::Registration, 6, AdmissionConfig::default());
        assert_ne!(
            controller().hash_for(&PARAMS, &alice(), &salt()).unwrap(),
            other.hash_for(&PARAMS, &alice(), &salt()).unwrap()
        );
    }

    #[test]
    fn test_scope_binding() {
        let hash = controller().hash_for(&PARAMS, &alice(), &salt()).unwrap();
        let mut tasks = CommitRevealController::new(CommitmentScope::TaskAuthorization, 5, AdmissionConfig::default());
        tasks.commit(&alice(), hash, 0).unwrap();
        assert_eq!(
            tasks.reveal(&alice(), &PARAMS, &salt(), 100, ok),
            Err(AdmissionError::InvalidReveal)
        );
    }

    #[test]
    fn test_take_expired() {
        let mut c = committed(0);
        assert_eq!(
            c.take_expired(&alice(), 3_600),
            Err(AdmissionError::CommitmentStillLive {
                committer: alice(),
                expires_at: 3_600
            })
        );
        assert_eq!(c.take_expired(&alice(), 3_601).unwrap().committed_at, 0);
        assert!(c.is_empty());
    }

    #[test]
    fn test_salt_hex_serde() {
        let json = serde_json::to_string(&salt()).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));
        let back: Salt = serde_json::from_str(&json).unwrap();
        assert_eq!(back, salt());
    }
}
