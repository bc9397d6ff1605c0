//! Identity registry
//!
//! Records live in an arena (`Vec<AgentRecord>`) addressed by index. Secondary
//! indexes map agent ids, owners and `(owner, key)` pairs to arena slots, so
//! revoking a key touches only the records that actually carry it.

use sigil_core::{
    AccountId, AgentDirectory, AgentId, GuardConfig, IterationGuard, KeyHash, Page, RegistryConfig, Timestamp,
};
use std::collections::{HashMap, HashSet};

use crate::error::RegistryError;
use crate::keys::AgentKey;
use crate::rate::RegistrationLimiter;
use crate::record::{validate_did, AgentMetadata, AgentRecord, AgentStatus, RegisteredKey, RegistrationParams};

/// A record affected by a key revocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revocation {
    pub agent_id: AgentId,
    /// Status before the cascade
    pub previous: AgentStatus,
}

/// Agent identities with multi-key ownership
#[derive(Debug, Clone)]
pub struct IdentityRegistry {
    domain_id: u64,
    config: RegistryConfig,
    guard: IterationGuard,
    records: Vec<AgentRecord>,
    by_id: HashMap<AgentId, usize>,
    by_owner: HashMap<AccountId, Vec<usize>>,
    by_owner_key: HashMap<(AccountId, KeyHash), Vec<usize>>,
    /// Revocations are scoped to the owner that issued them
    revoked_keys: HashSet<(AccountId, KeyHash)>,
    limiter: RegistrationLimiter,
}

impl IdentityRegistry {
    pub fn new(domain_id: u64, config: RegistryConfig, guard: GuardConfig) -> Self {
        Self {
            domain_id,
            config,
            guard: IterationGuard::new(guard),
            records: Vec::new(),
            by_id: HashMap::new(),
            by_owner: HashMap::new(),
            by_owner_key: HashMap::new(),
            revoked_keys: HashSet::new(),
            limiter: RegistrationLimiter::new(),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Install a new configuration version
    pub fn reconfigure(&mut self, domain_id: u64, config: RegistryConfig, guard: GuardConfig) {
        self.domain_id = domain_id;
        self.config = config;
        self.guard = IterationGuard::new(guard);
    }

    /// Run every registration check without mutating anything
    pub fn check_register(
        &self,
        owner: &AccountId,
        params: &RegistrationParams,
        now: Timestamp,
    ) -> Result<AgentId, RegistryError> {
        validate_did(&params.did, self.config.max_did_length)?;
        params.metadata.validate(&self.config)?;

        let agent_id = AgentId::from_did(&params.did);
        if self.by_id.contains_key(&agent_id) {
            return Err(RegistryError::DuplicateIdentity(agent_id));
        }

        let owned = self.by_owner.get(owner).map(Vec::len).unwrap_or(0);
        if owned >= self.config.max_agents_per_owner {
            return Err(RegistryError::TooManyAgents {
                owner: owner.clone(),
                max: self.config.max_agents_per_owner,
            });
        }
        self.limiter.check(
            owner,
            now,
            self.config.registrations_per_window,
            self.config.rate_window,
        )?;

        self.check_keys(owner, &params.did, &params.keys)?;
        Ok(agent_id)
    }

    fn check_keys(&self, owner: &AccountId, did: &str, keys: &[AgentKey]) -> Result<(), RegistryError> {
        if keys.is_empty() || keys.len() > self.config.max_keys_per_agent {
            return Err(RegistryError::KeyCount {
                max: self.config.max_keys_per_agent,
                actual: keys.len(),
            });
        }

        let mut seen = HashSet::with_capacity(keys.len());
        for key in keys {
            let hash = key.hash();
            if !seen.insert(hash) {
                return Err(RegistryError::DuplicateKey(hash));
            }
            if self.revoked_keys.contains(&(owner.clone(), hash)) {
                return Err(RegistryError::RevokedKey(hash));
            }
        }
        if !keys.iter().any(|k| k.key_type.is_signing()) {
            return Err(RegistryError::MissingSigningKey);
        }

        for key in keys {
            if let Err(e) = key.verify(self.domain_id, owner, did) {
                tracing::warn!(owner = %owner, did = %did, error = %e, "key rejected at registration");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Store a new pending record; the continuation of a successful reveal
    pub fn register(
        &mut self,
        owner: &AccountId,
        params: &RegistrationParams,
        now: Timestamp,
    ) -> Result<&AgentRecord, RegistryError> {
        let agent_id = self.check_register(owner, params, now)?;

        let keys: Vec<RegisteredKey> = params
            .keys
            .iter()
            .map(|k| RegisteredKey {
                key_type: k.key_type,
                key_hash: k.hash(),
                key_data: k.canonical_data().into_owned(),
                revoked: false,
            })
            .collect();

        let index = self.records.len();
        for key in &keys {
            self.by_owner_key
                .entry((owner.clone(), key.key_hash))
                .or_default()
                .push(index);
        }
        self.by_owner.entry(owner.clone()).or_default().push(index);
        self.by_id.insert(agent_id, index);
        self.limiter.record(owner, now, self.config.rate_window);

        self.records.push(AgentRecord {
            id: agent_id,
            did: params.did.clone(),
            owner: owner.clone(),
            metadata: params.metadata.clone(),
            keys,
            status: AgentStatus::Pending,
            registered_at: now,
            unlock_at: now.saturating_add(self.config.activation_delay),
            updated_at: now,
            nonce: 0,
        });

        tracing::debug!(agent_id = %agent_id, did = %params.did, owner = %owner, "agent registered");
        metrics::counter!("sigil_agents_registered_total").increment(1);
        Ok(&self.records[index])
    }

    fn owned(&self, caller: &AccountId, agent_id: &AgentId) -> Result<usize, RegistryError> {
        let index = *self
            .by_id
            .get(agent_id)
            .ok_or(RegistryError::AgentNotFound(*agent_id))?;
        if &self.records[index].owner != caller {
            return Err(RegistryError::NotOwner {
                agent_id: *agent_id,
                caller: caller.clone(),
            });
        }
        Ok(index)
    }

    fn owned_active(&self, caller: &AccountId, agent_id: &AgentId) -> Result<usize, RegistryError> {
        let index = self.owned(caller, agent_id)?;
        if !self.records[index].is_active() {
            return Err(RegistryError::AgentNotActive(*agent_id));
        }
        Ok(index)
    }

    /// Check that `caller` may activate the agent now
    pub fn check_activate(&self, caller: &AccountId, agent_id: &AgentId, now: Timestamp) -> Result<(), RegistryError> {
        let record = &self.records[self.owned(caller, agent_id)?];
        if record.status != AgentStatus::Pending {
            return Err(RegistryError::AgentNotPending(*agent_id));
        }
        if now < record.unlock_at {
            return Err(RegistryError::StillLocked {
                unlock_at: record.unlock_at,
                now,
            });
        }
        Ok(())
    }

    /// Move a pending record to active once its time-lock has elapsed
    pub fn activate(&mut self, caller: &AccountId, agent_id: &AgentId, now: Timestamp) -> Result<&AgentRecord, RegistryError> {
        self.check_activate(caller, agent_id, now)?;
        let index = self.by_id[agent_id];
        let record = &mut self.records[index];
        record.status = AgentStatus::Active;
        record.updated_at = now;

        tracing::debug!(agent_id = %agent_id, "agent activated");
        metrics::counter!("sigil_agents_activated_total").increment(1);
        Ok(&self.records[index])
    }

    /// Records a revocation of `key_hash` by `caller` would cascade to
    pub fn check_revoke(&self, caller: &AccountId, key_hash: &KeyHash) -> Result<Vec<Revocation>, RegistryError> {
        let indexes = self
            .by_owner_key
            .get(&(caller.clone(), *key_hash))
            .ok_or(RegistryError::KeyNotFound(*key_hash))?;
        Ok(indexes
            .iter()
            .map(|i| &self.records[*i])
            .filter(|r| matches!(r.status, AgentStatus::Pending | AgentStatus::Active))
            .map(|r| Revocation {
                agent_id: r.id,
                previous: r.status,
            })
            .collect())
    }

    /// Revoke a key and every record of the caller that carries it
    pub fn revoke_key(
        &mut self,
        caller: &AccountId,
        key_hash: &KeyHash,
        now: Timestamp,
    ) -> Result<Vec<Revocation>, RegistryError> {
        let indexes = self
            .by_owner_key
            .remove(&(caller.clone(), *key_hash))
            .ok_or(RegistryError::KeyNotFound(*key_hash))?;
        self.revoked_keys.insert((caller.clone(), *key_hash));

        let mut affected = Vec::new();
        for index in indexes {
            let record = &mut self.records[index];
            for key in record.keys.iter_mut().filter(|k| &k.key_hash == key_hash) {
                key.revoked = true;
            }
            if matches!(record.status, AgentStatus::Pending | AgentStatus::Active) {
                affected.push(Revocation {
                    agent_id: record.id,
                    previous: record.status,
                });
                record.status = AgentStatus::Revoked;
            }
            record.updated_at = now;
        }

        tracing::debug!(owner = %caller, key_hash = %key_hash, affected = affected.len(), "key revoked");
        metrics::counter!("sigil_keys_revoked_total").increment(1);
        Ok(affected)
    }

    pub fn check_update(
        &self,
        caller: &AccountId,
        agent_id: &AgentId,
        metadata: &AgentMetadata,
    ) -> Result<(), RegistryError> {
        self.owned_active(caller, agent_id)?;
        metadata.validate(&self.config)
    }

    /// Replace an active agent's metadata, returning the new nonce
    pub fn update_metadata(
        &mut self,
        caller: &AccountId,
        agent_id: &AgentId,
        metadata: AgentMetadata,
        now: Timestamp,
    ) -> Result<u64, RegistryError> {
        self.check_update(caller, agent_id, &metadata)?;
        let record = &mut self.records[self.by_id[agent_id]];
        record.metadata = metadata;
        record.nonce += 1;
        record.updated_at = now;
        Ok(record.nonce)
    }

    pub fn check_deactivate(&self, caller: &AccountId, agent_id: &AgentId) -> Result<(), RegistryError> {
        self.owned_active(caller, agent_id).map(|_| ())
    }

    /// Retire an active agent
    pub fn deactivate(&mut self, caller: &AccountId, agent_id: &AgentId, now: Timestamp) -> Result<(), RegistryError> {
        self.check_deactivate(caller, agent_id)?;
        let record = &mut self.records[self.by_id[agent_id]];
        record.status = AgentStatus::Deactivated;
        record.updated_at = now;
        tracing::debug!(agent_id = %agent_id, "agent deactivated");
        Ok(())
    }

    pub fn get(&self, agent_id: &AgentId) -> Option<&AgentRecord> {
        self.by_id.get(agent_id).map(|i| &self.records[*i])
    }

    pub fn get_by_did(&self, did: &str) -> Option<&AgentRecord> {
        self.get(&AgentId::from_did(did))
    }

    /// One page of an owner's records, in registration order
    pub fn records_by_owner(
        &self,
        owner: &AccountId,
        offset: usize,
        limit: usize,
    ) -> Result<Page<&AgentRecord>, RegistryError> {
        let indexes = self.by_owner.get(owner).map(Vec::as_slice).unwrap_or(&[]);
        let page = self.guard.page(indexes, offset, limit)?;
        Ok(page.map(|i| &self.records[*i]))
    }

    /// Whether `owner` has revoked the key
    pub fn is_key_revoked(&self, owner: &AccountId, key_hash: &KeyHash) -> bool {
        self.revoked_keys.contains(&(owner.clone(), *key_hash))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl AgentDirectory for IdentityRegistry {
    fn is_active(&self, agent_id: &AgentId) -> bool {
        self.get(agent_id).map(AgentRecord::is_active).unwrap_or(false)
    }

    fn owner_of(&self, agent_id: &AgentId) -> Option<AccountId> {
        self.get(agent_id).map(|r| r.owner.clone())
    }
}
