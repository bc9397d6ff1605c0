//! Trust host
//!
//! [`TrustHost`] owns every component and runs one transition at a time.
//! Each transition checks first, applies its ledger batch in a single
//! [`EscrowLedger::apply`], then mutates component state and emits its
//! events. A transition that fails anywhere before the ledger commit leaves
//! nothing behind.

use serde::{Deserialize, Serialize};
use sigil_admission::{
    CommitRevealController, Commitment, Salt, TaskAuthorization, TaskAuthorizationParams, TaskAuthorizationStore,
};
use sigil_consensus::{
    AgentValidationSummary, RequestParams, Settlement, SubmissionOutcome, TrustedKeyOracle, ValidationEngine,
    ValidationRequest, ValidationResponse, ValidatorAccount,
};
use sigil_core::{
    AccountId, AgentId, Amount, CommitmentScope, EventLog, Hash, KeyHash, Page, ProtocolConfig, ProtocolEvent,
    RequestId, TaskId, Timestamp,
};
use sigil_ledger::{EscrowKey, EscrowLedger, LedgerOp, LedgerTotals, ValueTransfer};
use sigil_registry::{AgentMetadata, AgentRecord, AgentStatus, IdentityRegistry, RegistrationParams, Revocation};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::HostError;

/// Escrow holding the stake attached to a registration commitment
fn commitment_escrow(commitment: &Commitment) -> EscrowKey {
    EscrowKey::Commitment {
        committer: commitment.committer.clone(),
        hash: commitment.hash,
        committed_at: commitment.committed_at,
    }
}

/// Host-wide counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStatus {
    pub version: u64,
    pub domain_id: u64,
    pub governor: AccountId,
    pub agents: usize,
    pub open_escrows: usize,
    pub totals: LedgerTotals,
    pub events: usize,
    pub head: Option<Hash>,
}

/// The deterministic state-transition host
pub struct TrustHost {
    config: ProtocolConfig,
    registrations: CommitRevealController,
    task_commitments: CommitRevealController,
    registry: IdentityRegistry,
    tasks: TaskAuthorizationStore,
    engine: ValidationEngine,
    ledger: EscrowLedger,
    events: EventLog,
    /// Registration stakes still held for pending agents
    agent_escrows: HashMap<AgentId, EscrowKey>,
    last_seen: Timestamp,
}

impl std::fmt::Debug for TrustHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustHost")
            .field("version", &self.config.version)
            .field("domain_id", &self.config.domain_id)
            .field("agents", &self.registry.len())
            .field("events", &self.events.len())
            .finish()
    }
}

impl TrustHost {
    /// Create a host from a validated configuration
    pub fn new(config: ProtocolConfig, oracle: Arc<dyn TrustedKeyOracle>) -> Result<Self, HostError> {
        config.validate()?;
        let ledger = EscrowLedger::new();

        tracing::info!(
            domain_id = config.domain_id,
            version = config.version,
            governor = %config.governor,
            "trust host initialized"
        );

        Ok(Self {
            registrations: CommitRevealController::new(
                CommitmentScope::Registration,
                config.domain_id,
                config.admission,
            ),
            task_commitments: CommitRevealController::new(
                CommitmentScope::TaskAuthorization,
                config.domain_id,
                config.admission,
            ),
            registry: IdentityRegistry::new(config.domain_id, config.registry, config.guard),
            tasks: TaskAuthorizationStore::new(),
            engine: ValidationEngine::new(
                config.domain_id,
                config.consensus,
                config.guard,
                ledger.clone(),
                oracle,
            ),
            ledger,
            events: EventLog::new(),
            agent_escrows: HashMap::new(),
            last_seen: 0,
            config,
        })
    }

    fn emit(&mut self, now: Timestamp, event: ProtocolEvent) {
        self.last_seen = self.last_seen.max(now);
        self.events.emit(now, event);
        metrics::counter!("sigil_events_total").increment(1);
    }

    // === Admission and identity ===

    /// Commit to a registration, attaching `value` as registration stake.
    ///
    /// A stale, unrevealed commitment of the same caller is replaced and its
    /// stake refunded in the same batch.
    pub fn commit_registration(
        &mut self,
        caller: &AccountId,
        hash: Hash,
        value: Amount,
        now: Timestamp,
    ) -> Result<(), HostError> {
        let required = self.config.registry.registration_stake;
        if value < required {
            return Err(HostError::InsufficientStake {
                required,
                offered: value,
            });
        }

        let stale = self
            .registrations
            .check_commit(caller, now)?
            .filter(|c| !c.revealed)
            .map(|c| (c.hash, commitment_escrow(c)));

        let mut ops = Vec::with_capacity(2);
        let mut refund = None;
        if let Some((stale_hash, key)) = &stale {
            if let Some((op, amount)) = self.ledger.release_op(key, caller) {
                ops.push(op);
                refund = Some((*stale_hash, amount));
            }
        }
        if value > 0 {
            ops.push(LedgerOp::Deposit {
                key: EscrowKey::Commitment {
                    committer: caller.clone(),
                    hash,
                    committed_at: now,
                },
                amount: value,
            });
        }
        self.ledger.apply(&ops)?;
        self.registrations.commit(caller, hash, now)?;

        if let Some((commitment, refunded)) = refund {
            self.emit(
                now,
                ProtocolEvent::CommitmentReclaimed {
                    committer: caller.clone(),
                    commitment,
                    refunded,
                },
            );
        }
        self.emit(
            now,
            ProtocolEvent::Committed {
                scope: CommitmentScope::Registration,
                committer: caller.clone(),
                commitment: hash,
                stake: value,
            },
        );
        Ok(())
    }

    /// Reveal a registration commitment and store the pending agent
    pub fn reveal_registration(
        &mut self,
        caller: &AccountId,
        params: &RegistrationParams,
        salt: &Salt,
        now: Timestamp,
    ) -> Result<AgentId, HostError> {
        let registry = &mut self.registry;
        let (agent_id, unlock_at, commitment, key) =
            self.registrations
                .reveal(caller, params, salt, now, |params, commitment| -> Result<_, HostError> {
                    let record = registry.register(caller, params, now)?;
                    Ok((record.id, record.unlock_at, commitment.hash, commitment_escrow(commitment)))
                })?;

        // The stake stays escrowed until activation or revocation
        if self.ledger.escrowed(&key).is_some() {
            self.agent_escrows.insert(agent_id, key);
        }

        self.emit(
            now,
            ProtocolEvent::Revealed {
                scope: CommitmentScope::Registration,
                committer: caller.clone(),
                commitment,
            },
        );
        self.emit(
            now,
            ProtocolEvent::AgentRegistered {
                agent_id,
                did: params.did.clone(),
                owner: caller.clone(),
                unlock_at,
            },
        );
        Ok(agent_id)
    }

    /// Activate a pending agent once its time-lock elapsed, returning its stake to the owner
    pub fn activate_agent(&mut self, caller: &AccountId, agent_id: &AgentId, now: Timestamp) -> Result<Amount, HostError> {
        self.registry.check_activate(caller, agent_id, now)?;

        let release = self
            .agent_escrows
            .get(agent_id)
            .and_then(|key| self.ledger.release_op(key, caller));
        let mut refunded = 0;
        if let Some((op, amount)) = release {
            self.ledger.apply(&[op])?;
            refunded = amount;
        }
        self.registry.activate(caller, agent_id, now)?;
        self.agent_escrows.remove(agent_id);

        self.emit(
            now,
            ProtocolEvent::AgentActivated {
                agent_id: *agent_id,
                owner: caller.clone(),
            },
        );
        Ok(refunded)
    }

    /// Revoke one of the caller's keys, cascading to every record carrying it.
    ///
    /// Pending records lose their activation path, so their stakes go back to
    /// the owner.
    pub fn revoke_key(&mut self, caller: &AccountId, key_hash: &KeyHash, now: Timestamp) -> Result<Vec<Revocation>, HostError> {
        let preview = self.registry.check_revoke(caller, key_hash)?;
        let ops: Vec<LedgerOp> = preview
            .iter()
            .filter(|r| r.previous == AgentStatus::Pending)
            .filter_map(|r| self.agent_escrows.get(&r.agent_id))
            .filter_map(|key| self.ledger.release_op(key, caller))
            .map(|(op, _)| op)
            .collect();
        self.ledger.apply(&ops)?;

        let revoked = self.registry.revoke_key(caller, key_hash, now)?;
        for revocation in &revoked {
            self.agent_escrows.remove(&revocation.agent_id);
        }

        self.emit(
            now,
            ProtocolEvent::KeyRevoked {
                owner: caller.clone(),
                key_hash: *key_hash,
                affected: revoked.len(),
            },
        );
        for revocation in &revoked {
            self.emit(
                now,
                ProtocolEvent::AgentRevoked {
                    agent_id: revocation.agent_id,
                    key_hash: *key_hash,
                },
            );
        }
        Ok(revoked)
    }

    /// Replace an active agent's metadata, returning the new nonce
    pub fn update_agent(
        &mut self,
        caller: &AccountId,
        agent_id: &AgentId,
        metadata: AgentMetadata,
        now: Timestamp,
    ) -> Result<u64, HostError> {
        let nonce = self.registry.update_metadata(caller, agent_id, metadata, now)?;
        self.emit(
            now,
            ProtocolEvent::AgentUpdated {
                agent_id: *agent_id,
                nonce,
            },
        );
        Ok(nonce)
    }

    pub fn deactivate_agent(&mut self, caller: &AccountId, agent_id: &AgentId, now: Timestamp) -> Result<(), HostError> {
        self.registry.deactivate(caller, agent_id, now)?;
        self.emit(now, ProtocolEvent::AgentDeactivated { agent_id: *agent_id });
        Ok(())
    }

    /// Drop an expired, unrevealed registration commitment and refund its stake
    pub fn reclaim_commitment(&mut self, caller: &AccountId, now: Timestamp) -> Result<Amount, HostError> {
        let commitment = self.registrations.check_expired(caller, now)?;
        let hash = commitment.hash;
        let key = commitment_escrow(commitment);

        let mut refunded = 0;
        if let Some((op, amount)) = self.ledger.release_op(&key, caller) {
            self.ledger.apply(&[op])?;
            refunded = amount;
        }
        self.registrations.take_expired(caller, now)?;

        self.emit(
            now,
            ProtocolEvent::CommitmentReclaimed {
                committer: caller.clone(),
                commitment: hash,
                refunded,
            },
        );
        Ok(refunded)
    }

    pub fn commit_task_authorization(&mut self, caller: &AccountId, hash: Hash, now: Timestamp) -> Result<(), HostError> {
        self.task_commitments.commit(caller, hash, now)?;
        self.emit(
            now,
            ProtocolEvent::Committed {
                scope: CommitmentScope::TaskAuthorization,
                committer: caller.clone(),
                commitment: hash,
                stake: 0,
            },
        );
        Ok(())
    }

    /// Reveal a task-authorization commitment; the target agent must be active
    pub fn reveal_task_authorization(
        &mut self,
        caller: &AccountId,
        params: &TaskAuthorizationParams,
        salt: &Salt,
        now: Timestamp,
    ) -> Result<TaskAuthorization, HostError> {
        let tasks = &mut self.tasks;
        let registry = &self.registry;
        let (authorization, commitment) =
            self.task_commitments
                .reveal(caller, params, salt, now, |params, commitment| -> Result<_, HostError> {
                    Ok((tasks.authorize(caller, params, now, registry)?, commitment.hash))
                })?;

        self.emit(
            now,
            ProtocolEvent::Revealed {
                scope: CommitmentScope::TaskAuthorization,
                committer: caller.clone(),
                commitment,
            },
        );
        self.emit(
            now,
            ProtocolEvent::TaskAuthorized {
                task_id: authorization.task_id,
                agent_id: authorization.agent_id,
                authorizer: caller.clone(),
                expires_at: authorization.expires_at,
            },
        );
        Ok(authorization)
    }

    // === Validation ===

    pub fn request_validation(
        &mut self,
        caller: &AccountId,
        params: RequestParams,
        now: Timestamp,
    ) -> Result<RequestId, HostError> {
        let request = self.engine.request_validation(caller, params, now, &self.registry)?;
        let request_id = request.id;
        let event = ProtocolEvent::ValidationRequested {
            request_id,
            task_id: request.task_id,
            requester: caller.clone(),
            target_agent: request.target_agent,
            stake: request.stake,
            deadline: request.deadline,
        };
        self.emit(now, event);
        Ok(request_id)
    }

    pub fn submit_stake_validation(
        &mut self,
        caller: &AccountId,
        request_id: &RequestId,
        computed_hash: Hash,
        proof: Vec<u8>,
        stake: Amount,
        now: Timestamp,
    ) -> Result<SubmissionOutcome, HostError> {
        let outcome = self
            .engine
            .submit_stake_validation(caller, request_id, computed_hash, proof, stake, now)?;

        self.emit(
            now,
            ProtocolEvent::ValidationResponded {
                request_id: *request_id,
                response_id: outcome.response_id,
                validator: caller.clone(),
                agrees: outcome.agrees,
                stake,
            },
        );
        if let Some(settlement) = &outcome.settlement {
            self.emit(
                now,
                ProtocolEvent::ValidationFinalized {
                    request_id: *request_id,
                    status: settlement.status,
                    settled: settlement.total,
                },
            );
        }
        Ok(outcome)
    }

    pub fn submit_tee_attestation(
        &mut self,
        caller: &AccountId,
        request_id: &RequestId,
        attestation: &[u8],
        proof: &[u8],
        now: Timestamp,
    ) -> Result<Settlement, HostError> {
        let settlement = self
            .engine
            .submit_tee_attestation(caller, request_id, attestation, proof, now)?;
        self.emit(
            now,
            ProtocolEvent::ValidationFinalized {
                request_id: *request_id,
                status: settlement.status,
                settled: settlement.total,
            },
        );
        Ok(settlement)
    }

    pub fn finalize_expired(
        &mut self,
        caller: &AccountId,
        request_id: &RequestId,
        now: Timestamp,
    ) -> Result<Settlement, HostError> {
        let settlement = self.engine.finalize_expired(caller, request_id, now)?;
        self.emit(
            now,
            ProtocolEvent::ValidationExpired {
                request_id: *request_id,
                status: settlement.status,
                refunded: settlement.total,
            },
        );
        Ok(settlement)
    }

    // === Ledger and governance ===

    /// Pull the caller's pending balance out through `transfer`
    pub fn withdraw(&mut self, caller: &AccountId, transfer: &dyn ValueTransfer) -> Result<Amount, HostError> {
        let amount = self.ledger.withdraw(caller, transfer)?;
        self.emit(
            self.last_seen,
            ProtocolEvent::Withdrawn {
                account: caller.clone(),
                amount,
            },
        );
        Ok(amount)
    }

    /// Install a new configuration version; governor only.
    ///
    /// The supplied `version` is ignored and replaced by the next version
    /// number. Returns the installed version.
    pub fn update_config(&mut self, caller: &AccountId, mut config: ProtocolConfig) -> Result<u64, HostError> {
        if caller != &self.config.governor {
            tracing::warn!(caller = %caller, "configuration update by non-governor rejected");
            return Err(HostError::NotGovernor(caller.clone()));
        }
        config.version = self.config.version + 1;
        config.validate()?;

        let domain_id = config.domain_id;
        self.registrations.reconfigure(domain_id, config.admission);
        self.task_commitments.reconfigure(domain_id, config.admission);
        self.registry.reconfigure(domain_id, config.registry, config.guard);
        self.engine.reconfigure(domain_id, config.consensus, config.guard);

        let version = config.version;
        let governor = config.governor.clone();
        self.config = config;

        tracing::info!(version, governor = %governor, "configuration updated");
        self.emit(self.last_seen, ProtocolEvent::ConfigUpdated { version, governor });
        Ok(version)
    }

    // === Queries ===

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn status(&self) -> HostStatus {
        HostStatus {
            version: self.config.version,
            domain_id: self.config.domain_id,
            governor: self.config.governor.clone(),
            agents: self.registry.len(),
            open_escrows: self.ledger.open_escrows(),
            totals: self.ledger.totals(),
            events: self.events.len(),
            head: self.events.head(),
        }
    }

    /// The commitment `committer` currently holds in `scope`
    pub fn commitment(&self, scope: CommitmentScope, committer: &AccountId) -> Option<&Commitment> {
        match scope {
            CommitmentScope::Registration => self.registrations.commitment(committer),
            CommitmentScope::TaskAuthorization => self.task_commitments.commitment(committer),
        }
    }

    pub fn agent(&self, agent_id: &AgentId) -> Option<&AgentRecord> {
        self.registry.get(agent_id)
    }

    pub fn agent_by_did(&self, did: &str) -> Option<&AgentRecord> {
        self.registry.get_by_did(did)
    }

    pub fn agents_by_owner(&self, owner: &AccountId, offset: usize, limit: usize) -> Result<Page<&AgentRecord>, HostError> {
        Ok(self.registry.records_by_owner(owner, offset, limit)?)
    }

    pub fn is_key_revoked(&self, owner: &AccountId, key_hash: &KeyHash) -> bool {
        self.registry.is_key_revoked(owner, key_hash)
    }

    pub fn task_authorization(&self, task_id: &TaskId) -> Option<&TaskAuthorization> {
        self.tasks.get(task_id)
    }

    pub fn is_task_authorized(&self, task_id: &TaskId, now: Timestamp) -> bool {
        self.tasks.is_authorized(task_id, now)
    }

    pub fn request(&self, request_id: &RequestId) -> Option<&ValidationRequest> {
        self.engine.request(request_id)
    }

    pub fn responses(
        &self,
        request_id: &RequestId,
        offset: usize,
        limit: usize,
    ) -> Result<Page<&ValidationResponse>, HostError> {
        Ok(self.engine.responses(request_id, offset, limit)?)
    }

    pub fn requests_for_agent(
        &self,
        agent_id: &AgentId,
        offset: usize,
        limit: usize,
    ) -> Result<Page<&ValidationRequest>, HostError> {
        Ok(self.engine.requests_for_agent(agent_id, offset, limit)?)
    }

    pub fn validator(&self, account: &AccountId) -> Option<&ValidatorAccount> {
        self.engine.validator(account)
    }

    pub fn agent_summary(&self, agent_id: &AgentId) -> AgentValidationSummary {
        self.engine.agent_summary(agent_id)
    }

    pub fn pending_balance(&self, account: &AccountId) -> Amount {
        self.ledger.pending_balance(account)
    }

    /// Shared handle to the escrow ledger
    pub fn ledger(&self) -> &EscrowLedger {
        &self.ledger
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }
}
