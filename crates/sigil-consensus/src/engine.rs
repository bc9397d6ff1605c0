//! Validation consensus engine
//!
//! Per-request state machine: `Pending -> {Validated | Failed | Disputed | Expired}`.
//!
//! Every transition follows the same shape: run all checks against current
//! state, compute the complete ledger batch (stake deposit plus settlement
//! when the submission decides the request), apply the batch atomically, and
//! only then update in-memory records. A rejected transition leaves both the
//! ledger and the engine untouched.

use sigil_core::{
    AccountId, AgentDirectory, AgentId, Amount, ConsensusConfig, GuardConfig, GuardError, Hash, IterationGuard,
    Page, RequestId, ResponseId, Timestamp, ValidationStatus,
};
use sigil_ledger::{EscrowKey, EscrowLedger, LedgerOp};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::ConsensusError;
use crate::oracle::TrustedKeyOracle;
use crate::request::{RequestParams, ValidationRequest, ValidationResponse};
use crate::settlement::{PayoutKind, Settlement};
use crate::tally::{Tally, Verdict};
use crate::validator::{AgentValidationSummary, ValidatorAccount};

/// Result of a stake submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub response_id: ResponseId,
    pub agrees: bool,
    pub tally: Tally,
    /// Present when this submission decided the request
    pub settlement: Option<Settlement>,
}

/// The stake-based and attestation-based validation engine
pub struct ValidationEngine {
    domain_id: u64,
    config: ConsensusConfig,
    guard: IterationGuard,
    ledger: EscrowLedger,
    oracle: Arc<dyn TrustedKeyOracle>,
    requests: HashMap<RequestId, ValidationRequest>,
    responses: HashMap<RequestId, Vec<ValidationResponse>>,
    responded: HashSet<(RequestId, AccountId)>,
    validators: HashMap<AccountId, ValidatorAccount>,
    by_agent: HashMap<AgentId, Vec<RequestId>>,
    summaries: HashMap<AgentId, AgentValidationSummary>,
    /// Attestations that already decided a request; each is good for one
    used_attestations: HashSet<Hash>,
    nonce: u64,
}

impl std::fmt::Debug for ValidationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationEngine")
            .field("domain_id", &self.domain_id)
            .field("requests", &self.requests.len())
            .field("validators", &self.validators.len())
            .finish()
    }
}

impl ValidationEngine {
    pub fn new(
        domain_id: u64,
        config: ConsensusConfig,
        guard: GuardConfig,
        ledger: EscrowLedger,
        oracle: Arc<dyn TrustedKeyOracle>,
    ) -> Self {
        Self {
            domain_id,
            config,
            guard: IterationGuard::new(guard),
            ledger,
            oracle,
            requests: HashMap::new(),
            responses: HashMap::new(),
            responded: HashSet::new(),
            validators: HashMap::new(),
            by_agent: HashMap::new(),
            summaries: HashMap::new(),
            used_attestations: HashSet::new(),
            nonce: 0,
        }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Install a new configuration version
    pub fn reconfigure(&mut self, domain_id: u64, config: ConsensusConfig, guard: GuardConfig) {
        self.domain_id = domain_id;
        self.config = config;
        self.guard = IterationGuard::new(guard);
    }

    fn pending_request(&self, request_id: &RequestId) -> Result<&ValidationRequest, ConsensusError> {
        let request = self
            .requests
            .get(request_id)
            .ok_or(ConsensusError::RequestNotFound(*request_id))?;
        if !request.is_pending() {
            return Err(ConsensusError::RequestNotPending {
                request_id: *request_id,
                status: request.status,
            });
        }
        Ok(request)
    }

    /// Open a validation request, escrowing the requester's stake
    pub fn request_validation(
        &mut self,
        requester: &AccountId,
        params: RequestParams,
        now: Timestamp,
        directory: &dyn AgentDirectory,
    ) -> Result<&ValidationRequest, ConsensusError> {
        if params.stake < self.config.min_request_stake {
            return Err(ConsensusError::InsufficientStake {
                required: self.config.min_request_stake,
                offered: params.stake,
            });
        }
        if !directory.is_active(&params.target_agent) {
            return Err(ConsensusError::AgentNotActive(params.target_agent));
        }

        let earliest = now.saturating_add(self.config.min_deadline);
        let latest = now.saturating_add(self.config.max_deadline);
        if params.deadline < earliest || params.deadline > latest {
            return Err(ConsensusError::InvalidDeadline {
                deadline: params.deadline,
                earliest,
                latest,
            });
        }

        let id = RequestId::derive(self.domain_id, requester, &params.task_id, self.nonce);
        self.ledger.deposit(EscrowKey::validation(id), params.stake)?;
        self.nonce += 1;

        let request = ValidationRequest {
            id,
            task_id: params.task_id,
            requester: requester.clone(),
            target_agent: params.target_agent,
            expected_hash: params.expected_hash,
            mode: params.mode,
            stake: params.stake,
            deadline: params.deadline,
            created_at: now,
            status: ValidationStatus::Pending,
            response_count: 0,
            validation_complete: false,
            finalized_at: None,
            attestation: None,
        };

        self.by_agent.entry(request.target_agent).or_default().push(id);
        self.summaries.entry(request.target_agent).or_default().record_request();
        self.responses.insert(id, Vec::new());

        tracing::debug!(request_id = %id, requester = %requester, mode = ?request.mode, "validation requested");
        metrics::counter!("sigil_validation_requests_total").increment(1);

        Ok(self.requests.entry(id).or_insert(request))
    }

    /// Submit a staked re-execution result
    pub fn submit_stake_validation(
        &mut self,
        validator: &AccountId,
        request_id: &RequestId,
        computed_hash: Hash,
        proof: Vec<u8>,
        stake: Amount,
        now: Timestamp,
    ) -> Result<SubmissionOutcome, ConsensusError> {
        let request = self.pending_request(request_id)?;
        if !request.mode.admits_stake() {
            return Err(ConsensusError::ModeMismatch(request.mode));
        }
        if now > request.deadline {
            return Err(ConsensusError::DeadlinePassed {
                deadline: request.deadline,
                now,
            });
        }
        if let Err(GuardError::CapacityReached { ceiling }) = self.guard.admit(request.response_count) {
            tracing::warn!(request_id = %request_id, validator = %validator, "response ceiling reached");
            return Err(ConsensusError::MaxValidatorsReached { ceiling });
        }
        if validator == &request.requester {
            return Err(ConsensusError::SelfValidation);
        }
        if self.responded.contains(&(*request_id, validator.clone())) {
            return Err(ConsensusError::DuplicateResponse(validator.clone()));
        }
        if stake < self.config.min_validator_stake {
            return Err(ConsensusError::InsufficientStake {
                required: self.config.min_validator_stake,
                offered: stake,
            });
        }

        let response = ValidationResponse {
            id: ResponseId::derive(request_id, validator),
            request_id: *request_id,
            validator: validator.clone(),
            agrees: computed_hash == request.expected_hash,
            computed_hash,
            proof,
            stake,
            submitted_at: now,
        };

        // Everything below is computed against the would-be response set
        let existing = self.responses.get(request_id).map(Vec::as_slice).unwrap_or(&[]);
        let mut candidate = Vec::with_capacity(existing.len() + 1);
        candidate.extend_from_slice(existing);
        candidate.push(response.clone());

        let tally = Tally::from_responses(&candidate);
        let status = if candidate.len() >= self.config.min_validators {
            tally.verdict(self.config.consensus_threshold_bps).status()
        } else {
            None
        };
        let settlement = status
            .map(|s| Settlement::decided(request, &candidate, s, self.config.validator_reward_bps))
            .transpose()?;

        let mut accounts = HashMap::new();
        let staked = self
            .validators
            .get(validator)
            .cloned()
            .unwrap_or_else(|| ValidatorAccount::new(validator.clone()))
            .staked(stake)?;
        accounts.insert(validator.clone(), staked);
        if let Some(settlement) = &settlement {
            self.stage_accounts(settlement, &mut accounts)?;
        }

        let key = EscrowKey::validation(*request_id);
        let mut ops = vec![LedgerOp::Deposit { key: key.clone(), amount: stake }];
        if let Some(settlement) = &settlement {
            ops.push(LedgerOp::Settle {
                key,
                credits: settlement.credits(),
            });
        }
        self.apply_guarded(request_id, settlement.is_some(), &ops)?;

        // Commit in-memory state; nothing below can fail
        let response_id = response.id;
        let agrees = response.agrees;
        self.responded.insert((*request_id, validator.clone()));
        self.responses.entry(*request_id).or_default().push(response);
        self.validators.extend(accounts);
        if let Some(request) = self.requests.get_mut(request_id) {
            request.response_count += 1;
        }

        tracing::debug!(
            request_id = %request_id,
            validator = %validator,
            agrees,
            agree = tally.agree,
            disagree = tally.disagree,
            "stake response recorded"
        );
        metrics::counter!("sigil_validation_responses_total").increment(1);

        if let Some(settlement) = &settlement {
            self.record_outcome(request_id, settlement, now);
        }

        Ok(SubmissionOutcome {
            response_id,
            agrees,
            tally,
            settlement,
        })
    }

    /// Submit a TEE attestation; a trusted attestation decides the request
    pub fn submit_tee_attestation(
        &mut self,
        submitter: &AccountId,
        request_id: &RequestId,
        attestation: &[u8],
        proof: &[u8],
        now: Timestamp,
    ) -> Result<Settlement, ConsensusError> {
        let request = self.pending_request(request_id)?;
        if !request.mode.admits_attestation() {
            return Err(ConsensusError::ModeMismatch(request.mode));
        }
        if now > request.deadline {
            return Err(ConsensusError::DeadlinePassed {
                deadline: request.deadline,
                now,
            });
        }
        if submitter == &request.requester {
            return Err(ConsensusError::SelfValidation);
        }
        if proof.is_empty() {
            return Err(ConsensusError::MissingProof);
        }
        let attestation_hash = Hash::digest(attestation);
        if self.used_attestations.contains(&attestation_hash) {
            tracing::warn!(request_id = %request_id, submitter = %submitter, attestation = %attestation_hash, "attestation replayed");
            return Err(ConsensusError::AttestationReused(attestation_hash));
        }
        if !self.oracle.is_trustworthy(&attestation_hash) {
            tracing::warn!(request_id = %request_id, submitter = %submitter, attestation = %attestation_hash, "untrusted attestation");
            metrics::counter!("sigil_untrusted_attestations_total").increment(1);
            return Err(ConsensusError::UntrustedAttestation(attestation_hash));
        }

        // Stake responses already collected are judged against the attested outcome
        let responses = self.responses.get(request_id).map(Vec::as_slice).unwrap_or(&[]);
        let settlement = Settlement::decided(
            request,
            responses,
            ValidationStatus::Validated,
            self.config.validator_reward_bps,
        )?;

        let mut accounts = HashMap::new();
        self.stage_accounts(&settlement, &mut accounts)?;

        let ops = [LedgerOp::Settle {
            key: EscrowKey::validation(*request_id),
            credits: settlement.credits(),
        }];
        self.apply_guarded(request_id, true, &ops)?;

        self.validators.extend(accounts);
        self.used_attestations.insert(attestation_hash);
        if let Some(request) = self.requests.get_mut(request_id) {
            request.attestation = Some(attestation_hash);
        }
        tracing::debug!(request_id = %request_id, submitter = %submitter, "attestation accepted");
        self.record_outcome(request_id, &settlement, now);
        Ok(settlement)
    }

    /// Close a request whose deadline passed without a decision, refunding every stake
    pub fn finalize_expired(
        &mut self,
        caller: &AccountId,
        request_id: &RequestId,
        now: Timestamp,
    ) -> Result<Settlement, ConsensusError> {
        let request = self.pending_request(request_id)?;
        if now <= request.deadline {
            return Err(ConsensusError::DeadlineNotReached {
                deadline: request.deadline,
                now,
            });
        }

        let status = if request.response_count >= self.config.min_validators {
            ValidationStatus::Disputed
        } else {
            ValidationStatus::Expired
        };
        let responses = self.responses.get(request_id).map(Vec::as_slice).unwrap_or(&[]);
        let settlement = Settlement::refund(request, responses, status)?;

        let mut accounts = HashMap::new();
        self.stage_accounts(&settlement, &mut accounts)?;

        let ops = [LedgerOp::Settle {
            key: EscrowKey::validation(*request_id),
            credits: settlement.credits(),
        }];
        self.apply_guarded(request_id, true, &ops)?;

        self.validators.extend(accounts);
        tracing::debug!(request_id = %request_id, caller = %caller, status = ?status, "expired request closed");
        self.record_outcome(request_id, &settlement, now);
        Ok(settlement)
    }

    /// Compute updated validator accounts for a settlement without storing them
    fn stage_accounts(
        &self,
        settlement: &Settlement,
        accounts: &mut HashMap<AccountId, ValidatorAccount>,
    ) -> Result<(), ConsensusError> {
        for payout in &settlement.payouts {
            let current = accounts
                .get(&payout.validator)
                .or_else(|| self.validators.get(&payout.validator))
                .cloned()
                .unwrap_or_else(|| ValidatorAccount::new(payout.validator.clone()));
            let next = match payout.kind {
                PayoutKind::Rewarded => current.rewarded(payout.stake, payout.reward)?,
                PayoutKind::Slashed => current.slashed(payout.stake)?,
                PayoutKind::Refunded => current.released(payout.stake)?,
            };
            accounts.insert(payout.validator.clone(), next);
        }
        Ok(())
    }

    /// Apply a ledger batch, holding the completion flag while a settlement is in flight
    fn apply_guarded(&mut self, request_id: &RequestId, settles: bool, ops: &[LedgerOp]) -> Result<(), ConsensusError> {
        if settles {
            if let Some(request) = self.requests.get_mut(request_id) {
                request.validation_complete = true;
            }
        }
        if let Err(e) = self.ledger.apply(ops) {
            if settles {
                if let Some(request) = self.requests.get_mut(request_id) {
                    request.validation_complete = false;
                }
            }
            tracing::warn!(request_id = %request_id, error = %e, "ledger rejected validation batch");
            return Err(e.into());
        }
        Ok(())
    }

    fn record_outcome(&mut self, request_id: &RequestId, settlement: &Settlement, now: Timestamp) {
        let Some(request) = self.requests.get_mut(request_id) else {
            return;
        };
        request.status = settlement.status;
        request.finalized_at = Some(now);
        self.summaries
            .entry(request.target_agent)
            .or_default()
            .record_outcome(settlement.status);

        let slashed = settlement
            .payouts
            .iter()
            .filter(|p| p.kind == PayoutKind::Slashed)
            .count();
        tracing::debug!(
            request_id = %request_id,
            status = ?settlement.status,
            rewards = %settlement.rewards_paid(),
            slashed = %settlement.slashed(),
            "validation finalized"
        );
        metrics::counter!("sigil_validations_finalized_total").increment(1);
        metrics::counter!("sigil_validators_slashed_total").increment(slashed as u64);
    }

    pub fn request(&self, request_id: &RequestId) -> Option<&ValidationRequest> {
        self.requests.get(request_id)
    }

    /// One page of a request's responses, in submission order
    pub fn responses(
        &self,
        request_id: &RequestId,
        offset: usize,
        limit: usize,
    ) -> Result<Page<&ValidationResponse>, ConsensusError> {
        let responses = self
            .responses
            .get(request_id)
            .ok_or(ConsensusError::RequestNotFound(*request_id))?;
        Ok(self.guard.page(responses, offset, limit)?)
    }

    pub fn validator(&self, account: &AccountId) -> Option<&ValidatorAccount> {
        self.validators.get(account)
    }

    /// One page of the requests targeting an agent, oldest first
    pub fn requests_for_agent(
        &self,
        agent_id: &AgentId,
        offset: usize,
        limit: usize,
    ) -> Result<Page<&ValidationRequest>, ConsensusError> {
        let ids = self.by_agent.get(agent_id).map(Vec::as_slice).unwrap_or(&[]);
        let page = self.guard.page(ids, offset, limit)?;
        Ok(Page {
            items: page.items.into_iter().filter_map(|id| self.requests.get(id)).collect(),
            offset: page.offset,
            total_count: page.total_count,
        })
    }

    pub fn agent_summary(&self, agent_id: &AgentId) -> AgentValidationSummary {
        self.summaries.get(agent_id).copied().unwrap_or_default()
    }

    pub fn ledger(&self) -> &EscrowLedger {
        &self.ledger
    }
}
