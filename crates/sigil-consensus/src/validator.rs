//! Validator accounts and per-agent validation summaries

use serde::{Deserialize, Serialize};
use sigil_core::{AccountId, Amount, ValidationStatus};

use crate::error::ConsensusError;

/// Aggregate validator performance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorAccount {
    pub id: AccountId,
    /// Stake currently escrowed in undecided requests
    pub stake_balance: Amount,
    pub successful: u64,
    pub failed: u64,
    pub lifetime_rewards: Amount,
    pub lifetime_slashed: Amount,
}

impl ValidatorAccount {
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            stake_balance: 0,
            successful: 0,
            failed: 0,
            lifetime_rewards: 0,
            lifetime_slashed: 0,
        }
    }

    pub(crate) fn staked(&self, stake: Amount) -> Result<Self, ConsensusError> {
        let mut next = self.clone();
        next.stake_balance = next.stake_balance.checked_add(stake).ok_or(ConsensusError::Overflow)?;
        Ok(next)
    }

    pub(crate) fn released(&self, stake: Amount) -> Result<Self, ConsensusError> {
        let mut next = self.clone();
        next.stake_balance = next.stake_balance.checked_sub(stake).ok_or(ConsensusError::Overflow)?;
        Ok(next)
    }

    pub(crate) fn rewarded(&self, stake: Amount, reward: Amount) -> Result<Self, ConsensusError> {
        let mut next = self.released(stake)?;
        next.successful += 1;
        next.lifetime_rewards = next.lifetime_rewards.checked_add(reward).ok_or(ConsensusError::Overflow)?;
        Ok(next)
    }

    pub(crate) fn slashed(&self, stake: Amount) -> Result<Self, ConsensusError> {
        let mut next = self.released(stake)?;
        next.failed += 1;
        next.lifetime_slashed = next.lifetime_slashed.checked_add(stake).ok_or(ConsensusError::Overflow)?;
        Ok(next)
    }

    /// Share of decided responses that matched the outcome, in basis points
    pub fn accuracy_bps(&self) -> Option<u32> {
        let decided = self.successful + self.failed;
        (decided > 0).then(|| (self.successful * 10_000 / decided) as u32)
    }
}

/// Terminal outcomes of requests targeting one agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentValidationSummary {
    pub requested: u64,
    pub validated: u64,
    pub failed: u64,
    pub disputed: u64,
    pub expired: u64,
}

impl AgentValidationSummary {
    pub(crate) fn record_request(&mut self) {
        self.requested += 1;
    }

    pub(crate) fn record_outcome(&mut self, status: ValidationStatus) {
        match status {
            ValidationStatus::Pending => {}
            ValidationStatus::Validated => self.validated += 1,
            ValidationStatus::Failed => self.failed += 1,
            ValidationStatus::Disputed => self.disputed += 1,
            ValidationStatus::Expired => self.expired += 1,
        }
    }
}
