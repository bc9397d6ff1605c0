//! Settlement of a decided or expired request
//!
//! Settlement is computed in full, with checked arithmetic, before any value
//! moves. The resulting credit list always sums to the requester stake plus
//! every validator stake, which the ledger re-checks when it closes the
//! escrow.

use serde::{Deserialize, Serialize};
use sigil_core::{AccountId, Amount, ValidationStatus, BPS_DENOMINATOR};

use crate::error::ConsensusError;
use crate::request::{ValidationRequest, ValidationResponse};

/// What happened to one validator's stake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutKind {
    /// Matched the outcome: stake back plus a reward share
    Rewarded,
    /// Contradicted the outcome: stake forfeited to the requester
    Slashed,
    /// No outcome was reached: stake back, nothing else
    Refunded,
}

/// Per-validator settlement line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub validator: AccountId,
    pub stake: Amount,
    pub reward: Amount,
    pub kind: PayoutKind,
}

impl Payout {
    /// Amount credited to the validator
    pub fn credit(&self) -> Amount {
        match self.kind {
            PayoutKind::Slashed => 0,
            // stake + reward is bounded by the escrow total, checked on construction
            PayoutKind::Rewarded | PayoutKind::Refunded => self.stake + self.reward,
        }
    }
}

/// Full settlement of one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub status: ValidationStatus,
    pub requester: AccountId,
    pub requester_credit: Amount,
    pub payouts: Vec<Payout>,
    /// Requester stake plus every validator stake
    pub total: Amount,
}

fn total_stake(request: &ValidationRequest, responses: &[ValidationResponse]) -> Result<Amount, ConsensusError> {
    responses
        .iter()
        .try_fold(request.stake, |acc, r| acc.checked_add(r.stake))
        .ok_or(ConsensusError::Overflow)
}

impl Settlement {
    /// Settle against a decided outcome (`Validated` or `Failed`).
    ///
    /// The reward pool is `requester stake * reward_bps / 10000`, split among
    /// validators whose flag matches the outcome in proportion to their stake.
    /// Rounding dust and forfeited stakes go back to the requester.
    pub fn decided(
        request: &ValidationRequest,
        responses: &[ValidationResponse],
        status: ValidationStatus,
        reward_bps: u32,
    ) -> Result<Self, ConsensusError> {
        let total = total_stake(request, responses)?;
        let validated = status == ValidationStatus::Validated;

        let correct_stake = responses
            .iter()
            .filter(|r| r.agrees == validated)
            .try_fold(0 as Amount, |acc, r| acc.checked_add(r.stake))
            .ok_or(ConsensusError::Overflow)?;

        let reward_pool = if correct_stake == 0 {
            0
        } else {
            request
                .stake
                .checked_mul(reward_bps as Amount)
                .ok_or(ConsensusError::Overflow)?
                / BPS_DENOMINATOR as Amount
        };

        let mut payouts = Vec::with_capacity(responses.len());
        let mut rewards_paid: Amount = 0;
        let mut slashed: Amount = 0;
        for response in responses {
            if response.agrees == validated {
                let reward = reward_pool
                    .checked_mul(response.stake)
                    .ok_or(ConsensusError::Overflow)?
                    / correct_stake;
                rewards_paid = rewards_paid.checked_add(reward).ok_or(ConsensusError::Overflow)?;
                response.stake.checked_add(reward).ok_or(ConsensusError::Overflow)?;
                payouts.push(Payout {
                    validator: response.validator.clone(),
                    stake: response.stake,
                    reward,
                    kind: PayoutKind::Rewarded,
                });
            } else {
                slashed = slashed.checked_add(response.stake).ok_or(ConsensusError::Overflow)?;
                payouts.push(Payout {
                    validator: response.validator.clone(),
                    stake: response.stake,
                    reward: 0,
                    kind: PayoutKind::Slashed,
                });
            }
        }

        let requester_credit = request
            .stake
            .checked_sub(rewards_paid)
            .and_then(|v| v.checked_add(slashed))
            .ok_or(ConsensusError::Overflow)?;

        Ok(Self {
            status,
            requester: request.requester.clone(),
            requester_credit,
            payouts,
            total,
        })
    }

    /// Return every stake unchanged; used when no outcome was reached
    pub fn refund(
        request: &ValidationRequest,
        responses: &[ValidationResponse],
        status: ValidationStatus,
    ) -> Result<Self, ConsensusError> {
        let total = total_stake(request, responses)?;
        let payouts = responses
            .iter()
            .map(|r| Payout {
                validator: r.validator.clone(),
                stake: r.stake,
                reward: 0,
                kind: PayoutKind::Refunded,
            })
            .collect();

        Ok(Self {
            status,
            requester: request.requester.clone(),
            requester_credit: request.stake,
            payouts,
            total,
        })
    }

    /// Ledger credits, requester first
    pub fn credits(&self) -> Vec<(AccountId, Amount)> {
        let mut credits = Vec::with_capacity(self.payouts.len() + 1);
        credits.push((self.requester.clone(), self.requester_credit));
        credits.extend(
            self.payouts
                .iter()
                .filter(|p| p.credit() > 0)
                .map(|p| (p.validator.clone(), p.credit())),
        );
        credits
    }

    pub fn rewards_paid(&self) -> Amount {
        self.payouts.iter().map(|p| p.reward).sum()
    }

    pub fn slashed(&self) -> Amount {
        self.payouts
            .iter()
            .filter(|p| p.kind == PayoutKind::Slashed)
            .map(|p| p.stake)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::ValidationMode;
    use sigil_core::{AgentId, Hash, RequestId, ResponseId, TaskId};

    fn request(stake: Amount) -> ValidationRequest {
        let requester = AccountId::from("requester");
        let task_id = TaskId::from_label("t");
        ValidationRequest {
            id: RequestId::derive(1, &requester, &task_id, 0),
            task_id,
            requester,
            target_agent: AgentId::from_did("did:sigil:a"),
            expected_hash: Hash::digest(b"result"),
            mode: ValidationMode::Stake,
            stake,
            deadline: 10_000,
            created_at: 0,
            status: ValidationStatus::Pending,
            response_count: 0,
            validation_complete: false,
            finalized_at: None,
            attestation: None,
        }
    }

    fn response(req: &ValidationRequest, who: &str, agrees: bool, stake: Amount) -> ValidationResponse {
        let validator = AccountId::from(who);
        ValidationResponse {
            id: ResponseId::derive(&req.id, &validator),
            request_id: req.id,
            validator,
            agrees,
            computed_hash: Hash::digest(who.as_bytes()),
            proof: Vec::new(),
            stake,
            submitted_at: 1,
        }
    }

    fn credited(s: &Settlement) -> Amount {
        s.credits().iter().map(|(_, a)| *a).sum()
    }

    #[test]
    fn test_two_agree_one_disagree() {
        let req = request(1_000);
        let responses = vec![
            response(&req, "v1", true, 100),
            response(&req, "v2", true, 100),
            response(&req, "v3", false, 100),
        ];
        let s = Settlement::decided(&req, &responses, ValidationStatus::Validated, 1_000).unwrap();

        // pool = 100, split 50/50
        assert_eq!(s.payouts[0].credit(), 150);
        assert_eq!(s.payouts[1].credit(), 150);
        assert_eq!(s.payouts[2].credit(), 0);
        assert_eq!(s.slashed(), 100);
        assert_eq!(s.requester_credit, 1_000 - 100 + 100);
        assert_eq!(credited(&s), s.total);
        assert_eq!(s.total, 1_300);
    }

    #[test]
    fn test_rewards_are_stake_weighted_with_dust_to_requester() {
        let req = request(1_000);
        let responses = vec![
            response(&req, "v1", false, 100),
            response(&req, "v2", false, 200),
            response(&req, "v3", true, 50),
        ];
        let s = Settlement::decided(&req, &responses, ValidationStatus::Failed, 1_000).unwrap();
        // pool 100: 100*100/300 = 33, 100*200/300 = 66, dust 1
        assert_eq!(s.payouts[0].reward, 33);
        assert_eq!(s.payouts[1].reward, 66);
        assert_eq!(s.requester_credit, 1_000 - 99 + 50);
        assert_eq!(credited(&s), s.total);
    }

    #[test]
    fn test_no_correct_validators_pays_no_rewards() {
        let req = request(1_000);
        let responses = vec![response(&req, "v1", false, 100)];
        let s = Settlement::decided(&req, &responses, ValidationStatus::Validated, 1_000).unwrap();
        assert_eq!(s.rewards_paid(), 0);
        assert_eq!(s.requester_credit, 1_100);
    }

    #[test]
    fn test_refund_returns_every_stake() {
        let req = request(500);
        let responses = vec![response(&req, "v1", true, 120), response(&req, "v2", false, 80)];
        let s = Settlement::refund(&req, &responses, ValidationStatus::Expired).unwrap();
        assert_eq!(
            s.credits(),
            vec![
                (AccountId::from("requester"), 500),
                (AccountId::from("v1"), 120),
                (AccountId::from("v2"), 80),
            ]
        );
    }

    #[test]
    fn test_overflowing_stakes_abort() {
        let req = request(Amount::MAX);
        let responses = vec![response(&req, "v1", true, 1)];
        assert_eq!(
            Settlement::decided(&req, &responses, ValidationStatus::Validated, 1_000),
            Err(ConsensusError::Overflow)
        );
    }
}
