//! Validation requests and responses

use serde::{Deserialize, Serialize};
use sigil_core::{AccountId, AgentId, Amount, Hash, RequestId, ResponseId, TaskId, Timestamp, ValidationStatus};

use crate::mode::ValidationMode;

/// Parameters supplied by a requester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestParams {
    pub task_id: TaskId,
    pub target_agent: AgentId,
    /// Hash of the result the agent claims to have produced
    pub expected_hash: Hash,
    pub mode: ValidationMode,
    pub deadline: Timestamp,
    pub stake: Amount,
}

/// A request to independently verify a task result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub id: RequestId,
    pub task_id: TaskId,
    pub requester: AccountId,
    pub target_agent: AgentId,
    pub expected_hash: Hash,
    pub mode: ValidationMode,
    pub stake: Amount,
    pub deadline: Timestamp,
    pub created_at: Timestamp,
    pub status: ValidationStatus,
    pub response_count: usize,
    /// Set before any settlement funds move; never cleared once committed
    pub validation_complete: bool,
    pub finalized_at: Option<Timestamp>,
    /// Hash of the attestation that decided the request, if any
    pub attestation: Option<Hash>,
}

impl ValidationRequest {
    pub fn is_pending(&self) -> bool {
        self.status == ValidationStatus::Pending && !self.validation_complete
    }
}

/// One validator's claim about a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub id: ResponseId,
    pub request_id: RequestId,
    pub validator: AccountId,
    pub agrees: bool,
    pub computed_hash: Hash,
    #[serde(with = "hex::serde")]
    pub proof: Vec<u8>,
    pub stake: Amount,
    pub submitted_at: Timestamp,
}
