//! Consensus error types

use sigil_core::{AccountId, AgentId, Amount, ErrorClass, GuardError, Hash, RequestId, Timestamp, ValidationStatus};
use sigil_ledger::LedgerError;
use thiserror::Error;

use crate::mode::ValidationMode;

/// Errors raised by the validation consensus engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    #[error("Validation request not found: {0}")]
    RequestNotFound(RequestId),

    #[error("Request {request_id} is no longer pending ({status:?})")]
    RequestNotPending {
        request_id: RequestId,
        status: ValidationStatus,
    },

    #[error("Operation not allowed in {0:?} mode")]
    ModeMismatch(ValidationMode),

    #[error("Deadline {deadline} passed (now {now})")]
    DeadlinePassed { deadline: Timestamp, now: Timestamp },

    #[error("Deadline {deadline} not reached (now {now})")]
    DeadlineNotReached { deadline: Timestamp, now: Timestamp },

    #[error("Deadline {deadline} outside allowed range [{earliest}, {latest}]")]
    InvalidDeadline {
        deadline: Timestamp,
        earliest: Timestamp,
        latest: Timestamp,
    },

    #[error("Request already holds the maximum of {ceiling} responses")]
    MaxValidatorsReached { ceiling: usize },

    #[error("Requester cannot validate their own request")]
    SelfValidation,

    #[error("Validator {0} already responded")]
    DuplicateResponse(AccountId),

    #[error("Insufficient stake: required {required}, offered {offered}")]
    InsufficientStake { required: Amount, offered: Amount },

    #[error("Target agent not active: {0}")]
    AgentNotActive(AgentId),

    #[error("Attestation {0} is not backed by a trusted key")]
    UntrustedAttestation(Hash),

    #[error("Attestation submitted without proof")]
    MissingProof,

    #[error("Attestation {0} already decided a request")]
    AttestationReused(Hash),

    #[error("Arithmetic overflow in settlement")]
    Overflow,

    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ConsensusError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::RequestNotFound(_)
            | Self::RequestNotPending { .. }
            | Self::DeadlinePassed { .. }
            | Self::DeadlineNotReached { .. }
            | Self::AgentNotActive(_) => ErrorClass::Lifecycle,
            Self::MaxValidatorsReached { .. } => ErrorClass::Capacity,
            Self::Guard(e) => e.class(),
            Self::InsufficientStake { .. } | Self::DuplicateResponse(_) => ErrorClass::Economic,
            Self::ModeMismatch(_)
            | Self::InvalidDeadline { .. }
            | Self::UntrustedAttestation(_)
            | Self::AttestationReused(_)
            | Self::MissingProof => ErrorClass::Validation,
            Self::SelfValidation => ErrorClass::Authorization,
            Self::Overflow => ErrorClass::Integrity,
            Self::Ledger(e) => e.class(),
        }
    }
}
