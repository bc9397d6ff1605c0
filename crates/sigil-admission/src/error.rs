//! Admission error types

use sigil_core::{AccountId, AgentId, CoreError, ErrorClass, TaskId, Timestamp};
use thiserror::Error;

/// Errors raised by commit-reveal admission and the task-authorization store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("Live commitment already held by {0}")]
    AlreadyCommitted(AccountId),

    #[error("No commitment found for {0}")]
    NoCommitmentFound(AccountId),

    #[error("Commitment of {0} was already revealed")]
    CommitmentAlreadyRevealed(AccountId),

    #[error("Reveal too soon: accepted from {earliest}, now {now}")]
    RevealTooSoon { earliest: Timestamp, now: Timestamp },

    #[error("Reveal too late: window closed at {deadline}, now {now}")]
    RevealTooLate { deadline: Timestamp, now: Timestamp },

    #[error("Revealed parameters do not match the commitment")]
    InvalidReveal,

    #[error("Commitment of {committer} is live until {expires_at}")]
    CommitmentStillLive {
        committer: AccountId,
        expires_at: Timestamp,
    },

    #[error("Task already authorized: {0}")]
    TaskAlreadyAuthorized(TaskId),

    #[error("Agent not active: {0}")]
    AgentNotActive(AgentId),

    #[error("{caller} does not own agent {agent_id}")]
    NotAgentOwner { agent_id: AgentId, caller: AccountId },

    #[error("Hashing error: {0}")]
    Hashing(String),
}

impl From<CoreError> for AdmissionError {
    fn from(e: CoreError) -> Self {
        Self::Hashing(e.to_string())
    }
}

impl AdmissionError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::AlreadyCommitted(_)
            | Self::NoCommitmentFound(_)
            | Self::CommitmentAlreadyRevealed(_)
            | Self::RevealTooSoon { .. }
            | Self::RevealTooLate { .. }
            | Self::InvalidReveal => ErrorClass::Admission,
            Self::CommitmentStillLive { .. }
            | Self::TaskAlreadyAuthorized(_)
            | Self::AgentNotActive(_) => ErrorClass::Lifecycle,
            Self::NotAgentOwner { .. } => ErrorClass::Authorization,
            Self::Hashing(_) => ErrorClass::Validation,
        }
    }
}
