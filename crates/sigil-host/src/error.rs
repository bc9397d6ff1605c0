//! Host error type

use sigil_admission::AdmissionError;
use sigil_consensus::ConsensusError;
use sigil_core::{AccountId, Amount, ConfigError, ErrorClass};
use sigil_ledger::LedgerError;
use sigil_registry::RegistryError;
use thiserror::Error;

/// Any reason a host transition was rejected.
///
/// A rejected transition leaves every component and the ledger exactly as
/// they were before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Registration commitment needs {required}, {offered} attached")]
    InsufficientStake { required: Amount, offered: Amount },

    #[error("{0} is not the governor")]
    NotGovernor(AccountId),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

impl HostError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Admission(e) => e.class(),
            Self::Registry(e) => e.class(),
            Self::Consensus(e) => e.class(),
            Self::Ledger(e) => e.class(),
            Self::InsufficientStake { .. } => ErrorClass::Economic,
            Self::NotGovernor(_) => ErrorClass::Authorization,
            Self::InvalidConfig(e) => e.class(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::RequestId;

    #[test]
    fn test_class_follows_source() {
        let err: HostError = AdmissionError::InvalidReveal.into();
        assert_eq!(err.class(), ErrorClass::Admission);

        let err: HostError = ConsensusError::MaxValidatorsReached { ceiling: 100 }.into();
        assert_eq!(err.class(), ErrorClass::Capacity);

        let id = RequestId::derive(1, &AccountId::from("r"), &sigil_core::TaskId::from_label("t"), 0);
        let err: HostError = ConsensusError::RequestNotPending {
            request_id: id,
            status: sigil_core::ValidationStatus::Validated,
        }
        .into();
        assert_eq!(err.class(), ErrorClass::Lifecycle);

        assert_eq!(
            HostError::NotGovernor(AccountId::from("mallory")).class(),
            ErrorClass::Authorization
        );
        let err: HostError = LedgerError::Overflow.into();
        assert!(!err.class().is_caller_correctable());
    }
}
