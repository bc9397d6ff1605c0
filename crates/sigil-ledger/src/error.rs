//! Error types for the escrow ledger

use sigil_core::{AccountId, Amount, ErrorClass};
use thiserror::Error;

use crate::ledger::EscrowKey;

/// Errors that can occur during ledger operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Zero-value deposit into {0}")]
    ZeroDeposit(EscrowKey),

    #[error("Escrow not found: {0}")]
    EscrowNotFound(EscrowKey),

    #[error("Settlement of {key} credits {credited} but {escrowed} is escrowed")]
    ConservationViolation {
        key: EscrowKey,
        escrowed: Amount,
        credited: Amount,
    },

    #[error("Arithmetic overflow in ledger accounting")]
    Overflow,

    #[error("Nothing to withdraw for {0}")]
    NothingToWithdraw(AccountId),

    #[error("Withdrawal already in progress for {0}")]
    ReentrantWithdrawal(AccountId),

    #[error("Transfer to {account} failed: {reason}")]
    TransferFailed { account: AccountId, reason: String },
}

impl LedgerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ZeroDeposit(_) | Self::NothingToWithdraw(_) | Self::TransferFailed { .. } => {
                ErrorClass::Economic
            }
            Self::EscrowNotFound(_) | Self::ReentrantWithdrawal(_) => ErrorClass::Lifecycle,
            Self::ConservationViolation { .. } | Self::Overflow => ErrorClass::Integrity,
        }
    }
}
