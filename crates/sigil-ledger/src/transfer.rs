//! External value transfer seam
//!
//! The ledger never moves value itself. `withdraw` hands the amount to a
//! [`ValueTransfer`] implementation supplied by the host, after the pending
//! balance has already been zeroed.

use parking_lot::Mutex;
use sigil_core::{AccountId, Amount};
use std::collections::HashSet;
use thiserror::Error;

/// Failure reported by the external transfer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransferError(pub String);

/// Moves value out of the protocol to a recipient
pub trait ValueTransfer {
    fn transfer(&self, to: &AccountId, amount: Amount) -> Result<(), TransferError>;
}

/// In-memory transfer that records every payout.
///
/// Recipients can be marked as rejecting to exercise the failure path.
#[derive(Debug, Default)]
pub struct MemoryTransfer {
    payouts: Mutex<Vec<(AccountId, Amount)>>,
    rejecting: Mutex<HashSet<AccountId>>,
}

impl MemoryTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every transfer to `account` fail
    pub fn reject(&self, account: impl Into<AccountId>) {
        self.rejecting.lock().insert(account.into());
    }

    /// Accept transfers to `account` again
    pub fn accept(&self, account: &AccountId) {
        self.rejecting.lock().remove(account);
    }

    /// Every successful payout in order
    pub fn payouts(&self) -> Vec<(AccountId, Amount)> {
        self.payouts.lock().clone()
    }

    /// Sum of successful payouts to `account`
    pub fn total_paid(&self, account: &AccountId) -> Amount {
        self.payouts
            .lock()
            .iter()
            .filter(|(to, _)| to == account)
            .map(|(_, amount)| *amount)
            .sum()
    }
}

impl ValueTransfer for MemoryTransfer {
    fn transfer(&self, to: &AccountId, amount: Amount) -> Result<(), TransferError> {
        if self.rejecting.lock().contains(to) {
            return Err(TransferError(format!("recipient {} rejected payment", to)));
        }
        self.payouts.lock().push((to.clone(), amount));
        Ok(())
    }
}
