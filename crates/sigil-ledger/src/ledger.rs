//! Escrow accounts and pending balances
//!
//! Value enters the ledger only through [`LedgerOp::Deposit`] into an escrow
//! and leaves an escrow only through [`LedgerOp::Settle`], which must credit
//! exactly the escrowed amount to pending balances. Pending balances are pure
//! additions until the owner pulls them out with [`EscrowLedger::withdraw`].

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sigil_core::{AccountId, Amount, Hash, RequestId, Timestamp};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::LedgerError;
use crate::transfer::ValueTransfer;

/// What a block of escrowed value is held for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EscrowKey {
    /// Stake attached to a registration commitment
    Commitment {
        committer: AccountId,
        hash: Hash,
        committed_at: Timestamp,
    },
    /// Requester and validator stakes placed on one validation request
    Validation { request_id: RequestId },
}

impl EscrowKey {
    pub fn validation(request_id: RequestId) -> Self {
        Self::Validation { request_id }
    }
}

impl fmt::Display for EscrowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commitment {
                committer,
                hash,
                committed_at,
            } => write!(f, "commitment {}@{} by {}", hash, committed_at, committer),
            Self::Validation { request_id } => write!(f, "validation {}", request_id),
        }
    }
}

/// One step of an atomic ledger batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOp {
    /// Add value to an escrow, opening it if needed
    Deposit { key: EscrowKey, amount: Amount },
    /// Close an escrow, crediting its full balance to pending balances
    Settle {
        key: EscrowKey,
        credits: Vec<(AccountId, Amount)>,
    },
}

/// Aggregate view of the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub deposited: Amount,
    pub escrowed: Amount,
    pub pending: Amount,
    pub withdrawn: Amount,
}

impl LedgerTotals {
    /// Every unit deposited is escrowed, pending, or withdrawn
    pub fn is_conserved(&self) -> bool {
        self.escrowed
            .checked_add(self.pending)
            .and_then(|v| v.checked_add(self.withdrawn))
            == Some(self.deposited)
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    escrows: HashMap<EscrowKey, Amount>,
    pending: HashMap<AccountId, Amount>,
    busy: HashSet<AccountId>,
    totals: LedgerTotals,
}

/// Changes staged by a batch before they are committed
struct Staged<'a> {
    base: &'a LedgerState,
    escrows: HashMap<EscrowKey, Option<Amount>>,
    pending: HashMap<AccountId, Amount>,
    totals: LedgerTotals,
}

impl<'a> Staged<'a> {
    fn new(base: &'a LedgerState) -> Self {
        Self {
            base,
            escrows: HashMap::new(),
            pending: HashMap::new(),
            totals: base.totals,
        }
    }

    fn escrow(&self, key: &EscrowKey) -> Option<Amount> {
        match self.escrows.get(key) {
            Some(staged) => *staged,
            None => self.base.escrows.get(key).copied(),
        }
    }

    fn pending(&self, account: &AccountId) -> Amount {
        self.pending
            .get(account)
            .or_else(|| self.base.pending.get(account))
            .copied()
            .unwrap_or(0)
    }

    fn apply(&mut self, op: &LedgerOp) -> Result<(), LedgerError> {
        match op {
            LedgerOp::Deposit { key, amount } => {
                if *amount == 0 {
                    return Err(LedgerError::ZeroDeposit(key.clone()));
                }
                let current = self.escrow(key).unwrap_or(0);
                let next = current.checked_add(*amount).ok_or(LedgerError::Overflow)?;
                self.escrows.insert(key.clone(), Some(next));
                self.totals.deposited = self
                    .totals
                    .deposited
                    .checked_add(*amount)
                    .ok_or(LedgerError::Overflow)?;
                self.totals.escrowed = self
                    .totals
                    .escrowed
                    .checked_add(*amount)
                    .ok_or(LedgerError::Overflow)?;
            }
            LedgerOp::Settle { key, credits } => {
                let escrowed = self
                    .escrow(key)
                    .ok_or_else(|| LedgerError::EscrowNotFound(key.clone()))?;

                let mut credited: Amount = 0;
                for (_, amount) in credits {
                    credited = credited.checked_add(*amount).ok_or(LedgerError::Overflow)?;
                }
                if credited != escrowed {
                    return Err(LedgerError::ConservationViolation {
                        key: key.clone(),
                        escrowed,
                        credited,
                    });
                }

                for (account, amount) in credits {
                    if *amount == 0 {
                        continue;
                    }
                    let next = self
                        .pending(account)
                        .checked_add(*amount)
                        .ok_or(LedgerError::Overflow)?;
                    self.pending.insert(account.clone(), next);
                }
                self.escrows.insert(key.clone(), None);
                self.totals.escrowed = self
                    .totals
                    .escrowed
                    .checked_sub(escrowed)
                    .ok_or(LedgerError::Overflow)?;
                self.totals.pending = self
                    .totals
                    .pending
                    .checked_add(escrowed)
                    .ok_or(LedgerError::Overflow)?;
            }
        }
        Ok(())
    }

    fn into_changes(self) -> (HashMap<EscrowKey, Option<Amount>>, HashMap<AccountId, Amount>, LedgerTotals) {
        (self.escrows, self.pending, self.totals)
    }
}

/// Shared handle to the escrow ledger.
///
/// Cloning the handle shares the underlying state; the host and any component
/// that needs read access hold clones of the same ledger.
#[derive(Debug, Clone, Default)]
pub struct EscrowLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl EscrowLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a batch of operations atomically.
    ///
    /// Either every operation succeeds and all of them take effect, or the
    /// first failure is returned and the ledger is left untouched.
    pub fn apply(&self, ops: &[LedgerOp]) -> Result<(), LedgerError> {
        let mut state = self.state.lock();

        let (escrows, pending, totals) = {
            let mut staged = Staged::new(&*state);
            for op in ops {
                staged.apply(op)?;
            }
            staged.into_changes()
        };

        for (key, amount) in escrows {
            match amount {
                Some(amount) => {
                    state.escrows.insert(key, amount);
                }
                None => {
                    state.escrows.remove(&key);
                }
            }
        }
        for (account, amount) in pending {
            state.pending.insert(account, amount);
        }
        state.totals = totals;

        for op in ops {
            match op {
                LedgerOp::Deposit { key, amount } => {
                    tracing::debug!(escrow = %key, amount = %amount, "escrow deposit");
                    metrics::counter!("sigil_escrow_deposits_total").increment(1);
                }
                LedgerOp::Settle { key, credits } => {
                    tracing::debug!(escrow = %key, recipients = credits.len(), "escrow settled");
                    metrics::counter!("sigil_escrow_settlements_total").increment(1);
                }
            }
        }
        Ok(())
    }

    /// Deposit into a single escrow
    pub fn deposit(&self, key: EscrowKey, amount: Amount) -> Result<(), LedgerError> {
        self.apply(&[LedgerOp::Deposit { key, amount }])
    }

    /// Settle a single escrow
    pub fn settle(&self, key: EscrowKey, credits: Vec<(AccountId, Amount)>) -> Result<(), LedgerError> {
        self.apply(&[LedgerOp::Settle { key, credits }])
    }

    /// Build the op that releases an entire escrow to one account, with the amount it moves
    pub fn release_op(&self, key: &EscrowKey, to: &AccountId) -> Option<(LedgerOp, Amount)> {
        let amount = self.escrowed(key)?;
        let op = LedgerOp::Settle {
            key: key.clone(),
            credits: vec![(to.clone(), amount)],
        };
        Some((op, amount))
    }

    /// Release an entire escrow to one account, returning the amount
    pub fn release_to(&self, key: &EscrowKey, to: &AccountId) -> Result<Amount, LedgerError> {
        let (op, amount) = self
            .release_op(key, to)
            .ok_or_else(|| LedgerError::EscrowNotFound(key.clone()))?;
        self.apply(&[op])?;
        Ok(amount)
    }

    /// Pull the caller's pending balance out through `transfer`.
    ///
    /// The balance is zeroed and the account marked busy before the transfer
    /// runs, and the ledger lock is not held across the call, so a recipient
    /// that re-enters `withdraw` sees a busy account with nothing owed. A
    /// failed transfer restores the balance.
    pub fn withdraw(&self, account: &AccountId, transfer: &dyn ValueTransfer) -> Result<Amount, LedgerError> {
        let amount = {
            let mut state = self.state.lock();
            if state.busy.contains(account) {
                tracing::warn!(account = %account, "reentrant withdrawal rejected");
                metrics::counter!("sigil_reentrancy_rejections_total").increment(1);
                return Err(LedgerError::ReentrantWithdrawal(account.clone()));
            }
            let amount = state.pending.remove(account).unwrap_or(0);
            if amount == 0 {
                return Err(LedgerError::NothingToWithdraw(account.clone()));
            }
            state.totals.pending -= amount;
            state.busy.insert(account.clone());
            amount
        };

        let outcome = transfer.transfer(account, amount);

        let mut state = self.state.lock();
        state.busy.remove(account);
        match outcome {
            Ok(()) => {
                // withdrawn <= deposited, so this cannot overflow
                state.totals.withdrawn += amount;
                tracing::debug!(account = %account, amount = %amount, "withdrawal completed");
                metrics::counter!("sigil_withdrawals_total").increment(1);
                Ok(amount)
            }
            Err(e) => {
                let restored = state.pending.entry(account.clone()).or_insert(0);
                *restored += amount;
                state.totals.pending += amount;
                tracing::warn!(account = %account, error = %e, "withdrawal transfer failed");
                Err(LedgerError::TransferFailed {
                    account: account.clone(),
                    reason: e.0,
                })
            }
        }
    }

    /// Value currently held in an escrow
    pub fn escrowed(&self, key: &EscrowKey) -> Option<Amount> {
        self.state.lock().escrows.get(key).copied()
    }

    /// Value owed to an account
    pub fn pending_balance(&self, account: &AccountId) -> Amount {
        self.state.lock().pending.get(account).copied().unwrap_or(0)
    }

    pub fn totals(&self) -> LedgerTotals {
        self.state.lock().totals
    }

    pub fn open_escrows(&self) -> usize {
        self.state.lock().escrows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{MemoryTransfer, TransferError};
    use sigil_core::TaskId;

    fn request_key(n: u64) -> EscrowKey {
        EscrowKey::validation(RequestId::derive(
            1,
            &AccountId::from("requester"),
            &TaskId::from_label("task"),
            n,
        ))
    }

    fn alice() -> AccountId {
        AccountId::from("alice")
    }

    fn bob() -> AccountId {
        AccountId::from("bob")
    }

    #[test]
    fn test_deposit_then_settle_moves_value_to_pending() {
        let ledger = EscrowLedger::new();
        let key = request_key(0);
        ledger.deposit(key.clone(), 700).unwrap();
        ledger.deposit(key.clone(), 300).unwrap();
        assert_eq!(ledger.escrowed(&key), Some(1_000));

        ledger.settle(key.clone(), vec![(alice(), 600), (bob(), 400)]).unwrap();
        assert_eq!(ledger.escrowed(&key), None);
        assert_eq!(ledger.pending_balance(&alice()), 600);
        assert_eq!(ledger.pending_balance(&bob()), 400);
        assert!(ledger.totals().is_conserved());
    }

    #[test]
    fn test_settlement_must_conserve_value() {
        let ledger = EscrowLedger::new();
        let key = request_key(0);
        ledger.deposit(key.clone(), 1_000).unwrap();

        let err = ledger.settle(key.clone(), vec![(alice(), 999)]).unwrap_err();
        assert_eq!(
            err,
            LedgerError::ConservationViolation {
                key: key.clone(),
                escrowed: 1_000,
                credited: 999,
            }
        );
        assert_eq!(ledger.escrowed(&key), Some(1_000));
        assert_eq!(ledger.pending_balance(&alice()), 0);
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let ledger = EscrowLedger::new();
        let a = request_key(0);
        let b = request_key(1);
        ledger.deposit(a.clone(), 100).unwrap();

        let result = ledger.apply(&[
            LedgerOp::Settle {
                key: a.clone(),
                credits: vec![(alice(), 100)],
            },
            LedgerOp::Settle {
                key: b.clone(),
                credits: vec![(bob(), 1)],
            },
        ]);
        assert_eq!(result.unwrap_err(), LedgerError::EscrowNotFound(b));
        assert_eq!(ledger.escrowed(&a), Some(100));
        assert_eq!(ledger.pending_balance(&alice()), 0);
    }

    #[test]
    fn test_settled_escrow_cannot_be_settled_twice() {
        let ledger = EscrowLedger::new();
        let key = request_key(0);
        ledger.deposit(key.clone(), 50).unwrap();
        ledger.release_to(&key, &alice()).unwrap();

        assert!(matches!(
            ledger.release_to(&key, &alice()),
            Err(LedgerError::EscrowNotFound(_))
        ));
        assert_eq!(ledger.pending_balance(&alice()), 50);
    }

    #[test]
    fn test_zero_and_overflowing_deposits_fail() {
        let ledger = EscrowLedger::new();
        let key = request_key(0);
        assert!(matches!(ledger.deposit(key.clone(), 0), Err(LedgerError::ZeroDeposit(_))));

        ledger.deposit(key.clone(), Amount::MAX).unwrap();
        assert_eq!(ledger.deposit(key.clone(), 1).unwrap_err(), LedgerError::Overflow);
        assert_eq!(ledger.escrowed(&key), Some(Amount::MAX));
    }

    #[test]
    fn test_withdraw_pays_once() {
        let ledger = EscrowLedger::new();
        let key = request_key(0);
        ledger.deposit(key.clone(), 250).unwrap();
        ledger.release_to(&key, &alice()).unwrap();

        let transfer = MemoryTransfer::new();
        assert_eq!(ledger.withdraw(&alice(), &transfer).unwrap(), 250);
        assert_eq!(
            ledger.withdraw(&alice(), &transfer).unwrap_err(),
            LedgerError::NothingToWithdraw(alice())
        );
        assert_eq!(transfer.total_paid(&alice()), 250);
        assert!(ledger.totals().is_conserved());
    }

    #[test]
    fn test_failed_transfer_restores_balance() {
        let ledger = EscrowLedger::new();
        let key = request_key(0);
        ledger.deposit(key.clone(), 80).unwrap();
        ledger.release_to(&key, &alice()).unwrap();

        let transfer = MemoryTransfer::new();
        transfer.reject("alice");
        assert!(matches!(
            ledger.withdraw(&alice(), &transfer),
            Err(LedgerError::TransferFailed { .. })
        ));
        assert_eq!(ledger.pending_balance(&alice()), 80);

        transfer.accept(&alice());
        assert_eq!(ledger.withdraw(&alice(), &transfer).unwrap(), 80);
        assert!(ledger.totals().is_conserved());
    }

    /// A recipient that tries to withdraw again from inside the transfer
    struct ReentrantRecipient {
        ledger: EscrowLedger,
        inner: MemoryTransfer,
        reentry: Mutex<Option<Result<Amount, LedgerError>>>,
    }

    impl ValueTransfer for ReentrantRecipient {
        fn transfer(&self, to: &AccountId, amount: Amount) -> Result<(), TransferError> {
            let observed = self.ledger.pending_balance(to);
            assert_eq!(observed, 0, "balance must be zeroed before the transfer");
            *self.reentry.lock() = Some(self.ledger.withdraw(to, self));
            self.inner.transfer(to, amount)
        }
    }

    #[test]
    fn test_reentrant_withdrawal_extracts_nothing() {
        let ledger = EscrowLedger::new();
        let key = request_key(0);
        ledger.deposit(key.clone(), 1_000).unwrap();
        ledger.release_to(&key, &alice()).unwrap();

        let attacker = ReentrantRecipient {
            ledger: ledger.clone(),
            inner: MemoryTransfer::new(),
            reentry: Mutex::new(None),
        };
        assert_eq!(ledger.withdraw(&alice(), &attacker).unwrap(), 1_000);
        assert_eq!(
            attacker.reentry.lock().clone(),
            Some(Err(LedgerError::ReentrantWithdrawal(alice())))
        );
        assert_eq!(attacker.inner.total_paid(&alice()), 1_000);
        assert_eq!(ledger.totals().withdrawn, 1_000);
    }
}
