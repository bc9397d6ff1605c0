//! # Sigil Ledger
//!
//! Escrowed stakes and pull-payment withdrawals.
//!
//! Components never transfer value directly. Stakes are deposited into an
//! [`EscrowKey`]-addressed escrow; settlement moves an escrow's full balance
//! into per-account pending balances; an account holder pulls its balance out
//! with [`EscrowLedger::withdraw`].
//!
//! ```rust
//! use sigil_core::{AccountId, RequestId, TaskId};
//! use sigil_ledger::{EscrowKey, EscrowLedger, MemoryTransfer};
//!
//! let ledger = EscrowLedger::new();
//! let alice = AccountId::from("alice");
//! let key = EscrowKey::validation(RequestId::derive(1, &alice, &TaskId::from_label("t"), 0));
//!
//! ledger.deposit(key.clone(), 1_000).unwrap();
//! ledger.release_to(&key, &alice).unwrap();
//!
//! let transfer = MemoryTransfer::new();
//! assert_eq!(ledger.withdraw(&alice, &transfer).unwrap(), 1_000);
//! ```

pub mod error;
pub mod ledger;
pub mod transfer;

pub use error::LedgerError;
pub use ledger::{EscrowKey, EscrowLedger, LedgerOp, LedgerTotals};
pub use transfer::{MemoryTransfer, TransferError, ValueTransfer};
