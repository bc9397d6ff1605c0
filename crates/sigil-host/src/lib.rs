//! # Sigil Host
//!
//! The deterministic state-transition surface of the Sigil protocol.
//!
//! [`TrustHost`] composes commit-reveal admission, the identity registry, the
//! task-authorization store, the validation engine and the escrow ledger. It
//! is the only writer of each component, runs one transition at a time, and
//! emits one hash-chained event per accepted transition.
//!
//! ```rust
//! use std::sync::Arc;
//! use sigil_consensus::StaticKeyOracle;
//! use sigil_core::{AccountId, ProtocolConfig};
//! use sigil_host::{HostError, TrustHost};
//!
//! let mut host = TrustHost::new(
//!     ProtocolConfig::for_domain(7, "gov"),
//!     Arc::new(StaticKeyOracle::new()),
//! ).unwrap();
//!
//! let mut next = host.config().clone();
//! next.consensus.min_validators = 5;
//! assert!(matches!(
//!     host.update_config(&AccountId::from("mallory"), next.clone()),
//!     Err(HostError::NotGovernor(_))
//! ));
//! assert_eq!(host.update_config(&AccountId::from("gov"), next).unwrap(), 2);
//! ```

pub mod error;
pub mod host;

pub use error::HostError;
pub use host::{HostStatus, TrustHost};
