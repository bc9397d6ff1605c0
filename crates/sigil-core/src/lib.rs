//! # Sigil Core
//!
//! Shared primitives for the Sigil agent-trust protocol.
//!
//! ## Key Types
//!
//! - [`Hash`] - SHA-256 digests with canonical (JCS) preimage hashing
//! - [`AccountId`], [`AgentId`], [`RequestId`] - identifier newtypes
//! - [`ProtocolConfig`] - versioned configuration, one section per component
//! - [`IterationGuard`] - shared ceiling for response sets and page sizes
//! - [`EventLog`] - hash-chained record of every state transition
//!
//! ## Quick Start
//!
//! ```rust
//! use sigil_core::{AgentId, Hash, IterationGuard};
//!
//! let agent = AgentId::from_did("did:sigil:agent:1");
//! assert_eq!(agent, AgentId::from_did("did:sigil:agent:1"));
//!
//! let guard = IterationGuard::default();
//! let items: Vec<u32> = (0..250).collect();
//! let page = guard.page(&items, 200, 100).unwrap();
//! assert_eq!(page.items.len(), 50);
//! assert_eq!(page.next_offset(), None);
//! # let _ = Hash::digest(b"x");
//! ```

pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod guard;
pub mod hash;
pub mod ids;

pub use config::{
    AdmissionConfig, ConfigError, ConsensusConfig, ProtocolConfig, RegistryConfig,
    BPS_DENOMINATOR,
};
pub use directory::{AgentDirectory, StaticDirectory};
pub use error::{CoreError, ErrorClass};
pub use events::{CommitmentScope, EventLog, EventRecord, ProtocolEvent, ValidationStatus};
pub use guard::{GuardConfig, GuardError, IterationGuard, Page, DEFAULT_CEILING};
pub use hash::Hash;
pub use ids::{AccountId, AgentId, Amount, KeyHash, RequestId, ResponseId, TaskId, Timestamp};
