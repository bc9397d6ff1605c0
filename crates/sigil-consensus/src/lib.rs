//! # Sigil Consensus
//!
//! Stake-based and attestation-based validation of task results.
//!
//! ## Key Types
//!
//! - [`ValidationEngine`] - request/response state, finalization, expiry, queries
//! - [`ValidationMode`] - which submissions may decide a request
//! - [`Tally`] - symmetric-threshold agreement counting
//! - [`Settlement`] - reward, slash and refund computation
//! - [`TrustedKeyOracle`] - pluggable attestation trust decision
//!
//! Every submission that reaches the validator quorum attempts finalization;
//! a request is decided at most once, and settlement credits always sum to
//! the stakes placed on the request.

pub mod engine;
pub mod error;
pub mod mode;
pub mod oracle;
pub mod request;
pub mod settlement;
pub mod tally;
pub mod validator;

pub use engine::{SubmissionOutcome, ValidationEngine};
pub use error::ConsensusError;
pub use mode::ValidationMode;
pub use oracle::{StaticKeyOracle, TrustedKeyOracle};
pub use request::{RequestParams, ValidationRequest, ValidationResponse};
pub use settlement::{Payout, PayoutKind, Settlement};
pub use tally::{Tally, Verdict};
pub use validator::{AgentValidationSummary, ValidatorAccount};
