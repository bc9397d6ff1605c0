//! # Sigil Admission
//!
//! Front-running-safe admission through commit-reveal.
//!
//! - [`CommitRevealController`] - one live commitment per committer, timed reveal window
//! - [`commitment_hash`] - the client-side hash, bound to scope and deployment domain
//! - [`TaskAuthorizationStore`] - task authorizations admitted through the same protocol

pub mod controller;
pub mod error;
pub mod task_auth;

pub use controller::{commitment_hash, CommitRevealController, Commitment, Salt};
pub use error::AdmissionError;
pub use sigil_core::CommitmentScope;
pub use task_auth::{TaskAuthorization, TaskAuthorizationParams, TaskAuthorizationStore};
