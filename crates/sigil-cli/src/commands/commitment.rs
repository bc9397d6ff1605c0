//! Commitment command - Compute commitment hashes client-side
//!
//! Usage:
//! ```bash
//! sigil commitment registration --draft agent.json --owner alice --salt <64 hex>
//! sigil commitment task --draft task.json --authorizer alice --salt <64 hex>
//! ```
//!
//! The hash is what gets committed; the printed params and salt are what must
//! be revealed later, byte for byte.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sigil_admission::{commitment_hash, Salt};
use sigil_core::{AccountId, CommitmentScope, Hash, ProtocolConfig};
use std::path::{Path, PathBuf};

use crate::draft::{AgentDraft, TaskDraft};

/// Arguments for the commitment command
#[derive(Args)]
pub struct CommitmentArgs {
    #[command(subcommand)]
    kind: CommitmentKind,

    /// 32-byte salt as hex; keep it secret until the reveal
    #[arg(long, global = true, value_name = "HEX")]
    salt: Option<String>,

    /// Also print the params that must be revealed
    #[arg(long, global = true)]
    show_params: bool,
}

#[derive(Subcommand)]
enum CommitmentKind {
    /// Commitment for an agent registration
    Registration {
        /// Agent draft (JSON): did, metadata, keys by seed
        #[arg(long, value_name = "FILE")]
        draft: PathBuf,

        /// Account that will commit and own the agent
        #[arg(long)]
        owner: String,
    },

    /// Commitment for a task authorization
    Task {
        /// Task draft (JSON): task label, agent DID, scope, valid_for
        #[arg(long, value_name = "FILE")]
        draft: PathBuf,

        /// Account that will commit and authorize the task
        #[arg(long)]
        authorizer: String,
    },
}

/// A computed commitment and everything needed to reveal it
#[derive(Debug, Serialize)]
pub struct Prepared<P> {
    pub scope: CommitmentScope,
    pub committer: AccountId,
    pub domain_id: u64,
    pub hash: Hash,
    pub params: P,
}

/// Run the commitment command
pub fn run(args: CommitmentArgs, config: &ProtocolConfig) -> Result<()> {
    let salt_hex = args
        .salt
        .context("--salt is required (32 bytes of hex, e.g. from `openssl rand -hex 32`)")?;
    let salt = Salt::from_hex(&salt_hex).context("Salt must be exactly 32 bytes of hex")?;

    match args.kind {
        CommitmentKind::Registration { draft, owner } => {
            let draft: AgentDraft = read_json(&draft)?;
            let prepared = prepare_registration(&draft, &AccountId::new(owner), &salt, config.domain_id)?;
            print_prepared(&prepared, args.show_params)
        }
        CommitmentKind::Task { draft, authorizer } => {
            let draft: TaskDraft = read_json(&draft)?;
            let prepared = prepare_task(&draft, &AccountId::new(authorizer), &salt, config.domain_id)?;
            print_prepared(&prepared, args.show_params)
        }
    }
}

pub fn prepare_registration(
    draft: &AgentDraft,
    owner: &AccountId,
    salt: &Salt,
    domain_id: u64,
) -> Result<Prepared<sigil_registry::RegistrationParams>> {
    let params = draft.params(domain_id, owner)?;
    let hash = commitment_hash(CommitmentScope::Registration, &params, owner, salt, domain_id)?;
    Ok(Prepared {
        scope: CommitmentScope::Registration,
        committer: owner.clone(),
        domain_id,
        hash,
        params,
    })
}

pub fn prepare_task(
    draft: &TaskDraft,
    authorizer: &AccountId,
    salt: &Salt,
    domain_id: u64,
) -> Result<Prepared<sigil_admission::TaskAuthorizationParams>> {
    let params = draft.params();
    let hash = commitment_hash(CommitmentScope::TaskAuthorization, &params, authorizer, salt, domain_id)?;
    Ok(Prepared {
        scope: CommitmentScope::TaskAuthorization,
        committer: authorizer.clone(),
        domain_id,
        hash,
        params,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read draft: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse draft: {}", path.display()))
}

fn print_prepared<P: Serialize>(prepared: &Prepared<P>, show_params: bool) -> Result<()> {
    println!("{}", "Sigil Commitment".bold().cyan());
    println!("{}", "═".repeat(40).cyan());
    println!();
    println!("  {} {:?}", "Scope:".dimmed(), prepared.scope);
    println!("  {} {}", "Committer:".dimmed(), prepared.committer);
    println!("  {} {}", "Domain:".dimmed(), prepared.domain_id);
    println!("  {} {}", "Hash:".dimmed(), prepared.hash.to_hex().green());
    println!();

    if show_params {
        let params = serde_json::to_string_pretty(&prepared.params).context("Failed to encode params")?;
        println!("{}", "Reveal params:".bold());
        println!("{}", params);
        println!();
    }

    crate::print_info("Commit the hash now; reveal the params with the same salt after the reveal delay");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::KeySpec;

    fn draft() -> AgentDraft {
        AgentDraft {
            did: "did:sigil:worker".into(),
            metadata: Default::default(),
            keys: vec![KeySpec::Ed25519("worker".into())],
        }
    }

    #[test]
    fn test_registration_hash_binds_owner_salt_and_domain() {
        let alice = AccountId::from("alice");
        let salt = Salt([1; 32]);
        let base = prepare_registration(&draft(), &alice, &salt, 5).unwrap();

        assert_eq!(base.hash, prepare_registration(&draft(), &alice, &salt, 5).unwrap().hash);
        assert_ne!(base.hash, prepare_registration(&draft(), &AccountId::from("bob"), &salt, 5).unwrap().hash);
        assert_ne!(base.hash, prepare_registration(&draft(), &alice, &Salt([2; 32]), 5).unwrap().hash);
        assert_ne!(base.hash, prepare_registration(&draft(), &alice, &salt, 6).unwrap().hash);
    }

    #[test]
    fn test_task_and_registration_scopes_differ() {
        let alice = AccountId::from("alice");
        let salt = Salt([1; 32]);
        let task = TaskDraft {
            task: "t".into(),
            agent: "did:sigil:worker".into(),
            scope: String::new(),
            valid_for: 60,
        };
        let prepared = prepare_task(&task, &alice, &salt, 5).unwrap();
        let same_params_as_registration =
            commitment_hash(CommitmentScope::Registration, &prepared.params, &alice, &salt, 5).unwrap();
        assert_ne!(prepared.hash, same_params_as_registration);
    }
}
