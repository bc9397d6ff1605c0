//! Replay command - Run a scripted scenario against an in-memory host
//!
//! Usage:
//! ```bash
//! sigil replay scenario.json
//! sigil replay scenario.json --events events.json
//! ```
//!
//! A scenario names its agents and tasks once and then lists timestamped
//! steps. Steps run in order against a fresh [`TrustHost`]; each accepted
//! step prints the events it emitted, each rejected step prints its error.
//!
//! ```json
//! {
//!   "trusted_attestations": ["enclave-quote"],
//!   "agents": {
//!     "worker": { "owner": "alice", "salt": "<64 hex>", "did": "did:sigil:worker",
//!                 "keys": [{ "ed25519": "worker-seed" }] }
//!   },
//!   "steps": [
//!     { "at": 0,    "action": "commit_registration", "agent": "worker" },
//!     { "at": 60,   "action": "reveal_registration", "agent": "worker" },
//!     { "at": 3660, "action": "activate_agent", "agent": "worker" }
//!   ]
//! }
//! ```

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use sigil_admission::{commitment_hash, Salt};
use sigil_consensus::{RequestParams, StaticKeyOracle, ValidationMode};
use sigil_core::{
    AccountId, Amount, CommitmentScope, EventLog, EventRecord, Hash, ProtocolConfig, RequestId, TaskId,
    Timestamp,
};
use sigil_host::{HostError, TrustHost};
use sigil_ledger::MemoryTransfer;
use sigil_registry::AgentMetadata;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use crate::draft::{AgentDraft, TaskDraft};

/// Arguments for the replay command
#[derive(Args)]
pub struct ReplayArgs {
    /// Scenario file (JSON)
    #[arg(value_name = "FILE")]
    script: PathBuf,

    /// Write the full hash-chained event log to this file
    #[arg(long, value_name = "FILE")]
    events: Option<PathBuf>,

    /// Only print the summary
    #[arg(long, short = 'q')]
    quiet: bool,
}

/// A replayable scenario
#[derive(Debug, Deserialize)]
pub struct Script {
    /// Replaces the loaded configuration for this run
    #[serde(default)]
    pub config: Option<ProtocolConfig>,
    /// Attestation payloads the oracle accepts
    #[serde(default)]
    pub trusted_attestations: Vec<String>,
    #[serde(default)]
    pub agents: BTreeMap<String, ScriptAgent>,
    #[serde(default)]
    pub tasks: BTreeMap<String, ScriptTask>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
pub struct ScriptAgent {
    pub owner: AccountId,
    pub salt: Salt,
    #[serde(flatten)]
    pub draft: AgentDraft,
}

#[derive(Debug, Deserialize)]
pub struct ScriptTask {
    pub authorizer: AccountId,
    pub salt: Salt,
    #[serde(flatten)]
    pub draft: TaskDraft,
}

#[derive(Debug, Deserialize)]
pub struct Step {
    pub at: Timestamp,
    /// The step is expected to be rejected
    #[serde(default)]
    pub expect_error: bool,
    #[serde(flatten)]
    pub action: Action,
}

/// One host transition; names refer to the scenario's `agents`, `tasks`
/// and previously opened requests
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    CommitRegistration {
        agent: String,
        #[serde(default)]
        value: Amount,
    },
    RevealRegistration {
        agent: String,
    },
    ActivateAgent {
        agent: String,
    },
    RevokeKey {
        agent: String,
        #[serde(default)]
        key: usize,
    },
    UpdateAgent {
        agent: String,
        metadata: AgentMetadata,
    },
    DeactivateAgent {
        agent: String,
    },
    ReclaimCommitment {
        caller: AccountId,
    },
    CommitTask {
        task: String,
    },
    RevealTask {
        task: String,
    },
    RequestValidation {
        request: String,
        requester: AccountId,
        task: String,
        agent: String,
        /// The result the agent claims; hashed with SHA-256
        result: String,
        mode: ValidationMode,
        deadline: Timestamp,
        stake: Amount,
    },
    SubmitStake {
        request: String,
        validator: AccountId,
        result: String,
        stake: Amount,
        #[serde(default)]
        proof: String,
    },
    SubmitAttestation {
        request: String,
        submitter: AccountId,
        attestation: String,
        proof: String,
    },
    FinalizeExpired {
        request: String,
        caller: AccountId,
    },
    Withdraw {
        account: AccountId,
    },
    UpdateConfig {
        caller: AccountId,
        config: ProtocolConfig,
    },
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Self::CommitRegistration { .. } => "commit_registration",
            Self::RevealRegistration { .. } => "reveal_registration",
            Self::ActivateAgent { .. } => "activate_agent",
            Self::RevokeKey { .. } => "revoke_key",
            Self::UpdateAgent { .. } => "update_agent",
            Self::DeactivateAgent { .. } => "deactivate_agent",
            Self::ReclaimCommitment { .. } => "reclaim_commitment",
            Self::CommitTask { .. } => "commit_task",
            Self::RevealTask { .. } => "reveal_task",
            Self::RequestValidation { .. } => "request_validation",
            Self::SubmitStake { .. } => "submit_stake",
            Self::SubmitAttestation { .. } => "submit_attestation",
            Self::FinalizeExpired { .. } => "finalize_expired",
            Self::Withdraw { .. } => "withdraw",
            Self::UpdateConfig { .. } => "update_config",
        }
    }
}

/// What happened to one step
#[derive(Debug)]
pub struct StepReport {
    pub index: usize,
    pub at: Timestamp,
    pub action: &'static str,
    pub outcome: Result<String, HostError>,
    pub expected_error: bool,
    /// Events emitted by this step
    pub events: Vec<EventRecord>,
}

impl StepReport {
    pub fn as_expected(&self) -> bool {
        self.outcome.is_err() == self.expected_error
    }
}

/// Drives a [`TrustHost`] through a scenario
pub struct Replayer<'a> {
    script: &'a Script,
    host: TrustHost,
    transfer: MemoryTransfer,
    requests: HashMap<String, RequestId>,
}

impl<'a> Replayer<'a> {
    pub fn new(script: &'a Script, config: ProtocolConfig) -> Result<Self> {
        let config = script.config.clone().unwrap_or(config);
        let oracle = StaticKeyOracle::with_trusted(
            script
                .trusted_attestations
                .iter()
                .map(|payload| Hash::digest(payload.as_bytes())),
        );
        let host = TrustHost::new(config, Arc::new(oracle)).context("Scenario configuration rejected")?;
        Ok(Self {
            script,
            host,
            transfer: MemoryTransfer::new(),
            requests: HashMap::new(),
        })
    }

    pub fn host(&self) -> &TrustHost {
        &self.host
    }

    /// Run every step; scenario errors (unknown names, bad keys) abort the run
    pub fn run(&mut self) -> Result<Vec<StepReport>> {
        let mut reports = Vec::with_capacity(self.script.steps.len());
        for (index, step) in self.script.steps.iter().enumerate() {
            let before = self.host.events().len() as u64;
            let outcome = self
                .apply(step)
                .with_context(|| format!("Step {} ({}) is malformed", index, step.action.name()))?;
            tracing::debug!(step = index, action = step.action.name(), ok = outcome.is_ok(), "step replayed");
            reports.push(StepReport {
                index,
                at: step.at,
                action: step.action.name(),
                outcome,
                expected_error: step.expect_error,
                events: self.host.events().since(before).to_vec(),
            });
        }
        Ok(reports)
    }

    fn agent(&self, name: &str) -> Result<&'a ScriptAgent> {
        self.script
            .agents
            .get(name)
            .with_context(|| format!("Unknown agent '{}'", name))
    }

    fn task(&self, name: &str) -> Result<&'a ScriptTask> {
        self.script
            .tasks
            .get(name)
            .with_context(|| format!("Unknown task '{}'", name))
    }

    fn request(&self, name: &str) -> Result<RequestId> {
        self.requests
            .get(name)
            .copied()
            .with_context(|| format!("Unknown request '{}'", name))
    }

    /// Outer error: the scenario itself is broken. Inner error: the host
    /// rejected the transition.
    fn apply(&mut self, step: &Step) -> Result<Result<String, HostError>> {
        let now = step.at;
        let domain_id = self.host.config().domain_id;

        let outcome = match &step.action {
            Action::CommitRegistration { agent, value } => {
                let agent = self.agent(agent)?;
                let params = agent.draft.params(domain_id, &agent.owner)?;
                let hash = commitment_hash(CommitmentScope::Registration, &params, &agent.owner, &agent.salt, domain_id)?;
                self.host
                    .commit_registration(&agent.owner, hash, *value, now)
                    .map(|()| format!("committed {}", hash))
            }
            Action::RevealRegistration { agent } => {
                let agent = self.agent(agent)?;
                let params = agent.draft.params(domain_id, &agent.owner)?;
                self.host
                    .reveal_registration(&agent.owner, &params, &agent.salt, now)
                    .map(|id| format!("registered {}", id))
            }
            Action::ActivateAgent { agent } => {
                let agent = self.agent(agent)?;
                self.host
                    .activate_agent(&agent.owner, &agent.draft.agent_id(), now)
                    .map(|refund| format!("activated, {} stake released", refund))
            }
            Action::RevokeKey { agent, key } => {
                let agent = self.agent(agent)?;
                let key_hash = agent.draft.key_hash(*key, domain_id, &agent.owner)?;
                self.host
                    .revoke_key(&agent.owner, &key_hash, now)
                    .map(|revoked| format!("{} record(s) revoked", revoked.len()))
            }
            Action::UpdateAgent { agent, metadata } => {
                let agent = self.agent(agent)?;
                self.host
                    .update_agent(&agent.owner, &agent.draft.agent_id(), metadata.clone(), now)
                    .map(|nonce| format!("nonce {}", nonce))
            }
            Action::DeactivateAgent { agent } => {
                let agent = self.agent(agent)?;
                self.host
                    .deactivate_agent(&agent.owner, &agent.draft.agent_id(), now)
                    .map(|()| "deactivated".to_string())
            }
            Action::ReclaimCommitment { caller } => self
                .host
                .reclaim_commitment(caller, now)
                .map(|refund| format!("{} refunded", refund)),
            Action::CommitTask { task } => {
                let task = self.task(task)?;
                let hash = commitment_hash(
                    CommitmentScope::TaskAuthorization,
                    &task.draft.params(),
                    &task.authorizer,
                    &task.salt,
                    domain_id,
                )?;
                self.host
                    .commit_task_authorization(&task.authorizer, hash, now)
                    .map(|()| format!("committed {}", hash))
            }
            Action::RevealTask { task } => {
                let task = self.task(task)?;
                self.host
                    .reveal_task_authorization(&task.authorizer, &task.draft.params(), &task.salt, now)
                    .map(|auth| format!("authorized until {}", auth.expires_at))
            }
            Action::RequestValidation {
                request,
                requester,
                task,
                agent,
                result,
                mode,
                deadline,
                stake,
            } => {
                if self.requests.contains_key(request) {
                    bail!("Request name '{}' is already used", request);
                }
                let params = RequestParams {
                    task_id: TaskId::from_label(task),
                    target_agent: self.agent(agent)?.draft.agent_id(),
                    expected_hash: Hash::digest(result.as_bytes()),
                    mode: *mode,
                    deadline: *deadline,
                    stake: *stake,
                };
                let outcome = self.host.request_validation(requester, params, now);
                if let Ok(id) = &outcome {
                    self.requests.insert(request.clone(), *id);
                }
                outcome.map(|id| format!("opened {}", id))
            }
            Action::SubmitStake {
                request,
                validator,
                result,
                stake,
                proof,
            } => {
                let id = self.request(request)?;
                self.host
                    .submit_stake_validation(
                        validator,
                        &id,
                        Hash::digest(result.as_bytes()),
                        proof.as_bytes().to_vec(),
                        *stake,
                        now,
                    )
                    .map(|outcome| match outcome.settlement {
                        Some(settlement) => format!("decided {:?}", settlement.status),
                        None => format!("{}/{} agree", outcome.tally.agree, outcome.tally.total()),
                    })
            }
            Action::SubmitAttestation {
                request,
                submitter,
                attestation,
                proof,
            } => {
                let id = self.request(request)?;
                self.host
                    .submit_tee_attestation(submitter, &id, attestation.as_bytes(), proof.as_bytes(), now)
                    .map(|settlement| format!("decided {:?}", settlement.status))
            }
            Action::FinalizeExpired { request, caller } => {
                let id = self.request(request)?;
                self.host
                    .finalize_expired(caller, &id, now)
                    .map(|settlement| format!("closed {:?}", settlement.status))
            }
            Action::Withdraw { account } => self
                .host
                .withdraw(account, &self.transfer)
                .map(|paid| format!("{} paid out", paid)),
            Action::UpdateConfig { caller, config } => self
                .host
                .update_config(caller, config.clone())
                .map(|version| format!("version {}", version)),
        };
        Ok(outcome)
    }
}

/// Run the replay command
pub fn run(args: ReplayArgs, config: ProtocolConfig) -> Result<()> {
    let content = std::fs::read_to_string(&args.script)
        .with_context(|| format!("Failed to read scenario: {}", args.script.display()))?;
    let script: Script = serde_json::from_str(&content).context("Failed to parse scenario JSON")?;

    let mut replayer = Replayer::new(&script, config)?;
    let reports = replayer.run()?;
    let host = replayer.host();

    println!("{}", "Sigil Replay".bold().cyan());
    println!("{}", "═".repeat(40).cyan());
    println!();

    if !args.quiet {
        for report in &reports {
            print_report(report);
        }
        println!();
    }

    let records = host.events().records();
    let chain_ok = EventLog::verify_chain(records);
    let status = host.status();
    let unexpected = reports.iter().filter(|r| !r.as_expected()).count();

    println!("{}", "Summary:".bold());
    println!("  {} {}", "Steps:".dimmed(), reports.len());
    println!("  {} {}", "Events:".dimmed(), records.len());
    println!("  {} {}", "Agents:".dimmed(), status.agents);
    println!(
        "  {} deposited {}, escrowed {}, pending {}, withdrawn {}",
        "Ledger:".dimmed(),
        status.totals.deposited,
        status.totals.escrowed,
        status.totals.pending,
        status.totals.withdrawn
    );
    if let Some(head) = status.head {
        println!("  {} {}", "Chain head:".dimmed(), head.to_hex().green());
    }
    println!();

    if let Some(path) = &args.events {
        let json = serde_json::to_string_pretty(records).context("Failed to encode events")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write events: {}", path.display()))?;
        crate::print_info(&format!("Event log written to {}", path.display()));
    }

    if !chain_ok {
        bail!("Event chain failed verification");
    }
    if !status.totals.is_conserved() {
        bail!("Ledger totals are not conserved: {:?}", status.totals);
    }
    if unexpected > 0 {
        crate::print_error(&format!("{} step(s) did not behave as scripted", unexpected));
        bail!("Scenario diverged");
    }

    crate::print_success("Scenario replayed as scripted; event chain and ledger verified");
    Ok(())
}

fn print_report(report: &StepReport) {
    let mark = if report.as_expected() {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    let detail = match &report.outcome {
        Ok(detail) => detail.normal(),
        Err(e) => format!("rejected ({:?}): {}", e.class(), e).yellow(),
    };
    println!(
        "{} {:>3} t={:<8} {:<20} {}",
        mark,
        report.index,
        report.at,
        report.action.bold(),
        detail
    );
    for record in &report.events {
        let event = serde_json::to_string(&record.event).unwrap_or_else(|_| "<unencodable>".to_string());
        println!("      {} #{} {}", "→".cyan(), record.sequence, event.dimmed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::{AgentId, ErrorClass, ValidationStatus};

    const SALT: &str = "0101010101010101010101010101010101010101010101010101010101010101";

    fn script(steps: &str) -> Script {
        let json = format!(
            r#"{{
                "trusted_attestations": ["enclave-quote"],
                "agents": {{
                    "worker": {{
                        "owner": "alice",
                        "salt": "{salt}",
                        "did": "did:sigil:worker",
                        "metadata": {{ "name": "worker" }},
                        "keys": [ {{ "ed25519": "worker-signing" }}, {{ "x25519": "worker-kex" }} ]
                    }}
                }},
                "tasks": {{
                    "report": {{
                        "authorizer": "alice",
                        "salt": "{salt}",
                        "task": "nightly-report",
                        "agent": "did:sigil:worker",
                        "scope": "read:reports",
                        "valid_for": 600
                    }}
                }},
                "steps": [ {steps} ]
            }}"#,
            salt = SALT,
            steps = steps
        );
        serde_json::from_str(&json).unwrap()
    }

    const REGISTER: &str = r#"
        { "at": 0, "action": "commit_registration", "agent": "worker" },
        { "at": 30, "action": "reveal_registration", "agent": "worker", "expect_error": true },
        { "at": 60, "action": "reveal_registration", "agent": "worker" },
        { "at": 3660, "action": "activate_agent", "agent": "worker" }
    "#;

    fn replay(steps: &str) -> (Vec<StepReport>, TrustHost) {
        let script = script(steps);
        let mut replayer = Replayer::new(&script, ProtocolConfig::for_domain(7, "gov")).unwrap();
        let reports = replayer.run().unwrap();
        (reports, replayer.host)
    }

    #[test]
    fn test_registration_scenario() {
        let (reports, host) = replay(REGISTER);

        assert!(reports.iter().all(StepReport::as_expected));
        assert_eq!(
            reports[1].outcome.as_ref().unwrap_err().class(),
            ErrorClass::Admission
        );
        assert!(reports[1].events.is_empty());
        assert!(host.agent(&AgentId::from_did("did:sigil:worker")).unwrap().is_active());
        assert!(EventLog::verify_chain(host.events().records()));
    }

    #[test]
    fn test_validation_scenario_settles_and_pays_out() {
        let steps = format!(
            r#"{register},
            {{ "at": 4000, "action": "request_validation", "request": "r1", "requester": "bob",
               "task": "job", "agent": "worker", "result": "ok", "mode": "stake",
               "deadline": 11200, "stake": 1000 }},
            {{ "at": 4100, "action": "submit_stake", "request": "r1", "validator": "v1", "result": "ok", "stake": 100 }},
            {{ "at": 4100, "action": "submit_stake", "request": "r1", "validator": "v2", "result": "ok", "stake": 100 }},
            {{ "at": 4100, "action": "submit_stake", "request": "r1", "validator": "v3", "result": "bad", "stake": 100 }},
            {{ "at": 4200, "action": "withdraw", "account": "v1" }},
            {{ "at": 4200, "action": "withdraw", "account": "v1", "expect_error": true }}"#,
            register = REGISTER
        );
        let (reports, host) = replay(&steps);

        assert!(reports.iter().all(StepReport::as_expected));
        let id = RequestId::derive(7, &AccountId::from("bob"), &TaskId::from_label("job"), 0);
        assert_eq!(host.request(&id).unwrap().status, ValidationStatus::Validated);
        assert_eq!(reports[8].outcome.as_deref(), Ok("150 paid out"));
        assert_eq!(host.pending_balance(&AccountId::from("v2")), 150);
        assert!(host.status().totals.is_conserved());
    }

    #[test]
    fn test_attestation_uses_trusted_payloads() {
        let steps = format!(
            r#"{register},
            {{ "at": 4000, "action": "request_validation", "request": "r1", "requester": "bob",
               "task": "job", "agent": "worker", "result": "ok", "mode": "attestation",
               "deadline": 11200, "stake": 1000 }},
            {{ "at": 4100, "action": "submit_attestation", "request": "r1", "submitter": "tee",
               "attestation": "forged-quote", "proof": "sig", "expect_error": true }},
            {{ "at": 4100, "action": "submit_attestation", "request": "r1", "submitter": "tee",
               "attestation": "enclave-quote", "proof": "sig" }}"#,
            register = REGISTER
        );
        let (reports, _) = replay(&steps);
        assert!(reports.iter().all(StepReport::as_expected));
        assert_eq!(reports[6].outcome.as_deref(), Ok("decided Validated"));
    }

    #[test]
    fn test_task_and_revocation_scenario() {
        let steps = format!(
            r#"{register},
            {{ "at": 4000, "action": "commit_task", "task": "report" }},
            {{ "at": 4060, "action": "reveal_task", "task": "report" }},
            {{ "at": 4100, "action": "revoke_key", "agent": "worker", "key": 0 }},
            {{ "at": 4200, "action": "update_agent", "agent": "worker",
               "metadata": {{ "name": "renamed" }}, "expect_error": true }}"#,
            register = REGISTER
        );
        let (reports, host) = replay(&steps);
        assert!(reports.iter().all(StepReport::as_expected));
        assert!(host.is_task_authorized(&TaskId::from_label("nightly-report"), 4_100));
        assert_eq!(reports[6].outcome.as_deref(), Ok("1 record(s) revoked"));
    }

    #[test]
    fn test_demo_scenario_replays_as_scripted() {
        let script: Script = serde_json::from_str(include_str!("../../../../demos/scenario.json")).unwrap();
        let mut replayer = Replayer::new(&script, ProtocolConfig::default()).unwrap();
        let reports = replayer.run().unwrap();

        let diverged: Vec<_> = reports.iter().filter(|r| !r.as_expected()).map(|r| r.index).collect();
        assert!(diverged.is_empty(), "steps {:?} diverged", diverged);
        let status = replayer.host().status();
        assert!(status.totals.is_conserved());
        assert_eq!(status.totals.escrowed, 0);
        assert!(EventLog::verify_chain(replayer.host().events().records()));
    }

    #[test]
    fn test_unknown_names_abort_the_run() {
        let script = script(r#"{ "at": 0, "action": "activate_agent", "agent": "ghost" }"#);
        let mut replayer = Replayer::new(&script, ProtocolConfig::default()).unwrap();
        let err = replayer.run().unwrap_err();
        assert!(format!("{:#}", err).contains("Unknown agent 'ghost'"));
    }
}
