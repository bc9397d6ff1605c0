//! Task authorizations admitted through commit-reveal

use serde::{Deserialize, Serialize};
use sigil_core::{AccountId, AgentDirectory, AgentId, TaskId, Timestamp};
use std::collections::HashMap;

use crate::error::AdmissionError;

/// Plaintext revealed for a task-authorization commitment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAuthorizationParams {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    /// Free-form description of what the agent may do
    pub scope: String,
    /// Seconds the authorization stays valid after reveal
    pub valid_for: Timestamp,
}

/// An agent's authorization to perform one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAuthorization {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub authorizer: AccountId,
    pub scope: String,
    pub authorized_at: Timestamp,
    pub expires_at: Timestamp,
}

impl TaskAuthorization {
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        now <= self.expires_at
    }
}

/// Store of revealed task authorizations, one per task id
#[derive(Debug, Default, Clone)]
pub struct TaskAuthorizationStore {
    authorizations: HashMap<TaskId, TaskAuthorization>,
}

impl TaskAuthorizationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the owner of an active agent may authorize it for a task
    pub fn check(
        &self,
        authorizer: &AccountId,
        params: &TaskAuthorizationParams,
        directory: &dyn AgentDirectory,
    ) -> Result<(), AdmissionError> {
        if self.authorizations.contains_key(&params.task_id) {
            return Err(AdmissionError::TaskAlreadyAuthorized(params.task_id));
        }
        if !directory.is_active(&params.agent_id) {
            return Err(AdmissionError::AgentNotActive(params.agent_id));
        }
        if directory.owner_of(&params.agent_id).as_ref() != Some(authorizer) {
            return Err(AdmissionError::NotAgentOwner {
                agent_id: params.agent_id,
                caller: authorizer.clone(),
            });
        }
        Ok(())
    }

    /// Record an authorization; called as the continuation of a reveal
    pub fn authorize(
        &mut self,
        authorizer: &AccountId,
        params: &TaskAuthorizationParams,
        now: Timestamp,
        directory: &dyn AgentDirectory,
    ) -> Result<TaskAuthorization, AdmissionError> {
        self.check(authorizer, params, directory)?;

        let authorization = TaskAuthorization {
            task_id: params.task_id,
            agent_id: params.agent_id,
            authorizer: authorizer.clone(),
            scope: params.scope.clone(),
            authorized_at: now,
            expires_at: now.saturating_add(params.valid_for),
        };
        self.authorizations.insert(params.task_id, authorization.clone());

        tracing::debug!(task_id = %params.task_id, agent_id = %params.agent_id, "task authorized");
        Ok(authorization)
    }

    pub fn get(&self, task_id: &TaskId) -> Option<&TaskAuthorization> {
        self.authorizations.get(task_id)
    }

    pub fn is_authorized(&self, task_id: &TaskId, now: Timestamp) -> bool {
        self.authorizations
            .get(task_id)
            .map(|a| a.is_valid_at(now))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.authorizations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authorizations.is_empty()
    }
}
