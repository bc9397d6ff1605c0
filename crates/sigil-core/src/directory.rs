//! Read-only view of agent lifecycle state.
//!
//! Components that gate on "is this agent active?" (task authorization,
//! validation requests) depend on this trait rather than on the registry.

use crate::ids::{AccountId, AgentId};

/// Lookup of agent status and ownership
pub trait AgentDirectory {
    /// Whether the agent exists and is currently active
    fn is_active(&self, agent_id: &AgentId) -> bool;

    /// Owner of the agent, if it exists
    fn owner_of(&self, agent_id: &AgentId) -> Option<AccountId>;
}

/// Fixed set of active agents, for tests and offline tooling
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    agents: std::collections::HashMap<AgentId, AccountId>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an agent active under the given owner
    pub fn with_agent(mut self, agent_id: AgentId, owner: impl Into<AccountId>) -> Self {
        self.agents.insert(agent_id, owner.into());
        self
    }
}

impl AgentDirectory for StaticDirectory {
    fn is_active(&self, agent_id: &AgentId) -> bool {
        self.agents.contains_key(agent_id)
    }

    fn owner_of(&self, agent_id: &AgentId) -> Option<AccountId> {
        self.agents.get(agent_id).cloned()
    }
}
