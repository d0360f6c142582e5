//! Agent registry: tracks which agents are known to the bus and how
//! to reach them.

use std::collections::HashMap;
use std::sync::Arc;

use agent_bus_governance::Role;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A registered agent and its bus-relevant metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    pub role: Option<Role>,
    pub tenant_id: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

impl AgentRecord {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            role: None,
            tenant_id: None,
            registered_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

/// Registry of agents known to this bus instance.
///
/// A host may substitute a distributed backing behind the same
/// contract (`spec.md` §9 Open Question 4); this in-process
/// implementation makes no cross-process ordering guarantee and
/// doesn't need to, since it is the only implementation shipped here.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Arc<AgentRecord>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new agent. Returns `false` and leaves the existing
    /// record untouched if `agent_id` is already registered.
    pub fn register(&self, record: AgentRecord) -> bool {
        let mut agents = self.agents.write();
        if agents.contains_key(&record.agent_id) {
            return false;
        }
        agents.insert(record.agent_id.clone(), Arc::new(record));
        true
    }

    /// Returns `false` if `agent_id` was not registered.
    pub fn unregister(&self, agent_id: &str) -> bool {
        self.agents.write().remove(agent_id).is_some()
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<AgentRecord>> {
        self.agents.read().get(agent_id).cloned()
    }

    pub fn exists(&self, agent_id: &str) -> bool {
        self.agents.read().contains_key(agent_id)
    }

    /// Snapshot of all known agent IDs. Does not hold the lock while
    /// the caller iterates the result.
    pub fn list_agents(&self) -> Vec<String> {
        self.agents.read().keys().cloned().collect()
    }

    pub fn update_metadata(&self, agent_id: &str, key: impl Into<String>, value: impl Into<String>) -> bool {
        let mut agents = self.agents.write();
        match agents.get_mut(agent_id) {
            Some(record) => {
                let mut updated = (**record).clone();
                updated.metadata.insert(key.into(), value.into());
                *record = Arc::new(updated);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
