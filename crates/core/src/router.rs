//! Routes a message to its target agent(s) using the registry.

use agent_bus_governance::{ErrorKind, Message};

use crate::error::{BusError, BusResult};
use crate::registry::AgentRegistry;

/// Resolves message targets against the registry. Does not deliver
/// anything itself; the bus facade pairs this with a per-conversation
/// queue for actual dispatch.
pub struct Router<'a> {
    registry: &'a AgentRegistry,
}

impl<'a> Router<'a> {
    pub fn new(registry: &'a AgentRegistry) -> Self {
        Self { registry }
    }

    /// Resolve the single target agent for `message`. Fails with
    /// `NO_ROUTE` if `to_agent` is not registered.
    pub fn route(&self, message: &Message) -> BusResult<String> {
        if self.registry.exists(&message.to_agent) {
            Ok(message.to_agent.clone())
        } else {
            Err(BusError::new(
                ErrorKind::NoRoute,
                format!("no registered agent '{}'", message.to_agent),
            ))
        }
    }

    /// Resolve all registered agents for a broadcast, excluding the
    /// sender. Fails with `NO_ROUTE` if the result would be empty.
    pub fn route_broadcast(&self, message: &Message) -> BusResult<Vec<String>> {
        let targets: Vec<String> = self
            .registry
            .list_agents()
            .into_iter()
            .filter(|id| id != &message.from_agent)
            .collect();
        if targets.is_empty() {
            Err(BusError::new(ErrorKind::NoRoute, "no broadcast targets available"))
        } else {
            Ok(targets)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AgentRecord;
    use agent_bus_governance::{MessagePriority, MessageType};

    #[test]
    fn routes_to_registered_agent() {
        let registry = AgentRegistry::new();
        registry.register(AgentRecord::new("agent-b"));
        let m = Message::new("agent-a", "agent-b", MessageType::Query, MessagePriority::Low);
        assert_eq!(Router::new(&registry).route(&m).unwrap(), "agent-b");
    }

    #[test]
    fn no_route_for_unknown_agent() {
        let registry = AgentRegistry::new();
        let m = Message::new("agent-a", "agent-ghost", MessageType::Query, MessagePriority::Low);
        let err = Router::new(&registry).route(&m).unwrap_err();
        assert_eq!(err.kind, agent_bus_governance::ErrorKind::NoRoute);
    }

    #[test]
    fn broadcast_excludes_sender() {
        let registry = AgentRegistry::new();
        registry.register(AgentRecord::new("agent-a"));
        registry.register(AgentRecord::new("agent-b"));
        registry.register(AgentRecord::new("agent-c"));
        let m = Message::new("agent-a", "*", MessageType::Event, MessagePriority::Low);
        let mut targets = Router::new(&registry).route_broadcast(&m).unwrap();
        targets.sort();
        assert_eq!(targets, vec!["agent-b".to_string(), "agent-c".to_string()]);
    }

    #[test]
    fn broadcast_fails_with_no_other_agents() {
        let registry = AgentRegistry::new();
        registry.register(AgentRecord::new("agent-a"));
        let m = Message::new("agent-a", "*", MessageType::Event, MessagePriority::Low);
        assert!(Router::new(&registry).route_broadcast(&m).is_err());
    }
}
