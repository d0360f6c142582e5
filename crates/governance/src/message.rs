//! Core message types: the envelope that flows through the bus.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The build-time constitutional hash every message must carry verbatim.
///
/// Acts as a cheap, forgery-resistant namespace tag across the whole
/// governance regime. See [`crate::validation`] for the constant-time
/// comparison used to check it.
pub const CONSTITUTIONAL_HASH: &str = "cdd01ef066bc6cf2";

/// Classification of an inter-agent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Command,
    Query,
    Response,
    Event,
    Notification,
    Heartbeat,
    GovernanceRequest,
    GovernanceResponse,
    ConstitutionalValidation,
    TaskRequest,
    TaskResponse,
}

/// Message priority. Numeric ordering is load-bearing: `LOW < MEDIUM <
/// HIGH < CRITICAL`, and the ingress queue dequeues highest-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum MessagePriority {
    Low = 0,
    Medium = 1,
    High = 2,
    Critical = 3,
}

/// Message lifecycle status. Transitions form the DAG documented on
/// [`MessageStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Pending,
    Processing,
    Delivered,
    Failed,
    Expired,
    PendingDeliberation,
}

impl MessageStatus {
    /// Whether transitioning from `self` to `next` is legal per the
    /// state machine in `spec.md` §4.5:
    ///
    /// ```text
    /// PENDING ─┬─► EXPIRED
    ///          ├─► FAILED
    ///          ├─► PROCESSING ─┬─► DELIVERED
    ///          │               └─► FAILED
    ///          └─► PENDING_DELIBERATION ─┬─► DELIVERED
    ///                                    └─► FAILED
    /// ```
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        use MessageStatus::*;
        matches!(
            (self, next),
            (Pending, Expired)
                | (Pending, Failed)
                | (Pending, Processing)
                | (Pending, PendingDeliberation)
                | (Processing, Delivered)
                | (Processing, Failed)
                | (PendingDeliberation, Delivered)
                | (PendingDeliberation, Failed)
        )
    }
}

/// Routing hints attached to a message for delivery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingContext {
    pub source: String,
    pub target: String,
    pub routing_key: String,
    pub routing_tags: Vec<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub timeout_ms: u64,
}

/// One inter-agent communication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub from_agent: String,
    pub to_agent: String,
    pub tenant_id: Option<String>,
    pub message_type: MessageType,
    pub content: HashMap<String, serde_json::Value>,
    pub payload: HashMap<String, serde_json::Value>,
    pub headers: HashMap<String, String>,
    pub priority: MessagePriority,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub constitutional_hash: String,
    pub constitutional_validated: bool,
    pub impact_score: Option<f32>,
    pub security_context: HashMap<String, String>,
    pub routing: Option<RoutingContext>,
}

impl Message {
    /// Construct a new `PENDING` message stamped with the bus's
    /// constitutional hash and `created_at == updated_at`.
    pub fn new(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        message_type: MessageType,
        priority: MessagePriority,
    ) -> Self {
        let now = Utc::now();
        Self {
            message_id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
            tenant_id: None,
            message_type,
            content: HashMap::new(),
            payload: HashMap::new(),
            headers: HashMap::new(),
            priority,
            status: MessageStatus::Pending,
            created_at: now,
            updated_at: now,
            expires_at: None,
            constitutional_hash: CONSTITUTIONAL_HASH.to_string(),
            constitutional_validated: false,
            impact_score: None,
            security_context: HashMap::new(),
            routing: None,
        }
    }

    /// Keep the same `conversation_id` for a correlated follow-up
    /// message (e.g. a handler's response, or a retry).
    pub fn correlated(
        &self,
        to_agent: impl Into<String>,
        message_type: MessageType,
    ) -> Self {
        let mut m = Self::new(self.to_agent.clone(), to_agent, message_type, self.priority);
        m.conversation_id = self.conversation_id;
        m.tenant_id = self.tenant_id.clone();
        m
    }

    pub fn with_content(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.content.insert(key.into(), value);
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_security_role(mut self, role: impl Into<String>) -> Self {
        self.security_context.insert("role".to_string(), role.into());
        self
    }

    /// `true` once `expires_at` has passed relative to `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if now > at)
    }

    /// Transition `status`, enforcing the state-machine invariant and
    /// bumping `updated_at`. Panics on an illegal transition: that is a
    /// programming error, not a per-message failure.
    pub fn transition(&mut self, next: MessageStatus) {
        assert!(
            self.status.can_transition_to(next),
            "illegal message status transition: {:?} -> {:?}",
            self.status,
            next
        );
        self.status = next;
        self.updated_at = Utc::now();
    }

    pub fn role(&self) -> Option<&str> {
        self.security_context.get("role").map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_message_is_pending_and_stamped() {
        let m = Message::new("agent-a", "agent-b", MessageType::TaskRequest, MessagePriority::Medium);
        assert_eq!(m.status, MessageStatus::Pending);
        assert_eq!(m.constitutional_hash, CONSTITUTIONAL_HASH);
        assert!(!m.constitutional_validated);
        assert_eq!(m.created_at, m.updated_at);
    }

    #[test]
    fn priority_orders_ascending() {
        assert!(MessagePriority::Low < MessagePriority::Medium);
        assert!(MessagePriority::Medium < MessagePriority::High);
        assert!(MessagePriority::High < MessagePriority::Critical);
    }

    #[test]
    fn status_dag_allows_documented_paths() {
        use MessageStatus::*;
        assert!(Pending.can_transition_to(Expired));
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Delivered));
        assert!(Processing.can_transition_to(Failed));
        assert!(Pending.can_transition_to(PendingDeliberation));
        assert!(PendingDeliberation.can_transition_to(Delivered));
        assert!(PendingDeliberation.can_transition_to(Failed));
    }

    #[test]
    fn status_dag_rejects_other_paths() {
        use MessageStatus::*;
        assert!(!Delivered.can_transition_to(Processing));
        assert!(!Expired.can_transition_to(Delivered));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!PendingDeliberation.can_transition_to(Processing));
    }

    #[test]
    #[should_panic(expected = "illegal message status transition")]
    fn transition_panics_on_illegal_path() {
        let mut m = Message::new("a", "b", MessageType::Query, MessagePriority::Low);
        m.transition(MessageStatus::Delivered);
    }

    #[test]
    fn expiry_check_uses_injected_clock() {
        let m = Message::new("a", "b", MessageType::Query, MessagePriority::Low)
            .with_expires_at(Utc::now() - chrono::Duration::seconds(1));
        assert!(m.is_expired_at(Utc::now()));
    }

    #[test]
    fn correlated_message_shares_conversation_id() {
        let m1 = Message::new("a", "b", MessageType::TaskRequest, MessagePriority::Medium);
        let m2 = m1.correlated("a", MessageType::TaskResponse);
        assert_eq!(m1.conversation_id, m2.conversation_id);
        assert_eq!(m2.from_agent, "b");
        assert_eq!(m2.to_agent, "a");
    }
}
