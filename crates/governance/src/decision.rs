//! The audit record shape emitted for every governed decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validation::sanitize_hash;

/// The final disposition of a governed decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Allow,
    Deny,
    Review,
}

/// One row of the audit trail. Emitted fire-and-forget by the
/// processor's audit sink (`spec.md` §4.5 step 9); never blocks the
/// hot path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLog {
    pub trace_id: Uuid,
    pub span_id: Uuid,
    pub agent_id: String,
    pub tenant_id: Option<String>,
    pub policy_version: Option<String>,
    pub risk_score: Option<f32>,
    pub decision: Decision,
    pub constitutional_hash: String,
    pub timestamp: DateTime<Utc>,
    pub compliance_tags: Vec<String>,
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
}

impl DecisionLog {
    pub fn new(agent_id: impl Into<String>, decision: Decision, constitutional_hash: &str) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            tenant_id: None,
            policy_version: None,
            risk_score: None,
            decision,
            constitutional_hash: sanitize_hash(constitutional_hash),
            timestamp: Utc::now(),
            compliance_tags: Vec::new(),
            metadata: std::collections::HashMap::new(),
        }
    }

    /// A follow-up record (e.g. the final ALLOW/DENY after a REVIEW)
    /// that keeps the same `trace_id` for correlation but gets a fresh
    /// `span_id`.
    pub fn follow_up(&self, decision: Decision) -> Self {
        let mut log = Self::new(self.agent_id.clone(), decision, &self.constitutional_hash);
        log.trace_id = self.trace_id;
        log.tenant_id = self.tenant_id.clone();
        log.policy_version = self.policy_version.clone();
        log
    }

    pub fn with_risk_score(mut self, score: f32) -> Self {
        self.risk_score = Some(score);
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_compliance_tag(mut self, tag: impl Into<String>) -> Self {
        self.compliance_tags.push(tag.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructed_log_never_carries_the_full_hash() {
        let log = DecisionLog::new("agent-a", Decision::Allow, "cdd01ef066bc6cf2");
        assert!(log.constitutional_hash.len() < "cdd01ef066bc6cf2".len());
    }

    #[test]
    fn follow_up_shares_trace_id_but_not_span_id() {
        let initial = DecisionLog::new("agent-a", Decision::Review, "cdd01ef066bc6cf2");
        let resolved = initial.follow_up(Decision::Allow);
        assert_eq!(initial.trace_id, resolved.trace_id);
        assert_ne!(initial.span_id, resolved.span_id);
        assert_eq!(resolved.decision, Decision::Allow);
    }
}
