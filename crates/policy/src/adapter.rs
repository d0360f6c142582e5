//! Policy backends: the collaborator contract plus remote, embedded,
//! and fallback implementations.

use std::collections::HashMap;

use agent_bus_governance::Decision;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy backend unreachable: {0}")]
    Unreachable(String),
    #[error("malformed policy response: {0}")]
    Malformed(String),
    #[error("no policy found at '{0}'")]
    NotFound(String),
}

pub type PolicyResult<T> = Result<T, PolicyError>;

/// The outcome of evaluating a policy against an input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub decision: Decision,
    pub reasoning: String,
    pub risk_score: u8,
    pub matched_rule: Option<String>,
}

/// A pluggable policy backend. Callers key evaluation on a
/// `policy_path` (e.g. `"spending-limits"`) and a JSON input context.
#[async_trait]
pub trait PolicyAdapter: Send + Sync {
    fn name(&self) -> &str;
    async fn evaluate(&self, policy_path: &str, input: &serde_json::Value) -> PolicyResult<PolicyDecision>;
}

/// A single comparison: `field op value`, ANDed together within a
/// rule's `condition`. Intentionally a small subset of the YAML DSL's
/// expression language — enough to express the threshold/keyword
/// policies this bus actually ships with, not a general evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: ComparisonOp,
    pub value: serde_json::Value,
}

impl Condition {
    fn matches(&self, input: &serde_json::Value) -> bool {
        let Some(actual) = input.get(&self.field) else {
            return false;
        };
        match (actual.as_f64(), self.value.as_f64()) {
            (Some(a), Some(b)) => match self.op {
                ComparisonOp::Eq => a == b,
                ComparisonOp::Ne => a != b,
                ComparisonOp::Gt => a > b,
                ComparisonOp::Lt => a < b,
                ComparisonOp::Gte => a >= b,
                ComparisonOp::Lte => a <= b,
            },
            _ => match self.op {
                ComparisonOp::Eq => actual == &self.value,
                ComparisonOp::Ne => actual != &self.value,
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    Allow,
    Deny,
    Review,
}

impl From<PolicyAction> for Decision {
    fn from(action: PolicyAction) -> Self {
        match action {
            PolicyAction::Allow => Decision::Allow,
            PolicyAction::Deny => Decision::Deny,
            PolicyAction::Review => Decision::Review,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub conditions: Vec<Condition>,
    pub action: PolicyAction,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub risk_score: Option<u8>,
}

impl PolicyRule {
    fn matches(&self, input: &serde_json::Value) -> bool {
        self.conditions.iter().all(|c| c.matches(input))
    }
}

/// A named, ordered list of rules; the first matching rule wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    pub rules: Vec<PolicyRule>,
}

fn default_priority() -> i32 {
    0
}

/// Evaluates YAML/JSON-defined policies loaded at construction time,
/// entirely in-process. First matching rule across the policies
/// registered under a `policy_path` decides the outcome; no match
/// defaults to `ALLOW`.
pub struct EmbeddedPolicyAdapter {
    policies: HashMap<String, Policy>,
}

impl EmbeddedPolicyAdapter {
    pub fn new(policies: Vec<Policy>) -> Self {
        Self {
            policies: policies.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    pub fn from_yaml(policy_path: &str, yaml: &str) -> PolicyResult<Self> {
        let policy: Policy = serde_yaml::from_str(yaml)
            .map_err(|e| PolicyError::Malformed(e.to_string()))?;
        let mut policies = HashMap::new();
        policies.insert(policy_path.to_string(), policy);
        Ok(Self { policies })
    }
}

#[async_trait]
impl PolicyAdapter for EmbeddedPolicyAdapter {
    fn name(&self) -> &str {
        "embedded"
    }

    async fn evaluate(&self, policy_path: &str, input: &serde_json::Value) -> PolicyResult<PolicyDecision> {
        let policy = self
            .policies
            .get(policy_path)
            .ok_or_else(|| PolicyError::NotFound(policy_path.to_string()))?;

        for rule in &policy.rules {
            if rule.matches(input) {
                return Ok(PolicyDecision {
                    decision: rule.action.into(),
                    reasoning: rule.message.clone().unwrap_or_else(|| format!("matched rule '{}'", rule.id)),
                    risk_score: rule.risk_score.unwrap_or(0),
                    matched_rule: Some(rule.id.clone()),
                });
            }
        }

        Ok(PolicyDecision {
            decision: Decision::Allow,
            reasoning: "no rule matched".to_string(),
            risk_score: 0,
            matched_rule: None,
        })
    }
}

/// Evaluates policies against a remote policy engine over HTTP.
/// Compiled only with the `remote` feature; the rest of the crate has
/// no hard dependency on a network stack.
#[cfg(feature = "remote")]
pub struct RemotePolicyAdapter {
    client: reqwest::Client,
    base_url: String,
}

#[cfg(feature = "remote")]
impl RemotePolicyAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[cfg(feature = "remote")]
#[async_trait]
impl PolicyAdapter for RemotePolicyAdapter {
    fn name(&self) -> &str {
        "remote"
    }

    async fn evaluate(&self, policy_path: &str, input: &serde_json::Value) -> PolicyResult<PolicyDecision> {
        let url = format!("{}/v1/policies/{}/evaluate", self.base_url, policy_path);
        let response = self
            .client
            .post(&url)
            .json(input)
            .send()
            .await
            .map_err(|e| PolicyError::Unreachable(e.to_string()))?;

        response
            .json::<PolicyDecision>()
            .await
            .map_err(|e| PolicyError::Malformed(e.to_string()))
    }
}

/// The last-resort backend: never fails, always returns a
/// conservative `REVIEW` so a downed policy engine degrades to more
/// human oversight rather than silent allow.
pub struct FallbackPolicyAdapter;

#[async_trait]
impl PolicyAdapter for FallbackPolicyAdapter {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn evaluate(&self, policy_path: &str, _input: &serde_json::Value) -> PolicyResult<PolicyDecision> {
        Ok(PolicyDecision {
            decision: Decision::Review,
            reasoning: format!("policy backend unavailable for '{policy_path}', defaulting to review"),
            risk_score: 50,
            matched_rule: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deny_over_threshold_policy() -> Policy {
        Policy {
            id: "spending-limits".to_string(),
            priority: 0,
            rules: vec![PolicyRule {
                id: "max-transaction".to_string(),
                conditions: vec![Condition {
                    field: "amount".to_string(),
                    op: ComparisonOp::Gt,
                    value: json!(10_000),
                }],
                action: PolicyAction::Deny,
                message: Some("exceeds maximum allowed amount".to_string()),
                risk_score: Some(90),
            }],
        }
    }

    #[tokio::test]
    async fn matching_rule_denies() {
        let adapter = EmbeddedPolicyAdapter::new(vec![deny_over_threshold_policy()]);
        let decision = adapter
            .evaluate("spending-limits", &json!({"amount": 20_000}))
            .await
            .unwrap();
        assert_eq!(decision.decision, Decision::Deny);
        assert_eq!(decision.matched_rule.as_deref(), Some("max-transaction"));
    }

    #[tokio::test]
    async fn non_matching_input_allows_by_default() {
        let adapter = EmbeddedPolicyAdapter::new(vec![deny_over_threshold_policy()]);
        let decision = adapter
            .evaluate("spending-limits", &json!({"amount": 100}))
            .await
            .unwrap();
        assert_eq!(decision.decision, Decision::Allow);
    }

    #[tokio::test]
    async fn unknown_policy_path_errors() {
        let adapter = EmbeddedPolicyAdapter::new(vec![deny_over_threshold_policy()]);
        let err = adapter.evaluate("nonexistent", &json!({})).await.unwrap_err();
        assert!(matches!(err, PolicyError::NotFound(_)));
    }

    #[tokio::test]
    async fn fallback_always_reviews() {
        let decision = FallbackPolicyAdapter.evaluate("anything", &json!({})).await.unwrap();
        assert_eq!(decision.decision, Decision::Review);
    }
}
