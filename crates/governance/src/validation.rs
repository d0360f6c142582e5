//! Constitutional-hash and structural validation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::message::{Message, CONSTITUTIONAL_HASH};

/// Outcome of a validation pass. Multiple strategies accumulate into a
/// single result via [`ValidationResult::merge`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub decision: Option<String>,
    pub constitutional_hash: Option<String>,
}

impl ValidationResult {
    /// Start from a passing result; `add_error` flips it to failing.
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            ..Default::default()
        }
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.is_valid = false;
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Fold `other` into `self`. `is_valid` becomes the conjunction of
    /// both; errors/warnings/metadata are concatenated/merged, with
    /// `other`'s metadata keys taking precedence on collision.
    pub fn merge(&mut self, other: ValidationResult) {
        self.is_valid = self.is_valid && other.is_valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.metadata.extend(other.metadata);
        if other.decision.is_some() {
            self.decision = other.decision;
        }
        if other.constitutional_hash.is_some() {
            self.constitutional_hash = other.constitutional_hash;
        }
    }
}

/// A pluggable validation pass over a message.
///
/// Implementations must be side-effect free with respect to the
/// message itself; the processor applies the returned result.
pub trait ValidationStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn validate(&self, message: &Message) -> ValidationResult;
}

/// Truncates a hash to at most 8 hex characters followed by an
/// ellipsis, for safe inclusion in logs and error messages. Never log
/// or surface a full constitutional hash.
pub fn sanitize_hash(hash: &str) -> String {
    if hash.len() <= 8 {
        hash.to_string()
    } else {
        format!("{}…", &hash[..8])
    }
}

/// Constant-time comparison against the build-time constitutional
/// hash. Timing-safe so that a malformed or forged hash cannot be
/// brute-forced byte-by-byte via response-time measurement.
///
/// Public so collaborators outside the message pipeline proper (the
/// chaos engine, the recovery orchestrator) can perform the same
/// build-time constitutional check the spec requires of them before
/// acting, without duplicating the constant-time primitive.
pub fn hashes_match(candidate: &str) -> bool {
    use ring::constant_time::verify_slices_are_equal;
    verify_slices_are_equal(candidate.as_bytes(), CONSTITUTIONAL_HASH.as_bytes()).is_ok()
}

/// The mandatory first validation strategy: `message.constitutional_hash`
/// must constant-time-equal the build constant.
#[derive(Debug, Default)]
pub struct ConstitutionalHashStrategy;

impl ValidationStrategy for ConstitutionalHashStrategy {
    fn name(&self) -> &str {
        "constitutional_hash"
    }

    fn validate(&self, message: &Message) -> ValidationResult {
        let mut result = ValidationResult::ok();
        if hashes_match(&message.constitutional_hash) {
            result.constitutional_hash = Some(sanitize_hash(&message.constitutional_hash));
        } else {
            result.add_error(format!(
                "constitutional hash mismatch: got {}",
                sanitize_hash(&message.constitutional_hash)
            ));
        }
        result
    }
}

/// Minimal structural checks: required fields non-empty, priority and
/// message type set. Runs alongside the constitutional check.
#[derive(Debug, Default)]
pub struct StructuralValidationStrategy;

impl ValidationStrategy for StructuralValidationStrategy {
    fn name(&self) -> &str {
        "structural"
    }

    fn validate(&self, message: &Message) -> ValidationResult {
        let mut result = ValidationResult::ok();
        if message.from_agent.trim().is_empty() {
            result.add_error("from_agent must not be empty");
        }
        if message.to_agent.trim().is_empty() {
            result.add_error("to_agent must not be empty");
        }
        if message.from_agent == message.to_agent {
            result.add_warning("from_agent and to_agent are identical");
        }
        result
    }
}

/// Runs a fixed list of strategies and merges their results, forming
/// the processor's composite validation gate (`spec.md` §4.5 step 1).
pub struct CompositeValidationStrategy {
    strategies: Vec<Box<dyn ValidationStrategy>>,
}

impl CompositeValidationStrategy {
    pub fn new(strategies: Vec<Box<dyn ValidationStrategy>>) -> Self {
        Self { strategies }
    }

    /// The default gate: constitutional hash, then structural checks.
    pub fn default_gate() -> Self {
        Self::new(vec![
            Box::new(ConstitutionalHashStrategy),
            Box::new(StructuralValidationStrategy),
        ])
    }

    pub fn validate(&self, message: &Message) -> ValidationResult {
        let mut combined = ValidationResult::ok();
        for strategy in &self.strategies {
            combined.merge(strategy.validate(message));
        }
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessagePriority, MessageType};

    fn valid_message() -> Message {
        Message::new("agent-a", "agent-b", MessageType::Query, MessagePriority::Low)
    }

    #[test]
    fn constitutional_strategy_passes_correct_hash() {
        let m = valid_message();
        let result = ConstitutionalHashStrategy.validate(&m);
        assert!(result.is_valid);
        assert_eq!(result.constitutional_hash.as_deref(), Some("cdd01ef0…"));
    }

    #[test]
    fn constitutional_strategy_rejects_wrong_hash() {
        let mut m = valid_message();
        m.constitutional_hash = "0000000000000000".to_string();
        let result = ConstitutionalHashStrategy.validate(&m);
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn sanitize_hash_never_exceeds_nine_chars() {
        assert_eq!(sanitize_hash("cdd01ef066bc6cf2").len(), "cdd01ef0".len() + "…".len_utf8());
        assert_eq!(sanitize_hash("short"), "short");
    }

    #[test]
    fn structural_strategy_flags_empty_agents() {
        let mut m = valid_message();
        m.to_agent.clear();
        let result = StructuralValidationStrategy.validate(&m);
        assert!(!result.is_valid);
    }

    #[test]
    fn merge_combines_errors_and_conjuncts_validity() {
        let mut a = ValidationResult::ok();
        let mut b = ValidationResult::ok();
        b.add_error("boom");
        a.merge(b);
        assert!(!a.is_valid);
        assert_eq!(a.errors, vec!["boom".to_string()]);
    }

    #[test]
    fn default_gate_rejects_bad_hash_even_if_structurally_sound() {
        let mut m = valid_message();
        m.constitutional_hash = "deadbeefdeadbeef".to_string();
        let result = CompositeValidationStrategy::default_gate().validate(&m);
        assert!(!result.is_valid);
    }
}
