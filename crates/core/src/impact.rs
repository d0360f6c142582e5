//! Impact scoring: a weighted multi-factor model estimating how much
//! deliberative scrutiny a message deserves, plus the default
//! weighted implementation bundled with this crate.

use std::collections::VecDeque;

use agent_bus_governance::{Message, MessagePriority, MessageType};
use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use dashmap::DashMap;

use crate::config::ImpactScoreWeights;

/// A pluggable impact-score collaborator. Callers may substitute
/// their own implementation (e.g. an ML-backed scorer called over the
/// network); the processor only depends on this contract, guarded by
/// a circuit breaker and timeout.
#[async_trait]
pub trait ImpactScorer: Send + Sync {
    async fn score(&self, message: &Message) -> f32;
}

const HIGH_IMPACT_KEYWORDS: &[&str] = &[
    "delete", "drop", "truncate", "shutdown", "terminate", "revoke",
    "transfer", "withdraw", "grant", "sudo", "admin", "override",
];

const HIGH_RISK_TOOL_KEYWORDS: &[&str] = &[
    "exec", "shell", "filesystem", "payment", "wire_transfer", "credential",
];

const VOLUME_WINDOW_SECS: i64 = 60;

/// The bundled default scorer: semantic + permission + volume +
/// context + drift + priority + type factors, weighted and combined
/// per `spec.md` §6.3, then boosted for critical priority / high
/// semantic hits.
pub struct WeightedImpactScorer {
    weights: ImpactScoreWeights,
    agent_request_times: DashMap<String, VecDeque<DateTime<Utc>>>,
    agent_score_history: DashMap<String, VecDeque<f32>>,
}

impl WeightedImpactScorer {
    pub fn new(weights: ImpactScoreWeights) -> Self {
        Self {
            weights,
            agent_request_times: DashMap::new(),
            agent_score_history: DashMap::new(),
        }
    }

    fn semantic_score(&self, message: &Message) -> f32 {
        let haystack = serde_json::to_string(&message.content).unwrap_or_default().to_lowercase();
        let hits = HIGH_IMPACT_KEYWORDS.iter().filter(|k| haystack.contains(*k)).count();
        ((hits as f32) * 0.3).min(0.9)
    }

    fn permission_score(&self, message: &Message) -> f32 {
        let haystack = serde_json::to_string(&message.payload).unwrap_or_default().to_lowercase();
        if HIGH_RISK_TOOL_KEYWORDS.iter().any(|k| haystack.contains(*k)) {
            0.9
        } else {
            0.1
        }
    }

    fn volume_score(&self, message: &Message) -> f32 {
        let now = Utc::now();
        let mut entry = self
            .agent_request_times
            .entry(message.from_agent.clone())
            .or_default();
        entry.push_back(now);
        while let Some(&front) = entry.front() {
            if (now - front).num_seconds() > VOLUME_WINDOW_SECS {
                entry.pop_front();
            } else {
                break;
            }
        }
        match entry.len() {
            0..=10 => 0.1,
            11..=50 => 0.4,
            51..=100 => 0.7,
            _ => 1.0,
        }
    }

    fn context_score(&self, message: &Message) -> f32 {
        let mut score: f32 = 0.0;
        let hour = Utc::now().hour();
        if (1..5).contains(&hour) {
            score += 0.3;
        }
        let amount = message
            .payload
            .get("amount")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        if amount > 10_000.0 {
            score += 0.4;
        }
        score.min(1.0)
    }

    fn drift_score(&self, message: &Message, current: f32) -> f32 {
        let history = self.agent_score_history.entry(message.from_agent.clone()).or_default();
        if history.is_empty() {
            return 0.0;
        }
        let mean: f32 = history.iter().sum::<f32>() / history.len() as f32;
        let deviation = (current - mean).abs();
        if deviation > 0.3 {
            (deviation - 0.3).min(0.7)
        } else {
            0.0
        }
    }

    fn priority_score(&self, message: &Message) -> f32 {
        match message.priority {
            MessagePriority::Critical => self.weights.critical_priority_boost,
            MessagePriority::High => 0.6,
            MessagePriority::Medium => 0.3,
            MessagePriority::Low => 0.1,
        }
    }

    fn type_score(&self, message: &Message) -> f32 {
        match message.message_type {
            MessageType::GovernanceRequest | MessageType::ConstitutionalValidation => 0.9,
            MessageType::Command | MessageType::TaskRequest => 0.5,
            _ => 0.2,
        }
    }

    fn record_history(&self, agent_id: &str, score: f32) {
        let mut history = self.agent_score_history.entry(agent_id.to_string()).or_default();
        history.push_back(score);
        while history.len() > 20 {
            history.pop_front();
        }
    }
}

#[async_trait]
impl ImpactScorer for WeightedImpactScorer {
    async fn score(&self, message: &Message) -> f32 {
        let semantic = self.semantic_score(message);
        let permission = self.permission_score(message);
        let volume = self.volume_score(message);
        let context = self.context_score(message);
        let priority = self.priority_score(message);
        let type_ = self.type_score(message);

        let pre_drift = semantic * self.weights.semantic_weight
            + permission * self.weights.permission_weight
            + volume * self.weights.volume_weight
            + context * self.weights.context_weight
            + priority * self.weights.priority_weight
            + type_ * self.weights.type_weight;

        let drift = self.drift_score(message, pre_drift);
        let mut total = pre_drift + drift * self.weights.drift_weight;

        if semantic >= self.weights.high_semantic_boost {
            total = total.max(semantic);
        }

        total = total.clamp(0.0, 1.0);
        self.record_history(&message.from_agent, total);
        total
    }
}
