//! Single configuration surface for the bus (`spec.md` §6.3).
//!
//! Constructed programmatically or via `serde` deserialization;
//! invalid values are rejected at construction with [`ConfigError`]
//! rather than discovered later on the hot path.

use agent_bus_governance::ConfigError;
use serde::{Deserialize, Serialize};

/// Weights for the default impact scorer's seven factors. Must sum to
/// 1.0 within a small tolerance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactScoreWeights {
    pub semantic_weight: f32,
    pub permission_weight: f32,
    pub volume_weight: f32,
    pub context_weight: f32,
    pub drift_weight: f32,
    pub priority_weight: f32,
    pub type_weight: f32,
    pub critical_priority_boost: f32,
    pub high_semantic_boost: f32,
}

impl Default for ImpactScoreWeights {
    fn default() -> Self {
        Self {
            semantic_weight: 0.30,
            permission_weight: 0.20,
            volume_weight: 0.10,
            context_weight: 0.10,
            drift_weight: 0.15,
            priority_weight: 0.10,
            type_weight: 0.05,
            critical_priority_boost: 0.9,
            high_semantic_boost: 0.8,
        }
    }
}

impl ImpactScoreWeights {
    fn sum(&self) -> f32 {
        self.semantic_weight
            + self.permission_weight
            + self.volume_weight
            + self.context_weight
            + self.drift_weight
            + self.priority_weight
            + self.type_weight
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let sum = self.sum();
        if (sum - 1.0).abs() > 1e-3 {
            return Err(ConfigError::InvalidWeightSum(sum));
        }
        Ok(())
    }
}

/// The backoff strategy a `RecoveryOrchestrator` task uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackoffStrategy {
    ExponentialBackoff,
    LinearBackoff,
    Immediate,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub failure_window_ms: u64,
    pub cooldown_ms: u64,
    pub half_open_probe_budget: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_ms: 10_000,
            cooldown_ms: 30_000,
            half_open_probe_budget: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub deliberation_threshold: f32,
    pub deliberation_queue_capacity: usize,
    pub deliberation_deadline_ms: u64,
    pub impact_score_weights: ImpactScoreWeights,
    pub external_timeout_ms: u64,
    pub impact_scorer_breaker: CircuitBreakerConfig,
    pub audit_queue_capacity: usize,
    pub metering_queue_capacity: usize,
    pub role_enforcement_strict: bool,
    pub max_chaos_scenario_duration_s: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 10_000,
            deliberation_threshold: 0.8,
            deliberation_queue_capacity: 1_000,
            deliberation_deadline_ms: 60_000,
            impact_score_weights: ImpactScoreWeights::default(),
            external_timeout_ms: 5_000,
            impact_scorer_breaker: CircuitBreakerConfig::default(),
            audit_queue_capacity: 100_000,
            metering_queue_capacity: 100_000,
            role_enforcement_strict: true,
            max_chaos_scenario_duration_s: 300,
        }
    }
}

impl BusConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::InvalidWorkerCount(self.worker_count));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity(self.queue_capacity));
        }
        if !(0.0..=1.0).contains(&self.deliberation_threshold) {
            return Err(ConfigError::InvalidDeliberationThreshold(
                self.deliberation_threshold,
            ));
        }
        self.impact_score_weights.validate()?;
        if self.max_chaos_scenario_duration_s > 300 {
            return Err(ConfigError::OutOfRange {
                field: "max_chaos_scenario_duration_s",
                min: 0,
                actual: self.max_chaos_scenario_duration_s,
            });
        }
        Ok(())
    }

    pub fn build(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(BusConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut cfg = BusConfig::default();
        cfg.worker_count = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidWorkerCount(0))));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let mut cfg = BusConfig::default();
        cfg.deliberation_threshold = 1.5;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidDeliberationThreshold(_))
        ));
    }

    #[test]
    fn weight_sum_must_equal_one() {
        let mut cfg = BusConfig::default();
        cfg.impact_score_weights.semantic_weight = 0.9;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidWeightSum(_))));
    }
}
