//! Aggregates circuit-breaker events into a single health score.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub score: Option<f64>,
    pub status: HealthStatus,
    pub tracked_breakers: usize,
    pub open_breakers: usize,
}

#[derive(Clone)]
struct BreakerObservation {
    name: String,
    state: CircuitState,
    observed_at: DateTime<Utc>,
}

/// Tracks the most recent observed state of each named circuit
/// breaker and derives a weighted health score: `1 - open_count /
/// total`, bucketed into HEALTHY/DEGRADED/CRITICAL.
pub struct HealthAggregator {
    window: chrono::Duration,
    observations: Mutex<VecDeque<BreakerObservation>>,
}

impl HealthAggregator {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window: chrono::Duration::milliseconds(window_ms as i64),
            observations: Mutex::new(VecDeque::new()),
        }
    }

    /// Record the current state of a named breaker. Later calls for
    /// the same name supersede earlier ones.
    pub fn observe(&self, name: &str, state: CircuitState) {
        let mut observations = self.observations.lock();
        let now = Utc::now();
        observations.retain(|o| o.name != name);
        observations.push_back(BreakerObservation {
            name: name.to_string(),
            state,
            observed_at: now,
        });
        while let Some(front) = observations.front() {
            if now - front.observed_at > self.window {
                observations.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let observations = self.observations.lock();
        let total = observations.len();
        if total == 0 {
            return HealthSnapshot {
                score: None,
                status: HealthStatus::Unknown,
                tracked_breakers: 0,
                open_breakers: 0,
            };
        }

        let open = observations
            .iter()
            .filter(|o| matches!(o.state, CircuitState::Open))
            .count();
        let score = 1.0 - (open as f64 / total as f64);
        let status = if score >= 0.9 {
            HealthStatus::Healthy
        } else if score >= 0.5 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Critical
        };

        HealthSnapshot {
            score: Some(score),
            status,
            tracked_breakers: total,
            open_breakers: open,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_observations_is_unknown() {
        let agg = HealthAggregator::new(60_000);
        let snap = agg.snapshot();
        assert_eq!(snap.status, HealthStatus::Unknown);
        assert!(snap.score.is_none());
    }

    #[test]
    fn all_closed_is_healthy() {
        let agg = HealthAggregator::new(60_000);
        agg.observe("a", CircuitState::Closed);
        agg.observe("b", CircuitState::Closed);
        let snap = agg.snapshot();
        assert_eq!(snap.status, HealthStatus::Healthy);
        assert_eq!(snap.score, Some(1.0));
    }

    #[test]
    fn half_open_breakers_degrade_score() {
        let agg = HealthAggregator::new(60_000);
        agg.observe("a", CircuitState::Open);
        agg.observe("b", CircuitState::Closed);
        let snap = agg.snapshot();
        assert_eq!(snap.score, Some(0.5));
        assert_eq!(snap.status, HealthStatus::Degraded);
    }

    #[test]
    fn majority_open_is_critical() {
        let agg = HealthAggregator::new(60_000);
        agg.observe("a", CircuitState::Open);
        agg.observe("b", CircuitState::Open);
        agg.observe("c", CircuitState::Closed);
        let snap = agg.snapshot();
        assert_eq!(snap.status, HealthStatus::Critical);
    }

    #[test]
    fn score_stays_within_unit_interval() {
        let agg = HealthAggregator::new(60_000);
        for i in 0..5 {
            agg.observe(&format!("b{i}"), CircuitState::Open);
        }
        let snap = agg.snapshot();
        let score = snap.score.unwrap();
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn re_observing_a_breaker_supersedes_the_prior_state() {
        let agg = HealthAggregator::new(60_000);
        agg.observe("a", CircuitState::Open);
        agg.observe("a", CircuitState::Closed);
        let snap = agg.snapshot();
        assert_eq!(snap.tracked_breakers, 1);
        assert_eq!(snap.open_breakers, 0);
    }
}
