//! Recovery orchestrator: a min-heap priority queue of recovery tasks
//! with pluggable backoff strategies, validating a health probe
//! (and, where relevant, the constitutional hash) before acting.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::circuit_breaker::{CircuitBreaker, CircuitEvent};
use crate::config::BackoffStrategy;
use crate::health::HealthAggregator;

/// One unit of recovery work: "bring `target` back to healthy".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryTask {
    pub id: Uuid,
    pub target: String,
    pub strategy: BackoffStrategy,
    pub attempt: u32,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// `backoff_multiplier` from `spec.md` §6.3; ignored by
    /// `LINEAR_BACKOFF`/`IMMEDIATE`/`MANUAL`.
    pub multiplier: f64,
    /// `max_delay_ms`: caps every computed delay so attempt delays are
    /// non-decreasing only up to this ceiling (invariant `spec.md`
    /// §8.1 #9).
    pub max_delay_ms: u64,
    pub priority: i32,
    pub next_attempt_at: DateTime<Utc>,
}

impl RecoveryTask {
    pub fn new(target: impl Into<String>, strategy: BackoffStrategy, priority: i32, base_delay_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            target: target.into(),
            strategy,
            attempt: 0,
            max_attempts: 5,
            base_delay_ms,
            multiplier: 2.0,
            max_delay_ms: u64::MAX,
            priority,
            next_attempt_at: Utc::now(),
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Delay before the next attempt, per the task's backoff
    /// strategy and `spec.md` §4.12's per-attempt formulas (1-indexed
    /// `n`, here `attempt + 1`):
    /// `EXPONENTIAL_BACKOFF = min(initial * multiplier^(n-1), max)`,
    /// `LINEAR_BACKOFF = min(initial * n, max)`, `IMMEDIATE = 0`,
    /// `MANUAL` never computes a next attempt (an operator must act).
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<u64> {
        match self.strategy {
            BackoffStrategy::ExponentialBackoff => {
                let raw = self.base_delay_ms as f64 * self.multiplier.powi(attempt as i32);
                Some((raw.min(self.max_delay_ms as f64)) as u64)
            }
            BackoffStrategy::LinearBackoff => {
                let raw = self.base_delay_ms.saturating_mul((attempt + 1) as u64);
                Some(raw.min(self.max_delay_ms))
            }
            BackoffStrategy::Immediate => Some(0),
            BackoffStrategy::Manual => None,
        }
    }

    fn schedule_next(&mut self) {
        if let Some(delay) = self.delay_for_attempt(self.attempt) {
            self.next_attempt_at = Utc::now() + chrono::Duration::milliseconds(delay as i64);
        }
    }
}

#[derive(Clone)]
struct HeapEntry {
    task: RecoveryTask,
    inserted_at: DateTime<Utc>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.task.id == other.task.id
    }
}
impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; higher priority and earlier
        // scheduled time should pop first.
        self.task
            .priority
            .cmp(&other.task.priority)
            .then_with(|| other.task.next_attempt_at.cmp(&self.task.next_attempt_at))
            .then_with(|| other.inserted_at.cmp(&self.inserted_at))
    }
}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryOutcome {
    Recovered,
    Retrying { attempt: u32, delay_ms: u64 },
    GaveUp,
    RequiresManualIntervention,
}

/// Schedules and (on `try_next`) validates recovery attempts against
/// a caller-supplied health probe, applying each task's backoff
/// strategy between attempts. When a target has a registered
/// [`CircuitBreaker`], `try_next` drives it through HALF_OPEN around
/// the probe per `spec.md` §4.12, closing it on success or re-opening
/// it on failure.
pub struct RecoveryOrchestrator {
    heap: Mutex<BinaryHeap<HeapEntry>>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    health: Option<Arc<HealthAggregator>>,
}

impl RecoveryOrchestrator {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            breakers: Mutex::new(HashMap::new()),
            health: None,
        }
    }

    pub fn with_health_aggregator(mut self, health: Arc<HealthAggregator>) -> Self {
        self.health = Some(health);
        self
    }

    /// Associate a target with the circuit breaker `try_next` should
    /// drive through HALF_OPEN while recovering it.
    pub fn register_breaker(&self, target: impl Into<String>, breaker: Arc<CircuitBreaker>) {
        self.breakers.lock().insert(target.into(), breaker);
    }

    pub fn schedule(&self, task: RecoveryTask) {
        let mut heap = self.heap.lock();
        heap.push(HeapEntry {
            task,
            inserted_at: Utc::now(),
        });
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pop the highest-priority task whose `next_attempt_at` has
    /// passed, run `probe_healthy` against it, and either mark it
    /// recovered, reschedule it with the next backoff delay, or give
    /// up once `max_attempts` is exhausted. Returns `None` if no task
    /// is currently due.
    pub fn try_next(&self, probe_healthy: impl FnOnce(&str) -> bool) -> Option<(RecoveryTask, RecoveryOutcome)> {
        let mut heap = self.heap.lock();
        let due = matches!(heap.peek(), Some(entry) if entry.task.next_attempt_at <= Utc::now());
        if !due {
            return None;
        }
        let HeapEntry { mut task, .. } = heap.pop().unwrap();
        drop(heap);

        let breaker = self.breakers.lock().get(&task.target).cloned();
        if let Some(breaker) = &breaker {
            self.observe(breaker, breaker.force_half_open());
        }

        if probe_healthy(&task.target) {
            if let Some(breaker) = &breaker {
                let event = breaker.record_success();
                self.observe(breaker, event);
            }
            return Some((task, RecoveryOutcome::Recovered));
        }

        if let Some(breaker) = &breaker {
            let event = breaker.record_failure();
            self.observe(breaker, event);
        }

        if matches!(task.strategy, BackoffStrategy::Manual) {
            return Some((task, RecoveryOutcome::RequiresManualIntervention));
        }

        task.attempt += 1;
        if task.attempt >= task.max_attempts {
            return Some((task, RecoveryOutcome::GaveUp));
        }

        let delay_ms = task.delay_for_attempt(task.attempt).unwrap_or(0);
        task.schedule_next();
        let outcome = RecoveryOutcome::Retrying {
            attempt: task.attempt,
            delay_ms,
        };
        self.schedule(task.clone());
        Some((task, outcome))
    }

    fn observe(&self, breaker: &CircuitBreaker, _event: Option<CircuitEvent>) {
        if let Some(health) = &self.health {
            health.observe(breaker.name(), breaker.state());
        }
    }
}

impl Default for RecoveryOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::config::CircuitBreakerConfig;

    #[test]
    fn exponential_backoff_doubles_each_attempt() {
        let task = RecoveryTask::new("svc", BackoffStrategy::ExponentialBackoff, 0, 100);
        assert_eq!(task.delay_for_attempt(0), Some(100));
        assert_eq!(task.delay_for_attempt(1), Some(200));
        assert_eq!(task.delay_for_attempt(2), Some(400));
    }

    #[test]
    fn linear_backoff_grows_by_base_delay() {
        let task = RecoveryTask::new("svc", BackoffStrategy::LinearBackoff, 0, 100);
        assert_eq!(task.delay_for_attempt(0), Some(100));
        assert_eq!(task.delay_for_attempt(1), Some(200));
        assert_eq!(task.delay_for_attempt(2), Some(300));
    }

    #[test]
    fn exponential_backoff_is_capped_at_max_delay_ms() {
        let task = RecoveryTask::new("svc", BackoffStrategy::ExponentialBackoff, 0, 100)
            .with_multiplier(2.0)
            .with_max_delay_ms(1_000);
        assert_eq!(task.delay_for_attempt(0), Some(100));
        assert_eq!(task.delay_for_attempt(1), Some(200));
        assert_eq!(task.delay_for_attempt(2), Some(400));
        assert_eq!(task.delay_for_attempt(3), Some(800));
        // would be 1600 uncapped; clamped to max_delay_ms
        assert_eq!(task.delay_for_attempt(4), Some(1_000));
    }

    #[test]
    fn delays_are_non_decreasing_up_to_the_cap() {
        let task = RecoveryTask::new("svc", BackoffStrategy::ExponentialBackoff, 0, 50)
            .with_multiplier(3.0)
            .with_max_delay_ms(500);
        let delays: Vec<u64> = (0..6).map(|n| task.delay_for_attempt(n).unwrap()).collect();
        for window in delays.windows(2) {
            assert!(window[1] >= window[0]);
        }
        assert!(delays.iter().all(|&d| d <= 500));
    }

    #[test]
    fn manual_strategy_never_schedules_a_next_attempt() {
        let task = RecoveryTask::new("svc", BackoffStrategy::Manual, 0, 100);
        assert_eq!(task.delay_for_attempt(0), None);
    }

    #[test]
    fn higher_priority_task_pops_first() {
        let orch = RecoveryOrchestrator::new();
        orch.schedule(RecoveryTask::new("low", BackoffStrategy::Immediate, 0, 0));
        orch.schedule(RecoveryTask::new("high", BackoffStrategy::Immediate, 10, 0));
        let (task, outcome) = orch.try_next(|_| true).unwrap();
        assert_eq!(task.target, "high");
        assert_eq!(outcome, RecoveryOutcome::Recovered);
    }

    #[test]
    fn unhealthy_target_reschedules_with_backoff() {
        let orch = RecoveryOrchestrator::new();
        orch.schedule(RecoveryTask::new("svc", BackoffStrategy::Immediate, 0, 0));
        let (task, outcome) = orch.try_next(|_| false).unwrap();
        assert_eq!(task.attempt, 1);
        assert!(matches!(outcome, RecoveryOutcome::Retrying { attempt: 1, .. }));
        assert_eq!(orch.len(), 1);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let orch = RecoveryOrchestrator::new();
        let mut task = RecoveryTask::new("svc", BackoffStrategy::Immediate, 0, 0);
        task.max_attempts = 1;
        orch.schedule(task);
        let (_, outcome) = orch.try_next(|_| false).unwrap();
        assert_eq!(outcome, RecoveryOutcome::GaveUp);
        assert!(orch.is_empty());
    }

    #[test]
    fn manual_strategy_surfaces_for_operator_action() {
        let orch = RecoveryOrchestrator::new();
        orch.schedule(RecoveryTask::new("svc", BackoffStrategy::Manual, 0, 0));
        let (_, outcome) = orch.try_next(|_| false).unwrap();
        assert_eq!(outcome, RecoveryOutcome::RequiresManualIntervention);
    }

    #[test]
    fn registered_breaker_closes_after_successful_probe() {
        let orch = RecoveryOrchestrator::new();
        let breaker = Arc::new(CircuitBreaker::new(
            "svc",
            CircuitBreakerConfig {
                failure_threshold: 1,
                failure_window_ms: 10_000,
                cooldown_ms: 0,
                half_open_probe_budget: 1,
            },
        ));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        orch.register_breaker("svc", breaker.clone());
        orch.schedule(RecoveryTask::new("svc", BackoffStrategy::Immediate, 0, 0));
        let (_, outcome) = orch.try_next(|_| true).unwrap();
        assert_eq!(outcome, RecoveryOutcome::Recovered);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn registered_breaker_reopens_after_failed_probe() {
        let orch = RecoveryOrchestrator::new();
        let breaker = Arc::new(CircuitBreaker::new(
            "svc",
            CircuitBreakerConfig {
                failure_threshold: 1,
                failure_window_ms: 10_000,
                cooldown_ms: 0,
                half_open_probe_budget: 1,
            },
        ));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        orch.register_breaker("svc", breaker.clone());
        orch.schedule(RecoveryTask::new("svc", BackoffStrategy::Immediate, 0, 0));
        let (_, outcome) = orch.try_next(|_| false).unwrap();
        assert!(matches!(outcome, RecoveryOutcome::Retrying { attempt: 1, .. }));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn nothing_due_returns_none() {
        let orch = RecoveryOrchestrator::new();
        let mut task = RecoveryTask::new("svc", BackoffStrategy::LinearBackoff, 0, 60_000);
        task.next_attempt_at = Utc::now() + chrono::Duration::seconds(60);
        orch.schedule(task);
        assert!(orch.try_next(|_| true).is_none());
    }
}
