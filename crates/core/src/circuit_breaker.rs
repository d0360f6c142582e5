//! Three-state circuit breaker guarding calls to external
//! collaborators (impact scorer, policy backend): CLOSED → OPEN →
//! HALF_OPEN → {CLOSED, OPEN}.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::CircuitBreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Event emitted on every state transition, for the health aggregator
/// to consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitEvent {
    pub from: CircuitState,
    pub to: CircuitState,
}

struct Inner {
    state: CircuitState,
    failures: VecDeque<DateTime<Utc>>,
    opened_at: Option<DateTime<Utc>>,
    half_open_probes_used: u32,
}

/// Guards a single external collaborator call.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    trip_count: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                half_open_probes_used: 0,
            }),
            trip_count: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn trip_count(&self) -> u64 {
        self.trip_count.load(Ordering::Relaxed)
    }

    /// Whether a call is currently allowed through. In HALF_OPEN, only
    /// `half_open_probe_budget` calls are let through before the
    /// breaker re-closes the gate until the next probe completes.
    pub fn allow_call(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or_else(Utc::now);
                let cooldown = chrono::Duration::milliseconds(self.config.cooldown_ms as i64);
                if Utc::now() - opened_at >= cooldown {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_probes_used = 0;
                    tracing::info!(breaker = %self.name, "circuit breaker entering half-open");
                    inner.half_open_probes_used += 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_probes_used < self.config.half_open_probe_budget {
                    inner.half_open_probes_used += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call. Closes the breaker from HALF_OPEN.
    pub fn record_success(&self) -> Option<CircuitEvent> {
        let mut inner = self.inner.lock();
        let from = inner.state;
        if matches!(inner.state, CircuitState::HalfOpen) {
            inner.state = CircuitState::Closed;
            inner.failures.clear();
            inner.opened_at = None;
            tracing::info!(breaker = %self.name, "circuit breaker closed after successful probe");
        }
        (from != inner.state).then_some(CircuitEvent { from, to: inner.state })
    }

    /// Force the breaker into HALF_OPEN regardless of cooldown, e.g.
    /// when a recovery orchestrator is about to run a health probe
    /// (`spec.md` §4.12).
    pub fn force_half_open(&self) -> Option<CircuitEvent> {
        let mut inner = self.inner.lock();
        let from = inner.state;
        inner.state = CircuitState::HalfOpen;
        inner.half_open_probes_used = 0;
        tracing::info!(breaker = %self.name, "circuit breaker forced half-open for recovery probe");
        (from != inner.state).then_some(CircuitEvent { from, to: inner.state })
    }

    /// Record a failed call. Trips the breaker once `failure_threshold`
    /// failures land inside `failure_window_ms`, or immediately on a
    /// HALF_OPEN probe failure.
    pub fn record_failure(&self) -> Option<CircuitEvent> {
        let mut inner = self.inner.lock();
        let from = inner.state;
        let now = Utc::now();

        if matches!(inner.state, CircuitState::HalfOpen) {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(now);
            self.trip_count.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(breaker = %self.name, "circuit breaker re-opened after failed probe");
            return Some(CircuitEvent { from, to: inner.state });
        }

        inner.failures.push_back(now);
        let window = chrono::Duration::milliseconds(self.config.failure_window_ms as i64);
        while let Some(&oldest) = inner.failures.front() {
            if now - oldest > window {
                inner.failures.pop_front();
            } else {
                break;
            }
        }

        if matches!(inner.state, CircuitState::Closed)
            && inner.failures.len() as u32 >= self.config.failure_threshold
        {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(now);
            inner.failures.clear();
            self.trip_count.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(breaker = %self.name, "circuit breaker tripped open");
        }

        (from != inner.state).then_some(CircuitEvent { from, to: inner.state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: 3,
                failure_window_ms: 10_000,
                cooldown_ms: 0,
                half_open_probe_budget: 1,
            },
        )
    }

    #[test]
    fn trips_open_after_threshold_failures() {
        let b = breaker();
        assert_eq!(b.state(), CircuitState::Closed);
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Closed);
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert_eq!(b.trip_count(), 1);
    }

    #[test]
    fn open_rejects_calls_until_cooldown_elapses() {
        let b = breaker();
        b.record_failure();
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        // cooldown_ms=0 so the next allow_call immediately transitions to half-open
        assert!(b.allow_call());
        assert_eq!(b.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_success_closes_breaker() {
        let b = breaker();
        b.record_failure();
        b.record_failure();
        b.record_failure();
        b.allow_call();
        assert_eq!(b.state(), CircuitState::HalfOpen);
        b.record_success();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_breaker() {
        let b = breaker();
        b.record_failure();
        b.record_failure();
        b.record_failure();
        b.allow_call();
        assert_eq!(b.state(), CircuitState::HalfOpen);
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert_eq!(b.trip_count(), 2);
    }

    #[test]
    fn force_half_open_overrides_cooldown() {
        let b = breaker();
        b.record_failure();
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        let event = b.force_half_open().unwrap();
        assert_eq!(event.from, CircuitState::Open);
        assert_eq!(event.to, CircuitState::HalfOpen);
        assert_eq!(b.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn failures_outside_window_do_not_accumulate() {
        let b = CircuitBreaker::new(
            "test2",
            CircuitBreakerConfig {
                failure_threshold: 2,
                failure_window_ms: 0,
                cooldown_ms: 0,
                half_open_probe_budget: 1,
            },
        );
        b.record_failure();
        std::thread::sleep(std::time::Duration::from_millis(5));
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Closed);
    }
}
