//! Fault-injection engine: scoped, time-boxed chaos scenarios with an
//! idempotent emergency stop.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use agent_bus_governance::{hashes_match, sanitize_hash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Maximum duration any single scenario may run, per `spec.md`.
pub const MAX_SCENARIO_DURATION_S: u64 = 300;

/// The six fault kinds a scenario may inject, per `spec.md` §3.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultKind {
    Latency,
    Error,
    CircuitBreaker,
    ResourceExhaustion,
    NetworkPartition,
    Timeout,
}

/// Which agents/conversations a scenario affects. `Global` is
/// deliberately not the default: every scenario must be constructed
/// with an explicit, as-narrow-as-possible blast radius.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlastRadius {
    Agent(String),
    Agents(HashSet<String>),
    Global,
}

impl BlastRadius {
    fn contains(&self, agent_id: &str) -> bool {
        match self {
            BlastRadius::Agent(id) => id == agent_id,
            BlastRadius::Agents(ids) => ids.contains(agent_id),
            BlastRadius::Global => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaosScenarioConfig {
    pub name: String,
    pub fault_kind: FaultKind,
    pub blast_radius: BlastRadius,
    pub duration_s: u64,
    pub injection_probability: f32,
    pub injected_latency_ms: u64,
    /// Required for `RESOURCE_EXHAUSTION`: which resource to simulate
    /// exhausting (e.g. `"memory"`, `"connections"`).
    pub resource_type: Option<String>,
    /// Required for `RESOURCE_EXHAUSTION`: exhaustion level in `[0,1]`.
    pub resource_level: Option<f32>,
    /// Validated against the build-time constant at construction
    /// (`spec.md` §4.13); never logged or returned in full — only
    /// through [`ChaosScenarioConfig::sanitized_hash`].
    pub constitutional_hash: String,
}

impl ChaosScenarioConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !hashes_match(&self.constitutional_hash) {
            return Err(format!(
                "constitutional hash mismatch: got {}",
                sanitize_hash(&self.constitutional_hash)
            ));
        }
        if self.duration_s == 0 || self.duration_s > MAX_SCENARIO_DURATION_S {
            return Err(format!(
                "duration_s must be in (0, {MAX_SCENARIO_DURATION_S}], got {}",
                self.duration_s
            ));
        }
        if !(0.0..=1.0).contains(&self.injection_probability) {
            return Err(format!(
                "injection_probability must be in [0, 1], got {}",
                self.injection_probability
            ));
        }
        if self.fault_kind == FaultKind::ResourceExhaustion {
            let level = self.resource_level.ok_or("resource_level is required for RESOURCE_EXHAUSTION")?;
            if !(0.0..=1.0).contains(&level) {
                return Err(format!("resource_level must be in [0, 1], got {level}"));
            }
            if self.resource_type.is_none() {
                return Err("resource_type is required for RESOURCE_EXHAUSTION".to_string());
            }
        }
        Ok(())
    }

    pub fn sanitized_hash(&self) -> String {
        sanitize_hash(&self.constitutional_hash)
    }
}

struct ActiveScenario {
    id: Uuid,
    config: ChaosScenarioConfig,
    started_at: DateTime<Utc>,
}

impl ActiveScenario {
    fn is_expired(&self) -> bool {
        Utc::now() - self.started_at > chrono::Duration::seconds(self.config.duration_s as i64)
    }
}

/// Holds zero or more active scenarios and answers
/// `should_inject_latency`/`should_inject_error` for a given agent.
/// `emergency_stop` idempotently clears every active scenario.
pub struct ChaosEngine {
    scenarios: RwLock<Vec<ActiveScenario>>,
    emergency_stopped: AtomicBool,
}

impl ChaosEngine {
    pub fn new() -> Self {
        Self {
            scenarios: RwLock::new(Vec::new()),
            emergency_stopped: AtomicBool::new(false),
        }
    }

    /// Activate a scenario. Rejected if malformed or if the engine is
    /// currently emergency-stopped (an operator must explicitly
    /// resume before new chaos can be injected).
    pub async fn activate(&self, config: ChaosScenarioConfig) -> Result<Uuid, String> {
        config.validate()?;
        if self.emergency_stopped.load(Ordering::SeqCst) {
            return Err("chaos engine is emergency-stopped".to_string());
        }
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        self.scenarios.write().await.push(ActiveScenario { id, config, started_at });
        tracing::warn!(scenario_id = %id, "chaos scenario activated");
        Ok(id)
    }

    /// Deactivate a scenario by ID, if still active.
    pub async fn deactivate(&self, id: Uuid) {
        self.scenarios.write().await.retain(|s| s.id != id);
    }

    /// Drop any scenario past its `duration_s`. Call periodically (or
    /// before each query) so scenarios self-deactivate without an
    /// external timer task.
    pub async fn sweep_expired(&self) {
        self.scenarios.write().await.retain(|s| !s.is_expired());
    }

    pub async fn should_inject_latency(&self, agent_id: &str) -> Option<u64> {
        if self.emergency_stopped.load(Ordering::SeqCst) {
            return None;
        }
        self.sweep_expired().await;
        let scenarios = self.scenarios.read().await;
        for scenario in scenarios.iter() {
            if scenario.config.fault_kind == FaultKind::Latency
                && scenario.config.blast_radius.contains(agent_id)
                && rand::random::<f32>() < scenario.config.injection_probability
            {
                return Some(scenario.config.injected_latency_ms);
            }
        }
        None
    }

    pub async fn should_inject_error(&self, agent_id: &str) -> bool {
        self.any_active_fault(agent_id, FaultKind::Error).await
    }

    /// `CIRCUIT_BREAKER` scenario: query before a breaker-guarded call
    /// to force it into the OPEN state regardless of its own failure
    /// tally.
    pub async fn should_force_circuit_open(&self, agent_id: &str) -> bool {
        self.any_active_fault(agent_id, FaultKind::CircuitBreaker).await
    }

    /// `NETWORK_PARTITION` scenario: query before a cross-agent call to
    /// simulate the target being unreachable.
    pub async fn should_inject_network_partition(&self, agent_id: &str) -> bool {
        self.any_active_fault(agent_id, FaultKind::NetworkPartition).await
    }

    /// `TIMEOUT` scenario: query before an external call to force it
    /// to exceed its deadline.
    pub async fn should_inject_timeout(&self, agent_id: &str) -> bool {
        self.any_active_fault(agent_id, FaultKind::Timeout).await
    }

    /// `RESOURCE_EXHAUSTION` scenario: returns `(resource_type, level)`
    /// if an active scenario targets `agent_id`.
    pub async fn should_inject_resource_exhaustion(&self, agent_id: &str) -> Option<(String, f32)> {
        if self.emergency_stopped.load(Ordering::SeqCst) {
            return None;
        }
        self.sweep_expired().await;
        let scenarios = self.scenarios.read().await;
        for scenario in scenarios.iter() {
            if scenario.config.fault_kind == FaultKind::ResourceExhaustion
                && scenario.config.blast_radius.contains(agent_id)
                && rand::random::<f32>() < scenario.config.injection_probability
            {
                let resource = scenario.config.resource_type.clone().unwrap_or_default();
                let level = scenario.config.resource_level.unwrap_or(0.0);
                return Some((resource, level));
            }
        }
        None
    }

    async fn any_active_fault(&self, agent_id: &str, kind: FaultKind) -> bool {
        if self.emergency_stopped.load(Ordering::SeqCst) {
            return false;
        }
        self.sweep_expired().await;
        let scenarios = self.scenarios.read().await;
        scenarios.iter().any(|s| {
            s.config.fault_kind == kind
                && s.config.blast_radius.contains(agent_id)
                && rand::random::<f32>() < s.config.injection_probability
        })
    }

    /// Idempotent: clears every active scenario and latches the
    /// engine closed until `resume` is called.
    pub async fn emergency_stop(&self) {
        self.emergency_stopped.store(true, Ordering::SeqCst);
        self.scenarios.write().await.clear();
        tracing::error!("chaos engine emergency stop activated");
    }

    pub fn resume(&self) {
        self.emergency_stopped.store(false, Ordering::SeqCst);
        tracing::info!("chaos engine resumed from emergency stop");
    }

    pub fn is_emergency_stopped(&self) -> bool {
        self.emergency_stopped.load(Ordering::SeqCst)
    }

    pub async fn active_count(&self) -> usize {
        self.scenarios.read().await.len()
    }
}

impl Default for ChaosEngine {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedChaosEngine = Arc<ChaosEngine>;
