//! The message processor: the ten-step pipeline every message passes
//! through between ingress and a terminal status.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use agent_bus_governance::{
    CompositeValidationStrategy, Decision, DecisionLog, ErrorKind, Message, MessageStatus,
    Role, RoleCheckOutcome, RoleEnforcer,
};

use crate::chaos::{ChaosEngine, SharedChaosEngine};
use crate::circuit_breaker::{CircuitBreaker, CircuitEvent};
use crate::config::BusConfig;
use crate::deliberation::DeliberationRouter;
use crate::health::HealthAggregator;
use crate::impact::ImpactScorer;
use crate::sinks::{AuditSink, MeteringEvent, MeteringSink};
use crate::strategy::ProcessingStrategy;

/// Warning attached to a [`ProcessOutcome`] when a step degraded
/// rather than failed the message outright, e.g. the impact scorer's
/// circuit was open so a default score of `0.0` was used instead.
pub const IMPACT_SCORE_UNAVAILABLE: &str = "IMPACT_SCORE_UNAVAILABLE";

/// A registered handler for a delivered message. Handlers run after a
/// message clears every gate; a handler failure fails the message but
/// never the processor itself. Handlers cannot yield a response
/// message back onto the bus — a host that needs request/response
/// semantics should call back into its own `AgentBus` handle from
/// inside the closure instead.
pub type Handler = Arc<
    dyn Fn(&Message) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> + Send + Sync,
>;

/// Wires together every collaborator on the hot path. Built once per
/// bus instance and shared across worker tasks.
pub struct MessageProcessor {
    config: BusConfig,
    validation: CompositeValidationStrategy,
    role_enforcer: RoleEnforcer,
    impact_scorer: Arc<dyn ImpactScorer>,
    impact_breaker: CircuitBreaker,
    deliberation: Arc<DeliberationRouter>,
    strategy: Arc<dyn ProcessingStrategy>,
    handlers: Vec<Handler>,
    audit: Arc<AuditSink>,
    metering: Arc<MeteringSink>,
    chaos: SharedChaosEngine,
    health: Arc<HealthAggregator>,
}

/// The end state of running a message through the pipeline. Every
/// terminal variant but `Expired` carries `warnings` accumulated along
/// the way (e.g. [`IMPACT_SCORE_UNAVAILABLE`]), so a caller can detect
/// degraded processing even when the message still got through.
#[derive(Debug)]
pub enum ProcessOutcome {
    Delivered { warnings: Vec<String> },
    Failed { reason: String, warnings: Vec<String> },
    Expired,
    PendingDeliberation { warnings: Vec<String> },
}

impl MessageProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: BusConfig,
        validation: CompositeValidationStrategy,
        role_enforcer: RoleEnforcer,
        impact_scorer: Arc<dyn ImpactScorer>,
        deliberation: Arc<DeliberationRouter>,
        strategy: Arc<dyn ProcessingStrategy>,
        audit: Arc<AuditSink>,
        metering: Arc<MeteringSink>,
        chaos: SharedChaosEngine,
        health: Arc<HealthAggregator>,
    ) -> Self {
        let impact_breaker = CircuitBreaker::new("impact_scorer", config.impact_scorer_breaker.clone());
        Self {
            config,
            validation,
            role_enforcer,
            impact_scorer,
            impact_breaker,
            deliberation,
            strategy,
            handlers: Vec::new(),
            audit,
            metering,
            chaos,
            health,
        }
    }

    pub fn register_handler(&mut self, handler: Handler) {
        self.handlers.push(handler);
    }

    /// The chaos-injection singleton this processor consults on the
    /// hot path. The bus exposes this so an operator can activate or
    /// deactivate scenarios without reaching into the processor.
    pub fn chaos(&self) -> &ChaosEngine {
        &self.chaos
    }

    /// Aggregate health derived from every circuit breaker this
    /// processor (and anything else sharing the same `Arc`) observes.
    pub fn health_snapshot(&self) -> crate::health::HealthSnapshot {
        self.health.snapshot()
    }

    /// Run a message through the full pipeline. Steps, per `spec.md`
    /// §4.5:
    ///
    /// 1. expiry gate
    /// 2. constitutional + structural validation
    /// 3. role check
    /// 4. impact scoring (breaker-guarded, timeout → score 0 + warning)
    /// 5. deliberation gate at `deliberation_threshold`
    /// 6. status → PROCESSING
    /// 7. strategy dispatch
    /// 8. handler dispatch, in registration order
    /// 9. status → DELIVERED/FAILED
    /// 10. fire-and-forget audit + metering
    pub async fn process(&self, message: &mut Message) -> ProcessOutcome {
        let now = chrono::Utc::now();

        if message.is_expired_at(now) {
            message.transition(MessageStatus::Expired);
            self.emit_audit(message, Decision::Deny, Some(0.0));
            return ProcessOutcome::Expired;
        }

        let validation = self.validation.validate(message);
        if !validation.is_valid {
            message.transition(MessageStatus::Failed);
            self.emit_audit(message, Decision::Deny, None);
            return ProcessOutcome::Failed {
                reason: validation.errors.join("; "),
                warnings: Vec::new(),
            };
        }
        message.constitutional_validated = true;

        if let Some(role_str) = message.role() {
            if let Some(role) = Role::parse(role_str) {
                let outcome = self.role_enforcer.check(role, message.message_type, None);
                match outcome {
                    RoleCheckOutcome::Denied { reason } => {
                        message.transition(MessageStatus::Failed);
                        self.emit_audit(message, Decision::Deny, None);
                        return ProcessOutcome::Failed { reason, warnings: Vec::new() };
                    }
                    RoleCheckOutcome::AllowedWithWarning { warning } => {
                        tracing::warn!(message_id = %message.message_id, %warning, "role check warning");
                    }
                    RoleCheckOutcome::Allowed => {}
                }
            } else if self.config.role_enforcement_strict {
                message.transition(MessageStatus::Failed);
                self.emit_audit(message, Decision::Deny, None);
                return ProcessOutcome::Failed {
                    reason: format!("unrecognized role '{role_str}'"),
                    warnings: Vec::new(),
                };
            }
        }

        let mut warnings = Vec::new();
        let (impact_score, score_unavailable) = self.score_impact(message).await;
        message.impact_score = Some(impact_score);
        if score_unavailable {
            warnings.push(IMPACT_SCORE_UNAVAILABLE.to_string());
        }

        if impact_score >= self.config.deliberation_threshold {
            message.transition(MessageStatus::PendingDeliberation);
            if let Err(err) = self.deliberation.submit(message) {
                message.transition(MessageStatus::Failed);
                self.emit_audit(message, Decision::Deny, Some(impact_score));
                return ProcessOutcome::Failed { reason: err.to_string(), warnings };
            }
            self.emit_audit(message, Decision::Review, Some(impact_score));
            return ProcessOutcome::PendingDeliberation { warnings };
        }

        message.transition(MessageStatus::Processing);

        if self.chaos.should_inject_error(&message.to_agent).await {
            message.transition(MessageStatus::Failed);
            self.emit_audit(message, Decision::Deny, Some(impact_score));
            return ProcessOutcome::Failed {
                reason: "chaos-injected error".to_string(),
                warnings,
            };
        }
        if let Some(delay_ms) = self.chaos.should_inject_latency(&message.to_agent).await {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        if let Err(err) = self.strategy.process(message).await {
            message.transition(MessageStatus::Failed);
            self.emit_audit(message, Decision::Deny, Some(impact_score));
            return ProcessOutcome::Failed { reason: err.to_string(), warnings };
        }

        for handler in &self.handlers {
            if let Err(err) = handler(message).await {
                message.transition(MessageStatus::Failed);
                self.emit_audit(message, Decision::Deny, Some(impact_score));
                return ProcessOutcome::Failed { reason: err, warnings };
            }
        }

        message.transition(MessageStatus::Delivered);
        self.emit_audit(message, Decision::Allow, Some(impact_score));
        self.emit_metering(message);
        ProcessOutcome::Delivered { warnings }
    }

    /// Resume a message that was in `PENDING_DELIBERATION` once its
    /// reviewer has posted a result, per `spec.md` §9 Open Question 2:
    /// bypasses re-validation but still emits a decision log, and
    /// follows the same strategy/handler/status path as the fast lane.
    pub async fn resume_after_deliberation(
        &self,
        message: &mut Message,
        decision: Decision,
        reviewer: &str,
    ) -> ProcessOutcome {
        let review_log = DecisionLog::new(message.from_agent.clone(), Decision::Review, &message.constitutional_hash)
            .with_tenant_id(message.tenant_id.clone().unwrap_or_default());
        let final_log = review_log.follow_up(decision);
        self.audit.record(final_log);
        tracing::info!(conversation_id = %message.conversation_id, %reviewer, ?decision, "deliberation resolved");

        if decision != Decision::Allow {
            message.transition(MessageStatus::Failed);
            return ProcessOutcome::Failed {
                reason: format!("deliberation denied by {reviewer}"),
                warnings: Vec::new(),
            };
        }

        message.transition(MessageStatus::Delivered);
        self.emit_metering(message);
        ProcessOutcome::Delivered { warnings: Vec::new() }
    }

    /// Look up a pending deliberation's current state without
    /// consuming it, for a caller polling on a `conversation_id`
    /// returned by an earlier `PENDING_DELIBERATION` outcome.
    pub fn deliberation_state(&self, conversation_id: uuid::Uuid) -> Option<crate::deliberation::DeliberationState> {
        self.deliberation.state(conversation_id)
    }

    /// Post a reviewer's decision for a pending deliberation and
    /// resume the suspended message in one step: reconciles
    /// `DeliberationRouter::post_result` and `take` with
    /// [`MessageProcessor::resume_after_deliberation`].
    pub async fn post_deliberation_result(
        &self,
        conversation_id: uuid::Uuid,
        decision: Decision,
        reviewer: &str,
    ) -> crate::error::BusResult<(Message, ProcessOutcome)> {
        self.deliberation.post_result(conversation_id, decision, reviewer)?;
        let (_, mut message) = self.deliberation.take(conversation_id).ok_or_else(|| {
            crate::error::BusError::new(
                agent_bus_governance::ErrorKind::NoRoute,
                "deliberation entry vanished between post_result and take",
            )
        })?;
        let outcome = self.resume_after_deliberation(&mut message, decision, reviewer).await;
        Ok((message, outcome))
    }

    /// Resolve every deliberation past its wall-clock deadline with no
    /// posted result: each is removed from the router, transitioned to
    /// `FAILED`, and audited with decision `DENY` and reason
    /// `DELIBERATION_TIMEOUT`, per `spec.md` §4.8. Call this
    /// periodically (the bus does so from a background sweep task);
    /// the router itself never runs one on its own.
    pub async fn sweep_deliberation_timeouts(&self) -> Vec<(Message, ProcessOutcome)> {
        let mut resolved = Vec::new();
        for conversation_id in self.deliberation.expire_stale() {
            let Some((_, mut message)) = self.deliberation.take(conversation_id) else {
                continue;
            };
            message.transition(MessageStatus::Failed);
            self.emit_audit(&message, Decision::Deny, message.impact_score);
            tracing::warn!(%conversation_id, "deliberation timed out, denying");
            resolved.push((
                message,
                ProcessOutcome::Failed {
                    reason: ErrorKind::DeliberationTimeout.to_string(),
                    warnings: Vec::new(),
                },
            ));
        }
        resolved
    }

    /// Returns the score plus whether it's a degraded `0.0` default
    /// (circuit open or the call timed out), for the caller to attach
    /// an [`IMPACT_SCORE_UNAVAILABLE`] warning.
    async fn score_impact(&self, message: &Message) -> (f32, bool) {
        if !self.impact_breaker.allow_call() {
            tracing::warn!(message_id = %message.message_id, "impact scorer circuit open, defaulting score to 0");
            return (0.0, true);
        }

        let timeout = Duration::from_millis(self.config.external_timeout_ms);
        match tokio::time::timeout(timeout, self.impact_scorer.score(message)).await {
            Ok(score) => {
                let event = self.impact_breaker.record_success();
                self.observe_breaker_event(event);
                (score, false)
            }
            Err(_) => {
                let event = self.impact_breaker.record_failure();
                self.observe_breaker_event(event);
                tracing::warn!(message_id = %message.message_id, "impact scorer timed out, defaulting score to 0");
                (0.0, true)
            }
        }
    }

    /// Forward a circuit-breaker transition into the shared
    /// [`HealthAggregator`] (`spec.md` §4.9/§4.11: "all transitions
    /// emit events the health aggregator subscribes to").
    fn observe_breaker_event(&self, event: Option<CircuitEvent>) {
        if let Some(CircuitEvent { from, to }) = event {
            tracing::info!(breaker = self.impact_breaker.name(), ?from, ?to, "circuit breaker transition");
        }
        self.health.observe(self.impact_breaker.name(), self.impact_breaker.state());
    }

    fn emit_audit(&self, message: &Message, decision: Decision, risk_score: Option<f32>) {
        let mut log = DecisionLog::new(message.from_agent.clone(), decision, &message.constitutional_hash);
        if let Some(score) = risk_score {
            log = log.with_risk_score(score);
        }
        if let Some(tenant_id) = &message.tenant_id {
            log = log.with_tenant_id(tenant_id.clone());
        }
        self.audit.record(log);
    }

    fn emit_metering(&self, message: &Message) {
        self.metering.record(MeteringEvent {
            agent_id: message.from_agent.clone(),
            tenant_id: message.tenant_id.clone(),
            message_type: format!("{:?}", message.message_type),
            timestamp: chrono::Utc::now(),
        });
    }
}
