//! `PolicyGateway`: the façade a bus host calls into. Looks up the
//! in-memory cache, then an optional distributed cache, then falls
//! through to the backend adapter behind a circuit breaker; a tripped
//! breaker or backend error degrades to the fallback adapter rather
//! than failing the call.

use std::sync::Arc;

use agent_bus_core::{CircuitBreaker, CircuitBreakerConfig, CircuitEvent, HealthAggregator};

use crate::adapter::{FallbackPolicyAdapter, PolicyAdapter, PolicyDecision, PolicyResult};
use crate::cache::{cache_key, DistributedPolicyCache, PolicyCache};

pub struct PolicyGateway {
    backend: Arc<dyn PolicyAdapter>,
    fallback: Arc<dyn PolicyAdapter>,
    cache: PolicyCache,
    distributed: Option<Arc<dyn DistributedPolicyCache>>,
    breaker: CircuitBreaker,
    health: Option<Arc<HealthAggregator>>,
}

impl PolicyGateway {
    pub fn new(backend: Arc<dyn PolicyAdapter>, cache_capacity: usize, breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            backend,
            fallback: Arc::new(FallbackPolicyAdapter),
            cache: PolicyCache::new(cache_capacity),
            distributed: None,
            breaker: CircuitBreaker::new("policy_backend", breaker_config),
            health: None,
        }
    }

    pub fn with_distributed_cache(mut self, cache: Arc<dyn DistributedPolicyCache>) -> Self {
        self.distributed = Some(cache);
        self
    }

    /// Subscribe a [`HealthAggregator`] to this gateway's breaker
    /// transitions (`spec.md` §4.11).
    pub fn with_health_aggregator(mut self, health: Arc<HealthAggregator>) -> Self {
        self.health = Some(health);
        self
    }

    fn observe_breaker_event(&self, event: Option<CircuitEvent>) {
        if let Some(CircuitEvent { from, to }) = event {
            tracing::info!(breaker = self.breaker.name(), ?from, ?to, "circuit breaker transition");
        }
        if let Some(health) = &self.health {
            health.observe(self.breaker.name(), self.breaker.state());
        }
    }

    /// Resolve a decision for `input` against the policy registered at
    /// `policy_path`. Lookup order: in-memory cache, distributed
    /// cache (if configured), then the backend. A backend call is only
    /// attempted while the breaker is closed or half-open; once it
    /// trips open, every call degrades straight to the fallback
    /// adapter until the cooldown elapses.
    pub async fn evaluate(
        &self,
        policy_path: &str,
        input: &serde_json::Value,
        constitutional_hash: &str,
    ) -> PolicyResult<PolicyDecision> {
        let key = cache_key(policy_path, input, constitutional_hash);

        if let Some(decision) = self.cache.get(&key) {
            return Ok(decision);
        }

        if let Some(distributed) = &self.distributed {
            if let Some(decision) = distributed.get(&key) {
                self.cache.put(key.clone(), decision.clone());
                return Ok(decision);
            }
        }

        if !self.breaker.allow_call() {
            tracing::warn!(policy_path, "policy backend circuit open, falling back");
            return self.fallback.evaluate(policy_path, input).await;
        }

        match self.backend.evaluate(policy_path, input).await {
            Ok(decision) => {
                let event = self.breaker.record_success();
                self.observe_breaker_event(event);
                self.cache.put(key.clone(), decision.clone());
                if let Some(distributed) = &self.distributed {
                    distributed.put(&key, decision.clone());
                }
                Ok(decision)
            }
            Err(err) => {
                let event = self.breaker.record_failure();
                self.observe_breaker_event(event);
                tracing::warn!(policy_path, %err, "policy backend failed, falling back");
                self.fallback.evaluate(policy_path, input).await
            }
        }
    }

    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }
}
