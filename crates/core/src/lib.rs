//! Registry, router, processor, deliberation routing, and the
//! resilience subsystems (circuit breaker, health aggregator,
//! recovery orchestrator, chaos engine) for the Enhanced Agent Bus.

pub mod bus;
pub mod chaos;
pub mod circuit_breaker;
pub mod config;
pub mod deliberation;
pub mod error;
pub mod health;
pub mod impact;
pub mod processor;
pub mod recovery;
pub mod registry;
pub mod router;
pub mod sinks;
pub mod strategy;

pub use bus::AgentBus;
pub use chaos::{BlastRadius, ChaosEngine, ChaosScenarioConfig, FaultKind, SharedChaosEngine};
pub use circuit_breaker::{CircuitBreaker, CircuitEvent, CircuitState};
pub use config::{BackoffStrategy, BusConfig, CircuitBreakerConfig, ImpactScoreWeights};
pub use deliberation::{DeliberationRouter, DeliberationState};
pub use error::{BusError, BusResult};
pub use health::{HealthAggregator, HealthSnapshot, HealthStatus};
pub use impact::{ImpactScorer, WeightedImpactScorer};
pub use processor::{Handler, MessageProcessor, ProcessOutcome};
pub use recovery::{RecoveryOrchestrator, RecoveryOutcome, RecoveryTask};
pub use registry::{AgentRecord, AgentRegistry};
pub use router::Router;
pub use sinks::{AuditSink, MeteringEvent, MeteringSink, SinkStats};
pub use strategy::{CompositeStrategy, InProcessStrategy, ProcessingStrategy, StrategyReadiness};
