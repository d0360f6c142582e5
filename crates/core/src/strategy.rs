//! Pluggable processing strategies. The processor dispatches a
//! validated, routed message to one of these; a [`CompositeStrategy`]
//! falls back to the next strategy only when one is unavailable, not
//! when it denies the message.

use agent_bus_governance::Message;
use async_trait::async_trait;

use crate::error::{BusError, BusResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyReadiness {
    Ready,
    Unavailable,
}

/// A strategy for turning a validated message into a delivery
/// outcome. Implementations decide how to reach the target agent
/// (in-process dispatch, a queue, an external transport).
#[async_trait]
pub trait ProcessingStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap readiness probe; the composite strategy uses this to
    /// decide whether to try this strategy at all before incurring
    /// the cost of `process`.
    fn readiness(&self) -> StrategyReadiness {
        StrategyReadiness::Ready
    }

    async fn process(&self, message: &Message) -> BusResult<()>;
}

/// The bundled default: hands the message to an in-process handler
/// table (see [`crate::processor::MessageProcessor`]). Always ready.
pub struct InProcessStrategy;

#[async_trait]
impl ProcessingStrategy for InProcessStrategy {
    fn name(&self) -> &str {
        "in_process"
    }

    async fn process(&self, _message: &Message) -> BusResult<()> {
        Ok(())
    }
}

/// Tries each strategy in order, skipping ones reporting
/// [`StrategyReadiness::Unavailable`]. If every strategy is
/// unavailable, fails with `STRATEGY_UNAVAILABLE`. A strategy that is
/// ready but returns an error is not retried against the next
/// strategy: a processing failure is a verdict, not a reason to shop
/// around.
pub struct CompositeStrategy {
    strategies: Vec<Box<dyn ProcessingStrategy>>,
}

impl CompositeStrategy {
    pub fn new(strategies: Vec<Box<dyn ProcessingStrategy>>) -> Self {
        Self { strategies }
    }
}

#[async_trait]
impl ProcessingStrategy for CompositeStrategy {
    fn name(&self) -> &str {
        "composite"
    }

    fn readiness(&self) -> StrategyReadiness {
        if self.strategies.iter().any(|s| s.readiness() == StrategyReadiness::Ready) {
            StrategyReadiness::Ready
        } else {
            StrategyReadiness::Unavailable
        }
    }

    async fn process(&self, message: &Message) -> BusResult<()> {
        for strategy in &self.strategies {
            if strategy.readiness() == StrategyReadiness::Ready {
                return strategy.process(message).await;
            }
        }
        Err(BusError::new(
            agent_bus_governance::ErrorKind::StrategyUnavailable,
            "no ready processing strategy",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_bus_governance::{ErrorKind, MessagePriority, MessageType};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlakyStrategy {
        ready: AtomicBool,
    }

    #[async_trait]
    impl ProcessingStrategy for FlakyStrategy {
        fn name(&self) -> &str {
            "flaky"
        }

        fn readiness(&self) -> StrategyReadiness {
            if self.ready.load(Ordering::Relaxed) {
                StrategyReadiness::Ready
            } else {
                StrategyReadiness::Unavailable
            }
        }

        async fn process(&self, _message: &Message) -> BusResult<()> {
            Ok(())
        }
    }

    fn message() -> Message {
        Message::new("a", "b", MessageType::Query, MessagePriority::Low)
    }

    #[tokio::test]
    async fn falls_back_to_next_strategy_when_first_unavailable() {
        let composite = CompositeStrategy::new(vec![
            Box::new(FlakyStrategy { ready: AtomicBool::new(false) }),
            Box::new(InProcessStrategy),
        ]);
        assert!(composite.process(&message()).await.is_ok());
    }

    #[tokio::test]
    async fn fails_when_every_strategy_is_unavailable() {
        let composite = CompositeStrategy::new(vec![Box::new(FlakyStrategy {
            ready: AtomicBool::new(false),
        })]);
        let err = composite.process(&message()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::StrategyUnavailable);
    }
}
