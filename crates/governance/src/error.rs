//! Error taxonomy for the Enhanced Agent Bus.
//!
//! Per-message errors are trapped at the processor boundary and rendered
//! into a `ValidationResult` plus a status transition; they never unwind
//! a worker task. Programming errors and startup errors (`ConfigError`)
//! are the only ones allowed to propagate and crash the process.

use thiserror::Error;

/// The fixed set of error kinds a message can fail with on the hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// `constitutional_hash` differs from the build-time constant.
    ConstitutionalMismatch,
    /// Principal's role lacks the derived action.
    RoleViolation,
    /// `expires_at` has passed.
    Expired,
    /// Router found no eligible target agent.
    NoRoute,
    /// Ingress queue saturated past the caller's timeout.
    QueueFull,
    /// A handler raised during dispatch.
    HandlerFailure,
    /// The selected processing strategy is not ready and no fallback succeeded.
    StrategyUnavailable,
    /// The guarding circuit breaker is open.
    CircuitOpen,
    /// No deliberation result arrived before the wall-clock deadline.
    DeliberationTimeout,
    /// The deliberation queue is full.
    DeliberationFull,
    /// Startup-time configuration violates the recognized configuration surface.
    ConfigInvalid,
}

impl ErrorKind {
    /// Human-readable, stable name (also the wire representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConstitutionalMismatch => "CONSTITUTIONAL_MISMATCH",
            Self::RoleViolation => "ROLE_VIOLATION",
            Self::Expired => "EXPIRED",
            Self::NoRoute => "NO_ROUTE",
            Self::QueueFull => "QUEUE_FULL",
            Self::HandlerFailure => "HANDLER_FAILURE",
            Self::StrategyUnavailable => "STRATEGY_UNAVAILABLE",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::DeliberationTimeout => "DELIBERATION_TIMEOUT",
            Self::DeliberationFull => "DELIBERATION_FULL",
            Self::ConfigInvalid => "CONFIG_INVALID",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Startup-time configuration error. Crashes the process per the
/// propagation policy; never trapped at the message boundary.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("constitutional_hash must be 16 hex characters, got {0} chars")]
    InvalidHashLength(usize),

    #[error("deliberation_threshold must be in [0, 1], got {0}")]
    InvalidDeliberationThreshold(f32),

    #[error("impact_score_weights must sum to 1.0 (±1e-3), got {0}")]
    InvalidWeightSum(f32),

    #[error("worker_count must be >= 1, got {0}")]
    InvalidWorkerCount(usize),

    #[error("queue_capacity must be >= 1, got {0}")]
    InvalidQueueCapacity(usize),

    #[error("{field} must be >= {min}, got {actual}")]
    OutOfRange {
        field: &'static str,
        min: u64,
        actual: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_round_trips_through_str() {
        for kind in [
            ErrorKind::ConstitutionalMismatch,
            ErrorKind::RoleViolation,
            ErrorKind::Expired,
            ErrorKind::NoRoute,
            ErrorKind::QueueFull,
            ErrorKind::HandlerFailure,
            ErrorKind::StrategyUnavailable,
            ErrorKind::CircuitOpen,
            ErrorKind::DeliberationTimeout,
            ErrorKind::DeliberationFull,
            ErrorKind::ConfigInvalid,
        ] {
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }
}
