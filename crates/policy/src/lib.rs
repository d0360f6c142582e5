//! Policy adapter gateway for the Enhanced Agent Bus: a pluggable
//! backend contract (remote/embedded/fallback), a two-tier cache keyed
//! on the constitutional hash in force, and a gateway that combines
//! both behind a circuit breaker.

pub mod adapter;
pub mod cache;
pub mod gateway;

pub use adapter::{
    ComparisonOp, Condition, EmbeddedPolicyAdapter, FallbackPolicyAdapter, Policy, PolicyAction,
    PolicyAdapter, PolicyDecision, PolicyError, PolicyResult, PolicyRule,
};
#[cfg(feature = "remote")]
pub use adapter::RemotePolicyAdapter;
pub use cache::{cache_key, CacheStats, DistributedPolicyCache, PolicyCache};
pub use gateway::PolicyGateway;
