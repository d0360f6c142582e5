//! Two-tier cache in front of a policy backend: a bounded in-memory
//! LRU keyed by `(policy_path, input_hash, constitutional_hash)`, with
//! an optional distributed tier a host can plug in for cross-process
//! sharing.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::adapter::PolicyDecision;

/// Derives a stable cache key from the policy path, the input it was
/// evaluated against, and the constitutional hash in force. Including
/// the hash means a hash rotation naturally invalidates every cached
/// decision instead of needing an explicit flush.
pub fn cache_key(policy_path: &str, input: &serde_json::Value, constitutional_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(policy_path.as_bytes());
    hasher.update(input.to_string().as_bytes());
    hasher.update(constitutional_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A pluggable second tier (e.g. a Redis-backed cache) a host may
/// inject; this crate ships no concrete implementation. Being
/// `async_trait`-less (`&self` returning owned data, no `.await`) keeps
/// it usable from sync or async hosts alike.
pub trait DistributedPolicyCache: Send + Sync {
    fn get(&self, key: &str) -> Option<PolicyDecision>;
    fn put(&self, key: &str, decision: PolicyDecision);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// The bounded, process-local LRU tier. Always consulted first.
pub struct PolicyCache {
    inner: Mutex<LruCache<String, PolicyDecision>>,
    hits: Mutex<u64>,
    misses: Mutex<u64>,
}

impl PolicyCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            hits: Mutex::new(0),
            misses: Mutex::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<PolicyDecision> {
        let mut inner = self.inner.lock();
        match inner.get(key) {
            Some(decision) => {
                *self.hits.lock() += 1;
                Some(decision.clone())
            }
            None => {
                *self.misses.lock() += 1;
                None
            }
        }
    }

    pub fn put(&self, key: String, decision: PolicyDecision) {
        self.inner.lock().put(key, decision);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: *self.hits.lock(),
            misses: *self.misses.lock(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_bus_governance::Decision;
    use serde_json::json;

    fn decision(d: Decision) -> PolicyDecision {
        PolicyDecision {
            decision: d,
            reasoning: "test".to_string(),
            risk_score: 0,
            matched_rule: None,
        }
    }

    #[test]
    fn cache_key_changes_with_constitutional_hash() {
        let input = json!({"amount": 100});
        let a = cache_key("spending-limits", &input, "hash-a");
        let b = cache_key("spending-limits", &input, "hash-b");
        assert_ne!(a, b);
    }

    #[test]
    fn get_put_round_trips() {
        let cache = PolicyCache::new(10);
        let key = cache_key("p", &json!({}), "h");
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), decision(Decision::Allow));
        assert_eq!(cache.get(&key).unwrap().decision, Decision::Allow);
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let cache = PolicyCache::new(10);
        let key = cache_key("p", &json!({}), "h");
        cache.get(&key);
        cache.put(key.clone(), decision(Decision::Allow));
        cache.get(&key);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn eviction_drops_least_recently_used() {
        let cache = PolicyCache::new(1);
        let k1 = cache_key("p1", &json!({}), "h");
        let k2 = cache_key("p2", &json!({}), "h");
        cache.put(k1.clone(), decision(Decision::Allow));
        cache.put(k2.clone(), decision(Decision::Deny));
        assert!(cache.get(&k1).is_none());
        assert_eq!(cache.get(&k2).unwrap().decision, Decision::Deny);
    }
}
