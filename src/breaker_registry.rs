//! Per-node circuit breakers, keyed by node slug so each remote node fails
//! independently — one unhealthy node opening its breaker must not affect
//! routing decisions for any other node.

use crate::resilience::{CircuitBreakerConfig, CircuitBreakerPolicy};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Registry of [`CircuitBreakerPolicy`] instances, one per node slug,
/// created lazily on first use and reused for the registry's lifetime.
#[derive(Clone)]
pub struct BreakerRegistry {
    breakers: Arc<Mutex<HashMap<String, CircuitBreakerPolicy>>>,
    failure_threshold: usize,
    recovery_timeout: Duration,
    half_open_max_calls: usize,
}

impl BreakerRegistry {
    pub fn new(failure_threshold: usize, recovery_timeout: Duration, half_open_max_calls: usize) -> Self {
        Self {
            breakers: Arc::new(Mutex::new(HashMap::new())),
            failure_threshold,
            recovery_timeout,
            half_open_max_calls,
        }
    }

    /// Get the breaker for `node_slug`, creating one with this registry's
    /// default config if this is the first time the node is seen.
    pub fn get_or_create(&self, node_slug: &str) -> CircuitBreakerPolicy {
        let mut breakers = self.breakers.lock().expect("breaker registry mutex poisoned");
        breakers
            .entry(node_slug.to_string())
            .or_insert_with(|| {
                CircuitBreakerPolicy::with_config(CircuitBreakerConfig {
                    failure_threshold: self.failure_threshold,
                    recovery_timeout: self.recovery_timeout,
                    half_open_max_calls: self.half_open_max_calls,
                })
            })
            .clone()
    }

    /// Slugs of every node this registry currently tracks a breaker for.
    pub fn known_nodes(&self) -> Vec<String> {
        self.breakers
            .lock()
            .expect("breaker registry mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Remove the breaker for a deregistered node so it doesn't leak memory
    /// across a long-running gateway's node churn.
    pub fn remove(&self, node_slug: &str) {
        self.breakers.lock().expect("breaker registry mutex poisoned").remove(node_slug);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResilienceError;

    fn registry() -> BreakerRegistry {
        BreakerRegistry::new(2, Duration::from_secs(10), 1)
    }

    #[tokio::test]
    async fn same_slug_returns_the_same_breaker_instance() {
        let registry = registry();
        let a = registry.get_or_create("node-a");
        let b = registry.get_or_create("node-a");

        // Opening `a` via 2 failures should be visible through `b` too,
        // since both handles share the same underlying atomics.
        for _ in 0..2 {
            let _ = a
                .execute(|| async { Err::<(), _>(ResilienceError::Inner(std::io::Error::other("boom"))) })
                .await;
        }
        let result = b.execute(|| async { Ok::<_, ResilienceError<std::io::Error>>(()) }).await;
        assert!(result.unwrap_err().is_circuit_open());
    }

    #[tokio::test]
    async fn independent_nodes_have_independent_breakers() {
        let registry = registry();
        let a = registry.get_or_create("node-a");
        let b = registry.get_or_create("node-b");

        for _ in 0..2 {
            let _ = a
                .execute(|| async { Err::<(), _>(ResilienceError::Inner(std::io::Error::other("boom"))) })
                .await;
        }

        let result = b.execute(|| async { Ok::<_, ResilienceError<std::io::Error>>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn known_nodes_reflects_created_breakers() {
        let registry = registry();
        registry.get_or_create("node-a");
        registry.get_or_create("node-b");
        let mut nodes = registry.known_nodes();
        nodes.sort();
        assert_eq!(nodes, vec!["node-a".to_string(), "node-b".to_string()]);
    }

    #[test]
    fn remove_drops_the_tracked_breaker() {
        let registry = registry();
        registry.get_or_create("node-a");
        registry.remove("node-a");
        assert!(registry.known_nodes().is_empty());
    }
}
