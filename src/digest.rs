//! Routing digests (component C5): a short, cached summary of what each node
//! is good at and how busy it is, used by the routing policy's LLM-driven
//! path as the candidate list it picks from, and by operators as a
//! lightweight fleet health view.

use crate::clock::{Clock, MonotonicClock};
use crate::models::{Node, RoutingDigest};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Literal returned by [`RoutingDigestBuilder::full_digest`] for an empty
/// fleet; the routing policy treats this exact string as its cue to answer
/// `LOCAL` without asking the engine.
pub const NO_NODES_AVAILABLE: &str = "No nodes available";

struct CachedDigest {
    digest: RoutingDigest,
    fetched_at_millis: u64,
}

/// TTL cache of per-node [`RoutingDigest`]s, keyed by node slug. Avoids
/// recomputing (or re-requesting from the node) a summary on every routing
/// decision; entries older than the configured TTL are rebuilt on next read.
pub struct DigestCache {
    entries: Mutex<HashMap<String, CachedDigest>>,
    ttl_millis: u64,
    clock: Arc<dyn Clock>,
}

impl DigestCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl_millis: ttl.as_millis() as u64,
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Return the cached digest for `node_slug` if it hasn't expired.
    pub fn get(&self, node_slug: &str) -> Option<RoutingDigest> {
        let entries = self.entries.lock().expect("digest cache mutex poisoned");
        let entry = entries.get(node_slug)?;
        let age = self.clock.now_millis().saturating_sub(entry.fetched_at_millis);
        if age >= self.ttl_millis {
            None
        } else {
            Some(entry.digest.clone())
        }
    }

    pub fn put(&self, digest: RoutingDigest) {
        let mut entries = self.entries.lock().expect("digest cache mutex poisoned");
        entries.insert(
            digest.node_slug.clone(),
            CachedDigest { digest, fetched_at_millis: self.clock.now_millis() },
        );
    }

    pub fn invalidate(&self, node_slug: &str) {
        self.entries.lock().expect("digest cache mutex poisoned").remove(node_slug);
    }
}

/// Builds [`RoutingDigest`]s from a node's registered metadata and live
/// session count, going through [`DigestCache`] so a rapid sequence of
/// routing decisions for the same node doesn't rebuild it every time.
pub struct RoutingDigestBuilder {
    cache: DigestCache,
}

impl RoutingDigestBuilder {
    pub fn new(ttl: Duration) -> Self {
        Self { cache: DigestCache::new(ttl) }
    }

    /// Digest for a single node, served from cache when fresh.
    pub fn digest_for(&self, node: &Node, active_sessions: usize) -> RoutingDigest {
        if let Some(cached) = self.cache.get(&node.slug) {
            return cached;
        }
        let collection_names: Vec<String> = node.collections.iter().map(|c| c.name.clone()).collect();
        let digest = RoutingDigest {
            node_slug: node.slug.clone(),
            summary: format!(
                "{} ({:?} node) covering: {}",
                node.display_name,
                node.node_type,
                collection_names.join(", ")
            ),
            collections: collection_names,
            active_sessions,
            generated_at: Utc::now(),
        };
        self.cache.put(digest.clone());
        digest
    }

    /// Fleet-wide digest: one entry per node, built through the same cache.
    pub fn fleet_digest<'a>(
        &self,
        nodes: impl IntoIterator<Item = (&'a Node, usize)>,
    ) -> Vec<RoutingDigest> {
        nodes.into_iter().map(|(node, sessions)| self.digest_for(node, sessions)).collect()
    }

    /// Concatenation of every active node's digest plus a "LOCAL NODE:"
    /// block built from `local_node_metadata`. Returns the literal
    /// "No nodes available" when the fleet is empty.
    pub fn full_digest<'a>(
        &self,
        nodes: impl IntoIterator<Item = (&'a Node, usize)>,
        local_node_metadata: &HashMap<String, String>,
    ) -> String {
        let digests = self.fleet_digest(nodes);
        if digests.is_empty() {
            return NO_NODES_AVAILABLE.to_string();
        }

        let mut sections: Vec<String> = digests.into_iter().map(|d| d.summary).collect();
        let local_block = local_node_metadata
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join(", ");
        sections.push(format!("LOCAL NODE: {local_block}"));
        sections.join("\n\n")
    }

    /// Force `node_slug`'s digest to regenerate and return the new value.
    pub fn refresh(&self, node: &Node, active_sessions: usize) -> RoutingDigest {
        self.invalidate(&node.slug);
        self.digest_for(node, active_sessions)
    }

    pub fn invalidate(&self, node_slug: &str) {
        self.cache.invalidate(node_slug);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::CollectionClaim;

    fn node(slug: &str) -> Node {
        Node::new(slug, format!("http://{slug}.local"), vec![CollectionClaim::simple("invoices")])
    }

    #[test]
    fn digest_is_served_from_cache_while_fresh() {
        let builder = RoutingDigestBuilder::new(Duration::from_secs(60));
        let n = node("invoicing");

        let first = builder.digest_for(&n, 3);
        let second = builder.digest_for(&n, 99);

        // Second call's session count is ignored because the cache served
        // the first-built digest.
        assert_eq!(first.active_sessions, second.active_sessions);
    }

    #[test]
    fn digest_rebuilds_once_ttl_elapses() {
        let clock = ManualClock::new();
        let cache = DigestCache::new(Duration::from_millis(100)).with_clock(clock.clone());
        let builder = RoutingDigestBuilder { cache };
        let n = node("invoicing");

        builder.digest_for(&n, 3);
        clock.advance(150);
        let rebuilt = builder.digest_for(&n, 10);

        assert_eq!(rebuilt.active_sessions, 10);
    }

    #[test]
    fn invalidate_forces_rebuild() {
        let builder = RoutingDigestBuilder::new(Duration::from_secs(60));
        let n = node("invoicing");

        builder.digest_for(&n, 3);
        builder.invalidate("invoicing");
        let rebuilt = builder.digest_for(&n, 10);

        assert_eq!(rebuilt.active_sessions, 10);
    }

    #[test]
    fn fleet_digest_covers_every_node() {
        let builder = RoutingDigestBuilder::new(Duration::from_secs(60));
        let a = node("a");
        let b = node("b");

        let digests = builder.fleet_digest(vec![(&a, 1), (&b, 2)]);
        let slugs: Vec<_> = digests.iter().map(|d| d.node_slug.clone()).collect();
        assert_eq!(slugs, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn full_digest_of_an_empty_fleet_is_the_literal_no_nodes_available() {
        let builder = RoutingDigestBuilder::new(Duration::from_secs(60));
        let metadata = HashMap::new();
        assert_eq!(builder.full_digest(std::iter::empty(), &metadata), NO_NODES_AVAILABLE);
    }

    #[test]
    fn full_digest_concatenates_node_digests_and_a_local_node_block() {
        let builder = RoutingDigestBuilder::new(Duration::from_secs(60));
        let a = node("a");
        let mut metadata = HashMap::new();
        metadata.insert("role".to_string(), "master".to_string());

        let full = builder.full_digest(vec![(&a, 1)], &metadata);

        assert!(full.contains("a (Domain node)"));
        assert!(full.contains("LOCAL NODE: role: master"));
    }

    #[test]
    fn refresh_forces_rebuild_and_returns_new_value() {
        let builder = RoutingDigestBuilder::new(Duration::from_secs(60));
        let n = node("invoicing");

        builder.digest_for(&n, 3);
        let refreshed = builder.refresh(&n, 10);

        assert_eq!(refreshed.active_sessions, 10);
    }
}
