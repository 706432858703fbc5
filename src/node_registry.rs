//! Active-node cache and collection→node resolution (component C2).
//!
//! Nodes are fetched from a [`NodeStore`] (backed by whatever the gateway
//! persists nodes in) and cached in an [`arc_swap::ArcSwap`] snapshot with a
//! TTL, the same shape as the upstream platform's model-list cache: cheap,
//! lock-free reads for the hot path, a full refetch once the snapshot goes
//! stale.

use crate::clock::{Clock, MonotonicClock};
use crate::models::Node;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Score awarded to an exact, case-insensitive collection name match.
const SCORE_EXACT: u32 = 100;
/// Score for a singular/plural variant of the collection name.
const SCORE_PLURAL: u32 = 90;
/// Score for a declared alias.
const SCORE_ALIAS: u32 = 80;
/// Score for a substring match, the weakest signal.
const SCORE_SUBSTRING: u32 = 70;

/// Where nodes are persisted. A real gateway backs this with its database;
/// [`InMemoryNodeStore`] is the reference implementation used in tests and
/// examples.
#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<Node>, NodeStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NodeStoreError {
    #[error("node store unavailable: {0}")]
    Unavailable(String),
}

/// In-memory [`NodeStore`] backed by a mutex-guarded `Vec`. Suitable for
/// tests and single-process deployments; anything sharing state across
/// gateway instances needs a real persistence-backed implementation.
#[derive(Default)]
pub struct InMemoryNodeStore {
    nodes: Mutex<Vec<Node>>,
}

impl InMemoryNodeStore {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes: Mutex::new(nodes) }
    }

    pub fn upsert(&self, node: Node) {
        let mut nodes = self.nodes.lock().expect("node store mutex poisoned");
        if let Some(existing) = nodes.iter_mut().find(|n| n.id == node.id) {
            *existing = node;
        } else {
            nodes.push(node);
        }
    }

    pub fn remove(&self, node_id: Uuid) {
        self.nodes.lock().expect("node store mutex poisoned").retain(|n| n.id != node_id);
    }
}

#[async_trait]
impl NodeStore for InMemoryNodeStore {
    async fn list_nodes(&self) -> Result<Vec<Node>, NodeStoreError> {
        Ok(self.nodes.lock().expect("node store mutex poisoned").clone())
    }
}

/// TTL-cached view of the active node fleet, plus the collection→node
/// scoring used to pick which node owns a given collection name.
pub struct NodeRegistry {
    store: Arc<dyn NodeStore>,
    snapshot: ArcSwap<Vec<Node>>,
    fetched_at_millis: AtomicU64,
    ttl_millis: u64,
    clock: Arc<dyn Clock>,
}

impl NodeRegistry {
    pub fn new(store: Arc<dyn NodeStore>, ttl: std::time::Duration) -> Self {
        Self {
            store,
            snapshot: ArcSwap::from_pointee(Vec::new()),
            fetched_at_millis: AtomicU64::new(0),
            ttl_millis: ttl.as_millis() as u64,
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    fn is_stale(&self) -> bool {
        let fetched_at = self.fetched_at_millis.load(Ordering::Acquire);
        if fetched_at == 0 {
            return true;
        }
        self.clock.now_millis().saturating_sub(fetched_at) >= self.ttl_millis
    }

    /// Active, routable nodes, refreshing the cache from the store first if
    /// the TTL has elapsed.
    pub async fn active_nodes(&self) -> Result<Arc<Vec<Node>>, NodeStoreError> {
        if self.is_stale() {
            self.refresh().await?;
        }
        Ok(self.snapshot.load_full())
    }

    async fn refresh(&self) -> Result<(), NodeStoreError> {
        let nodes = self.store.list_nodes().await?;
        let routable: Vec<Node> = nodes.into_iter().filter(Node::is_routable).collect();
        self.snapshot.store(Arc::new(routable));
        self.fetched_at_millis.store(self.clock.now_millis(), Ordering::Release);
        Ok(())
    }

    /// Force the next `active_nodes()` call to refetch, used after a node
    /// registers/deregisters so callers don't wait out the TTL.
    pub fn invalidate(&self) {
        self.fetched_at_millis.store(0, Ordering::Release);
    }

    /// Resolve the best node for a collection name, highest score wins;
    /// ties broken by higher `weight`, then by the order nodes were
    /// returned in (first wins).
    pub async fn resolve_collection(&self, collection: &str) -> Result<Option<Node>, NodeStoreError> {
        let nodes = self.active_nodes().await?;
        let query = normalize(collection);

        let mut best: Option<(u32, &Node)> = None;
        for node in nodes.iter() {
            if let Some(score) = best_score_for_node(&query, node) {
                let replace = match best {
                    None => true,
                    Some((best_score, best_node)) => {
                        score > best_score || (score == best_score && node.weight > best_node.weight)
                    }
                };
                if replace {
                    best = Some((score, node));
                }
            }
        }
        Ok(best.map(|(_, node)| node.clone()))
    }
}

/// Whether `node` owns `collection_name`, per the same scoring
/// (exact/plural/alias/substring) `resolve_collection` uses across the whole
/// fleet — the per-node predicate horizontal failover needs to test an
/// alternate node against the collection the original call was scoped to.
pub fn node_owns_collection(node: &Node, collection_name: &str) -> bool {
    best_score_for_node(&normalize(collection_name), node).is_some()
}

/// Case-insensitive match key: lowercase, non-alphanumerics stripped, so
/// "invoice-report" and "invoice_report" compare equal.
fn normalize(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).flat_map(char::to_lowercase).collect()
}

/// Highest score `node` gets for `query` (already normalized) across its
/// declared collections and aliases, or `None` if nothing matches at all.
fn best_score_for_node(query: &str, node: &Node) -> Option<u32> {
    let mut best: Option<u32> = None;
    for collection in &node.collections {
        let collection = normalize(&collection.name);
        if let Some(score) = score_match(query, &collection) {
            best = Some(best.map_or(score, |b| b.max(score)));
        }
    }
    for (_, aliases) in &node.aliases {
        for alias in aliases {
            if query == normalize(alias) {
                best = Some(best.map_or(SCORE_ALIAS, |b| b.max(SCORE_ALIAS)));
            }
        }
    }
    best
}

/// Score a single collection name against the query per the four match
/// kinds: exact, singular/plural, substring. Alias scoring is handled by the
/// caller since it crosses into a different field (`Node::aliases`).
fn score_match(query: &str, collection: &str) -> Option<u32> {
    if query == collection {
        return Some(SCORE_EXACT);
    }
    if is_singular_plural_variant(query, collection) {
        return Some(SCORE_PLURAL);
    }
    if collection.contains(query) || query.contains(collection) {
        return Some(SCORE_SUBSTRING);
    }
    None
}

fn is_singular_plural_variant(a: &str, b: &str) -> bool {
    singularize(a) == singularize(b) && a != b
}

/// Minimal English singularization: strips a trailing "es" or "s". Good
/// enough for collection names, which are short nouns ("invoices",
/// "contracts"), not a general stemmer.
fn singularize(word: &str) -> String {
    if let Some(stripped) = word.strip_suffix("ies") {
        return format!("{stripped}y");
    }
    if let Some(stripped) = word.strip_suffix("es") {
        return stripped.to_string();
    }
    if let Some(stripped) = word.strip_suffix('s') {
        return stripped.to_string();
    }
    word.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{CollectionClaim, NodeStatus};
    use std::time::Duration;

    fn node(slug: &str, collections: &[&str]) -> Node {
        Node::new(
            slug,
            format!("http://{slug}.local"),
            collections.iter().map(|c| CollectionClaim::simple(*c)).collect(),
        )
    }

    #[tokio::test]
    async fn resolves_exact_match_over_substring_match() {
        let store = Arc::new(InMemoryNodeStore::new(vec![
            node("broad", &["invoice"]),
            node("narrow", &["invoices"]),
        ]));
        let registry = NodeRegistry::new(store, Duration::from_secs(30));

        let resolved = registry.resolve_collection("invoices").await.unwrap().unwrap();
        assert_eq!(resolved.slug, "narrow");
    }

    #[tokio::test]
    async fn resolves_singular_plural_variant() {
        let store = Arc::new(InMemoryNodeStore::new(vec![node("invoicing", &["invoice"])]));
        let registry = NodeRegistry::new(store, Duration::from_secs(30));

        let resolved = registry.resolve_collection("invoices").await.unwrap().unwrap();
        assert_eq!(resolved.slug, "invoicing");
    }

    #[tokio::test]
    async fn resolves_alias() {
        let mut n = node("billing", &["payments"]);
        n.aliases.insert("payments".to_string(), vec!["billing-records".to_string()]);
        let store = Arc::new(InMemoryNodeStore::new(vec![n]));
        let registry = NodeRegistry::new(store, Duration::from_secs(30));

        let resolved = registry.resolve_collection("billing-records").await.unwrap().unwrap();
        assert_eq!(resolved.slug, "billing");
    }

    #[tokio::test]
    async fn returns_none_when_nothing_matches() {
        let store = Arc::new(InMemoryNodeStore::new(vec![node("invoicing", &["invoice"])]));
        let registry = NodeRegistry::new(store, Duration::from_secs(30));

        assert!(registry.resolve_collection("weather").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn excludes_non_routable_nodes() {
        let mut n = node("disabled-node", &["invoice"]);
        n.status = NodeStatus::Disabled;
        let store = Arc::new(InMemoryNodeStore::new(vec![n]));
        let registry = NodeRegistry::new(store, Duration::from_secs(30));

        assert!(registry.resolve_collection("invoice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cache_is_refreshed_once_ttl_elapses() {
        let clock = ManualClock::new();
        let store = Arc::new(InMemoryNodeStore::new(vec![]));
        let registry = NodeRegistry::new(store.clone(), Duration::from_millis(100)).with_clock(clock.clone());

        assert!(registry.active_nodes().await.unwrap().is_empty());

        store.upsert(node("new-node", &["invoice"]));
        // Cache still warm: stale node list observed.
        assert!(registry.active_nodes().await.unwrap().is_empty());

        clock.advance(150);
        assert_eq!(registry.active_nodes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refresh_before_ttl_elapses() {
        let store = Arc::new(InMemoryNodeStore::new(vec![]));
        let registry = NodeRegistry::new(store.clone(), Duration::from_secs(30));

        assert!(registry.active_nodes().await.unwrap().is_empty());
        store.upsert(node("new-node", &["invoice"]));
        registry.invalidate();
        assert_eq!(registry.active_nodes().await.unwrap().len(), 1);
    }

    #[test]
    fn node_owns_collection_tolerates_singular_plural() {
        let n = node("invoicing", &["invoices"]);
        assert!(node_owns_collection(&n, "invoice"));
        assert!(!node_owns_collection(&n, "weather"));
    }

    #[test]
    fn node_owns_collection_strips_punctuation_before_matching() {
        let n = node("reports", &["invoice-report"]);
        assert!(node_owns_collection(&n, "invoice_report"));
    }
}
