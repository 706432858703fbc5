//! Shared data model: nodes, vector records, routing digests, and the
//! request/session bookkeeping that every component reads or writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Kind of specialized node. Determines which collections it is eligible to
/// own and which prompt templates the engine applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    General,
    Domain,
    Archival,
}

/// Health as observed by the forwarder, independent of the circuit breaker's
/// own open/closed/half-open state — a node can be `Healthy` with an open
/// breaker (cooling down) or `Unreachable` with a closed one (first failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeHealth {
    Healthy,
    Degraded,
    Unreachable,
}

/// Administrative status, set by an operator rather than derived from traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Active,
    Draining,
    Disabled,
}

/// Consecutive failed pings past which a node is no longer routable, even
/// if its administrative status is still `active`.
pub const PING_FAILURE_THRESHOLD: u32 = 3;

/// A remote AI node registered with the federation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    pub slug: String,
    pub display_name: String,
    pub base_url: String,
    pub node_type: NodeType,
    pub status: NodeStatus,
    pub health: NodeHealth,
    pub api_key: String,
    pub api_key_expires_at: Option<DateTime<Utc>>,
    pub refresh_token: String,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    /// Health profile, updated by whatever pings the node out of band.
    pub last_ping_at: Option<DateTime<Utc>>,
    pub ping_failures: u32,
    pub avg_response_time_ms: Option<u32>,
    /// Snapshot of in-flight calls, synced from [`crate::forwarder::NodeForwarder`]'s
    /// live lease counter for persistence/diagnostics; the forwarder's own
    /// counter is the authoritative value for routing decisions.
    pub active_connections: u32,
    /// Positive integer used to break ties between equally-scored
    /// collection matches in favor of the node with more capacity.
    pub weight: u32,
    /// Collections this node owns, for the plural/singular/alias/substring
    /// scoring in the node registry.
    pub collections: Vec<CollectionClaim>,
    /// Collection name → alternate names (plurals, synonyms) it also matches.
    #[serde(default)]
    pub aliases: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub autonomous_collectors: Vec<AutonomousCollector>,
    #[serde(default)]
    pub workflows: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub data_types: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub version: String,
    pub registered_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl Node {
    /// Convenience constructor for registering a node with every capability
    /// field left empty/inert; callers fill in what their deployment needs.
    pub fn new(slug: impl Into<String>, base_url: impl Into<String>, collections: Vec<CollectionClaim>) -> Self {
        let slug = slug.into();
        Self {
            id: Uuid::new_v4(),
            display_name: slug.clone(),
            slug,
            base_url: base_url.into(),
            node_type: NodeType::Domain,
            status: NodeStatus::Active,
            health: NodeHealth::Healthy,
            api_key: String::new(),
            api_key_expires_at: None,
            refresh_token: String::new(),
            refresh_token_expires_at: None,
            last_ping_at: None,
            ping_failures: 0,
            avg_response_time_ms: None,
            active_connections: 0,
            weight: 1,
            collections,
            aliases: HashMap::new(),
            autonomous_collectors: Vec::new(),
            workflows: Vec::new(),
            domains: Vec::new(),
            data_types: Vec::new(),
            keywords: Vec::new(),
            version: "1".to_string(),
            registered_at: Utc::now(),
            last_seen_at: None,
        }
    }

    pub fn is_routable(&self) -> bool {
        matches!(self.status, NodeStatus::Active)
            && self.ping_failures < PING_FAILURE_THRESHOLD
            && !matches!(self.health, NodeHealth::Unreachable)
    }
}

/// Observed circuit breaker state for a single node, as surfaced by
/// [`crate::breaker_registry::BreakerRegistry`] for diagnostics/admin views.
/// The breaker itself lives in [`crate::resilience::circuit_breaker`]; this
/// is the read-only snapshot shape exposed across the crate boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub node_slug_hash: u64,
    pub is_open: bool,
    pub is_half_open: bool,
    pub failure_count: usize,
}

/// Kind of request being forwarded, used for error-handling branch points
/// (only chat/search attempt horizontal failover; actions never do).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Chat,
    Search,
    Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Succeeded,
    FailedOver,
    Failed,
}

/// One forwarded request, persisted for observability and for the routing
/// digest's recent-activity summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRequestLog {
    pub id: Uuid,
    pub node_slug: String,
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub latency: Duration,
    pub failed_over_from: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A single embedded chunk stored in the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: Uuid,
    pub collection: String,
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub payload: HashMap<String, serde_json::Value>,
}

/// A vector collection owned by exactly one node at a time (see
/// [`CollectionClaim`]), with the index metadata needed to recreate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    pub name: String,
    pub vector_size: usize,
    pub distance: VectorDistance,
    pub owner_node_slug: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorDistance {
    Cosine,
    Dot,
    Euclid,
}

/// One collection a node owns — an element of [`Node::collections`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionClaim {
    pub name: String,
    pub class: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
}

impl CollectionClaim {
    /// A claim with only a name, for call sites that don't track class or
    /// capability metadata.
    pub fn simple(name: impl Into<String>) -> Self {
        Self { name: name.into(), class: "default".to_string(), description: None, capabilities: None }
    }
}

/// A node's self-directed ingestion of content into its own collections
/// (crawling, polling a feed) — an element of [`Node::autonomous_collectors`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomousCollector {
    pub name: String,
    pub goal: String,
    pub collection: String,
    pub poll_interval: Duration,
    pub enabled: bool,
}

/// A node's self-reported summary used by the routing policy and by the
/// fleet-wide digest: what it's good at and how busy it currently is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDigest {
    pub node_slug: String,
    pub summary: String,
    pub collections: Vec<String>,
    pub active_sessions: usize,
    pub generated_at: DateTime<Utc>,
}

/// Decision made by the routing policy for one turn of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingAction {
    /// Keep talking to the node already handling this session.
    Continue,
    /// Hand the session to a different node.
    ReRoute,
    /// Answer directly without forwarding (no node is a good fit).
    Local,
}

/// Per-session routing state: which node currently owns the conversation,
/// and how many consecutive turns it has owned it (used by the fast-path
/// follow-up heuristic before falling back to the LLM-driven path).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Uuid,
    pub current_node_slug: Option<String>,
    pub turns_on_current_node: u32,
    pub last_routed_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            current_node_slug: None,
            turns_on_current_node: 0,
            last_routed_at: Utc::now(),
        }
    }
}

/// Options accepted by a chat forward; mirrors the subset of engine
/// parameters the federation layer is allowed to see and pass through.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub use_rag: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResult {
    pub node_slug: String,
    pub message: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub node_slug: String,
    pub matches: Vec<VectorRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub node_slug: String,
    pub action: String,
    pub output: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_node_is_routable_by_default() {
        let node = Node::new("invoicing", "http://invoicing.local", vec![CollectionClaim::simple("invoices")]);
        assert!(node.is_routable());
        assert_eq!(node.weight, 1);
        assert_eq!(node.collections[0].name, "invoices");
    }

    #[test]
    fn node_with_too_many_ping_failures_is_not_routable() {
        let mut node = Node::new("invoicing", "http://invoicing.local", vec![]);
        node.ping_failures = PING_FAILURE_THRESHOLD;
        assert!(!node.is_routable());
    }

    #[test]
    fn autonomous_collector_describes_a_polling_ingestion_job() {
        let collector = AutonomousCollector {
            name: "invoice-crawler".to_string(),
            goal: "keep invoice embeddings current".to_string(),
            collection: "invoices".to_string(),
            poll_interval: Duration::from_secs(300),
            enabled: true,
        };
        assert!(collector.enabled);
    }
}
