#![forbid(unsafe_code)]

//! # node-federation
//!
//! Routes chat, search, and action requests across a fleet of independently
//! deployed, specialized AI nodes. A gateway process embeds this crate to
//! decide which node should handle a request, forward it resiliently
//! (retry, circuit breaker, horizontal failover to a sibling node), and
//! assemble retrieved context for nodes that do RAG.
//!
//! This crate does not run a model, operate a vector database, or render a
//! UI — it owns the routing, forwarding, and retrieval-orchestration layer
//! that sits between them. See [`engine::Engine`] for the abstract AI driver
//! boundary and [`vector_index`] for the vector store wire client.
//!
//! ## Quick start
//!
//! ```no_run
//! use node_federation::{FederationConfig, InMemoryNodeStore, NodeRegistry, RoutingPolicy};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FederationConfig::from_env()?;
//! let store = Arc::new(InMemoryNodeStore::default());
//! let registry = Arc::new(NodeRegistry::new(store, config.node_list_cache_ttl));
//! let _policy = RoutingPolicy::new(registry);
//! # Ok(())
//! # }
//! ```
//!
//! ## Layout
//!
//! - [`resilience`]: retry, circuit breaker, bulkhead, timeout, and the
//!   stack that composes them around one async operation.
//! - [`models`]: the data model shared across every component (`Node`,
//!   `RoutingDigest`, `VectorRecord`, ...).
//! - [`config`]: layered configuration (env + file) for the whole crate.
//! - [`clock`] / [`sleeper`]: time abstractions so tests run instantly.
//! - [`telemetry`]: structured event emission for every policy decision.
//! - [`auth`]: HMAC-signed inter-node bearer tokens.
//! - [`http_client`]: the `reqwest`-backed client nodes are called through.
//! - [`node_registry`]: the active-node cache and collection→node index.
//! - [`breaker_registry`]: per-node circuit breakers, keyed by node slug.
//! - [`forwarder`]: retry + breaker + horizontal failover across nodes.
//! - [`digest`]: per-node and fleet-wide routing digests.
//! - [`routing_policy`]: fast-path lexical routing plus the LLM-driven path.
//! - [`chunker`]: token-budgeted content splitting for embedding and context.
//! - [`vector_index`]: the Qdrant-wire-compatible vector store client.
//! - [`rag`]: retrieval and context assembly for node chat requests.

mod auth;
mod breaker_registry;
mod chunker;
pub mod clock;
mod config;
mod digest;
mod engine;
pub mod error;
mod federation_error;
mod forwarder;
mod http_client;
mod models;
mod node_registry;
pub mod prelude;
mod rag;
pub mod resilience;
mod routing_policy;
pub mod sleeper;
pub mod telemetry;
mod vector_index;

pub use auth::{AuthError, NodeToken, TokenSigner};
pub use breaker_registry::BreakerRegistry;
pub use chunker::{Chunk, ChunkOutput, ChunkStrategy, Chunker};
pub use config::{ConfigError, FederationConfig};
pub use digest::{DigestCache, RoutingDigestBuilder, NO_NODES_AVAILABLE};
pub use engine::{Engine, EngineError, EngineMessage, JsonAnalysis};
pub use error::ResilienceError;
pub use federation_error::FederationError;
pub use forwarder::{ForwardOutcome, NodeForwarder};
pub use http_client::{HttpClient, HttpClientError};
pub use models::{
    ActionResult, AutonomousCollector, ChatOptions, ChatResult, CircuitBreakerState,
    CollectionClaim, CollectionDescriptor, Node, NodeHealth, NodeRequestLog, NodeStatus,
    NodeType, PING_FAILURE_THRESHOLD, RequestStatus, RequestType, RoutingAction, RoutingDigest,
    SearchResult, SessionState, VectorDistance, VectorRecord,
};
pub use node_registry::{node_owns_collection, InMemoryNodeStore, NodeRegistry, NodeStore};
pub use rag::{RagChatResult, RagRetriever, RetrievalOptions, RetrievedContext, RetrievedSource};
pub use routing_policy::{HistoryTurn, RoutingDecision, RoutingPolicy};
pub use vector_index::{VectorIndexError, VectorIndexManager};
