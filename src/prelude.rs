//! Convenient re-exports for the common entry points into this crate.
pub use crate::{
    breaker_registry::BreakerRegistry,
    chunker::{Chunk, ChunkOutput, ChunkStrategy, Chunker},
    config::{ConfigError, FederationConfig},
    digest::{DigestCache, RoutingDigestBuilder, NO_NODES_AVAILABLE},
    engine::{Engine, EngineError, EngineMessage, JsonAnalysis},
    federation_error::FederationError,
    forwarder::{ForwardOutcome, NodeForwarder},
    http_client::{HttpClient, HttpClientError},
    models::{
        ActionResult, ChatOptions, ChatResult, CollectionClaim, Node, NodeStatus, RoutingAction,
        RoutingDigest, SearchResult, SessionState,
    },
    node_registry::{node_owns_collection, InMemoryNodeStore, NodeRegistry, NodeStore},
    rag::{RagChatResult, RagRetriever, RetrievalOptions, RetrievedContext, RetrievedSource},
    resilience::{Backoff, Jitter, ResilienceStack},
    routing_policy::{HistoryTurn, RoutingDecision, RoutingPolicy},
    telemetry::{LogSink, MemorySink, NullSink, PolicyEvent, TelemetrySink},
    vector_index::{VectorIndexError, VectorIndexManager},
    ResilienceError,
};
