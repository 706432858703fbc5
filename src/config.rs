//! Layered configuration for the federation layer: environment variables
//! with documented defaults, the same way the surrounding platform's other
//! services read their own settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidValue { var: &'static str, value: String, reason: String },
}

/// Resolved configuration for one federation gateway instance. Constructed
/// once at startup via [`FederationConfig::from_env`] and shared (cheaply
/// cloned, every field is `Clone`) across the registry, forwarder, and
/// routing policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Shared secret used to sign and verify inter-node bearer tokens.
    pub auth_secret: String,
    /// How long a minted node token remains valid.
    pub token_ttl: Duration,

    /// Base URL of the vector store (Qdrant-wire-compatible).
    pub vector_store_url: String,

    /// Per-call HTTP timeout for node requests.
    pub node_call_timeout: Duration,
    /// Max attempts for a single node call before failing over.
    pub node_retry_attempts: usize,

    /// Circuit breaker failure threshold before a node's breaker opens.
    pub breaker_failure_threshold: usize,
    /// Base cooldown before a half-open probe is allowed.
    pub breaker_recovery_timeout: Duration,
    /// Concurrent probes allowed while a breaker is half-open.
    pub breaker_half_open_max_calls: usize,

    /// How long the active-node list cache is trusted before refetching.
    pub node_list_cache_ttl: Duration,
    /// How long a per-node routing digest is trusted before refetching.
    pub digest_cache_ttl: Duration,

    /// Token budget a chunk must fit inside (before the 0.9 safety factor
    /// and 1.3 chars-per-token expansion described in the chunker).
    pub chunk_token_limit: usize,
    /// Overlap, in characters, between consecutive chunks of a split field.
    pub chunk_overlap: usize,

    /// Minimum similarity score for a RAG match to be included as context.
    pub rag_score_threshold: f32,
    /// Max sources assembled into one context block.
    pub rag_max_sources: usize,

    /// Which telemetry sink to wire up by default (`"log"`, `"memory"`,
    /// `"null"`). Gateways that need fan-out construct their own
    /// [`crate::telemetry::MulticastSink`] instead of relying on this.
    pub telemetry_sink: String,
}

impl FederationConfig {
    /// Read configuration from environment variables, falling back to the
    /// defaults below for anything unset. `NODE_FEDERATION_AUTH_SECRET` and
    /// `NODE_FEDERATION_VECTOR_STORE_URL` have no default and must be set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let auth_secret = require_var("NODE_FEDERATION_AUTH_SECRET")?;
        let vector_store_url = require_var("NODE_FEDERATION_VECTOR_STORE_URL")?;

        Ok(Self {
            auth_secret,
            vector_store_url,
            token_ttl: duration_secs_var("NODE_FEDERATION_TOKEN_TTL_SECS", 3600)?,
            node_call_timeout: duration_secs_var("NODE_FEDERATION_NODE_CALL_TIMEOUT_SECS", 30)?,
            node_retry_attempts: usize_var("NODE_FEDERATION_NODE_RETRY_ATTEMPTS", 3)?,
            breaker_failure_threshold: usize_var("NODE_FEDERATION_BREAKER_FAILURE_THRESHOLD", 5)?,
            breaker_recovery_timeout: duration_secs_var(
                "NODE_FEDERATION_BREAKER_RECOVERY_TIMEOUT_SECS",
                60,
            )?,
            breaker_half_open_max_calls: usize_var(
                "NODE_FEDERATION_BREAKER_HALF_OPEN_MAX_CALLS",
                1,
            )?,
            node_list_cache_ttl: duration_secs_var("NODE_FEDERATION_NODE_LIST_CACHE_TTL_SECS", 30)?,
            digest_cache_ttl: duration_secs_var("NODE_FEDERATION_DIGEST_CACHE_TTL_SECS", 300)?,
            chunk_token_limit: usize_var("NODE_FEDERATION_CHUNK_TOKEN_LIMIT", 8192)?,
            chunk_overlap: usize_var("NODE_FEDERATION_CHUNK_OVERLAP", 200)?,
            rag_score_threshold: f32_var("NODE_FEDERATION_RAG_SCORE_THRESHOLD", 0.5)?,
            rag_max_sources: usize_var("NODE_FEDERATION_RAG_MAX_SOURCES", 5)?,
            telemetry_sink: std::env::var("NODE_FEDERATION_TELEMETRY_SINK")
                .unwrap_or_else(|_| "log".to_string()),
        })
    }

    /// Build a config suitable for tests: all the same defaults `from_env`
    /// would use, without requiring environment variables to be set.
    pub fn for_testing() -> Self {
        Self {
            auth_secret: "test-secret".to_string(),
            token_ttl: Duration::from_secs(3600),
            vector_store_url: "http://localhost:6333".to_string(),
            node_call_timeout: Duration::from_secs(30),
            node_retry_attempts: 3,
            breaker_failure_threshold: 5,
            breaker_recovery_timeout: Duration::from_secs(60),
            breaker_half_open_max_calls: 1,
            node_list_cache_ttl: Duration::from_secs(30),
            digest_cache_ttl: Duration::from_secs(300),
            chunk_token_limit: 8192,
            chunk_overlap: 200,
            rag_score_threshold: 0.5,
            rag_max_sources: 5,
            telemetry_sink: "memory".to_string(),
        }
    }
}

fn require_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

fn usize_var(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            var: name,
            value,
            reason: "expected an unsigned integer".to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn f32_var(name: &'static str, default: f32) -> Result<f32, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            var: name,
            value,
            reason: "expected a float".to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn duration_secs_var(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    usize_var(name, default_secs as usize).map(|secs| Duration::from_secs(secs as u64))
}
