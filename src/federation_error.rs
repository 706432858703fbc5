//! Domain error taxonomy for the federation layer (spec §7).
//!
//! Unlike [`crate::resilience::ResilienceError`], which is generic over the
//! wrapped operation's error type, `FederationError` is the concrete error
//! every public operation in this crate returns. It carries its own
//! `Resilience` variant so the forwarder can surface retry/circuit-breaker
//! failures without losing the rest of the taxonomy.

use crate::resilience::ResilienceError;
use std::time::Duration;

/// The seven error kinds from spec §7.
#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    /// Timeouts, 5xx, connection resets. Retried per-call; on exhaustion,
    /// triggers failover for chat/search, fails permanently for actions.
    #[error("transient error calling {node_slug}: {message}")]
    Transient { node_slug: String, message: String },

    /// 4xx other than 429, validation errors, unknown action. No retry, no
    /// failover.
    #[error("permanent error calling {node_slug} ({status_code}): {message}")]
    Permanent { node_slug: String, status_code: u16, message: String },

    /// 429. Treated like `Transient` but with a forced minimum delay from
    /// the `Retry-After` hint.
    #[error("rate limited by {node_slug}, retry after {retry_after:?}")]
    RateLimited { node_slug: String, retry_after: Duration },

    /// 401/403. Triggers one token refresh attempt; on second failure the
    /// node is marked unhealthy.
    #[error("auth failure calling {node_slug}: {message}")]
    Auth { node_slug: String, message: String },

    /// Short-circuited without network I/O because the node's breaker is open.
    #[error("circuit open for {node_slug} ({failure_count} failures, retry at {next_retry_in:?})")]
    BreakerOpen { node_slug: String, failure_count: usize, next_retry_in: Duration },

    /// RAG retrieved zero sources above threshold. Recovered locally by the
    /// caller (the engine is still invoked, without a context block).
    #[error("insufficient context: {0}")]
    InsufficientContext(String),

    /// Malformed chunker/embedder input, or any other caller precondition
    /// violation. Always surfaced.
    #[error("validation error: {0}")]
    Validation(String),

    /// Wraps a retry/circuit-breaker/timeout/bulkhead failure from the
    /// resilience stack without discarding domain context.
    #[error(transparent)]
    Resilience(#[from] Box<ResilienceError<FederationError>>),
}

impl FederationError {
    pub fn transient(node_slug: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient { node_slug: node_slug.into(), message: message.into() }
    }

    pub fn permanent(node_slug: impl Into<String>, status_code: u16, message: impl Into<String>) -> Self {
        Self::Permanent { node_slug: node_slug.into(), status_code, message: message.into() }
    }

    pub fn rate_limited(node_slug: impl Into<String>, retry_after: Duration) -> Self {
        Self::RateLimited { node_slug: node_slug.into(), retry_after }
    }

    pub fn auth(node_slug: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Auth { node_slug: node_slug.into(), message: message.into() }
    }

    pub fn breaker_open(node_slug: impl Into<String>, failure_count: usize, next_retry_in: Duration) -> Self {
        Self::BreakerOpen { node_slug: node_slug.into(), failure_count, next_retry_in }
    }

    pub fn resilience(err: ResilienceError<FederationError>) -> Self {
        Self::Resilience(Box::new(err))
    }

    /// Whether a retry (per-call backoff, not failover) is appropriate.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::RateLimited { .. })
    }

    /// Whether `forward_chat`/`forward_search` should attempt a sibling node
    /// owning the same collection. Never true for actions (callers enforce
    /// that at the call site, not here).
    pub fn allows_failover(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::RateLimited { .. } | Self::BreakerOpen { .. })
    }

    pub fn node_slug(&self) -> Option<&str> {
        match self {
            Self::Transient { node_slug, .. }
            | Self::Permanent { node_slug, .. }
            | Self::RateLimited { node_slug, .. }
            | Self::Auth { node_slug, .. }
            | Self::BreakerOpen { node_slug, .. } => Some(node_slug),
            _ => None,
        }
    }
}
