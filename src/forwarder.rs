//! Resilient node forwarding (component C4): sends a chat/search/action call
//! to its owning node through that node's circuit breaker with bounded
//! exponential-backoff retry, then fails the call over to a sibling node
//! that owns the same collection before giving up. Actions never fail over —
//! they are not idempotent, so a retried side effect could double-fire it.

use crate::breaker_registry::BreakerRegistry;
use crate::clock::{Clock, MonotonicClock};
use crate::federation_error::FederationError;
use crate::http_client::HttpClient;
use crate::models::{ActionResult, ChatOptions, ChatResult, Node, SearchResult};
use crate::node_registry::{node_owns_collection, NodeRegistry};
use crate::resilience::{Backoff, Jitter, RetryPolicy};
use crate::ResilienceError;
use crate::telemetry::{emit_best_effort, ForwarderEvent, NullSink, PolicyEvent, TelemetrySink};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Base delay for the exponential backoff between retries of the same node.
const BACKOFF_BASE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Chat,
    Search,
    Action,
}

impl CallKind {
    /// Default `max_retries`: 1 for chat/search, 0 for actions (spec §4.4).
    fn max_retries(self) -> usize {
        match self {
            CallKind::Chat | CallKind::Search => 1,
            CallKind::Action => 0,
        }
    }

    fn allows_failover(self) -> bool {
        !matches!(self, CallKind::Action)
    }
}

/// Result of a forwarded call, annotated with which node actually served it.
#[derive(Debug, Clone)]
pub struct ForwardOutcome<T> {
    pub result: T,
    pub served_by: String,
    pub failover_from: Option<String>,
}

/// RAII lease on a node's in-flight connection counter. Decremented on drop
/// so a retry, failover jump, or early return via `?` never leaks a count.
struct ConnectionLease {
    counter: Arc<AtomicUsize>,
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Routes calls to the node that owns them, retrying and failing over per
/// node-slug circuit breaker state.
pub struct NodeForwarder<Sink: TelemetrySink = NullSink> {
    registry: Arc<NodeRegistry>,
    breakers: BreakerRegistry,
    http: Arc<HttpClient>,
    sink: Sink,
    active_connections: Mutex<HashMap<String, Arc<AtomicUsize>>>,
    rate_limited_until: Mutex<HashMap<String, u64>>,
    clock: Arc<dyn Clock>,
}

impl NodeForwarder<NullSink> {
    pub fn new(registry: Arc<NodeRegistry>, breakers: BreakerRegistry, http: Arc<HttpClient>) -> Self {
        Self::with_sink(registry, breakers, http, NullSink)
    }
}

impl<Sink: TelemetrySink> NodeForwarder<Sink> {
    pub fn with_sink(registry: Arc<NodeRegistry>, breakers: BreakerRegistry, http: Arc<HttpClient>, sink: Sink) -> Self {
        Self {
            registry,
            breakers,
            http,
            sink,
            active_connections: Mutex::new(HashMap::new()),
            rate_limited_until: Mutex::new(HashMap::new()),
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    #[cfg(test)]
    fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Current in-flight call count for `node_slug`, for admin/diagnostic views.
    pub fn active_connections(&self, node_slug: &str) -> usize {
        self.active_connections
            .lock()
            .expect("forwarder connection map poisoned")
            .get(node_slug)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    fn lease(&self, node_slug: &str) -> ConnectionLease {
        let mut map = self.active_connections.lock().expect("forwarder connection map poisoned");
        let counter = map.entry(node_slug.to_string()).or_insert_with(|| Arc::new(AtomicUsize::new(0))).clone();
        counter.fetch_add(1, Ordering::AcqRel);
        ConnectionLease { counter }
    }

    fn is_rate_limited(&self, node_slug: &str) -> bool {
        let map = self.rate_limited_until.lock().expect("rate limit map poisoned");
        map.get(node_slug).is_some_and(|until| self.clock.now_millis() < *until)
    }

    fn mark_rate_limited(&self, node_slug: &str, retry_after: Duration) {
        let until = self.clock.now_millis() + retry_after.as_millis() as u64;
        self.rate_limited_until.lock().expect("rate limit map poisoned").insert(node_slug.to_string(), until);
    }

    pub async fn forward_chat(
        &self,
        node: &Node,
        message: &str,
        session_id: &str,
        options: &ChatOptions,
        collection: Option<&str>,
    ) -> Result<ForwardOutcome<ChatResult>, FederationError> {
        let body = json!({ "message": message, "session_id": session_id, "options": options });
        self.forward(node, collection, CallKind::Chat, "chat", body).await
    }

    pub async fn forward_search(
        &self,
        node: &Node,
        query: &str,
        collections: &[String],
        limit: usize,
    ) -> Result<ForwardOutcome<SearchResult>, FederationError> {
        let body = json!({ "query": query, "collections": collections, "limit": limit });
        self.forward(node, collections.first().map(String::as_str), CallKind::Search, "search", body).await
    }

    /// Actions never fail over — `collection` is `None` so step 4 is skipped
    /// unconditionally regardless of what's passed here.
    pub async fn forward_action(
        &self,
        node: &Node,
        action_id: &str,
        params: &Value,
    ) -> Result<ForwardOutcome<ActionResult>, FederationError> {
        let body = json!({ "action_id": action_id, "params": params });
        self.forward(node, None, CallKind::Action, "actions", body).await
    }

    /// The 5-step algorithm: breaker/health short-circuit, retrying call,
    /// success, horizontal failover (chat/search only), and final failure.
    async fn forward<T: DeserializeOwned>(
        &self,
        node: &Node,
        collection: Option<&str>,
        kind: CallKind,
        path: &str,
        body: Value,
    ) -> Result<ForwardOutcome<T>, FederationError> {
        let mut attempted = vec![node.clone()];

        match self.try_node::<T>(node, kind, path, &body).await {
            Ok(result) => return Ok(ForwardOutcome { result, served_by: node.slug.clone(), failover_from: None }),
            Err(err) if !kind.allows_failover() || !err.allows_failover() => return Err(err),
            Err(_) => {}
        }

        let Some(collection) = collection else {
            return Err(FederationError::transient(&node.slug, "no collection to fail over on"));
        };

        for alt in self.alternates_for(collection, &attempted).await {
            attempted.push(alt.clone());
            match self.try_node::<T>(&alt, kind, path, &body).await {
                Ok(result) => {
                    emit_best_effort(
                        &self.sink,
                        PolicyEvent::Forwarder(ForwarderEvent::FailedOver {
                            from_node: node.slug.clone(),
                            to_node: alt.slug.clone(),
                        }),
                    )
                    .await;
                    return Ok(ForwardOutcome {
                        result,
                        served_by: alt.slug.clone(),
                        failover_from: Some(node.slug.clone()),
                    });
                }
                Err(err) if !err.allows_failover() => return Err(err),
                Err(_) => continue,
            }
        }

        emit_best_effort(
            &self.sink,
            PolicyEvent::Forwarder(ForwarderEvent::AlternatesExhausted {
                node_slug: node.slug.clone(),
                attempted: attempted.len(),
            }),
        )
        .await;
        Err(FederationError::transient(&node.slug, format!("all {} alternates exhausted", attempted.len())))
    }

    /// Active nodes other than the ones already attempted that own
    /// `collection`, in registry order (registry priority).
    async fn alternates_for(&self, collection: &str, exclude: &[Node]) -> Vec<Node> {
        let Ok(nodes) = self.registry.active_nodes().await else {
            return Vec::new();
        };
        nodes
            .iter()
            .filter(|n| !exclude.iter().any(|e| e.id == n.id))
            .filter(|n| node_owns_collection(n, collection))
            .cloned()
            .collect()
    }

    /// Steps 1-3 against a single node: breaker/health/rate-limit
    /// short-circuit, then a retry policy wrapping that node's circuit
    /// breaker wrapping the actual HTTP call (composition order mirrors
    /// [`crate::resilience::ResilienceStack`]'s retry-then-breaker layering).
    async fn try_node<T: DeserializeOwned>(
        &self,
        node: &Node,
        kind: CallKind,
        path: &str,
        body: &Value,
    ) -> Result<T, FederationError> {
        if !node.is_routable() {
            return Err(FederationError::breaker_open(&node.slug, 0, Duration::from_secs(0)));
        }
        if self.is_rate_limited(&node.slug) {
            return Err(FederationError::rate_limited(&node.slug, Duration::from_secs(0)));
        }

        let breaker = self.breakers.get_or_create(&node.slug);
        if breaker.is_open() {
            emit_best_effort(
                &self.sink,
                PolicyEvent::Forwarder(ForwarderEvent::BreakerShortCircuit { node_slug: node.slug.clone() }),
            )
            .await;
        }

        let retry: RetryPolicy<FederationError> = RetryPolicy::builder()
            .max_attempts(kind.max_retries() + 1)
            .expect("max_attempts is always >= 1")
            .backoff(Backoff::exponential(BACKOFF_BASE))
            .with_jitter(Jitter::full())
            .should_retry(FederationError::is_retryable)
            .build();

        let _lease = self.lease(&node.slug);
        let url = format!("{}/{}", node.base_url.trim_end_matches('/'), path);
        let http = self.http.clone();
        let node_slug = node.slug.clone();
        let body = body.clone();

        let outcome = retry
            .execute(|| {
                let breaker = breaker.clone();
                let http = http.clone();
                let node_slug = node_slug.clone();
                let url = url.clone();
                let body = body.clone();
                async move {
                    breaker
                        .execute(|| {
                            let http = http.clone();
                            let node_slug = node_slug.clone();
                            let url = url.clone();
                            let body = body.clone();
                            async move { http.post_json::<Value, T>(&node_slug, &url, &body).await.map_err(ResilienceError::Inner) }
                        })
                        .await
                }
            })
            .await;

        match outcome {
            Ok(value) => Ok(value),
            Err(err) => {
                if let Some(retry_after) = rate_limit_hint(&err) {
                    self.mark_rate_limited(&node.slug, retry_after);
                }
                Err(FederationError::resilience(err))
            }
        }
    }
}

/// Dig a `retry_after` hint out of the terminal resilience error, if the
/// node's last observed failure was a rate limit.
fn rate_limit_hint(err: &ResilienceError<FederationError>) -> Option<Duration> {
    let last = match err {
        ResilienceError::Inner(e) => Some(e),
        ResilienceError::RetryExhausted { failures, .. } => failures.last(),
        _ => None,
    }?;
    match last {
        FederationError::RateLimited { retry_after, .. } => Some(*retry_after),
        _ => None,
    }
}
