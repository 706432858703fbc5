//! Per-turn routing decisions (component C6): a fast lexical path for
//! obvious follow-ups, and an LLM-driven path for everything else, with
//! CONTINUE as the safe default whenever the engine path fails.

use crate::digest::NO_NODES_AVAILABLE;
use crate::engine::{Engine, EngineMessage};
use crate::models::{RoutingAction, SessionState};
use crate::node_registry::NodeRegistry;
use std::sync::Arc;

/// Recent turns handed to the LLM path so it has enough context to decide.
#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub action: RoutingAction,
    pub node_slug: Option<String>,
}

/// Fixed lexical matcher for the fast-path follow-up heuristic: numeric
/// selectors, affirmations, and pagination requests over lowercased,
/// trimmed input. Deliberately simple — a message that doesn't clearly
/// match one of these falls through to the LLM path rather than guessing.
fn is_follow_up(message: &str) -> bool {
    let trimmed = message.trim().to_lowercase();

    if trimmed.is_empty() {
        return false;
    }
    if trimmed.parse::<u32>().is_ok() {
        return true;
    }

    const ORDINAL_SELECTORS: &[&str] =
        &["the first one", "the second one", "the third one", "that one", "this one"];
    const AFFIRMATIONS: &[&str] = &["yes", "yep", "yeah", "ok", "okay", "sure", "continue"];
    const PAGINATION: &[&str] = &["next page", "next", "previous page", "previous", "more", "go back"];

    ORDINAL_SELECTORS.contains(&trimmed.as_str())
        || AFFIRMATIONS.contains(&trimmed.as_str())
        || PAGINATION.contains(&trimmed.as_str())
}

/// Parse the engine's routing directive, including the legacy aliases
/// (`RELATED` → `CONTINUE`, `DIFFERENT` → `LOCAL`).
fn parse_engine_directive(raw: &str) -> RoutingDecision {
    let trimmed = raw.trim();

    if trimmed.eq_ignore_ascii_case("CONTINUE") || trimmed.eq_ignore_ascii_case("RELATED") {
        return RoutingDecision { action: RoutingAction::Continue, node_slug: None };
    }
    if trimmed.eq_ignore_ascii_case("LOCAL") || trimmed.eq_ignore_ascii_case("DIFFERENT") {
        return RoutingDecision { action: RoutingAction::Local, node_slug: None };
    }
    if let Some(slug) = trimmed.strip_prefix("RE_ROUTE:").or_else(|| trimmed.strip_prefix("RE_ROUTE: ")) {
        return RoutingDecision { action: RoutingAction::ReRoute, node_slug: Some(slug.trim().to_string()) };
    }

    // Unrecognized output: treat like an engine exception, default CONTINUE.
    RoutingDecision { action: RoutingAction::Continue, node_slug: None }
}

/// Decides, per turn, whether to keep the session on its current node,
/// hand it to a different one, or answer locally.
pub struct RoutingPolicy {
    registry: Arc<NodeRegistry>,
}

impl RoutingPolicy {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    /// Decide the action for one turn. `routing_digest` is the full
    /// fleet-wide digest text (component C5's output) to prompt the engine
    /// with; `history` is the last W turns.
    pub async fn decide(
        &self,
        engine: &dyn Engine,
        session: &SessionState,
        user_message: &str,
        routing_digest: &str,
        history: &[HistoryTurn],
    ) -> RoutingDecision {
        if let Some(slug) = &session.current_node_slug {
            if is_follow_up(user_message) {
                return RoutingDecision { action: RoutingAction::Continue, node_slug: Some(slug.clone()) };
            }
        }

        if routing_digest == NO_NODES_AVAILABLE {
            return RoutingDecision { action: RoutingAction::Local, node_slug: None };
        }

        let decision = match self.ask_engine(engine, session, user_message, routing_digest, history).await {
            Some(raw) => parse_engine_directive(&raw),
            // Engine call failed: default to CONTINUE rather than losing context.
            None => RoutingDecision { action: RoutingAction::Continue, node_slug: None },
        };

        self.post_process(decision, session).await
    }

    async fn ask_engine(
        &self,
        engine: &dyn Engine,
        session: &SessionState,
        user_message: &str,
        routing_digest: &str,
        history: &[HistoryTurn],
    ) -> Option<String> {
        let mut messages = vec![EngineMessage {
            role: "system".to_string(),
            content: format!(
                "You are a routing controller. Available nodes:\n{routing_digest}\n\n\
                 Reply with exactly one of: CONTINUE, RE_ROUTE:<slug>, LOCAL."
            ),
        }];
        messages.extend(history.iter().map(|t| EngineMessage { role: t.role.clone(), content: t.content.clone() }));
        messages.push(EngineMessage { role: "user".to_string(), content: user_message.to_string() });

        let _ = session; // session id reserved for future per-session prompt context
        engine.complete(&messages).await.ok()
    }

    /// Validate a `RE_ROUTE`/`CONTINUE` decision's node slug against the
    /// registry, downgrading to `LOCAL` on a miss per spec §4.6.
    async fn post_process(&self, decision: RoutingDecision, session: &SessionState) -> RoutingDecision {
        match decision.action {
            RoutingAction::Continue => {
                let slug = decision.node_slug.or_else(|| session.current_node_slug.clone());
                match slug {
                    Some(slug) if self.node_exists(&slug).await => {
                        RoutingDecision { action: RoutingAction::Continue, node_slug: Some(slug) }
                    }
                    _ => RoutingDecision { action: RoutingAction::Local, node_slug: None },
                }
            }
            RoutingAction::ReRoute => match &decision.node_slug {
                Some(slug) if self.node_exists(slug).await => decision,
                _ => RoutingDecision { action: RoutingAction::Local, node_slug: None },
            },
            RoutingAction::Local => decision,
        }
    }

    async fn node_exists(&self, slug: &str) -> bool {
        match self.registry.active_nodes().await {
            Ok(nodes) => nodes.iter().any(|n| n.slug == slug),
            Err(_) => false,
        }
    }
}
