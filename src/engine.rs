//! Abstract boundary between the federation layer and whatever actually
//! talks to a model (out of scope for this crate — see the module docs).
//! Kept as a trait object so a gateway can plug in any concrete driver
//! without this crate depending on it, the same way a provider registry
//! type-erases its concrete backends behind one handle.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    #[error("engine returned malformed output: {0}")]
    MalformedOutput(String),
}

/// One turn of conversation passed to the engine. The federation layer
/// assembles these (optionally prefixed with a RAG context block) but never
/// inspects their content.
#[derive(Debug, Clone)]
pub struct EngineMessage {
    pub role: String,
    pub content: String,
}

/// The core AI driver contract. A gateway implements this once per model
/// backend (local, hosted, whatever) and hands an `Arc<dyn Engine>` to the
/// routing policy and RAG retriever.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Generate a reply given the conversation so far.
    async fn complete(&self, messages: &[EngineMessage]) -> Result<String, EngineError>;
}

/// Side-capability for engines that can also produce structured analysis —
/// used by the routing policy's LLM-driven path to ask "should we stay,
/// re-route, or go local" as a small JSON decision rather than free text.
/// Kept separate from [`Engine`] because not every backend supports
/// JSON-constrained output, and the fast-path lexical matcher never needs it.
#[async_trait]
pub trait JsonAnalysis: Send + Sync {
    async fn generate_json_analysis(&self, prompt: &str) -> Result<serde_json::Value, EngineError>;
}
