//! RAG retrieval and context assembly (component C9): embeds a query,
//! searches the vector index, resolves hits back to domain records, and
//! formats them into the context block a node's engine call is prefixed
//! with.

use crate::engine::{Engine, EngineMessage};
use crate::federation_error::FederationError;
use crate::vector_index::{SearchHit, VectorIndexManager};
use serde_json::Value;

/// A source folded into a RAG context block, paired with its similarity
/// score for the optional relevance annotation.
#[derive(Debug, Clone)]
pub struct RetrievedSource {
    pub content: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalOptions {
    pub limit: Option<usize>,
    pub min_score: Option<f32>,
    pub filter: Option<Value>,
    /// Append `(Relevance: XX.X%)` to each formatted source.
    pub annotate_relevance: bool,
}

/// Everything the RAG step produced for one query: the raw sources (for
/// logging/ranking) and the pre-formatted context block ready to prefix an
/// engine prompt with.
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub sources: Vec<RetrievedSource>,
    pub context_block: String,
}

impl RetrievedContext {
    fn empty() -> Self {
        Self { sources: Vec::new(), context_block: String::new() }
    }
}

/// Outcome of [`RagRetriever::chat`] — the engine's reply plus whatever
/// sources it was grounded on (empty when recovered via the
/// no-relevant-sources fallback).
#[derive(Debug, Clone)]
pub struct RagChatResult {
    pub message: String,
    pub sources: Vec<RetrievedSource>,
    /// Set when retrieval found nothing above threshold and the engine was
    /// called without a context block instead.
    pub used_fallback: bool,
}

/// Embeds queries and retrieves/formats RAG context against a collection.
/// The embedding step is delegated to a closure rather than a trait so
/// callers can pass anything from a local model to a remote embedding API
/// without this crate depending on either.
pub struct RagRetriever {
    index: VectorIndexManager,
    default_limit: usize,
    default_min_score: f32,
}

impl RagRetriever {
    pub fn new(index: VectorIndexManager, default_limit: usize, default_min_score: f32) -> Self {
        Self { index, default_limit, default_min_score }
    }

    /// Retrieve sources for `query_embedding` against `collection`, per
    /// spec §4.9 steps 2-5 (embedding itself is the caller's job — see
    /// [`crate::engine::Engine`] module docs for why it isn't a crate
    /// dependency here).
    pub async fn retrieve(
        &self,
        collection: &str,
        query_embedding: &[f32],
        options: &RetrievalOptions,
    ) -> Result<RetrievedContext, FederationError> {
        let limit = options.limit.unwrap_or(self.default_limit);
        let threshold = options.min_score.unwrap_or(self.default_min_score);

        let hits = self
            .index
            .search(collection, query_embedding, limit, Some(threshold), options.filter.clone())
            .await
            .map_err(|e| FederationError::transient(collection, e.to_string()))?;

        if hits.is_empty() {
            return Err(FederationError::InsufficientContext(format!(
                "no sources above threshold {threshold} in collection {collection}"
            )));
        }

        let sources: Vec<RetrievedSource> = hits.into_iter().map(Self::source_from_hit).collect();
        let context_block = format_context_block(&sources, options.annotate_relevance);

        Ok(RetrievedContext { sources, context_block })
    }

    /// Retrieve then call `engine`, per spec §4.9's `chat(...)`. Zero sources
    /// above threshold is recovered locally rather than surfaced: the engine
    /// is still called, just without a context block, and the reply is
    /// annotated to say no relevant sources were found.
    pub async fn chat(
        &self,
        collection: &str,
        query_embedding: &[f32],
        system_prompt: &str,
        query: &str,
        engine: &dyn Engine,
        options: &RetrievalOptions,
    ) -> Result<RagChatResult, FederationError> {
        let context_result = self.retrieve(collection, query_embedding, options).await;
        Self::respond(context_result, collection, system_prompt, query, engine).await
    }

    /// The part of [`Self::chat`] after retrieval — split out so the
    /// no-relevant-sources fallback is testable without a live vector store.
    async fn respond(
        context_result: Result<RetrievedContext, FederationError>,
        collection: &str,
        system_prompt: &str,
        query: &str,
        engine: &dyn Engine,
    ) -> Result<RagChatResult, FederationError> {
        let (context, used_fallback) = match context_result {
            Ok(context) => (context, false),
            Err(FederationError::InsufficientContext(_)) => (RetrievedContext::empty(), true),
            Err(other) => return Err(other),
        };

        let prompt = Self::build_chat_prompt(system_prompt, &context.context_block, query);
        let messages = [EngineMessage { role: "user".to_string(), content: prompt }];
        let reply = engine
            .complete(&messages)
            .await
            .map_err(|e| FederationError::transient(collection, e.to_string()))?;

        let message = if used_fallback { format!("{reply}\n\n(no relevant sources)") } else { reply };

        Ok(RagChatResult { message, sources: context.sources, used_fallback })
    }

    fn source_from_hit(hit: SearchHit) -> RetrievedSource {
        let content = hit
            .metadata
            .get("content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default();
        RetrievedSource { content, score: hit.score }
    }

    /// Build the full prompt an engine call should receive: the system
    /// prompt, the formatted context block, then the user's question.
    pub fn build_chat_prompt(system_prompt: &str, context_block: &str, query: &str) -> String {
        if context_block.is_empty() {
            format!("{system_prompt}\n\nUSER QUESTION:\n{query}")
        } else {
            format!("{system_prompt}\n\nCONTEXT INFORMATION:\n{context_block}\n\nUSER QUESTION:\n{query}")
        }
    }
}

/// Format sources as `"[Source N]\n<content>"` joined by `"\n\n---\n\n"`,
/// per spec §4.9 step 5.
fn format_context_block(sources: &[RetrievedSource], annotate_relevance: bool) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            if annotate_relevance {
                format!("[Source {}]\n{} (Relevance: {:.1}%)", i + 1, source.content, source.score * 100.0)
            } else {
                format!("[Source {}]\n{}", i + 1, source.content)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use async_trait::async_trait;

    struct StubEngine(String);

    #[async_trait]
    impl Engine for StubEngine {
        async fn complete(&self, _messages: &[EngineMessage]) -> Result<String, EngineError> {
            Ok(self.0.clone())
        }
    }

    fn sources() -> Vec<RetrievedSource> {
        vec![
            RetrievedSource { content: "first source body".to_string(), score: 0.91 },
            RetrievedSource { content: "second source body".to_string(), score: 0.77 },
        ]
    }

    #[test]
    fn format_context_block_joins_sources_with_the_spec_separator() {
        let block = format_context_block(&sources(), false);
        assert_eq!(
            block,
            "[Source 1]\nfirst source body\n\n---\n\n[Source 2]\nsecond source body"
        );
    }

    #[test]
    fn format_context_block_annotates_relevance_when_requested() {
        let block = format_context_block(&sources(), true);
        assert!(block.contains("(Relevance: 91.0%)"));
        assert!(block.contains("(Relevance: 77.0%)"));
    }

    #[test]
    fn build_chat_prompt_includes_context_section_when_present() {
        let prompt = RagRetriever::build_chat_prompt("You are helpful.", "[Source 1]\nfoo", "What is foo?");
        assert!(prompt.contains("CONTEXT INFORMATION:"));
        assert!(prompt.contains("USER QUESTION:\nWhat is foo?"));
    }

    #[test]
    fn build_chat_prompt_omits_context_section_when_empty() {
        let prompt = RagRetriever::build_chat_prompt("You are helpful.", "", "What is foo?");
        assert!(!prompt.contains("CONTEXT INFORMATION:"));
    }

    #[tokio::test]
    async fn zero_sources_above_threshold_recovers_by_calling_the_engine_without_context() {
        let no_sources = Err(FederationError::InsufficientContext("no sources above threshold".to_string()));
        let engine = StubEngine("invoice 1042 is still open.".to_string());

        let result = RagRetriever::respond(no_sources, "invoices", "You are helpful.", "status?", &engine)
            .await
            .unwrap();

        assert!(result.used_fallback);
        assert!(result.sources.is_empty());
        assert!(result.message.contains("invoice 1042 is still open."));
        assert!(result.message.contains("no relevant sources"));
    }

    #[tokio::test]
    async fn retrieved_sources_are_passed_through_untouched() {
        let context = Ok(RetrievedContext {
            sources: sources(),
            context_block: format_context_block(&sources(), false),
        });
        let engine = StubEngine("here's what I found.".to_string());

        let result = RagRetriever::respond(context, "invoices", "You are helpful.", "status?", &engine)
            .await
            .unwrap();

        assert!(!result.used_fallback);
        assert_eq!(result.sources.len(), 2);
        assert!(!result.message.contains("no relevant sources"));
    }

    #[tokio::test]
    async fn other_errors_are_not_treated_as_the_no_sources_fallback() {
        let err = Err(FederationError::transient("invoicing", "connection reset"));
        let engine = StubEngine("unused".to_string());

        let result = RagRetriever::respond(err, "invoices", "You are helpful.", "status?", &engine).await;
        assert!(result.is_err());
    }
}
