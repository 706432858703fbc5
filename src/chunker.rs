//! Content chunking and token budgeting (component C7): splits or truncates
//! prose at sentence boundaries so it fits under a per-model token cap
//! before embedding or being folded into a RAG context block.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Chars-per-token used to translate a token budget into a character budget.
/// English prose averages close to this; it's a budgeting heuristic, not a
/// real tokenizer, so [`estimate_tokens`] and chunk sizing both use it.
const CHARS_PER_TOKEN: f64 = 1.3;
/// Safety factor applied to the token limit before converting to chars, so
/// a chunk estimated at the cap doesn't actually overrun it once re-tokenized.
const SAFETY_FACTOR: f64 = 0.9;
/// Fields larger than this are prechunked with the 70/30 head-tail strategy
/// before normal split/truncate runs on each half.
const MAX_FIELD_SIZE: usize = 100_000;
/// Default overlap, in characters, between consecutive Split-strategy chunks.
pub const DEFAULT_OVERLAP: usize = 200;

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("chunk_size must be positive, got {0}")]
    NonPositiveChunkSize(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    /// Walk the text emitting successive overlapping windows.
    Split,
    /// Return a single sentence-boundary-trimmed prefix.
    Truncate,
}

/// Result of dispatching on a caller-configured [`ChunkStrategy`] rather
/// than calling [`Chunker::split`] or [`Chunker::truncate`] directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutput {
    Split(Vec<Chunk>),
    Truncate(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub content: String,
}

/// Estimate a token count for `s` using the crate-wide chars-per-token ratio.
pub fn estimate_tokens(s: &str) -> usize {
    (s.len() as f64 / CHARS_PER_TOKEN).ceil() as usize
}

fn sentence_boundary_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.\n]").expect("static regex is valid"))
}

/// Splits and truncates content under a token budget, per spec §4.7.
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Build a chunker for a `token_limit`-token model, with the default
    /// 0.9 safety factor and 1.3 chars-per-token conversion baked in.
    pub fn new(token_limit: usize, overlap: usize) -> Result<Self, ChunkError> {
        let chunk_size = ((token_limit as f64) * SAFETY_FACTOR * CHARS_PER_TOKEN) as usize;
        if chunk_size == 0 {
            return Err(ChunkError::NonPositiveChunkSize(chunk_size));
        }
        Ok(Self { chunk_size, overlap })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Dispatch to [`Self::split`] or [`Self::truncate`] by a
    /// caller-configured strategy, for ingestion pipelines that only carry
    /// a `vectorization.strategy` config value rather than a call-site choice.
    pub fn run(&self, strategy: ChunkStrategy, content: &str) -> ChunkOutput {
        match strategy {
            ChunkStrategy::Split => ChunkOutput::Split(self.split(content)),
            ChunkStrategy::Truncate => ChunkOutput::Truncate(self.truncate(content)),
        }
    }

    /// Split `content` into overlapping windows of roughly `chunk_size`
    /// chars each, preferring a sentence/line boundary near the end of a
    /// window over cutting mid-sentence.
    pub fn split(&self, content: &str) -> Vec<Chunk> {
        if content.len() > MAX_FIELD_SIZE {
            return self.split_prechunked(content);
        }
        self.split_within_budget(content)
    }

    /// Return a single prefix of `content` up to `chunk_size` chars,
    /// preferring a sentence boundary in the last 10% of the window.
    pub fn truncate(&self, content: &str) -> String {
        if content.len() <= self.chunk_size {
            return content.to_string();
        }
        let window = &content[..self.chunk_size];
        let tail_start = self.chunk_size - (self.chunk_size / 10).max(1);
        cut_at_boundary(window, tail_start).to_string()
    }

    /// 70/30 head-tail prechunking for fields over [`MAX_FIELD_SIZE`]: keep
    /// the first 70% and last 30% of the chunk budget (not of the field
    /// itself — `content` can be arbitrarily larger), each trimmed to a
    /// sentence boundary, joined by a space, then split normally.
    fn split_prechunked(&self, content: &str) -> Vec<Chunk> {
        let head_budget = (self.chunk_size as f64 * 0.7) as usize;
        let tail_budget = self.chunk_size - head_budget;

        let head_end = head_budget.min(content.len());
        let head = cut_at_boundary(&content[..head_end], (head_end * 9) / 10);

        let tail_start = content.len().saturating_sub(tail_budget);
        let tail_raw = &content[tail_start..];
        let tail_cut = (tail_raw.len() / 10).max(1);
        let tail = cut_at_boundary(tail_raw, tail_raw.len().saturating_sub(tail_cut));

        let combined = format!("{head} {tail}");
        self.split_within_budget(&combined)
    }

    fn split_within_budget(&self, content: &str) -> Vec<Chunk> {
        if content.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut index = 0usize;

        while start < content.len() {
            let remaining = &content[start..];
            if remaining.len() <= self.chunk_size {
                chunks.push(Chunk { index, content: remaining.to_string() });
                break;
            }

            let window = &remaining[..self.chunk_size];
            let tail_start = self.chunk_size - (self.chunk_size / 5).max(1);
            let cut = cut_at_boundary(window, tail_start);
            let cut_len = cut.len();

            chunks.push(Chunk { index, content: cut.to_string() });
            index += 1;

            let advance = cut_len.saturating_sub(self.overlap).max(1);
            start += advance;
        }

        chunks
    }
}

/// Within `window`, if a `.` or newline appears at or after byte offset
/// `tail_start`, cut right after it; otherwise cut at the exact window end.
/// Byte offsets are walked on char boundaries so multi-byte UTF-8 text is
/// never split mid-codepoint.
fn cut_at_boundary(window: &str, tail_start: usize) -> &str {
    let search_region = if tail_start < window.len() { &window[tail_start..] } else { "" };
    if let Some(m) = sentence_boundary_regex().find(search_region) {
        let cut = tail_start + m.end();
        if window.is_char_boundary(cut) {
            return &window[..cut];
        }
    }
    window
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_matches_the_chars_per_token_ratio() {
        let s = "a".repeat(130);
        assert_eq!(estimate_tokens(&s), 100);
    }

    #[test]
    fn chunk_size_applies_safety_factor_and_chars_per_token() {
        let chunker = Chunker::new(1000, DEFAULT_OVERLAP).unwrap();
        // 1000 * 0.9 * 1.3 = 1170
        assert_eq!(chunker.chunk_size(), 1170);
    }

    #[test]
    fn split_of_short_content_returns_one_chunk() {
        let chunker = Chunker::new(1000, DEFAULT_OVERLAP).unwrap();
        let content = "short content.";
        let chunks = chunker.split(content);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, content);
    }

    #[test]
    fn split_emits_multiple_overlapping_chunks_for_long_content() {
        // 20_000 chars, limit 8_000 tokens -> chunk_size well above 20_000 is
        // avoided by using a small token_limit so the char budget is small.
        let chunker = Chunker::new(2000, 200).unwrap(); // chunk_size ~= 2340
        let content = "word ".repeat(4000); // 20_000 chars
        let chunks = chunker.split(&content);

        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.content.len() <= chunker.chunk_size());
        }
    }

    #[test]
    fn split_chunks_overlap_with_the_prior_chunk_tail() {
        let chunker = Chunker::new(2000, 200).unwrap();
        let content = "word ".repeat(4000);
        let chunks = chunker.split(&content);

        assert!(chunks.len() >= 2);
        let first_tail = &chunks[0].content[chunks[0].content.len().saturating_sub(50)..];
        assert!(chunks[1].content.contains(&first_tail[..10.min(first_tail.len())]));
    }

    #[test]
    fn truncate_short_content_is_unchanged() {
        let chunker = Chunker::new(1000, DEFAULT_OVERLAP).unwrap();
        let content = "a short sentence.";
        assert_eq!(chunker.truncate(content), content);
    }

    #[test]
    fn truncate_prefers_a_sentence_boundary_near_the_cutoff() {
        let chunker = Chunker::new(10, DEFAULT_OVERLAP).unwrap(); // chunk_size = 11
        let content = "Hi there. This keeps going well past the cutoff point with more words.";
        let truncated = chunker.truncate(content);
        assert!(truncated.len() <= chunker.chunk_size());
        assert!(content.starts_with(&truncated));
    }

    #[test]
    fn large_fields_are_prechunked_with_head_and_tail() {
        let chunker = Chunker::new(4000, 200).unwrap(); // chunk_size ~= 4680
        let content = format!("{}{}", "HEAD ".repeat(30_000), "TAIL ".repeat(5));
        let chunks = chunker.split(&content);

        assert!(!chunks.is_empty());
        assert!(chunks[0].content.contains("HEAD"));
    }

    #[test]
    fn zero_effective_chunk_size_is_rejected() {
        // A token_limit small enough that the char budget rounds to zero.
        let result = Chunker::new(0, DEFAULT_OVERLAP);
        assert!(matches!(result, Err(ChunkError::NonPositiveChunkSize(0))));
    }

    #[test]
    fn run_dispatches_to_the_matching_strategy() {
        let chunker = Chunker::new(1000, DEFAULT_OVERLAP).unwrap();
        let content = "a".repeat(5000);

        match chunker.run(ChunkStrategy::Split, &content) {
            ChunkOutput::Split(chunks) => assert_eq!(chunks, chunker.split(&content)),
            ChunkOutput::Truncate(_) => panic!("expected Split output"),
        }

        match chunker.run(ChunkStrategy::Truncate, &content) {
            ChunkOutput::Truncate(s) => assert_eq!(s, chunker.truncate(&content)),
            ChunkOutput::Split(_) => panic!("expected Truncate output"),
        }
    }
}
