//! Self-RAG Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used by the Self-RAG loop:
//! - Retrieved passages and the per-run state threaded through the loop
//! - Common error types
//! - Capability traits for similarity search and LLM completion
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ConfigError, LlmConfig, LlmProvider, LoggingConfig, SelfRagConfig, VectorConfig,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for Self-RAG operations
///
/// Only upstream failures and invalid input are errors. Unparseable grader
/// output and exhausted retry budgets are regular run outcomes.
#[derive(Error, Debug)]
pub enum SelfRagError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Search error: {0}")]
    SearchError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SelfRagError {
    /// Whether the error came from an external collaborator
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::SearchError(_) | Self::LlmError(_))
    }
}

pub type Result<T> = std::result::Result<T, SelfRagError>;

// ============================================================================
// Passages
// ============================================================================

/// One retrieved context unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Text content
    pub content: String,

    /// Source metadata reported by the search backend
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Passage {
    /// Create a passage without metadata
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    /// Add a metadata value
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Get a string metadata value
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

// ============================================================================
// Run State
// ============================================================================

/// Per-run loop counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptCounters {
    /// Node executions so far, across both cycles
    pub steps: u32,

    /// Calls made to the generator
    pub generations: u32,

    /// Regenerations triggered by a hallucination verdict
    pub regenerations: u32,

    /// Query rewrites triggered by an unhelpful verdict
    pub rewrites: u32,
}

/// The payload threaded through the Self-RAG loop
///
/// `context` and `answer` always belong to the current `query`: replacing the
/// query clears both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagState {
    /// Current information need
    pub query: String,

    /// Retrieved passages, most similar first
    pub context: Vec<Passage>,

    /// Candidate answer (empty until generated)
    pub answer: String,

    /// Loop counters
    pub attempts: AttemptCounters,
}

impl RagState {
    /// Create the initial state for a run
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            context: Vec::new(),
            answer: String::new(),
            attempts: AttemptCounters::default(),
        }
    }

    /// Replace the query, dropping context and answer of the old one
    pub fn replace_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.context.clear();
        self.answer.clear();
    }
}

/// Join passage contents with a paragraph break, preserving order
pub fn join_passages(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|p| p.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ============================================================================
// Traits
// ============================================================================

/// Similarity search capability
///
/// Implementations must be idempotent and side-effect free from the caller's
/// perspective. Results are ordered most similar first.
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    /// Search for the `k` passages most similar to `query`
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// LLM completion capability
#[async_trait::async_trait]
pub trait Completer: Send + Sync {
    /// Complete a prompt
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Model name for logging
    fn model(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> RagState {
        let mut state = RagState::new("What are the removal conditions?");
        state.context = vec![
            Passage::new("first passage").with_metadata("page", 3),
            Passage::new("second passage"),
        ];
        state.answer = "an answer".to_string();
        state
    }

    #[test]
    fn test_replace_query_clears_context_and_answer() {
        let mut state = sample_state();
        state.attempts.rewrites = 1;

        state.replace_query("Who counts as a resident?");

        assert_eq!(state.query, "Who counts as a resident?");
        assert!(state.context.is_empty());
        assert!(state.answer.is_empty());
        // counters survive a rewrite
        assert_eq!(state.attempts.rewrites, 1);
    }

    #[test]
    fn test_joined_context_preserves_order() {
        let state = sample_state();
        assert_eq!(join_passages(&state.context), "first passage\n\nsecond passage");
    }

    #[test]
    fn test_passage_metadata() {
        let passage = Passage::new("text")
            .with_metadata("source", "parkinglot_law.pdf")
            .with_metadata("page", 12);

        assert_eq!(passage.metadata_str("source"), Some("parkinglot_law.pdf"));
        assert_eq!(passage.metadata.get("page"), Some(&serde_json::json!(12)));
        assert_eq!(passage.metadata_str("page"), None);
    }

    #[test]
    fn test_upstream_classification() {
        assert!(SelfRagError::SearchError("down".into()).is_upstream());
        assert!(SelfRagError::LlmError("bad payload".into()).is_upstream());
        assert!(!SelfRagError::ValidationError("empty".into()).is_upstream());
    }

    #[test]
    fn test_passage_deserializes_without_metadata() {
        let passage: Passage = serde_json::from_str(r#"{"content":"abc"}"#).unwrap();
        assert_eq!(passage, Passage::new("abc"));
    }
}
