//! Query rewriting against a substitution glossary

use crate::prompts::rewrite_prompt;
use selfrag_core::{Completer, RagState, Result, SelfRagError};
use std::sync::Arc;

/// Reformulates a query with the domain glossary
pub struct QueryRewriter {
    llm: Arc<dyn Completer>,
    glossary: Vec<String>,
}

impl QueryRewriter {
    pub fn new(llm: Arc<dyn Completer>, glossary: Vec<String>) -> Self {
        Self { llm, glossary }
    }

    /// Ask the model for a reformulated query
    pub async fn rewrite_query(&self, query: &str) -> Result<String> {
        let response = self
            .llm
            .complete(&rewrite_prompt(query, &self.glossary))
            .await?;

        let rewritten = clean_rewrite(&response);
        if rewritten.is_empty() {
            return Err(SelfRagError::LlmError(
                "Query rewrite returned empty text".to_string(),
            ));
        }

        tracing::info!(from = %query, to = %rewritten, "[rewrite] query replaced");
        Ok(rewritten)
    }

    /// Replace the state's query, clearing its context and answer
    pub async fn rewrite(&self, state: &mut RagState) -> Result<()> {
        let rewritten = self.rewrite_query(&state.query).await?;
        state.replace_query(rewritten);
        Ok(())
    }
}

/// Strip whitespace, surrounding quotes and a leading label such as `Question:`
fn clean_rewrite(response: &str) -> String {
    let trimmed = response.trim();
    let unlabeled = trimmed
        .split_once(':')
        .filter(|(label, _)| {
            let label = label.trim().to_lowercase();
            label == "question" || label == "rewritten question"
        })
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);

    unlabeled
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'')
        .trim()
        .to_string()
}
