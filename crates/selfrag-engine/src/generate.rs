//! Answer generation over the retrieved passages

use crate::prompts::answer_prompt;
use selfrag_core::{Completer, Passage, Result};
use std::sync::Arc;

/// Fills the QA template and makes a single completion call
///
/// Retries on hallucination belong to the orchestrator.
pub struct Generator {
    llm: Arc<dyn Completer>,
}

impl Generator {
    pub fn new(llm: Arc<dyn Completer>) -> Self {
        Self { llm }
    }

    pub async fn generate(&self, query: &str, context: &[Passage]) -> Result<String> {
        let prompt = answer_prompt(query, context);
        tracing::debug!(
            passages = context.len(),
            "Calling LLM with prompt length: {} chars",
            prompt.len()
        );

        let answer = self.llm.complete(&prompt).await?;
        tracing::info!("LLM response received: {} chars", answer.len());

        Ok(answer.trim().to_string())
    }
}
