//! Quality gates
//!
//! Each grader wraps one LLM call with a fixed prompt and turns the response
//! into a verdict through [`crate::parse`]. Graders only read their inputs.
//!
//! Author: hephaex@gmail.com

use crate::parse::{is_known_grounding_label, parse_grounding, parse_helpfulness, parse_relevance};
use crate::prompts::{hallucination_prompt, helpfulness_prompt, relevance_prompt};
use crate::verdict::{GroundingVerdict, HelpfulnessVerdict, RelevanceGrade, RelevanceVerdict};
use selfrag_core::{Completer, Passage, Result};
use std::sync::Arc;

// ============================================================================
// Relevance
// ============================================================================

/// Grades how relevant the retrieved passages are to the query (1-10)
pub struct DocRelevanceScorer {
    llm: Arc<dyn Completer>,
    threshold: u8,
}

impl DocRelevanceScorer {
    /// Default pass threshold
    pub const DEFAULT_THRESHOLD: u8 = 7;

    pub fn new(llm: Arc<dyn Completer>) -> Self {
        Self {
            llm,
            threshold: Self::DEFAULT_THRESHOLD,
        }
    }

    /// Set the minimum passing score
    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    /// Score the passages against the query
    ///
    /// An empty context scores the minimum without calling the model.
    pub async fn score(&self, query: &str, context: &[Passage]) -> Result<RelevanceGrade> {
        if context.is_empty() {
            return Ok(RelevanceGrade {
                explanation: Some("no passages retrieved".to_string()),
                ..RelevanceGrade::unparsed()
            });
        }

        let response = self.llm.complete(&relevance_prompt(query, context)).await?;
        let grade = parse_relevance(&response);

        if !grade.parsed {
            tracing::warn!(
                response_len = response.len(),
                "Relevance score not parseable, defaulting to {}",
                RelevanceGrade::MIN_SCORE
            );
        }
        tracing::info!("[relevance] Score: {}/10", grade.score);

        Ok(grade)
    }

    /// Score the passages and apply the threshold
    pub async fn check(&self, query: &str, context: &[Passage]) -> Result<RelevanceVerdict> {
        let grade = self.score(query, context).await?;
        Ok(RelevanceVerdict::from_grade(grade, self.threshold))
    }
}

// ============================================================================
// Hallucination
// ============================================================================

/// Classifies whether an answer is supported by the passages
pub struct HallucinationChecker {
    llm: Arc<dyn Completer>,
}

impl HallucinationChecker {
    pub fn new(llm: Arc<dyn Completer>) -> Self {
        Self { llm }
    }

    pub async fn check(&self, answer: &str, context: &[Passage]) -> Result<GroundingVerdict> {
        let response = self
            .llm
            .complete(&hallucination_prompt(answer, context))
            .await?;

        if !is_known_grounding_label(&response) {
            tracing::warn!(
                response = %response.chars().take(80).collect::<String>(),
                "Unrecognized grounding label, treating answer as hallucinated"
            );
        }

        let verdict = parse_grounding(&response);
        tracing::info!(grounded = verdict.is_grounded(), "[hallucination] checked");
        Ok(verdict)
    }
}

// ============================================================================
// Helpfulness
// ============================================================================

/// Grades whether an answer actually helps with the query (0/1)
pub struct HelpfulnessScorer {
    llm: Arc<dyn Completer>,
    pass_score: u8,
}

impl HelpfulnessScorer {
    pub fn new(llm: Arc<dyn Completer>) -> Self {
        Self { llm, pass_score: 1 }
    }

    /// Set the score that counts as helpful
    pub fn with_pass_score(mut self, pass_score: u8) -> Self {
        self.pass_score = pass_score;
        self
    }

    pub async fn score(&self, query: &str, answer: &str) -> Result<HelpfulnessVerdict> {
        let response = self
            .llm
            .complete(&helpfulness_prompt(query, answer))
            .await?;
        let grade = parse_helpfulness(&response);

        if grade.score.is_none() {
            tracing::warn!("Helpfulness score not parseable, treating answer as unhelpful");
        }

        let verdict = HelpfulnessVerdict::from_grade(grade, self.pass_score);
        tracing::info!(helpful = verdict.is_helpful(), "[helpfulness] graded");
        Ok(verdict)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use selfrag_core::SelfRagError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Completer that always returns the same text
    struct FixedLlm {
        response: String,
        calls: AtomicUsize,
    }

    impl FixedLlm {
        fn new(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: response.to_string(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Completer for FixedLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }

        fn model(&self) -> &str {
            "fixed"
        }
    }

    struct DownLlm;

    #[async_trait]
    impl Completer for DownLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(SelfRagError::LlmError("connection refused".to_string()))
        }

        fn model(&self) -> &str {
            "down"
        }
    }

    fn passages() -> Vec<Passage> {
        vec![Passage::new(
            "Mechanical parking facilities may be removed when they are unusable.",
        )]
    }

    #[tokio::test]
    async fn test_relevance_pass_and_fail() {
        let llm = FixedLlm::new(r#"{"Score": 9, "Explanation": "direct"}"#);
        let scorer = DocRelevanceScorer::new(llm);
        let verdict = scorer.check("removal conditions?", &passages()).await.unwrap();
        assert!(verdict.is_relevant());
        assert_eq!(verdict.score(), 9);

        let scorer = DocRelevanceScorer::new(FixedLlm::new(r#"{"Score": 6}"#));
        let verdict = scorer.check("removal conditions?", &passages()).await.unwrap();
        assert!(!verdict.is_relevant());
    }

    #[tokio::test]
    async fn test_relevance_custom_threshold() {
        let scorer =
            DocRelevanceScorer::new(FixedLlm::new(r#"{"Score": 6}"#)).with_threshold(5);
        assert!(scorer.check("q", &passages()).await.unwrap().is_relevant());
    }

    #[tokio::test]
    async fn test_unparseable_relevance_is_irrelevant() {
        let scorer = DocRelevanceScorer::new(FixedLlm::new("Very relevant, I would say."));
        let verdict = scorer.check("q", &passages()).await.unwrap();

        assert!(!verdict.is_relevant());
        assert_eq!(verdict.score(), 1);
        assert!(!verdict.grade().parsed);
    }

    #[tokio::test]
    async fn test_fractional_relevance_does_not_pass() {
        let scorer = DocRelevanceScorer::new(FixedLlm::new(r#"{"Score": 6.5}"#));
        let verdict = scorer.check("q", &passages()).await.unwrap();
        assert!(!verdict.is_relevant());
        assert_eq!(verdict.score(), 1);

        let scorer = DocRelevanceScorer::new(FixedLlm::new(r#"{"Score": 1e300}"#));
        let verdict = scorer.check("q", &passages()).await.unwrap();
        assert!(!verdict.is_relevant());
        assert!(!verdict.grade().parsed);
    }

    #[tokio::test]
    async fn test_empty_context_skips_llm() {
        let llm = FixedLlm::new(r#"{"Score": 10}"#);
        let scorer = DocRelevanceScorer::new(llm.clone());

        let verdict = scorer.check("q", &[]).await.unwrap();

        assert!(!verdict.is_relevant());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_hallucination_checker() {
        let checker = HallucinationChecker::new(FixedLlm::new("not hallucinated"));
        assert!(checker.check("a", &passages()).await.unwrap().is_grounded());

        let checker = HallucinationChecker::new(FixedLlm::new("I am not sure."));
        assert!(!checker.check("a", &passages()).await.unwrap().is_grounded());
    }

    #[tokio::test]
    async fn test_helpfulness_scorer() {
        let scorer = HelpfulnessScorer::new(FixedLlm::new(r#"{"Score": 1}"#));
        assert!(scorer.score("q", "a").await.unwrap().is_helpful());

        let scorer = HelpfulnessScorer::new(FixedLlm::new("{\"Score\": 0}"));
        assert!(!scorer.score("q", "a").await.unwrap().is_helpful());

        let scorer = HelpfulnessScorer::new(FixedLlm::new("helpful!"));
        assert!(!scorer.score("q", "a").await.unwrap().is_helpful());
    }

    #[tokio::test]
    async fn test_non_integer_helpfulness_is_unhelpful() {
        for response in [r#"{"Score": 0.6}"#, r#"{"Score": 1.4}"#, r#"{"Score": 1e300}"#] {
            let scorer = HelpfulnessScorer::new(FixedLlm::new(response));
            let verdict = scorer.score("q", "a").await.unwrap();
            assert!(!verdict.is_helpful(), "{response} should not pass");
        }
    }

    #[tokio::test]
    async fn test_upstream_error_propagates() {
        let scorer = DocRelevanceScorer::new(Arc::new(DownLlm));
        let err = scorer.check("q", &passages()).await.unwrap_err();
        assert!(err.is_upstream());

        let checker = HallucinationChecker::new(Arc::new(DownLlm));
        assert!(checker.check("a", &passages()).await.is_err());
    }
}
