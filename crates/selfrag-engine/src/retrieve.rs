//! Retriever adapter
//!
//! Bounds the external similarity search to a fixed top-k and rejects
//! payloads the rest of the loop cannot use.

use selfrag_core::{Passage, Result, Retriever, SelfRagError};
use std::sync::Arc;

/// Fixed top-k view over a [`Retriever`]
pub struct PassageRetriever {
    backend: Arc<dyn Retriever>,
    top_k: usize,
}

impl PassageRetriever {
    pub fn new(backend: Arc<dyn Retriever>, top_k: usize) -> Self {
        Self { backend, top_k }
    }

    /// Retrieve at most `top_k` passages, most similar first
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Passage>> {
        let mut passages = self.backend.search(query, self.top_k).await?;
        passages.truncate(self.top_k);

        if let Some(index) = passages.iter().position(|p| p.content.trim().is_empty()) {
            return Err(SelfRagError::SearchError(format!(
                "{} returned a passage without content at rank {}",
                self.backend.name(),
                index + 1
            )));
        }

        tracing::info!(
            backend = self.backend.name(),
            "[retrieve] Retrieved docs count: {}",
            passages.len()
        );
        for (i, passage) in passages.iter().enumerate() {
            tracing::debug!(
                "Doc {}: {}...",
                i,
                passage.content.chars().take(100).collect::<String>()
            );
        }

        Ok(passages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct ListRetriever(Vec<Passage>);

    #[async_trait]
    impl Retriever for ListRetriever {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<Passage>> {
            // ignores k on purpose to exercise truncation
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "list"
        }
    }

    #[tokio::test]
    async fn test_truncates_to_top_k_in_order() {
        let backend = ListRetriever((1..=5).map(|i| Passage::new(format!("p{i}"))).collect());
        let retriever = PassageRetriever::new(Arc::new(backend), 3);

        let passages = retriever.retrieve("q").await.unwrap();

        let contents: Vec<_> = passages.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, ["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn test_empty_content_is_malformed() {
        let backend = ListRetriever(vec![Passage::new("ok"), Passage::new("  ")]);
        let retriever = PassageRetriever::new(Arc::new(backend), 3);

        let err = retriever.retrieve("q").await.unwrap_err();
        assert!(matches!(err, SelfRagError::SearchError(_)));
    }

    #[tokio::test]
    async fn test_no_results_is_not_an_error() {
        let retriever = PassageRetriever::new(Arc::new(ListRetriever(Vec::new())), 3);
        assert!(retriever.retrieve("q").await.unwrap().is_empty());
    }
}
