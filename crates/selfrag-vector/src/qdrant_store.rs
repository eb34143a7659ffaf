//! Qdrant implementation of the similarity-search capability
//!
//! Read path only: embed the query, search the collection, and map each
//! point's payload to a passage. Points are expected to carry a `content`
//! payload field; every other string field becomes passage metadata.
//!
//! Author: hephaex@gmail.com

use crate::embedding::EmbeddingClient;
use async_trait::async_trait;
use qdrant_client::qdrant::{SearchPointsBuilder, Value};
use qdrant_client::Qdrant;
use selfrag_core::{Passage, Result, Retriever, SelfRagError, VectorConfig};
use std::collections::HashMap;

const CONTENT_FIELD: &str = "content";

/// Qdrant-backed retriever
pub struct QdrantRetriever {
    client: Qdrant,
    collection: String,
    dimension: usize,
    embedder: Box<dyn EmbeddingClient>,
}

impl QdrantRetriever {
    /// Connect to the configured collection
    pub fn new(config: &VectorConfig, embedder: Box<dyn EmbeddingClient>) -> Result<Self> {
        let client = Qdrant::from_url(&config.qdrant_url)
            .build()
            .map_err(|e| SelfRagError::SearchError(format!("Qdrant connection failed: {e}")))?;

        if embedder.dimension() != config.vector_dimension {
            tracing::warn!(
                embedder = embedder.dimension(),
                collection = config.vector_dimension,
                "Embedding dimension differs from configured vector dimension"
            );
        }

        Ok(Self {
            client,
            collection: config.collection.clone(),
            dimension: config.vector_dimension,
            embedder,
        })
    }
}

#[async_trait]
impl Retriever for QdrantRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        let vector = self.embedder.embed(query).await?;
        if vector.len() != self.dimension {
            return Err(SelfRagError::SearchError(format!(
                "Query embedding has {} dimensions, collection expects {}",
                vector.len(),
                self.dimension
            )));
        }

        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector, k as u64).with_payload(true),
            )
            .await
            .map_err(|e| SelfRagError::SearchError(format!("Vector search failed: {e}")))?;

        tracing::debug!(
            collection = %self.collection,
            "Vector search returned {} results",
            results.result.len()
        );

        Ok(results
            .result
            .into_iter()
            .map(|point| payload_to_passage(point.payload, point.score))
            .collect())
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}

/// Map a point payload to a passage; a missing `content` field yields an
/// empty passage, which the retriever adapter rejects
fn payload_to_passage(payload: HashMap<String, Value>, score: f32) -> Passage {
    let mut passage = Passage::new(
        payload
            .get(CONTENT_FIELD)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_default(),
    );

    for (key, value) in &payload {
        if key == CONTENT_FIELD {
            continue;
        }
        if let Some(text) = value.as_str() {
            passage = passage.with_metadata(key.clone(), text.to_string());
        }
    }

    passage.with_metadata("score", f64::from(score))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(entries: &[(&str, serde_json::Value)]) -> HashMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone().into()))
            .collect()
    }

    #[test]
    fn test_payload_to_passage() {
        let passage = payload_to_passage(
            payload(&[
                ("content", serde_json::json!("Mechanical parking removal rules")),
                ("source", serde_json::json!("parkinglot_law.pdf")),
            ]),
            0.5,
        );

        assert_eq!(passage.content, "Mechanical parking removal rules");
        assert_eq!(passage.metadata_str("source"), Some("parkinglot_law.pdf"));
        assert!(!passage.metadata.contains_key("content"));
        assert_eq!(passage.metadata.get("score"), Some(&serde_json::json!(0.5)));
    }

    #[test]
    fn test_missing_content_yields_empty_passage() {
        let passage = payload_to_passage(payload(&[("source", serde_json::json!("a.pdf"))]), 0.1);
        assert!(passage.content.is_empty());
    }
}
