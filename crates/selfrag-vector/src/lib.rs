//! Self-RAG Vector - Similarity search over a vector database
//!
//! Provides the `Retriever` used in production: the query is embedded
//! with the configured embedding API and searched in a Qdrant collection.
//! Index construction and document ingestion live outside this crate.

pub mod embedding;
pub mod qdrant_store;

pub use embedding::{create_embedding_client, EmbeddingClient, OllamaEmbedding, OpenAiEmbedding};
pub use qdrant_store::QdrantRetriever;
