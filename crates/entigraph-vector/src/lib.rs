//! Entigraph Vector - Embeddings and similarity queries
//!
//! Embedding clients for OpenAI and Ollama APIs plus an in-memory
//! similarity index over entity vectors with staleness tracking.

use async_trait::async_trait;

use entigraph_core::Result;

pub mod embedding;
pub mod index;

pub use embedding::{create_embedding_client, OllamaEmbedding, OpenAiEmbedding};
pub use index::{EmbeddingRecord, SimilarEntity, SimilarityIndex};

/// Trait for embedding generation
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimension
    fn dimension(&self) -> usize;
}
