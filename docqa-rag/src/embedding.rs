//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What an embedding will be used for.
///
/// Query and document embeddings must come from the same model family so the
/// two spaces stay comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmbeddingIntent {
    /// Embedding a user question for nearest-neighbour lookup.
    Query,
    /// Embedding a chunk for storage.
    Document,
}

/// A provider that generates vector embeddings from text input.
///
/// The default [`embed_batch`](EmbeddingProvider::embed_batch) implementation
/// calls [`embed`](EmbeddingProvider::embed) sequentially; backends that
/// support native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{EmbeddingIntent, EmbeddingProvider};
///
/// let embedding = provider.embed("what is a crew list?", EmbeddingIntent::Query).await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str, intent: EmbeddingIntent) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// Callers must not assume the returned vector count matches the input;
    /// see [`RagError::EmbeddingCountMismatch`](crate::RagError::EmbeddingCountMismatch).
    async fn embed_batch(&self, texts: &[&str], intent: EmbeddingIntent) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text, intent).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}
