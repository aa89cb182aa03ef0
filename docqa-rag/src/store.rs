//! Document store trait: persisted chunks with nearest-neighbour lookup.

use async_trait::async_trait;

use crate::document::{Chunk, QueryResult};
use crate::error::Result;

/// A storage backend for embedded chunks.
///
/// The indexing and nearest-neighbour algorithm are the backend's business;
/// callers only rely on [`query_nearest`](DocumentStore::query_nearest)
/// returning aligned documents and metadata ordered by descending similarity.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{DocumentStore, InMemoryDocumentStore};
///
/// let store = InMemoryDocumentStore::new();
/// store.create_collection("hmsreg_docs").await?;
/// store.add_chunks("hmsreg_docs", &chunks).await?;
/// let result = store.query_nearest("hmsreg_docs", &query_embedding, 10).await?;
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a named collection. No-op if it already exists.
    async fn create_collection(&self, name: &str) -> Result<()>;

    /// Delete a named collection and all its chunks. No-op if it does not exist.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Add chunks to a collection, replacing any with the same `chunk_id`.
    ///
    /// Chunks without an embedding are skipped. Returns the number stored.
    async fn add_chunks(&self, collection: &str, chunks: &[Chunk]) -> Result<usize>;

    /// Return the `k` chunks nearest to `embedding`.
    async fn query_nearest(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<QueryResult>;
}
