//! In-memory document store using cosine similarity.
//!
//! [`InMemoryDocumentStore`] keeps collections in a `HashMap` behind a
//! `tokio::sync::RwLock` and can snapshot itself to a JSON file, which is
//! enough for development, tests, and small documentation sets.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::document::{Chunk, QueryResult};
use crate::error::{RagError, Result};
use crate::similarity::cosine_similarity;
use crate::store::DocumentStore;

const BACKEND: &str = "InMemory";

/// An in-memory document store.
///
/// Collections are stored as collection name → chunks in insertion order.
/// Search ties keep insertion order.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{DocumentStore, InMemoryDocumentStore};
///
/// let store = InMemoryDocumentStore::new();
/// store.create_collection("hmsreg_docs").await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Chunk>>>,
}

impl InMemoryDocumentStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store previously written by [`save`](Self::save).
    ///
    /// A missing file yields an empty store.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no store snapshot, starting empty");
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };
        let collections: HashMap<String, Vec<Chunk>> = serde_json::from_slice(&bytes)?;
        let chunk_count: usize = collections.values().map(Vec::len).sum();
        info!(path = %path.display(), collections = collections.len(), chunk_count, "loaded store");
        Ok(Self { collections: RwLock::new(collections) })
    }

    /// Write every collection to `path` as JSON.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = {
            let collections = self.collections.read().await;
            serde_json::to_vec(&*collections)?
        };
        tokio::fs::write(path, bytes).await?;
        info!(path = %path.display(), "saved store");
        Ok(())
    }

    /// Number of chunks in a collection, or `None` if it does not exist.
    pub async fn len(&self, collection: &str) -> Option<usize> {
        self.collections.read().await.get(collection).map(Vec::len)
    }

    fn missing(collection: &str) -> RagError {
        RagError::DocumentStoreError {
            backend: BACKEND.to_string(),
            message: format!("collection '{collection}' does not exist"),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }

    async fn add_chunks(&self, collection: &str, chunks: &[Chunk]) -> Result<usize> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| Self::missing(collection))?;

        let mut stored = 0;
        for chunk in chunks.iter().filter(|c| c.is_embedded()) {
            match store.iter_mut().find(|c| c.chunk_id == chunk.chunk_id) {
                Some(existing) => *existing = chunk.clone(),
                None => store.push(chunk.clone()),
            }
            stored += 1;
        }
        Ok(stored)
    }

    async fn query_nearest(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<QueryResult> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| Self::missing(collection))?;

        let mut scored: Vec<(f32, &Chunk)> =
            store.iter().map(|chunk| (cosine_similarity(&chunk.embedding, embedding), chunk)).collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        let mut result = QueryResult::default();
        for (_, chunk) in scored {
            result.documents.push(chunk.content.clone());
            result.metadatas.push(chunk.metadata());
        }
        Ok(result)
    }
}
