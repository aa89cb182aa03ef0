//! Gemini-backed [`EmbeddingProvider`].

use std::sync::Arc;

use async_trait::async_trait;
use docqa_rag::{EmbeddingIntent, EmbeddingProvider, Result};
use tracing::{debug, error};

use crate::client::GeminiClient;
use crate::error::Capability;
use crate::model::{BatchEmbedContentsRequest, Content, EmbedContentRequest, Model, TaskType};

/// Map a pipeline intent onto the Gemini task type.
pub fn task_type(intent: EmbeddingIntent) -> TaskType {
    match intent {
        EmbeddingIntent::Query => TaskType::RetrievalQuery,
        EmbeddingIntent::Document => TaskType::RetrievalDocument,
    }
}

/// An [`EmbeddingProvider`] backed by the Gemini embedding API.
///
/// Queries are embedded with `RETRIEVAL_QUERY` and chunks with
/// `RETRIEVAL_DOCUMENT` from the same model, so both land in one space.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_gemini::{GeminiClient, GeminiEmbeddingProvider};
///
/// let provider = GeminiEmbeddingProvider::new(Arc::new(GeminiClient::from_env()?));
/// let embedding = provider.embed("hva er en mannskapsliste?", EmbeddingIntent::Query).await?;
/// ```
pub struct GeminiEmbeddingProvider {
    client: Arc<GeminiClient>,
    model: Model,
    dimensions: usize,
}

impl GeminiEmbeddingProvider {
    /// Output size of `text-embedding-004`.
    pub const DEFAULT_DIMENSIONS: usize = 768;

    /// Most texts `batchEmbedContents` accepts in one call.
    pub const MAX_BATCH_SIZE: usize = 100;

    /// Create a provider using `text-embedding-004`.
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self { client, model: Model::TextEmbedding004, dimensions: Self::DEFAULT_DIMENSIONS }
    }

    /// Use a different embedding model with the given output size.
    pub fn with_model(mut self, model: impl Into<Model>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }

    fn request(&self, text: &str, intent: EmbeddingIntent) -> EmbedContentRequest {
        EmbedContentRequest {
            model: self.model.to_string(),
            content: Content::text(text),
            task_type: Some(task_type(intent)),
        }
    }

    fn batch_requests(&self, texts: &[&str], intent: EmbeddingIntent) -> Vec<BatchEmbedContentsRequest> {
        texts
            .chunks(Self::MAX_BATCH_SIZE)
            .map(|batch| BatchEmbedContentsRequest {
                requests: batch.iter().map(|text| self.request(text, intent)).collect(),
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed(&self, text: &str, intent: EmbeddingIntent) -> Result<Vec<f32>> {
        debug!(provider = "Gemini", text_len = text.len(), ?intent, "embedding single text");

        let response =
            self.client.embed_content(&self.model, &self.request(text, intent)).await.map_err(|e| {
                error!(provider = "Gemini", error = %e, "embedding request failed");
                e.into_rag(Capability::Embedding)
            })?;

        Ok(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[&str], intent: EmbeddingIntent) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = "Gemini", batch_size = texts.len(), ?intent, "embedding batch");

        let mut embeddings = Vec::with_capacity(texts.len());
        for request in self.batch_requests(texts, intent) {
            let response =
                self.client.embed_content_batch(&self.model, &request).await.map_err(|e| {
                    error!(provider = "Gemini", error = %e, "batch embedding request failed");
                    e.into_rag(Capability::Embedding)
                })?;
            embeddings.extend(response.embeddings.into_iter().map(|e| e.values));
        }

        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
