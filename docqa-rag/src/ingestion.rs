//! Ingestion: clean → split → deduplicate → embed → store.
//!
//! Near-duplicate chunks are removed per page before they are embedded for
//! storage, keeping the index small. Every failure of the embedding provider
//! is soft: deduplication is skipped or chunks are left un-embedded (and so
//! never stored), with a log line for each degraded path.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::RagConfig;
use crate::document::{Chunk, SourcePage};
use crate::embedding::{EmbeddingIntent, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::similarity::SimilarityDeduplicator;
use crate::splitter::{RecursiveSplitter, clean_text};
use crate::store::DocumentStore;

/// Title used for pages without one and without an `ID=` parameter.
pub const UNTITLED_DOCUMENT: &str = "Untitled Document";

/// Pick a display title for a page.
///
/// Falls back to `"HMSREG Document {id}"` when the URL carries an `ID=`
/// parameter, else [`UNTITLED_DOCUMENT`].
pub fn page_title(page: &SourcePage) -> String {
    if let Some(title) = page.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        return title.to_string();
    }
    page.url
        .rsplit_once("ID=")
        .map(|(_, rest)| rest.split('&').next().unwrap_or_default())
        .filter(|id| !id.is_empty())
        .map(|id| format!("HMSREG Document {id}"))
        .unwrap_or_else(|| UNTITLED_DOCUMENT.to_string())
}

/// Embed a batch, turning a count mismatch into an error.
async fn embed_exact(
    provider: &dyn EmbeddingProvider,
    texts: &[&str],
    intent: EmbeddingIntent,
) -> Result<Vec<Vec<f32>>> {
    let embeddings = provider.embed_batch(texts, intent).await?;
    if embeddings.len() != texts.len() {
        return Err(RagError::EmbeddingCountMismatch {
            expected: texts.len(),
            actual: embeddings.len(),
        });
    }
    Ok(embeddings)
}

/// Removes near-duplicate chunks of a single page using embedding similarity.
///
/// All chunks are embedded in one batch call. If the provider fails, the
/// input is returned unfiltered.
pub struct ChunkDeduplicator {
    provider: Arc<dyn EmbeddingProvider>,
    similarity: SimilarityDeduplicator,
}

impl ChunkDeduplicator {
    /// Create a deduplicator dropping chunks more similar than `threshold`.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, threshold: f32) -> Self {
        Self { provider, similarity: SimilarityDeduplicator::new(threshold) }
    }

    /// Return the distinct subsequence of `chunks`, preserving order.
    ///
    /// Makes no provider call for empty input.
    pub async fn dedup(&self, chunks: Vec<String>) -> Vec<String> {
        if chunks.is_empty() {
            return chunks;
        }

        let texts: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let embeddings =
            match embed_exact(self.provider.as_ref(), &texts, EmbeddingIntent::Document).await {
                Ok(embeddings) => embeddings,
                Err(e) if e.is_degraded() => {
                    warn!(error = %e, chunk_count = chunks.len(), "skipping semantic dedup");
                    return chunks;
                }
                Err(e) => {
                    error!(error = %e, chunk_count = chunks.len(), "semantic dedup unavailable, keeping all chunks");
                    return chunks;
                }
            };

        let initial = chunks.len();
        let kept: Vec<String> = self
            .similarity
            .retain_distinct(chunks.into_iter().zip(embeddings).collect())
            .into_iter()
            .map(|(text, _)| text)
            .collect();

        info!(initial, unique = kept.len(), "deduplicated chunks");
        kept
    }
}

/// Counters for one or more ingested pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Pages processed successfully.
    pub pages: usize,
    /// Pages that could not be stored.
    pub failed_pages: usize,
    /// Chunks produced by the splitter.
    pub initial_chunks: usize,
    /// Chunks left after semantic deduplication.
    pub unique_chunks: usize,
    /// Chunks written to the store.
    pub stored_chunks: usize,
    /// Unique chunks left out of the store for lack of an embedding.
    pub skipped_chunks: usize,
}

impl IngestReport {
    /// Add another report's counters to this one.
    pub fn merge(&mut self, other: &IngestReport) {
        self.pages += other.pages;
        self.failed_pages += other.failed_pages;
        self.initial_chunks += other.initial_chunks;
        self.unique_chunks += other.unique_chunks;
        self.stored_chunks += other.stored_chunks;
        self.skipped_chunks += other.skipped_chunks;
    }
}

/// Orchestrates page ingestion into a [`DocumentStore`].
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = IngestionPipeline::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .document_store(store.clone())
///     .build()?;
///
/// pipeline.reset_collection().await?;
/// let report = pipeline.ingest_pages(&pages).await;
/// ```
pub struct IngestionPipeline {
    config: RagConfig,
    splitter: RecursiveSplitter,
    deduplicator: ChunkDeduplicator,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    document_store: Arc<dyn DocumentStore>,
}

impl IngestionPipeline {
    /// Create a new [`IngestionPipelineBuilder`].
    pub fn builder() -> IngestionPipelineBuilder {
        IngestionPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Create the configured collection if it does not exist.
    pub async fn ensure_collection(&self) -> Result<()> {
        let name = &self.config.collection;
        self.document_store.create_collection(name).await.map_err(|e| {
            error!(collection = %name, error = %e, "failed to create collection");
            RagError::PipelineError(format!("failed to create collection '{name}': {e}"))
        })
    }

    /// Drop and recreate the configured collection before a full re-ingest.
    pub async fn reset_collection(&self) -> Result<()> {
        let name = &self.config.collection;
        self.document_store.delete_collection(name).await.map_err(|e| {
            error!(collection = %name, error = %e, "failed to delete collection");
            RagError::PipelineError(format!("failed to delete collection '{name}': {e}"))
        })?;
        info!(collection = %name, "cleared collection");
        self.ensure_collection().await
    }

    /// Split, deduplicate and embed a page without storing it.
    ///
    /// Returned chunks whose embedding failed have an empty `embedding`.
    pub async fn prepare_page(&self, page: &SourcePage) -> (Vec<Chunk>, IngestReport) {
        let mut report = IngestReport::default();
        let text = clean_text(&page.text);
        let pieces = self.splitter.split(&text);
        report.initial_chunks = pieces.len();
        if pieces.is_empty() {
            warn!(url = %page.url, "no content to ingest");
            return (Vec::new(), report);
        }

        let unique = self.deduplicator.dedup(pieces).await;
        report.unique_chunks = unique.len();

        let texts: Vec<&str> = unique.iter().map(String::as_str).collect();
        let embeddings = match embed_exact(
            self.embedding_provider.as_ref(),
            &texts,
            EmbeddingIntent::Document,
        )
        .await
        {
            Ok(embeddings) => embeddings,
            Err(e @ RagError::EmbeddingCountMismatch { .. }) => {
                error!(url = %page.url, error = %e, "skipping embeddings for page");
                vec![Vec::new(); unique.len()]
            }
            Err(e) if e.is_degraded() => {
                warn!(url = %page.url, error = %e, "embedding generation disabled");
                vec![Vec::new(); unique.len()]
            }
            Err(e) => {
                error!(url = %page.url, error = %e, "embedding failed during ingestion");
                vec![Vec::new(); unique.len()]
            }
        };

        let title = page_title(page);
        let chunks: Vec<Chunk> = unique
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (content, embedding))| Chunk {
                url: page.url.clone(),
                title: title.clone(),
                chunk_id: format!("{}#{i}", page.url),
                content,
                embedding,
            })
            .collect();

        (chunks, report)
    }

    /// Ingest one page: clean → split → dedup → embed → store.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if the store rejects the chunks.
    /// Embedding failures are not errors; affected chunks are skipped.
    pub async fn ingest_page(&self, page: &SourcePage) -> Result<IngestReport> {
        let (chunks, mut report) = self.prepare_page(page).await;
        let embedded: Vec<Chunk> = chunks.iter().filter(|c| c.is_embedded()).cloned().collect();
        report.skipped_chunks = chunks.len() - embedded.len();

        if !embedded.is_empty() {
            let collection = &self.config.collection;
            report.stored_chunks =
                self.document_store.add_chunks(collection, &embedded).await.map_err(|e| {
                    error!(url = %page.url, error = %e, "store failed during ingestion");
                    RagError::PipelineError(format!("store failed for page '{}': {e}", page.url))
                })?;
        }

        report.pages = 1;
        info!(
            url = %page.url,
            initial = report.initial_chunks,
            unique = report.unique_chunks,
            stored = report.stored_chunks,
            skipped = report.skipped_chunks,
            "ingested page"
        );
        Ok(report)
    }

    /// Ingest many pages, continuing past pages that fail.
    pub async fn ingest_pages(&self, pages: &[SourcePage]) -> IngestReport {
        let mut total = IngestReport::default();
        for page in pages {
            match self.ingest_page(page).await {
                Ok(report) => total.merge(&report),
                Err(e) => {
                    error!(url = %page.url, error = %e, "page ingestion failed");
                    total.failed_pages += 1;
                }
            }
        }
        info!(
            pages = total.pages,
            failed = total.failed_pages,
            stored = total.stored_chunks,
            "ingestion finished"
        );
        total
    }
}

/// Builder for constructing an [`IngestionPipeline`].
#[derive(Default)]
pub struct IngestionPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    document_store: Option<Arc<dyn DocumentStore>>,
}

impl IngestionPipelineBuilder {
    /// Set the pipeline configuration. Defaults to [`RagConfig::default`].
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the document store.
    pub fn document_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.document_store = Some(store);
        self
    }

    /// Build the [`IngestionPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<IngestionPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let document_store = self
            .document_store
            .ok_or_else(|| RagError::ConfigError("document_store is required".to_string()))?;

        Ok(IngestionPipeline {
            splitter: RecursiveSplitter::new(config.chunk_size, config.chunk_overlap)?,
            deduplicator: ChunkDeduplicator::new(
                embedding_provider.clone(),
                config.embedding_similarity_threshold,
            ),
            config,
            embedding_provider,
            document_store,
        })
    }
}
