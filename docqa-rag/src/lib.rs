//! # docqa-rag
//!
//! Retrieval-augmented question answering over the HMSREG documentation.
//!
//! ## Overview
//!
//! Two pipelines share one similarity primitive:
//!
//! - **Ingestion** ([`IngestionPipeline`]): clean → split → drop
//!   near-duplicate chunks by embedding similarity → embed → store.
//! - **Answering** ([`ChatService`]): expand the question with domain
//!   synonyms → retrieve → drop redundant passages → cap → cite → generate,
//!   then either gate the structured answer on confidence or stream it as
//!   token deltas.
//!
//! Providers are traits: [`EmbeddingProvider`], [`DocumentStore`] and
//! [`Generator`]. [`InMemoryDocumentStore`] is a JSON-persistable store for
//! development and tests.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docqa_rag::{ChatRequest, ChatService, InMemoryDocumentStore, IngestionPipeline};
//!
//! let store = Arc::new(InMemoryDocumentStore::new());
//! let ingestion = IngestionPipeline::builder()
//!     .embedding_provider(embedder.clone())
//!     .document_store(store.clone())
//!     .build()?;
//! ingestion.ingest_pages(&pages).await;
//!
//! let service = ChatService::builder()
//!     .embedding_provider(embedder)
//!     .document_store(store)
//!     .generator(generator)
//!     .build()?;
//! let response = service.generate_chat_response(ChatRequest::new("Hvordan får jeg HMS-kort?")).await;
//! ```

pub mod chat;
pub mod config;
pub mod context;
pub mod document;
pub mod embedding;
pub mod error;
pub mod expansion;
pub mod gate;
pub mod generation;
pub mod ingestion;
pub mod inmemory;
pub mod service;
pub mod similarity;
pub mod splitter;
pub mod store;
pub mod stream;

pub use chat::{ChatRequest, ChatResponse, UserRole};
pub use config::{DEFAULT_FALLBACK_MESSAGE, RagConfig, RagConfigBuilder};
pub use context::{AssembledContext, ContextAssembler, ContextChunk};
pub use document::{Chunk, ChunkMetadata, QueryResult, SourceCitation, SourcePage};
pub use embedding::{EmbeddingIntent, EmbeddingProvider};
pub use error::{RagError, Result};
pub use expansion::{QueryExpander, SynonymTable};
pub use gate::ConfidenceGate;
pub use generation::{
    GenerationRequest, Generator, STREAMING_INSTRUCTIONS, STRUCTURED_INSTRUCTIONS, SnapshotStream,
};
pub use ingestion::{ChunkDeduplicator, IngestReport, IngestionPipeline, IngestionPipelineBuilder};
pub use inmemory::InMemoryDocumentStore;
pub use service::{ChatService, ChatServiceBuilder, ERROR_MESSAGE};
pub use similarity::{SimilarityDeduplicator, cosine_similarity};
pub use splitter::{RecursiveSplitter, clean_text};
pub use store::DocumentStore;
pub use stream::{DeltaExtractor, StreamEvent, StreamPhase};
