//! # docqa-gemini
//!
//! Gemini REST providers for the docqa pipeline.
//!
//! - [`GeminiEmbeddingProvider`] implements [`docqa_rag::EmbeddingProvider`]
//!   with `RETRIEVAL_QUERY` / `RETRIEVAL_DOCUMENT` task types.
//! - [`GeminiGenerator`] implements [`docqa_rag::Generator`]: JSON-schema
//!   structured answers, and server-sent-event streaming folded into
//!   cumulative snapshots.
//!
//! A client built without an API key is usable; its calls fail with
//! [`docqa_rag::RagError::MissingCredentials`] so the pipeline degrades
//! instead of aborting.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docqa_gemini::{GeminiClient, GeminiEmbeddingProvider, GeminiGenerator};
//!
//! # fn run() -> Result<(), docqa_gemini::GeminiError> {
//! let client = Arc::new(GeminiClient::from_env()?);
//! let embedder = GeminiEmbeddingProvider::new(client.clone());
//! let generator = GeminiGenerator::new(client);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod embedding;
mod error;
pub mod generator;
pub mod model;


pub use client::{API_KEY_VARS, GeminiClient};
pub use embedding::GeminiEmbeddingProvider;
pub use error::GeminiError;
pub use generator::{GeminiGenerator, cumulative_snapshots, parse_structured, response_schema};
pub use model::{Model, TaskType};
