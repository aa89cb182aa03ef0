//! Error types for the `docqa-rag` crate.

use thiserror::Error;

/// Errors that can occur while ingesting documents or answering questions.
#[derive(Debug, Error)]
pub enum RagError {
    /// The embedding provider failed or could not be reached.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The document store failed or could not be reached.
    #[error("Document store error ({backend}): {message}")]
    DocumentStoreError {
        /// The store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The generative model failed or could not be reached.
    #[error("Generation error ({provider}): {message}")]
    GenerationError {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A provider was constructed without credentials and runs degraded.
    #[error("Missing credentials for {provider}")]
    MissingCredentials {
        /// The provider that has no credentials.
        provider: String,
    },

    /// The embedding provider returned a different number of vectors than inputs.
    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    EmbeddingCountMismatch {
        /// Number of texts sent to the provider.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },

    /// An upstream service returned output that could not be interpreted.
    #[error("Malformed upstream output: {0}")]
    MalformedResponse(String),

    /// An error occurred while splitting text into chunks.
    #[error("Chunking error: {0}")]
    ChunkingError(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Filesystem error while persisting or loading a store.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RagError {
    /// Whether this error means a provider or store could not serve the call.
    pub fn is_provider_unavailable(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingError { .. }
                | Self::DocumentStoreError { .. }
                | Self::GenerationError { .. }
        )
    }

    /// Whether this error comes from a provider running without credentials.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::MissingCredentials { .. })
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
