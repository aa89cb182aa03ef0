//! Configuration for ingestion and question answering.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Message shown to the user when an answer is gated for low confidence.
pub const DEFAULT_FALLBACK_MESSAGE: &str = "I'm not confident I can answer that accurately. \
     Please try rephrasing your question, or consult the HMSREG documentation directly.";

/// Configuration parameters shared by ingestion and the chat pipeline.
///
/// Thresholds are process-wide and read-only once the pipeline is built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of nearest chunks requested from the document store.
    pub top_k: usize,
    /// Maximum number of unique chunks placed in the context window.
    pub max_context_chunks: usize,
    /// Cosine similarity above which two chunk embeddings count as duplicates.
    pub embedding_similarity_threshold: f32,
    /// Word-bag overlap ratio above which two retrieved chunks count as duplicates.
    pub context_overlap_threshold: f32,
    /// Answers with a self-reported confidence strictly below this are replaced by a fallback.
    pub confidence_threshold: f32,
    /// Name of the document store collection.
    pub collection: String,
    /// Message returned in place of a gated answer.
    pub fallback_message: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 10,
            max_context_chunks: 3,
            embedding_similarity_threshold: 0.95,
            context_overlap_threshold: 0.60,
            confidence_threshold: 0.7,
            collection: "hmsreg_docs".to_string(),
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k == 0` or `max_context_chunks == 0`
    /// - a similarity or overlap threshold is outside `[0, 1]`
    /// - `confidence_threshold` is outside `[0, 1]`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.max_context_chunks == 0 {
            return Err(RagError::ConfigError(
                "max_context_chunks must be greater than zero".to_string(),
            ));
        }
        for (name, value) in [
            ("embedding_similarity_threshold", self.embedding_similarity_threshold),
            ("context_overlap_threshold", self.context_overlap_threshold),
            ("confidence_threshold", self.confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RagError::ConfigError(format!(
                    "{name} ({value}) must be within [0, 1]"
                )));
            }
        }
        if self.collection.trim().is_empty() {
            return Err(RagError::ConfigError("collection must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of nearest chunks requested from the store.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the cap on unique chunks placed in the context window.
    pub fn max_context_chunks(mut self, cap: usize) -> Self {
        self.config.max_context_chunks = cap;
        self
    }

    /// Set the embedding-level duplicate threshold.
    pub fn embedding_similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.embedding_similarity_threshold = threshold;
        self
    }

    /// Set the word-overlap duplicate threshold used during context assembly.
    pub fn context_overlap_threshold(mut self, threshold: f32) -> Self {
        self.config.context_overlap_threshold = threshold;
        self
    }

    /// Set the confidence below which answers are replaced by the fallback message.
    pub fn confidence_threshold(mut self, threshold: f32) -> Self {
        self.config.confidence_threshold = threshold;
        self
    }

    /// Set the document store collection name.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.config.collection = name.into();
        self
    }

    /// Set the message returned in place of a gated answer.
    pub fn fallback_message(mut self, message: impl Into<String>) -> Self {
        self.config.fallback_message = message.into();
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_context_chunks, 3);
        assert!((config.embedding_similarity_threshold - 0.95).abs() < f32::EPSILON);
        assert!((config.context_overlap_threshold - 0.60).abs() < f32::EPSILON);
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        let err = RagConfig::builder().chunk_size(100).chunk_overlap(100).build().unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[test]
    fn zero_caps_are_rejected() {
        assert!(RagConfig::builder().top_k(0).build().is_err());
        assert!(RagConfig::builder().max_context_chunks(0).build().is_err());
    }

    #[test]
    fn thresholds_must_be_in_unit_range() {
        assert!(RagConfig::builder().confidence_threshold(1.5).build().is_err());
        assert!(RagConfig::builder().embedding_similarity_threshold(-0.1).build().is_err());
        assert!(RagConfig::builder().context_overlap_threshold(0.6).build().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: RagConfig = serde_json::from_str(r#"{"top_k": 4}"#).unwrap();
        assert_eq!(config.top_k, 4);
        assert_eq!(config.collection, "hmsreg_docs");
    }
}
