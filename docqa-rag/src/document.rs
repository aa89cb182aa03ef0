//! Data types for source pages, stored chunks, and retrieval results.

use serde::{Deserialize, Serialize};

/// URL recorded for chunks whose source is not known.
pub const UNKNOWN_URL: &str = "Unknown";

/// Title recorded for chunks whose source has no title.
pub const UNTITLED: &str = "Untitled";

/// A page of cleaned documentation text, ready to be split and ingested.
///
/// Crawling and HTML extraction happen upstream; this is their output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourcePage {
    /// The page URL.
    pub url: String,
    /// The page title, if the extractor found one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The extracted article text.
    pub text: String,
}

/// A slice of a source page's text, the unit of retrieval.
///
/// Immutable once stored. An empty `embedding` marks an embedding failure
/// and keeps the chunk out of the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// The source page URL.
    pub url: String,
    /// The source page title.
    pub title: String,
    /// Unique identifier derived from the URL and the chunk's ordinal.
    pub chunk_id: String,
    /// The chunk text.
    pub content: String,
    /// Document-intent embedding of `content`.
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl Chunk {
    /// Whether this chunk carries a usable embedding.
    pub fn is_embedded(&self) -> bool {
        !self.embedding.is_empty()
    }

    /// The metadata record stored alongside the chunk.
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            url: self.url.clone(),
            title: self.title.clone(),
            chunk_id: self.chunk_id.clone(),
        }
    }
}

fn unknown_url() -> String {
    UNKNOWN_URL.to_string()
}

fn untitled() -> String {
    UNTITLED.to_string()
}

/// Metadata returned with each retrieved chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// The source page URL, `"Unknown"` if the store has none.
    #[serde(default = "unknown_url")]
    pub url: String,
    /// The source page title, `"Untitled"` if the store has none.
    #[serde(default = "untitled")]
    pub title: String,
    /// The chunk identifier.
    #[serde(default)]
    pub chunk_id: String,
}

/// The nearest chunks for one query embedding.
///
/// `documents` and `metadatas` are positionally aligned and ordered by
/// descending similarity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    /// Chunk texts.
    pub documents: Vec<String>,
    /// Metadata for each entry of `documents`.
    pub metadatas: Vec<ChunkMetadata>,
}

impl QueryResult {
    /// Number of aligned (document, metadata) pairs.
    pub fn len(&self) -> usize {
        self.documents.len().min(self.metadatas.len())
    }

    /// Whether the result holds no aligned pairs.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the two arrays have the same length.
    pub fn is_aligned(&self) -> bool {
        self.documents.len() == self.metadatas.len()
    }

    /// Iterate over aligned (document, metadata) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChunkMetadata)> {
        self.documents.iter().map(String::as_str).zip(self.metadatas.iter())
    }
}

/// A source shown to the user next to an answer. Unique by `url`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SourceCitation {
    /// The source page title.
    pub title: String,
    /// The source page URL.
    pub url: String,
}
