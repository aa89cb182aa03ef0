//! Generative model trait with structured and cumulative-streaming modes.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::chat::ChatResponse;
use crate::error::Result;

/// System instruction for structured, JSON-shaped answers.
pub const STRUCTURED_INSTRUCTIONS: &str = "You are a helpful assistant for the HMSREG \
construction registration system. Use the provided context to answer the user's question. \
If you don't know the answer, just say that you don't know. Report your confidence in the \
answer as a number between 0 and 1. If the question is ambiguous, give a short guiding \
statement as the answer and list clarifying questions in suggested_queries. \
You must output a JSON object matching the response schema.";

/// System instruction for plain-text streaming answers.
pub const STREAMING_INSTRUCTIONS: &str = "You are a helpful assistant for the HMSREG \
construction registration system. Use the provided context to answer the user's question. \
If you don't know the answer, just say that you don't know.";

/// A stream of cumulative answer snapshots. Each item is the full answer so far.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A prompt plus the system instruction it runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// The user-turn prompt, context included.
    pub prompt: String,
    /// The system instruction.
    pub instructions: String,
}

impl GenerationRequest {
    /// A request for a structured answer.
    pub fn structured(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), instructions: STRUCTURED_INSTRUCTIONS.to_string() }
    }

    /// A request for a streamed plain-text answer.
    pub fn streaming(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), instructions: STREAMING_INSTRUCTIONS.to_string() }
    }
}

/// A generative model.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{GenerationRequest, Generator};
/// use futures::StreamExt;
///
/// let response = generator.generate_structured(&GenerationRequest::structured(prompt)).await?;
/// let mut snapshots = generator.generate_stream(&GenerationRequest::streaming(prompt)).await?;
/// while let Some(snapshot) = snapshots.next().await {
///     println!("{}", snapshot?);
/// }
/// ```
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce a single structured answer.
    async fn generate_structured(&self, request: &GenerationRequest) -> Result<ChatResponse>;

    /// Produce a stream of cumulative answer snapshots.
    ///
    /// Dropping the stream releases the upstream connection.
    async fn generate_stream(&self, request: &GenerationRequest) -> Result<SnapshotStream>;
}
