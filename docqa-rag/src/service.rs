//! Chat service: the public entry points for answering questions.
//!
//! [`ChatService`] composes a [`ContextAssembler`], a [`Generator`] and a
//! [`ConfidenceGate`]. Neither entry point returns an error: failures become
//! an apologetic [`ChatResponse`] or a terminal [`StreamEvent::Error`].
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{ChatRequest, ChatService, InMemoryDocumentStore, RagConfig};
//! use futures::StreamExt;
//!
//! let service = ChatService::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(embedder)
//!     .document_store(Arc::new(InMemoryDocumentStore::new()))
//!     .generator(generator)
//!     .build()?;
//!
//! let mut events = std::pin::pin!(service.stream_chat_response(ChatRequest::new("What is a crew list?")));
//! while let Some(event) = events.next().await {
//!     print!("{}", event.to_sse_frame());
//! }
//! ```

use std::sync::Arc;

use async_stream::stream;
use futures::{Stream, StreamExt};
use tracing::{Instrument, Span, error, info, info_span};
use uuid::Uuid;

use crate::chat::{ChatRequest, ChatResponse};
use crate::config::RagConfig;
use crate::context::ContextAssembler;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::expansion::{QueryExpander, SynonymTable};
use crate::gate::ConfidenceGate;
use crate::generation::{GenerationRequest, Generator};
use crate::store::DocumentStore;
use crate::stream::{DeltaExtractor, StreamEvent};

/// Text returned to the user when a request fails.
pub const ERROR_MESSAGE: &str = "I encountered an error while processing your request.";

fn request_span(request: &ChatRequest, streaming: bool) -> Span {
    info_span!(
        "chat.request",
        request.id = %Uuid::new_v4(),
        user.role = %request.user_role,
        streaming,
    )
}

/// Answers questions against the document store.
///
/// Holds only read-only collaborators; one service serves any number of
/// concurrent requests.
pub struct ChatService {
    assembler: ContextAssembler,
    generator: Arc<dyn Generator>,
    gate: ConfidenceGate,
}

impl ChatService {
    /// Create a new [`ChatServiceBuilder`].
    pub fn builder() -> ChatServiceBuilder {
        ChatServiceBuilder::default()
    }

    /// Create a service from its parts.
    pub fn new(assembler: ContextAssembler, generator: Arc<dyn Generator>) -> Self {
        let config = assembler.config();
        let gate = ConfidenceGate::new(config.confidence_threshold, config.fallback_message.clone());
        Self { assembler, generator, gate }
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &RagConfig {
        self.assembler.config()
    }

    /// Answer a question with a single structured response.
    ///
    /// Citations come from the retrieved context. The confidence gate runs
    /// last. On failure the answer is [`ERROR_MESSAGE`] with no citations.
    pub async fn generate_chat_response(&self, request: ChatRequest) -> ChatResponse {
        let span = request_span(&request, false);
        async move {
            match self.answer(&request).await {
                Ok(response) => {
                    info!(
                        citations = response.citations.len(),
                        fallback = response.fallback_message.is_some(),
                        "answered request"
                    );
                    response
                }
                Err(e) => {
                    error!(error = %e, "chat request failed");
                    ChatResponse::answer(ERROR_MESSAGE)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn answer(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let context = self.assembler.assemble(request).await?;
        let mut response =
            self.generator.generate_structured(&GenerationRequest::structured(context.prompt)).await?;
        response.citations = context.citations;
        Ok(self.gate.apply(response))
    }

    /// Answer a question as a stream of events.
    ///
    /// A structured pre-check runs first: a gated answer ends the stream with
    /// [`StreamEvent::Fallback`], an ambiguous one with
    /// [`StreamEvent::Suggestions`]. Otherwise tokens are streamed and the
    /// stream ends with [`StreamEvent::Citation`]. Any failure ends it with
    /// [`StreamEvent::Error`]. Dropping the stream stops the upstream read.
    pub fn stream_chat_response(
        &self,
        request: ChatRequest,
    ) -> impl Stream<Item = StreamEvent> + Send + '_ {
        let span = request_span(&request, true);
        stream! {
            let mut extractor = DeltaExtractor::new();

            let context = match self.assembler.assemble(&request).instrument(span.clone()).await {
                Ok(context) => context,
                Err(e) => {
                    span.in_scope(|| error!(error = %e, "context assembly failed"));
                    if let Some(event) = extractor.fail(ERROR_MESSAGE) {
                        yield event;
                    }
                    return;
                }
            };

            let precheck = self
                .generator
                .generate_structured(&GenerationRequest::structured(context.prompt.clone()))
                .instrument(span.clone())
                .await
                .map(|response| self.gate.apply(response));
            let precheck = match precheck {
                Ok(precheck) => precheck,
                Err(e) => {
                    span.in_scope(|| error!(error = %e, "structured pre-check failed"));
                    if let Some(event) = extractor.fail(ERROR_MESSAGE) {
                        yield event;
                    }
                    return;
                }
            };

            if let Some(message) = precheck.fallback_message {
                span.in_scope(|| info!("streaming fallback"));
                if let Some(event) = extractor.fallback(message) {
                    yield event;
                }
                return;
            }
            if let Some(queries) = precheck.suggested_queries.filter(|q| !q.is_empty()) {
                span.in_scope(|| info!(count = queries.len(), "streaming suggestions"));
                if let Some(event) = extractor.suggestions(queries) {
                    yield event;
                }
                return;
            }

            let snapshots = self
                .generator
                .generate_stream(&GenerationRequest::streaming(context.prompt))
                .instrument(span.clone())
                .await;
            let mut snapshots = match snapshots {
                Ok(snapshots) => snapshots,
                Err(e) => {
                    span.in_scope(|| error!(error = %e, "failed to open generation stream"));
                    if let Some(event) = extractor.fail(ERROR_MESSAGE) {
                        yield event;
                    }
                    return;
                }
            };

            while let Some(snapshot) = snapshots.next().instrument(span.clone()).await {
                match snapshot {
                    Ok(snapshot) => {
                        if let Some(event) = extractor.next_event(&snapshot) {
                            yield event;
                        }
                    }
                    Err(e) => {
                        span.in_scope(|| error!(error = %e, "generation stream failed"));
                        if let Some(event) = extractor.fail(ERROR_MESSAGE) {
                            yield event;
                        }
                        return;
                    }
                }
            }

            span.in_scope(|| {
                info!(
                    answer_len = extractor.accumulated().len(),
                    citations = context.citations.len(),
                    "stream complete"
                )
            });
            if let Some(event) = extractor.finish(context.citations) {
                yield event;
            }
        }
    }
}

/// Builder for constructing a [`ChatService`].
#[derive(Default)]
pub struct ChatServiceBuilder {
    config: Option<RagConfig>,
    synonyms: Option<SynonymTable>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    document_store: Option<Arc<dyn DocumentStore>>,
    generator: Option<Arc<dyn Generator>>,
}

impl ChatServiceBuilder {
    /// Set the configuration. Defaults to [`RagConfig::default`].
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the synonym table. Defaults to [`SynonymTable::hmsreg_default`].
    pub fn synonyms(mut self, table: SynonymTable) -> Self {
        self.synonyms = Some(table);
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

    /// Set the generative model.
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Build the service.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required collaborator is missing
    /// or the configuration is invalid.
    pub fn build(self) -> Result<ChatService> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let document_store = self
            .document_store
            .ok_or_else(|| RagError::ConfigError("document_store is required".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| RagError::ConfigError("generator is required".to_string()))?;

        let expander = QueryExpander::new(self.synonyms.unwrap_or_else(SynonymTable::hmsreg_default));
        let assembler = ContextAssembler::new(config, expander, embedding_provider, document_store);
        Ok(ChatService::new(assembler, generator))
    }
}
