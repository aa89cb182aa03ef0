//! Gemini-backed [`Generator`].

use std::sync::Arc;

use async_trait::async_trait;
use docqa_rag::{ChatResponse, GenerationRequest, Generator, RagError, Result, SnapshotStream};
use futures::{Stream, StreamExt, future};
use serde_json::json;
use tracing::{debug, error, warn};

use crate::client::GeminiClient;
use crate::error::{Capability, GeminiError};
use crate::model::{Content, GenerateContentRequest, GenerationConfig, GenerationResponse, Model};

/// JSON schema the structured mode asks the model to fill.
pub fn response_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "answer": { "type": "STRING" },
            "citations": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "title": { "type": "STRING" },
                        "url": { "type": "STRING" }
                    },
                    "required": ["title", "url"]
                }
            },
            "confidence": { "type": "NUMBER" },
            "fallback_message": { "type": "STRING", "nullable": true },
            "suggested_queries": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "nullable": true
            }
        },
        "required": ["answer", "confidence"]
    })
}

/// Parse the model's JSON text into a [`ChatResponse`].
///
/// Tolerates a surrounding Markdown code fence.
pub fn parse_structured(text: &str) -> Result<ChatResponse> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).map_err(|e| {
        RagError::MalformedResponse(format!("structured answer is not valid JSON: {e}"))
    })
}

/// Fold incremental stream chunks into cumulative answer snapshots.
pub fn cumulative_snapshots<S>(chunks: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<GenerationResponse, GeminiError>> + Send,
{
    chunks.scan(String::new(), |answer, chunk| {
        let snapshot = match chunk {
            Ok(response) => {
                answer.push_str(&response.text());
                Ok(answer.clone())
            }
            Err(e) => {
                warn!(provider = "Gemini", error = %e, "stream chunk failed");
                Err(e.into_rag(Capability::Generation))
            }
        };
        future::ready(Some(snapshot))
    })
}

/// A [`Generator`] backed by the Gemini `generateContent` API.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_gemini::{GeminiClient, GeminiGenerator};
///
/// let generator = GeminiGenerator::new(Arc::new(GeminiClient::from_env()?));
/// let response = generator.generate_structured(&GenerationRequest::structured(prompt)).await?;
/// ```
pub struct GeminiGenerator {
    client: Arc<GeminiClient>,
    model: Model,
    temperature: Option<f32>,
}

impl GeminiGenerator {
    /// Create a generator using the default Gemini model.
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self { client, model: Model::default(), temperature: None }
    }

    /// Use a different model.
    pub fn with_model(mut self, model: impl Into<Model>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn build_request(&self, request: &GenerationRequest, structured: bool) -> GenerateContentRequest {
        let generation_config = GenerationConfig {
            temperature: self.temperature,
            response_mime_type: structured.then(|| "application/json".to_string()),
            response_schema: structured.then(response_schema),
        };
        GenerateContentRequest {
            contents: vec![Content::user(request.prompt.clone())],
            system_instruction: Some(Content::text(request.instructions.clone())),
            generation_config: Some(generation_config),
        }
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate_structured(&self, request: &GenerationRequest) -> Result<ChatResponse> {
        let body = self.build_request(request, true);
        let response = self.client.generate_content(&self.model, &body).await.map_err(|e| {
            error!(provider = "Gemini", error = %e, "structured generation failed");
            e.into_rag(Capability::Generation)
        })?;

        let text = response.text();
        if text.trim().is_empty() {
            return Err(GeminiError::EmptyResponse { reason: response.blocked_reason() }
                .into_rag(Capability::Generation));
        }
        let parsed = parse_structured(&text)?;
        debug!(confidence = parsed.confidence, "structured answer parsed");
        Ok(parsed)
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<SnapshotStream> {
        let body = self.build_request(request, false);
        let chunks =
            self.client.generate_content_stream(&self.model, &body).await.map_err(|e| {
                error!(provider = "Gemini", error = %e, "failed to open generation stream");
                e.into_rag(Capability::Generation)
            })?;
        Ok(Box::pin(cumulative_snapshots(chunks)))
    }
}
