//! Errors raised by the Gemini REST client.

use docqa_rag::RagError;
use eventsource_stream::EventStreamError;
use reqwest::header::InvalidHeaderValue;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GeminiError {
    #[snafu(display("no API key configured"))]
    MissingApiKey,

    #[snafu(display("failed to parse API key"))]
    InvalidApiKey { source: InvalidHeaderValue },

    #[snafu(display("failed to build HTTP client"))]
    BuildClient { source: reqwest::Error },

    #[snafu(display("failed to construct URL (probably incorrect model name): {suffix}"))]
    ConstructUrl { source: url::ParseError, suffix: String },

    #[snafu(display("failed to perform request"))]
    PerformRequest { source: reqwest::Error },

    #[snafu(display(
        "bad response from server; code {code}; description: {}",
        description.as_deref().unwrap_or("none")
    ))]
    BadResponse {
        /// HTTP status code
        code: u16,
        /// HTTP error description
        description: Option<String>,
    },

    #[snafu(display("failed to obtain stream SSE part"))]
    BadPart { source: EventStreamError<reqwest::Error> },

    #[snafu(display("failed to deserialize JSON response"))]
    Deserialize { source: serde_json::Error },

    #[snafu(display("failed to decode response body"))]
    DecodeResponse { source: reqwest::Error },

    #[snafu(display("response contained no text{}", reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default()))]
    EmptyResponse { reason: Option<String> },
}

/// Which side of the provider boundary an error crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Capability {
    Embedding,
    Generation,
}

impl GeminiError {
    /// Map onto the pipeline error taxonomy.
    pub(crate) fn into_rag(self, capability: Capability) -> RagError {
        let provider = "Gemini".to_string();
        match self {
            GeminiError::MissingApiKey => RagError::MissingCredentials { provider },
            GeminiError::Deserialize { .. } | GeminiError::EmptyResponse { .. } => {
                RagError::MalformedResponse(display_chain(&self))
            }
            other => {
                let message = display_chain(&other);
                match capability {
                    Capability::Embedding => RagError::EmbeddingError { provider, message },
                    Capability::Generation => RagError::GenerationError { provider, message },
                }
            }
        }
    }
}

/// `outer: inner: ...` so the root cause survives conversion to a string.
fn display_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_degraded() {
        let err = GeminiError::MissingApiKey.into_rag(Capability::Embedding);
        assert!(err.is_degraded());
    }

    #[test]
    fn bad_response_is_provider_unavailable() {
        let err = GeminiError::BadResponse { code: 503, description: Some("overloaded".into()) }
            .into_rag(Capability::Generation);
        assert!(err.is_provider_unavailable());
        assert!(err.to_string().contains("503"));
        assert!(matches!(err, RagError::GenerationError { .. }));
    }

    #[test]
    fn undecodable_output_is_malformed() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = GeminiError::Deserialize { source }.into_rag(Capability::Generation);
        assert!(matches!(err, RagError::MalformedResponse(ref m) if m.starts_with("failed to deserialize")));
    }
}
