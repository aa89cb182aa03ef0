//! Confidence gate for structured answers.

use tracing::{debug, info};

use crate::chat::ChatResponse;
use crate::config::DEFAULT_FALLBACK_MESSAGE;

/// Replaces low-confidence answers with a fixed fallback message.
///
/// Only a `confidence` strictly below the threshold triggers the gate; a
/// missing confidence passes. A non-finite confidence is treated as failing.
/// Suggested queries are left untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceGate {
    threshold: f32,
    fallback_message: String,
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self::new(0.7, DEFAULT_FALLBACK_MESSAGE)
    }
}

impl ConfidenceGate {
    /// Create a gate with the given threshold and fallback message.
    pub fn new(threshold: f32, fallback_message: impl Into<String>) -> Self {
        Self { threshold, fallback_message: fallback_message.into() }
    }

    /// The confidence threshold.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Whether `response` would be replaced by the fallback.
    pub fn rejects(&self, response: &ChatResponse) -> bool {
        match response.confidence {
            Some(confidence) if !confidence.is_finite() => true,
            Some(confidence) => confidence < self.threshold,
            None => false,
        }
    }

    /// Apply the gate. A rejected answer is discarded, never returned.
    pub fn apply(&self, mut response: ChatResponse) -> ChatResponse {
        if !self.rejects(&response) {
            return response;
        }

        info!(
            confidence = response.confidence,
            threshold = self.threshold,
            "answer below confidence threshold, returning fallback"
        );
        debug!(discarded_answer = %response.answer, "low-confidence answer");

        response.answer.clear();
        response.citations.clear();
        response.fallback_message = Some(self.fallback_message.clone());
        response
    }
}
