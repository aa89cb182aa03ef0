//! Streaming events and cumulative-snapshot delta extraction.
//!
//! Upstream streaming yields the *whole answer so far* on every read. The
//! [`DeltaExtractor`] folds those snapshots into incremental tokens and
//! enforces the event ordering of one streamed answer:
//!
//! ```text
//! Init ─┬─> FallbackEmitted                 (terminal)
//!       ├─> SuggestionsEmitted              (terminal)
//!       └─> Streaming ─> CitationsEmitted   (terminal)
//! any ──> ErrorEmitted                      (terminal)
//! ```

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::document::SourceCitation;

/// One event of a streamed answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Newly generated answer text.
    Token(String),
    /// Sources for the answer. Always the last event of a successful stream.
    Citation(Vec<SourceCitation>),
    /// The answer failed the confidence check.
    Fallback(String),
    /// The question was ambiguous; clarifying queries to offer.
    Suggestions(Vec<String>),
    /// The request failed.
    Error(String),
}

impl StreamEvent {
    /// The wire name of the event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::Citation(_) => "citation",
            Self::Fallback(_) => "fallback",
            Self::Suggestions(_) => "suggestions",
            Self::Error(_) => "error",
        }
    }

    /// Whether no event may follow this one.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Token(_))
    }

    /// Render as a server-sent-events frame: `data: {json}\n\n`.
    pub fn to_sse_frame(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => format!("data: {json}\n\n"),
            Err(e) => {
                warn!(error = %e, "failed to encode stream event");
                String::from("data: {\"type\":\"error\",\"content\":\"\"}\n\n")
            }
        }
    }
}

/// Position of a [`DeltaExtractor`] in the event state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamPhase {
    Init,
    Streaming,
    FallbackEmitted,
    SuggestionsEmitted,
    CitationsEmitted,
    ErrorEmitted,
}

impl StreamPhase {
    /// Whether the phase accepts no further events.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Init | Self::Streaming)
    }
}

/// Converts cumulative snapshots into token deltas.
///
/// Every method returns `None` once a terminal event has been produced.
#[derive(Debug, Clone)]
pub struct DeltaExtractor {
    accumulated: String,
    phase: StreamPhase,
}

impl Default for DeltaExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl DeltaExtractor {
    /// A fresh extractor in [`StreamPhase::Init`].
    pub fn new() -> Self {
        Self { accumulated: String::new(), phase: StreamPhase::Init }
    }

    /// Current phase.
    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Text reconstructed so far.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Feed the next cumulative snapshot.
    ///
    /// A snapshot that extends the accumulated text yields only the new
    /// suffix. Any other non-empty snapshot that differs from the accumulated
    /// text is emitted whole and becomes the new baseline. A repeat of the
    /// accumulated text yields nothing.
    pub fn next_event(&mut self, snapshot: &str) -> Option<StreamEvent> {
        if self.phase.is_terminal() {
            return None;
        }
        self.phase = StreamPhase::Streaming;

        // A repeated snapshot is an empty delta.
        if snapshot == self.accumulated {
            return None;
        }

        if snapshot.len() > self.accumulated.len() && snapshot.starts_with(&self.accumulated) {
            let delta = snapshot[self.accumulated.len()..].to_string();
            self.accumulated = snapshot.to_string();
            return Some(StreamEvent::Token(delta));
        }

        warn!(
            accumulated_len = self.accumulated.len(),
            snapshot_len = snapshot.len(),
            "snapshot does not extend accumulated text, resetting"
        );
        self.accumulated = snapshot.to_string();
        Some(StreamEvent::Token(snapshot.to_string()))
    }

    /// Emit the fallback event. Only valid before any token.
    pub fn fallback(&mut self, message: impl Into<String>) -> Option<StreamEvent> {
        self.short_circuit(StreamPhase::FallbackEmitted, StreamEvent::Fallback(message.into()))
    }

    /// Emit the suggestions event. Only valid before any token.
    pub fn suggestions(&mut self, queries: Vec<String>) -> Option<StreamEvent> {
        self.short_circuit(StreamPhase::SuggestionsEmitted, StreamEvent::Suggestions(queries))
    }

    /// Emit the terminal citation event.
    pub fn finish(&mut self, citations: Vec<SourceCitation>) -> Option<StreamEvent> {
        if self.phase.is_terminal() {
            return None;
        }
        self.phase = StreamPhase::CitationsEmitted;
        Some(StreamEvent::Citation(citations))
    }

    /// Emit the terminal error event.
    pub fn fail(&mut self, message: impl Into<String>) -> Option<StreamEvent> {
        if self.phase.is_terminal() {
            return None;
        }
        self.phase = StreamPhase::ErrorEmitted;
        Some(StreamEvent::Error(message.into()))
    }

    fn short_circuit(&mut self, phase: StreamPhase, event: StreamEvent) -> Option<StreamEvent> {
        if self.phase != StreamPhase::Init {
            return None;
        }
        self.phase = phase;
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(snapshots: &[&str]) -> Vec<String> {
        let mut extractor = DeltaExtractor::new();
        snapshots
            .iter()
            .filter_map(|s| extractor.next_event(s))
            .map(|e| match e {
                StreamEvent::Token(t) => t,
                other => panic!("unexpected event {other:?}"),
            })
            .collect()
    }

    #[test]
    fn cumulative_snapshots_become_deltas() {
        assert_eq!(tokens(&["To", "To get", "To get a card"]), vec!["To", " get", " a card"]);
    }

    #[test]
    fn non_prefix_snapshot_resets() {
        let mut extractor = DeltaExtractor::new();
        extractor.next_event("Hello wor");
        assert_eq!(extractor.next_event("Hi"), Some(StreamEvent::Token("Hi".into())));
        assert_eq!(extractor.accumulated(), "Hi");
        assert_eq!(extractor.next_event("Hi there"), Some(StreamEvent::Token(" there".into())));
    }

    #[test]
    fn shorter_prefix_snapshot_resets() {
        let mut extractor = DeltaExtractor::new();
        extractor.next_event("To get");
        assert_eq!(extractor.next_event("To"), Some(StreamEvent::Token("To".into())));
    }

    #[test]
    fn repeated_snapshot_emits_nothing() {
        assert_eq!(tokens(&["", "To", "To", "To go"]), vec!["To", " go"]);
    }

    #[test]
    fn multibyte_deltas_split_on_char_boundaries() {
        assert_eq!(tokens(&["Få", "Få HMS-kort"]), vec!["Få", " HMS-kort"]);
    }

    #[test]
    fn citations_end_the_stream() {
        let mut extractor = DeltaExtractor::new();
        extractor.next_event("Done");
        let citation = SourceCitation { title: "T".into(), url: "https://d/t".into() };
        assert_eq!(
            extractor.finish(vec![citation.clone()]),
            Some(StreamEvent::Citation(vec![citation]))
        );
        assert_eq!(extractor.phase(), StreamPhase::CitationsEmitted);
        assert!(extractor.next_event("Done more").is_none());
        assert!(extractor.fail("late").is_none());
    }

    #[test]
    fn fallback_only_before_tokens() {
        let mut extractor = DeltaExtractor::new();
        assert!(extractor.fallback("rephrase").is_some());
        assert!(extractor.finish(vec![]).is_none());

        let mut extractor = DeltaExtractor::new();
        extractor.next_event("token");
        assert!(extractor.suggestions(vec!["a".into()]).is_none());
    }

    #[test]
    fn error_is_terminal_from_streaming() {
        let mut extractor = DeltaExtractor::new();
        extractor.next_event("partial");
        assert_eq!(extractor.fail("boom"), Some(StreamEvent::Error("boom".into())));
        assert!(extractor.phase().is_terminal());
        assert!(extractor.finish(vec![]).is_none());
    }

    #[test]
    fn events_serialize_with_type_and_content() {
        let frame = StreamEvent::Token("Hi".into()).to_sse_frame();
        assert_eq!(frame, "data: {\"type\":\"token\",\"content\":\"Hi\"}\n\n");

        let citation = StreamEvent::Citation(vec![SourceCitation {
            title: "Crew".into(),
            url: "https://d/crew".into(),
        }]);
        let json = serde_json::to_value(&citation).unwrap();
        assert_eq!(json["type"], "citation");
        assert_eq!(json["content"][0]["url"], "https://d/crew");
        assert_eq!(citation.kind(), "citation");
        assert!(citation.is_terminal());
    }
}
