//! Context assembly: question → deduplicated, citation-bearing prompt.
//!
//! Retrieved candidates pass a layered redundancy check against every chunk
//! already accepted, short-circuiting at the first rule that matches:
//!
//! 1. identical normalised text
//! 2. one normalised text contains the other
//! 3. word-bag overlap `|A ∩ B| / |A ∪ B|` above the overlap threshold
//! 4. identical first sentence (text up to the first period)
//!
//! Acceptance stops at the context cap.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::chat::{ChatRequest, UserRole};
use crate::config::RagConfig;
use crate::document::{ChunkMetadata, QueryResult, SourceCitation, UNKNOWN_URL};
use crate::embedding::{EmbeddingIntent, EmbeddingProvider};
use crate::error::Result;
use crate::expansion::QueryExpander;
use crate::store::DocumentStore;

/// A retrieved chunk accepted into the context window.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextChunk {
    /// The chunk text as stored.
    pub content: String,
    /// Source metadata.
    pub metadata: ChunkMetadata,
}

/// Output of [`ContextAssembler::assemble`].
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    /// The full prompt for the generative model.
    pub prompt: String,
    /// One citation per distinct known URL, in first-seen order.
    pub citations: Vec<SourceCitation>,
    /// The chunks placed in the context window.
    pub chunks: Vec<ContextChunk>,
}

/// Lower-case and collapse whitespace.
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn first_sentence(normalized: &str) -> &str {
    normalized.split('.').next().unwrap_or_default().trim()
}

fn word_overlap(a: &str, b: &str) -> f32 {
    let a: HashSet<&str> = a.split_whitespace().collect();
    let b: HashSet<&str> = b.split_whitespace().collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f32 / union as f32
}

/// Whether `candidate` repeats `accepted`. Both must already be normalised.
pub fn is_redundant(candidate: &str, accepted: &str, overlap_threshold: f32) -> bool {
    if candidate == accepted {
        return true;
    }
    if accepted.contains(candidate) || candidate.contains(accepted) {
        return true;
    }
    if word_overlap(candidate, accepted) > overlap_threshold {
        return true;
    }
    let (a, b) = (first_sentence(candidate), first_sentence(accepted));
    !a.is_empty() && a == b
}

/// Pick at most `cap` non-redundant chunks from a retrieval result.
pub fn select_unique(result: &QueryResult, overlap_threshold: f32, cap: usize) -> Vec<ContextChunk> {
    let mut accepted: Vec<ContextChunk> = Vec::new();
    let mut accepted_norm: Vec<String> = Vec::new();

    for (document, metadata) in result.iter() {
        if accepted.len() >= cap {
            break;
        }
        let normalized = normalize(document);
        if normalized.is_empty() {
            continue;
        }
        if accepted_norm.iter().any(|seen| is_redundant(&normalized, seen, overlap_threshold)) {
            debug!(chunk_id = %metadata.chunk_id, "dropping redundant chunk");
            continue;
        }
        accepted_norm.push(normalized);
        accepted.push(ContextChunk { content: document.to_string(), metadata: metadata.clone() });
    }

    accepted
}

/// One citation per distinct URL other than `"Unknown"`, in first-seen order.
pub fn collect_citations<'a>(
    metadatas: impl IntoIterator<Item = &'a ChunkMetadata>,
) -> Vec<SourceCitation> {
    let mut seen = HashSet::new();
    metadatas
        .into_iter()
        .filter(|m| m.url != UNKNOWN_URL && seen.insert(m.url.clone()))
        .map(|m| SourceCitation { title: m.title.clone(), url: m.url.clone() })
        .collect()
}

/// Render accepted chunks as labelled blocks separated by blank lines.
pub fn format_context(chunks: &[ContextChunk]) -> String {
    chunks
        .iter()
        .map(|c| {
            format!(
                "Title: {}\nSource: {}\nContent: {}",
                c.metadata.title, c.metadata.url, c.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the final prompt from the context block and the original question.
pub fn build_prompt(context: &str, question: &str, role: UserRole) -> String {
    format!(
        "Context:\n{context}\n\n\
         {persona}\n\n\
         Question: {question}\n\n\
         Answer the question using only the context above. Synthesize the relevant \
         information across the sources into one coherent answer and do not repeat \
         passages verbatim. If the context does not contain the answer, say that you \
         don't know.",
        persona = role.persona_instruction(),
    )
}

/// Turns a [`ChatRequest`] into a prompt and citation list.
///
/// Holds no per-request state; one assembler serves concurrent requests.
pub struct ContextAssembler {
    config: RagConfig,
    expander: QueryExpander,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    document_store: Arc<dyn DocumentStore>,
}

impl ContextAssembler {
    /// Create an assembler.
    pub fn new(
        config: RagConfig,
        expander: QueryExpander,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        document_store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self { config, expander, embedding_provider, document_store }
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Expand → embed → retrieve → dedup → cap → cite → format.
    ///
    /// # Errors
    ///
    /// Propagates embedding and store failures unchanged.
    pub async fn assemble(&self, request: &ChatRequest) -> Result<AssembledContext> {
        let expanded = self.expander.expand(&request.message);
        let query_embedding =
            self.embedding_provider.embed(&expanded, EmbeddingIntent::Query).await?;

        let result = self
            .document_store
            .query_nearest(&self.config.collection, &query_embedding, self.config.top_k)
            .await?;
        if !result.is_aligned() {
            warn!(
                documents = result.documents.len(),
                metadatas = result.metadatas.len(),
                "retrieval result is misaligned, using common prefix"
            );
        }

        let chunks = select_unique(
            &result,
            self.config.context_overlap_threshold,
            self.config.max_context_chunks,
        );
        let citations = collect_citations(chunks.iter().map(|c| &c.metadata));
        let prompt = build_prompt(&format_context(&chunks), &request.message, request.user_role);

        info!(
            retrieved = result.len(),
            accepted = chunks.len(),
            citations = citations.len(),
            "assembled context"
        );

        Ok(AssembledContext { prompt, citations, chunks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(url: &str, title: &str) -> ChunkMetadata {
        ChunkMetadata { url: url.to_string(), title: title.to_string(), chunk_id: format!("{url}#0") }
    }

    #[test]
    fn exact_match_after_normalisation_is_redundant() {
        let a = normalize("  The HMS card   is required. ");
        let b = normalize("the hms card is required.");
        assert!(is_redundant(&a, &b, 0.6));
    }

    #[test]
    fn substring_is_redundant() {
        let a = normalize("crew lists are sent daily");
        let b = normalize("Before noon, crew lists are sent daily to the client.");
        assert!(is_redundant(&a, &b, 0.6));
        assert!(is_redundant(&b, &a, 0.6));
    }

    #[test]
    fn high_word_overlap_is_redundant() {
        let a = normalize("workers must check in at the gate every morning");
        let b = normalize("every morning workers must check in at the main gate");
        assert!(word_overlap(&a, &b) > 0.6);
        assert!(is_redundant(&a, &b, 0.6));
    }

    #[test]
    fn same_first_sentence_is_redundant() {
        let a = normalize("Suppliers register in the portal. Then they add employees.");
        let b = normalize("Suppliers register in the portal. Invoices are handled elsewhere entirely.");
        assert!(word_overlap(&a, &b) <= 0.6);
        assert!(is_redundant(&a, &b, 0.6));
    }

    #[test]
    fn distinct_texts_are_kept() {
        let a = normalize("The HMS card proves identity on site.");
        let b = normalize("Timesheets are approved by the project manager weekly.");
        assert!(!is_redundant(&a, &b, 0.6));
    }

    #[test]
    fn overlap_exactly_at_threshold_is_kept() {
        // 3 shared of 5 distinct words = 0.6
        assert!((word_overlap("a b c d", "a b c e") - 0.6).abs() < 1e-6);
        assert!(!is_redundant("a b c d", "a b c e", 0.6));
    }

    #[test]
    fn selection_caps_and_skips_duplicates() {
        let result = QueryResult {
            documents: vec![
                "Alpha text about cards.".into(),
                "alpha text about cards.".into(),
                "Beta text about crew lists.".into(),
                "Gamma text about timesheets.".into(),
                "Delta text about suppliers.".into(),
            ],
            metadatas: (0..5).map(|i| meta(&format!("https://d/{i}"), "T")).collect(),
        };
        let chunks = select_unique(&result, 0.6, 3);
        let urls: Vec<_> = chunks.iter().map(|c| c.metadata.url.as_str()).collect();
        assert_eq!(urls, vec!["https://d/0", "https://d/2", "https://d/3"]);
    }

    #[test]
    fn citations_are_unique_and_skip_unknown() {
        let metas = vec![
            meta("https://docs.example.com/a", "A"),
            meta(UNKNOWN_URL, "Nowhere"),
            meta("https://docs.example.com/b", "B"),
            meta("https://docs.example.com/a", "A again"),
        ];
        let citations = collect_citations(&metas);
        assert_eq!(
            citations,
            vec![
                SourceCitation { title: "A".into(), url: "https://docs.example.com/a".into() },
                SourceCitation { title: "B".into(), url: "https://docs.example.com/b".into() },
            ]
        );
    }

    #[test]
    fn context_blocks_are_labelled() {
        let chunks = vec![
            ContextChunk { content: "One.".into(), metadata: meta("https://d/1", "First") },
            ContextChunk { content: "Two.".into(), metadata: meta("https://d/2", "Second") },
        ];
        assert_eq!(
            format_context(&chunks),
            "Title: First\nSource: https://d/1\nContent: One.\n\n\
             Title: Second\nSource: https://d/2\nContent: Two."
        );
    }

    #[test]
    fn prompt_has_original_question_and_persona() {
        let prompt = build_prompt("ctx", "What is a reg card?", UserRole::ConstructionWorker);
        assert!(prompt.starts_with("Context:\nctx\n\n"));
        assert!(prompt.contains("Question: What is a reg card?"));
        assert!(prompt.contains("construction worker"));
        assert!(prompt.contains("only the context above"));
    }
}
