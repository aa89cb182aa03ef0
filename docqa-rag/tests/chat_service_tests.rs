//! End-to-end answering through `ChatService` with scripted providers.

mod common;

use std::sync::Arc;

use common::{FailingEmbedder, FnEmbedder, ScriptedGenerator, unit};
use docqa_rag::{
    ChatRequest, ChatResponse, ChatService, Chunk, DocumentStore, ERROR_MESSAGE,
    EmbeddingProvider, InMemoryDocumentStore, RagConfig, RagError, StreamEvent, UserRole,
};
use futures::StreamExt;

const COLLECTION: &str = "hmsreg_docs";

fn chunk(url: &str, index: usize, content: &str, degrees: f32) -> Chunk {
    Chunk {
        url: url.to_string(),
        title: format!("Title of {url}"),
        chunk_id: format!("{url}#{index}"),
        content: content.to_string(),
        embedding: unit(degrees),
    }
}

async fn store_with(chunks: &[Chunk]) -> Arc<InMemoryDocumentStore> {
    let store = Arc::new(InMemoryDocumentStore::new());
    store.create_collection(COLLECTION).await.unwrap();
    store.add_chunks(COLLECTION, chunks).await.unwrap();
    store
}

fn query_embedder() -> Arc<dyn EmbeddingProvider> {
    Arc::new(FnEmbedder::new(2, |_: &str| unit(0.0)))
}

fn service(
    store: Arc<InMemoryDocumentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: ScriptedGenerator,
) -> ChatService {
    ChatService::builder()
        .config(RagConfig::default())
        .embedding_provider(embedder)
        .document_store(store)
        .generator(Arc::new(generator))
        .build()
        .unwrap()
}

fn confident(answer: &str) -> ChatResponse {
    ChatResponse::answer(answer).with_confidence(0.9)
}

fn context_blocks(prompt: &str) -> usize {
    prompt.matches("\nContent: ").count()
}

#[tokio::test]
async fn near_identical_chunks_never_exceed_context_cap() {
    let chunks: Vec<Chunk> = (0..10)
        .map(|i| {
            chunk(
                &format!("https://docs.hmsreg.com/?ID={i}"),
                0,
                &format!("Workers must carry a valid HMS card on every construction site {i}."),
                i as f32 * 0.1,
            )
        })
        .collect();
    let generator = ScriptedGenerator::answering(confident("Carry the card."), &[]);
    let service = service(store_with(&chunks).await, query_embedder(), generator.clone());

    let response = service.generate_chat_response(ChatRequest::new("Do I need a card?")).await;

    let prompt = generator.last_prompt().unwrap();
    let blocks = context_blocks(&prompt);
    assert!((1..=3).contains(&blocks), "got {blocks} context blocks");
    assert_eq!(response.citations.len(), blocks);
}

#[tokio::test]
async fn distinct_chunks_are_capped_at_three() {
    let topics = [
        "The HMS card proves identity on site.",
        "Crew lists are submitted by the main contractor.",
        "Timesheets are approved weekly by the project manager.",
        "Suppliers register their company in the portal.",
        "Check-in happens at the gate terminal each morning.",
    ];
    let chunks: Vec<Chunk> = topics
        .iter()
        .enumerate()
        .map(|(i, text)| chunk(&format!("https://docs.hmsreg.com/{i}"), 0, text, i as f32 * 5.0))
        .collect();
    let generator = ScriptedGenerator::answering(confident("Several things."), &[]);
    let service = service(store_with(&chunks).await, query_embedder(), generator.clone());

    let response = service.generate_chat_response(ChatRequest::new("Overview?")).await;

    assert_eq!(context_blocks(&generator.last_prompt().unwrap()), 3);
    let urls: Vec<_> = response.citations.iter().map(|c| c.url.as_str()).collect();
    assert_eq!(
        urls,
        vec!["https://docs.hmsreg.com/0", "https://docs.hmsreg.com/1", "https://docs.hmsreg.com/2"]
    );
}

#[tokio::test]
async fn chunks_sharing_a_url_yield_one_citation() {
    let chunks = vec![
        chunk("https://docs.hmsreg.com/card", 0, "Order the HMS card through your employer.", 0.0),
        chunk("https://docs.hmsreg.com/card", 1, "Lost cards are blocked by calling support.", 1.0),
    ];
    let generator = ScriptedGenerator::answering(confident("Ask your employer."), &[]);
    let service = service(store_with(&chunks).await, query_embedder(), generator);

    let response = service.generate_chat_response(ChatRequest::new("How do I get a card?")).await;

    assert_eq!(response.citations.len(), 1);
    assert_eq!(response.citations[0].url, "https://docs.hmsreg.com/card");
    assert_eq!(response.answer, "Ask your employer.");
}

#[tokio::test]
async fn prompt_keeps_original_question_and_role() {
    let chunks = vec![chunk("https://docs.hmsreg.com/card", 0, "Order the HMS card.", 0.0)];
    let generator = ScriptedGenerator::answering(confident("Order it."), &[]);
    let service = service(store_with(&chunks).await, query_embedder(), generator.clone());

    service
        .generate_chat_response(
            ChatRequest::new("Hvordan får jeg hms-kort?").with_role(UserRole::ConstructionWorker),
        )
        .await;

    let prompt = generator.last_prompt().unwrap();
    assert!(prompt.contains("Question: Hvordan får jeg hms-kort?\n"));
    assert!(!prompt.contains("construction ID card"));
    assert!(prompt.contains(UserRole::ConstructionWorker.persona_instruction()));
}

#[tokio::test]
async fn low_confidence_answer_becomes_fallback() {
    let chunks = vec![chunk("https://docs.hmsreg.com/card", 0, "Order the HMS card.", 0.0)];
    let generator =
        ScriptedGenerator::answering(ChatResponse::answer("Maybe?").with_confidence(0.69), &[]);
    let service = service(store_with(&chunks).await, query_embedder(), generator);

    let response = service.generate_chat_response(ChatRequest::new("What is a reg card?")).await;

    assert!(response.answer.is_empty());
    assert!(response.citations.is_empty());
    assert_eq!(response.fallback_message.as_deref(), Some(RagConfig::default().fallback_message.as_str()));
}

#[tokio::test]
async fn provider_failure_returns_apology() {
    let store = store_with(&[]).await;
    let generator = ScriptedGenerator::answering(confident("unused"), &[]);
    let service = service(store, Arc::new(FailingEmbedder { degraded: false }), generator);

    let response = service.generate_chat_response(ChatRequest::new("anything")).await;

    assert_eq!(response.answer, ERROR_MESSAGE);
    assert!(response.citations.is_empty());
}

async fn collect(service: &ChatService, message: &str) -> Vec<StreamEvent> {
    service.stream_chat_response(ChatRequest::new(message)).collect().await
}

#[tokio::test]
async fn stream_emits_deltas_then_citations() {
    let chunks = vec![chunk("https://docs.hmsreg.com/card", 0, "Order the HMS card.", 0.0)];
    let generator =
        ScriptedGenerator::answering(confident("To get a card"), &["To", "To get", "To get a card"]);
    let service = service(store_with(&chunks).await, query_embedder(), generator);

    let events = collect(&service, "How do I get a card?").await;

    let (last, tokens) = events.split_last().unwrap();
    let text: String = tokens
        .iter()
        .map(|e| match e {
            StreamEvent::Token(t) => t.as_str(),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(tokens.len(), 3);
    assert_eq!(text, "To get a card");
    match last {
        StreamEvent::Citation(citations) => {
            assert_eq!(citations.len(), 1);
            assert_eq!(citations[0].url, "https://docs.hmsreg.com/card");
        }
        other => panic!("expected citations, got {other:?}"),
    }
}

#[tokio::test]
async fn stream_short_circuits_on_fallback() {
    let chunks = vec![chunk("https://docs.hmsreg.com/card", 0, "Order the HMS card.", 0.0)];
    let generator = ScriptedGenerator::answering(
        ChatResponse::answer("Unsure").with_confidence(0.2),
        &["never", "never streamed"],
    );
    let service = service(store_with(&chunks).await, query_embedder(), generator);

    let events = collect(&service, "What is a reg card?").await;

    assert_eq!(events, vec![StreamEvent::Fallback(RagConfig::default().fallback_message)]);
}

#[tokio::test]
async fn stream_short_circuits_on_suggestions() {
    let chunks = vec![chunk("https://docs.hmsreg.com/card", 0, "Order the HMS card.", 0.0)];
    let suggestions = vec!["How do I get an HMS card?".to_string(), "How do I renew it?".to_string()];
    let generator = ScriptedGenerator::answering(
        confident("Which card do you mean?").with_suggestions(suggestions.clone()),
        &["never"],
    );
    let service = service(store_with(&chunks).await, query_embedder(), generator);

    let events = collect(&service, "card").await;

    assert_eq!(events, vec![StreamEvent::Suggestions(suggestions)]);
}

#[tokio::test]
async fn stream_failure_mid_answer_ends_with_error() {
    let chunks = vec![chunk("https://docs.hmsreg.com/card", 0, "Order the HMS card.", 0.0)];
    let mut generator = ScriptedGenerator::answering(confident("To get"), &["To"]);
    generator.snapshots.push(Err(RagError::GenerationError {
        provider: "Mock".into(),
        message: "connection reset".into(),
    }));
    generator.snapshots.push(Ok("To get".into()));
    let service = service(store_with(&chunks).await, query_embedder(), generator);

    let events = collect(&service, "How?").await;

    assert_eq!(
        events,
        vec![StreamEvent::Token("To".into()), StreamEvent::Error(ERROR_MESSAGE.into())]
    );
}

#[tokio::test]
async fn stream_assembly_failure_is_single_error() {
    let generator = ScriptedGenerator::answering(confident("unused"), &["unused"]);
    let service =
        service(store_with(&[]).await, Arc::new(FailingEmbedder { degraded: true }), generator);

    let events = collect(&service, "How?").await;

    assert_eq!(events, vec![StreamEvent::Error(ERROR_MESSAGE.into())]);
}

#[tokio::test]
async fn stream_without_structured_model_is_single_error() {
    let chunks = vec![chunk("https://docs.hmsreg.com/card", 0, "Order the HMS card.", 0.0)];
    let generator = ScriptedGenerator { snapshots: vec![Ok("never".into())], ..Default::default() };
    let service = service(store_with(&chunks).await, query_embedder(), generator);

    let events = collect(&service, "How?").await;

    assert_eq!(events, vec![StreamEvent::Error(ERROR_MESSAGE.into())]);
}

#[tokio::test]
async fn concurrent_requests_do_not_share_state() {
    let chunks = vec![chunk("https://docs.hmsreg.com/card", 0, "Order the HMS card.", 0.0)];
    let generator = ScriptedGenerator::answering(confident("Hello"), &["He", "Hello"]);
    let service = service(store_with(&chunks).await, query_embedder(), generator);

    let (a, b) = tokio::join!(collect(&service, "one"), collect(&service, "two"));

    assert_eq!(a, b);
    assert_eq!(a[0], StreamEvent::Token("He".into()));
    assert_eq!(a[1], StreamEvent::Token("llo".into()));
}
