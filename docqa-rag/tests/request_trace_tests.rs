//! Every chat request runs inside a `chat.request` span with its own id.

mod common;

use std::sync::Arc;

use common::{FnEmbedder, ScriptedGenerator, unit};
use docqa_rag::{
    ChatRequest, ChatResponse, ChatService, Chunk, DocumentStore, InMemoryDocumentStore,
};
use docqa_telemetry::{CaptureLayer, RequestTraceStore};
use futures::StreamExt;
use tracing_subscriber::layer::SubscriberExt;

async fn service(generator: ScriptedGenerator) -> ChatService {
    let store = Arc::new(InMemoryDocumentStore::new());
    store.create_collection("hmsreg_docs").await.unwrap();
    store
        .add_chunks(
            "hmsreg_docs",
            &[Chunk {
                url: "https://docs.hmsreg.com/?ID=1".into(),
                title: "HMS card".into(),
                chunk_id: "https://docs.hmsreg.com/?ID=1#0".into(),
                content: "Order the HMS card through your employer.".into(),
                embedding: unit(0.0),
            }],
        )
        .await
        .unwrap();

    ChatService::builder()
        .embedding_provider(Arc::new(FnEmbedder::new(2, |_: &str| unit(0.0))))
        .document_store(store)
        .generator(Arc::new(generator))
        .build()
        .unwrap()
}

#[tokio::test]
async fn each_request_gets_a_distinct_traced_span() {
    let traces = Arc::new(RequestTraceStore::new());
    let _guard = tracing::subscriber::set_default(
        tracing_subscriber::registry().with(CaptureLayer::new(traces.clone())),
    );

    let generator = ScriptedGenerator::answering(
        ChatResponse::answer("Ask your employer.").with_confidence(0.9),
        &["Ask", "Ask your employer."],
    );
    let service = service(generator).await;

    service.generate_chat_response(ChatRequest::new("Hvordan får jeg HMS-kort?")).await;
    let events: Vec<_> =
        service.stream_chat_response(ChatRequest::new("Hvordan får jeg HMS-kort?")).collect().await;
    assert!(events.last().is_some_and(|e| e.is_terminal()));

    let ids = traces.request_ids();
    assert_eq!(ids.len(), 2);

    let mut streaming_flags = Vec::new();
    for id in &ids {
        let trace = traces.get_trace(id).unwrap();
        let root = trace.iter().find(|s| s.name == "chat.request").unwrap();
        assert_eq!(root.attributes["user.role"], "General User");
        streaming_flags.push(root.attributes["streaming"].as_bool().unwrap());
    }
    streaming_flags.sort();
    assert_eq!(streaming_flags, vec![false, true]);
}
