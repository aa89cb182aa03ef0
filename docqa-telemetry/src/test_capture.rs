use std::sync::Arc;

use tracing::{info, info_span, warn};
use tracing_subscriber::layer::SubscriberExt;

use crate::{CaptureLayer, LogFormat, RequestTraceStore};

fn capture() -> (Arc<RequestTraceStore>, impl tracing::Subscriber + Send + Sync) {
    let store = Arc::new(RequestTraceStore::new());
    let subscriber = tracing_subscriber::registry().with(CaptureLayer::new(store.clone()));
    (store, subscriber)
}

#[test]
fn span_with_request_id_is_captured() {
    let (store, subscriber) = capture();

    tracing::subscriber::with_default(subscriber, || {
        let span = info_span!("chat.request", request.id = "req-1", user.role = "worker", streaming = false);
        let _enter = span.enter();
        info!(citations = 2, "answered request");
    });

    let trace = store.get_trace("req-1").expect("trace for req-1");
    assert_eq!(trace.len(), 1);
    let span = &trace[0];
    assert_eq!(span.name, "chat.request");
    assert_eq!(span.request_id, "req-1");
    assert_eq!(span.attributes["user.role"], "worker");
    assert_eq!(span.attributes["streaming"], false);
    assert!(span.end_time >= span.start_time);

    assert_eq!(span.events.len(), 1);
    assert_eq!(span.events[0].message, "answered request");
    assert_eq!(span.events[0].level, "INFO");
    assert_eq!(span.events[0].fields["citations"], 2);
}

#[test]
fn children_inherit_request_id() {
    let (store, subscriber) = capture();

    tracing::subscriber::with_default(subscriber, || {
        let parent = info_span!("chat.request", request.id = "req-2");
        let _p = parent.enter();
        let child = info_span!("retrieve", k = 5);
        let _c = child.enter();
        warn!("embedding provider degraded");
    });

    let trace = store.get_trace("req-2").expect("trace for req-2");
    let names: Vec<_> = trace.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["retrieve", "chat.request"]);
    assert_eq!(trace[0].parent_id.as_deref(), Some(trace[1].id.as_str()));
    assert_eq!(trace[0].events[0].level, "WARN");
}

#[test]
fn spans_without_request_id_are_ignored() {
    let (store, subscriber) = capture();

    tracing::subscriber::with_default(subscriber, || {
        let _span = info_span!("ingest.page", url = "https://d/1").entered();
    });

    assert!(store.request_ids().is_empty());
}

#[test]
fn late_recorded_fields_are_kept() {
    let (store, subscriber) = capture();

    tracing::subscriber::with_default(subscriber, || {
        let span = info_span!("generate", request.id = "req-3", usage.total_tokens = tracing::field::Empty);
        span.record("usage.total_tokens", 42);
    });

    let trace = store.get_trace("req-3").expect("trace for req-3");
    assert_eq!(trace[0].attributes["usage.total_tokens"], 42);
}

#[test]
fn span_record_serializes_with_wire_names() {
    let (store, subscriber) = capture();
    tracing::subscriber::with_default(subscriber, || {
        let _span = info_span!("chat.request", request.id = "req-4").entered();
    });

    let span = &store.get_trace("req-4").expect("trace")[0];
    let json = serde_json::to_value(span).unwrap();
    assert!(json.get("span_id").is_some());
    assert!(json.get("parent_span_id").is_none());
    assert_eq!(json["request_id"], "req-4");

    store.clear();
    assert!(store.get_trace("req-4").is_none());
}

#[test]
fn log_format_parses() {
    assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
    assert_eq!("Pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
    assert!("xml".parse::<LogFormat>().is_err());
}
