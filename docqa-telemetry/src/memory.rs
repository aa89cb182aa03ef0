use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use tracing::{Event, Id, Subscriber};
use tracing_subscriber::{Layer, layer::Context, registry::LookupSpan};

/// Span field that carries the per-request correlation id.
pub const REQUEST_ID_FIELD: &str = "request.id";

/// A log event recorded inside a captured span.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub level: String,
    pub message: String,
    pub fields: HashMap<String, serde_json::Value>,
}

/// A closed span.
#[derive(Debug, Clone, Serialize)]
pub struct SpanRecord {
    #[serde(rename = "span_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "parent_span_id", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub request_id: String,
    /// Nanoseconds since the Unix epoch.
    pub start_time: u128,
    pub end_time: u128,
    pub attributes: HashMap<String, serde_json::Value>,
    pub events: Vec<EventRecord>,
}

/// Captured spans grouped by request id.
#[derive(Debug, Clone, Default)]
pub struct RequestTraceStore {
    traces: Arc<RwLock<HashMap<String, Vec<SpanRecord>>>>,
}

impl RequestTraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spans recorded for one request, in close order.
    pub fn get_trace(&self, request_id: &str) -> Option<Vec<SpanRecord>> {
        self.traces.read().ok()?.get(request_id).cloned()
    }

    /// Every request id seen so far.
    pub fn request_ids(&self) -> Vec<String> {
        self.traces.read().map(|t| t.keys().cloned().collect()).unwrap_or_default()
    }

    /// Every captured trace, keyed by request id.
    pub fn all_traces(&self) -> HashMap<String, Vec<SpanRecord>> {
        self.traces.read().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn add_span(&self, request_id: String, span: SpanRecord) {
        if let Ok(mut traces) = self.traces.write() {
            traces.entry(request_id).or_default().push(span);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut traces) = self.traces.write() {
            traces.clear();
        }
    }
}

/// A tracing layer that keeps every span carrying a request id in memory,
/// along with the events logged inside it.
///
/// Child spans inherit the request id of their parent.
pub struct CaptureLayer {
    store: Arc<RequestTraceStore>,
}

impl CaptureLayer {
    pub fn new(store: Arc<RequestTraceStore>) -> Self {
        Self { store }
    }
}

#[derive(Clone)]
struct SpanFields(HashMap<String, serde_json::Value>);

struct StartTime(u128);

#[derive(Default)]
struct SpanEvents(Vec<EventRecord>);

fn now_nanos() -> u128 {
    SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().as_nanos()
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &tracing::span::Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };

        let mut visitor = JsonVisitor::default();
        attrs.record(&mut visitor);
        let mut fields = visitor.0;

        if !fields.contains_key(REQUEST_ID_FIELD) {
            let inherited = span.parent().and_then(|parent| {
                parent
                    .extensions()
                    .get::<SpanFields>()
                    .and_then(|f| f.0.get(REQUEST_ID_FIELD).cloned())
            });
            if let Some(request_id) = inherited {
                fields.insert(REQUEST_ID_FIELD.to_string(), request_id);
            }
        }

        let mut extensions = span.extensions_mut();
        extensions.insert(StartTime(now_nanos()));
        extensions.insert(SpanFields(fields));
        extensions.insert(SpanEvents::default());
    }

    fn on_record(&self, id: &Id, values: &tracing::span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            let mut visitor = JsonVisitor::default();
            values.record(&mut visitor);
            fields.0.extend(visitor.0);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.event_span(event) else { return };

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        let mut fields = visitor.0;
        let message = match fields.remove("message") {
            Some(serde_json::Value::String(message)) => message,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let record =
            EventRecord { level: event.metadata().level().to_string(), message, fields };

        if let Some(events) = span.extensions_mut().get_mut::<SpanEvents>() {
            events.0.push(record);
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else { return };
        let extensions = span.extensions();

        let attributes = extensions.get::<SpanFields>().map(|f| f.0.clone()).unwrap_or_default();
        let Some(request_id) =
            attributes.get(REQUEST_ID_FIELD).and_then(|v| v.as_str()).map(str::to_string)
        else {
            return;
        };

        let record = SpanRecord {
            id: format!("{:016x}", id.into_u64()),
            name: span.metadata().name().to_string(),
            parent_id: span.parent().map(|p| format!("{:016x}", p.id().into_u64())),
            request_id: request_id.clone(),
            start_time: extensions.get::<StartTime>().map(|s| s.0).unwrap_or_default(),
            end_time: now_nanos(),
            events: extensions.get::<SpanEvents>().map(|e| e.0.clone()).unwrap_or_default(),
            attributes,
        };

        self.store.add_span(request_id, record);
    }
}

#[derive(Default)]
struct JsonVisitor(HashMap<String, serde_json::Value>);

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::Value::Bool(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }
}
