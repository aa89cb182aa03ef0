//! Logging setup for docqa binaries and tests.
//!
//! [`init_telemetry`] installs a global `tracing` subscriber with an
//! `RUST_LOG`-style filter (default `info`). [`init_with_storage`] also
//! captures every span that carries a `request.id` into a
//! [`RequestTraceStore`], so one chat request can be inspected end to end.

use std::str::FromStr;
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

pub mod memory;

#[cfg(test)]
mod test_capture;

pub use memory::{CaptureLayer, EventRecord, REQUEST_ID_FIELD, RequestTraceStore, SpanRecord};

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}', expected 'pretty' or 'json'")),
        }
    }
}

/// Error returned when a global subscriber is already installed.
pub type InitError = tracing_subscriber::util::TryInitError;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn fmt_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(true);
    match format {
        LogFormat::Pretty => layer.boxed(),
        LogFormat::Json => layer.json().with_current_span(true).with_span_list(false).boxed(),
    }
}

/// Install the global subscriber.
pub fn init_telemetry(service_name: &str, format: LogFormat) -> Result<(), InitError> {
    tracing_subscriber::registry().with(env_filter()).with(fmt_layer(format)).try_init()?;
    tracing::debug!(service = service_name, ?format, "telemetry initialized");
    Ok(())
}

/// Install the global subscriber and capture request spans into `store`.
pub fn init_with_storage(
    service_name: &str,
    format: LogFormat,
    store: Arc<RequestTraceStore>,
) -> Result<(), InitError> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer(format))
        .with(CaptureLayer::new(store))
        .try_init()?;
    tracing::debug!(service = service_name, ?format, "telemetry initialized with request capture");
    Ok(())
}
