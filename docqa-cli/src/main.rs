//! `docqa`: ingest documentation pages and ask questions about them.

mod cli;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use docqa_gemini::{API_KEY_VARS, GeminiClient, GeminiEmbeddingProvider, GeminiGenerator};
use docqa_rag::{
    ChatRequest, ChatService, InMemoryDocumentStore, IngestionPipeline, SourcePage,
    StreamEvent, SynonymTable, UserRole,
};
use docqa_telemetry::RequestTraceStore;
use futures::StreamExt;
use tracing::{info, warn};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let traces = match &cli.capture_traces {
        Some(_) => {
            let store = Arc::new(RequestTraceStore::new());
            docqa_telemetry::init_with_storage("docqa", cli.log_format, store.clone())
                .context("failed to initialize logging")?;
            Some(store)
        }
        None => {
            docqa_telemetry::init_telemetry("docqa", cli.log_format)
                .context("failed to initialize logging")?;
            None
        }
    };
    let capture_path = cli.capture_traces.clone();

    let result = run(cli).await;

    if let (Some(path), Some(traces)) = (capture_path, traces) {
        write_traces(&path, &traces).await?;
    }
    result
}

/// Log a warning and return `true` when the client has no API key.
fn warn_if_degraded(client: &GeminiClient) -> bool {
    if client.has_api_key() {
        return false;
    }
    warn!(
        vars = ?API_KEY_VARS,
        "no Gemini API key set, embedding and generation calls will fail and ingestion keeps every chunk"
    );
    true
}

async fn write_traces(path: &Path, traces: &RequestTraceStore) -> Result<()> {
    let json = serde_json::to_vec_pretty(&traces.all_traces())?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write traces to {}", path.display()))?;
    info!(path = %path.display(), requests = traces.request_ids().len(), "wrote request traces");
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.config.to_config().context("invalid pipeline configuration")?;
    let store = Arc::new(
        InMemoryDocumentStore::load(&cli.store)
            .await
            .with_context(|| format!("failed to load store from {}", cli.store.display()))?,
    );
    let client = Arc::new(GeminiClient::from_env().context("failed to create Gemini client")?);
    warn_if_degraded(&client);
    let embedder = Arc::new(GeminiEmbeddingProvider::new(client.clone()));

    match cli.command {
        Commands::Ingest { pages, reset } => {
            let pipeline = IngestionPipeline::builder()
                .config(config)
                .embedding_provider(embedder)
                .document_store(store.clone())
                .build()?;
            ingest(&pipeline, &pages, reset).await?;
            store.save(&cli.store).await.context("failed to save store")?;
        }
        Commands::Ask { question, role, stream, sse } => {
            let synonyms = match &cli.synonyms {
                Some(path) => SynonymTable::from_json_file(path)
                    .with_context(|| format!("failed to read synonyms from {}", path.display()))?,
                None => SynonymTable::hmsreg_default(),
            };
            let service = ChatService::builder()
                .config(config)
                .synonyms(synonyms)
                .embedding_provider(embedder)
                .document_store(store)
                .generator(Arc::new(GeminiGenerator::new(client)))
                .build()?;
            let request = ChatRequest::new(question).with_role(UserRole::from(role));
            if stream {
                ask_streaming(&service, request, sse).await?;
            } else {
                let response = service.generate_chat_response(request).await;
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
        }
        Commands::Reset => {
            let pipeline = IngestionPipeline::builder()
                .config(config.clone())
                .embedding_provider(embedder)
                .document_store(store.clone())
                .build()?;
            pipeline.reset_collection().await?;
            store.save(&cli.store).await.context("failed to save store")?;
            println!("collection '{}' reset", config.collection);
        }
    }

    Ok(())
}

async fn ingest(pipeline: &IngestionPipeline, pages: &Path, reset: bool) -> Result<()> {
    let bytes = tokio::fs::read(pages)
        .await
        .with_context(|| format!("failed to read pages from {}", pages.display()))?;
    let pages: Vec<SourcePage> =
        serde_json::from_slice(&bytes).context("pages file must be a JSON array of pages")?;

    if reset {
        pipeline.reset_collection().await?;
    } else {
        pipeline.ensure_collection().await?;
    }

    let report = pipeline.ingest_pages(&pages).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn ask_streaming(service: &ChatService, request: ChatRequest, sse: bool) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    let mut events = std::pin::pin!(service.stream_chat_response(request));
    while let Some(event) = events.next().await {
        if sse {
            write!(stdout, "{}", event.to_sse_frame())?;
            continue;
        }
        match event {
            StreamEvent::Token(text) => write!(stdout, "{text}")?,
            StreamEvent::Citation(citations) => {
                writeln!(stdout)?;
                for citation in citations {
                    writeln!(stdout, "- {} <{}>", citation.title, citation.url)?;
                }
            }
            StreamEvent::Fallback(message) | StreamEvent::Error(message) => {
                writeln!(stdout, "{message}")?
            }
            StreamEvent::Suggestions(queries) => {
                writeln!(stdout, "Did you mean:")?;
                for query in queries {
                    writeln!(stdout, "- {query}")?;
                }
            }
        }
        stdout.flush()?;
    }
    Ok(())
}
