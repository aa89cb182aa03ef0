//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use docqa_rag::{
    ChatResponse, EmbeddingIntent, EmbeddingProvider, GenerationRequest, Generator, RagError,
    Result, SnapshotStream,
};

/// Embeds text with a caller-supplied function and counts calls.
pub struct FnEmbedder<F> {
    embed_fn: F,
    dimensions: usize,
    pub calls: AtomicUsize,
}

impl<F> FnEmbedder<F>
where
    F: Fn(&str) -> Vec<f32> + Send + Sync,
{
    pub fn new(dimensions: usize, embed_fn: F) -> Self {
        Self { embed_fn, dimensions, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F> EmbeddingProvider for FnEmbedder<F>
where
    F: Fn(&str) -> Vec<f32> + Send + Sync,
{
    async fn embed(&self, text: &str, _intent: EmbeddingIntent) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.embed_fn)(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Every call fails with the configured error kind.
pub struct FailingEmbedder {
    pub degraded: bool,
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str, _intent: EmbeddingIntent) -> Result<Vec<f32>> {
        if self.degraded {
            Err(RagError::MissingCredentials { provider: "Mock".into() })
        } else {
            Err(RagError::EmbeddingError { provider: "Mock".into(), message: "unreachable".into() })
        }
    }

    fn dimensions(&self) -> usize {
        2
    }
}

/// Returns one vector fewer than requested from batch calls.
pub struct ShortBatchEmbedder;

#[async_trait]
impl EmbeddingProvider for ShortBatchEmbedder {
    async fn embed(&self, _text: &str, _intent: EmbeddingIntent) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }

    async fn embed_batch(&self, texts: &[&str], _intent: EmbeddingIntent) -> Result<Vec<Vec<f32>>> {
        Ok(vec![vec![1.0, 0.0]; texts.len().saturating_sub(1)])
    }

    fn dimensions(&self) -> usize {
        2
    }
}

/// Replays a fixed structured response and snapshot sequence.
#[derive(Default)]
pub struct ScriptedGenerator {
    pub structured: Option<ChatResponse>,
    pub snapshots: Vec<Result<String>>,
    pub prompts: Arc<std::sync::Mutex<Vec<String>>>,
}

impl ScriptedGenerator {
    pub fn answering(response: ChatResponse, snapshots: &[&str]) -> Self {
        Self {
            structured: Some(response),
            snapshots: snapshots.iter().map(|s| Ok(s.to_string())).collect(),
            prompts: Arc::default(),
        }
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().ok().and_then(|p| p.last().cloned())
    }
}

fn clone_result(result: &Result<String>) -> Result<String> {
    match result {
        Ok(s) => Ok(s.clone()),
        Err(e) => Err(RagError::GenerationError { provider: "Mock".into(), message: e.to_string() }),
    }
}

impl Clone for ScriptedGenerator {
    fn clone(&self) -> Self {
        Self {
            structured: self.structured.clone(),
            snapshots: self.snapshots.iter().map(clone_result).collect(),
            prompts: self.prompts.clone(),
        }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate_structured(&self, request: &GenerationRequest) -> Result<ChatResponse> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt.clone());
        }
        self.structured.clone().ok_or_else(|| RagError::GenerationError {
            provider: "Mock".into(),
            message: "model unavailable".into(),
        })
    }

    async fn generate_stream(&self, _request: &GenerationRequest) -> Result<SnapshotStream> {
        let items: Vec<Result<String>> = self.snapshots.iter().map(clone_result).collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// A unit vector at `degrees` from the x axis.
pub fn unit(degrees: f32) -> Vec<f32> {
    let radians = degrees.to_radians();
    vec![radians.cos(), radians.sin()]
}
