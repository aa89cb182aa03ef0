use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use docqa_rag::{RagConfig, UserRole};

#[derive(Parser, Debug)]
#[command(name = "docqa", version, about = "Ask questions about the HMSREG documentation")]
pub struct Cli {
    /// JSON snapshot of the document store, shared by every command.
    #[arg(long, global = true, env = "DOCQA_STORE", default_value = "docqa-store.json")]
    pub store: PathBuf,

    /// JSON object of `term -> [synonyms]` replacing the built-in table.
    #[arg(long, global = true)]
    pub synonyms: Option<PathBuf>,

    /// Log output format (`pretty` or `json`).
    #[arg(long, global = true, env = "DOCQA_LOG_FORMAT", default_value = "pretty")]
    pub log_format: docqa_telemetry::LogFormat,

    /// Capture request spans and write them to this file as JSON on exit.
    #[arg(long, global = true)]
    pub capture_traces: Option<PathBuf>,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Split, deduplicate, embed and store pre-extracted pages.
    Ingest {
        /// JSON array of `{ "url", "title"?, "text" }` objects.
        pages: PathBuf,
        /// Drop the collection before ingesting.
        #[arg(long)]
        reset: bool,
    },
    /// Answer one question.
    Ask {
        question: String,
        #[arg(long, value_enum, default_value_t = RoleArg::General)]
        role: RoleArg,
        /// Stream the answer as events instead of one structured response.
        #[arg(long)]
        stream: bool,
        /// With `--stream`, print raw `data: {...}` frames.
        #[arg(long, requires = "stream")]
        sse: bool,
    },
    /// Delete and recreate the collection.
    Reset,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    Worker,
    Supplier,
    Manager,
    General,
}

impl From<RoleArg> for UserRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Worker => UserRole::ConstructionWorker,
            RoleArg::Supplier => UserRole::SupplierSubcontractor,
            RoleArg::Manager => UserRole::ProjectManagerAdmin,
            RoleArg::General => UserRole::GeneralUser,
        }
    }
}

/// Pipeline tuning. Unset flags keep the library defaults.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    #[arg(long, global = true)]
    pub collection: Option<String>,
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,
    #[arg(long, global = true)]
    pub chunk_overlap: Option<usize>,
    #[arg(long, global = true)]
    pub top_k: Option<usize>,
    #[arg(long, global = true)]
    pub max_context_chunks: Option<usize>,
    #[arg(long, global = true)]
    pub embedding_similarity_threshold: Option<f32>,
    #[arg(long, global = true)]
    pub context_overlap_threshold: Option<f32>,
    #[arg(long, global = true)]
    pub confidence_threshold: Option<f32>,
    #[arg(long, global = true)]
    pub fallback_message: Option<String>,
}

impl ConfigArgs {
    /// Overlay the flags on the defaults and validate.
    pub fn to_config(&self) -> docqa_rag::Result<RagConfig> {
        let defaults = RagConfig::default();
        let mut builder = RagConfig::builder()
            .chunk_size(self.chunk_size.unwrap_or(defaults.chunk_size))
            .chunk_overlap(self.chunk_overlap.unwrap_or(defaults.chunk_overlap))
            .top_k(self.top_k.unwrap_or(defaults.top_k))
            .max_context_chunks(self.max_context_chunks.unwrap_or(defaults.max_context_chunks))
            .embedding_similarity_threshold(
                self.embedding_similarity_threshold.unwrap_or(defaults.embedding_similarity_threshold),
            )
            .context_overlap_threshold(
                self.context_overlap_threshold.unwrap_or(defaults.context_overlap_threshold),
            )
            .confidence_threshold(self.confidence_threshold.unwrap_or(defaults.confidence_threshold));
        if let Some(collection) = &self.collection {
            builder = builder.collection(collection.clone());
        }
        if let Some(message) = &self.fallback_message {
            builder = builder.fallback_message(message.clone());
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_parses_role_and_stream_flags() {
        let cli = Cli::try_parse_from([
            "docqa", "ask", "Hvordan får jeg HMS-kort?", "--role", "worker", "--stream", "--top-k", "5",
        ])
        .unwrap();
        match cli.command {
            Commands::Ask { question, role, stream, sse } => {
                assert_eq!(question, "Hvordan får jeg HMS-kort?");
                assert_eq!(UserRole::from(role), UserRole::ConstructionWorker);
                assert!(stream);
                assert!(!sse);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.config.to_config().unwrap().top_k, 5);
    }

    #[test]
    fn capture_traces_is_global() {
        let cli = Cli::try_parse_from(["docqa", "ask", "q", "--capture-traces", "traces.json"]).unwrap();
        assert_eq!(cli.capture_traces, Some(PathBuf::from("traces.json")));
    }

    #[test]
    fn sse_requires_stream() {
        assert!(Cli::try_parse_from(["docqa", "ask", "q", "--sse"]).is_err());
    }

    #[test]
    fn unset_flags_keep_defaults() {
        let cli = Cli::try_parse_from(["docqa", "reset"]).unwrap();
        assert_eq!(cli.config.to_config().unwrap(), RagConfig::default());
    }

    #[test]
    fn invalid_overlap_is_rejected() {
        let cli = Cli::try_parse_from(["docqa", "--chunk-size", "100", "--chunk-overlap", "100", "reset"])
            .unwrap();
        assert!(cli.config.to_config().is_err());
    }
}
