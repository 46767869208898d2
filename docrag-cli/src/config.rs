//! Command-line and environment configuration.
//!
//! Every option can also be set through a `DOCRAG_*` environment variable,
//! and `main` loads a `.env` file before parsing.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use docrag::{EmbeddingSettings, EngineSettings, RagConfig, RetryPolicy, SynthesizerSettings};

/// Index documents and answer questions from them.
#[derive(Debug, Parser)]
#[command(name = "docrag", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// SQLite index file
    #[arg(long, env = "DOCRAG_STORE", default_value = "docrag.db", global = true)]
    pub store: PathBuf,

    /// Directory holding the corpus
    #[arg(long, env = "DOCRAG_DOCS", default_value = "docs", global = true)]
    pub docs: PathBuf,

    /// Embedding backend
    #[arg(long, env = "DOCRAG_EMBEDDER", value_enum, default_value_t = EmbedderKind::Hash, global = true)]
    pub embedder: EmbedderKind,

    /// Embedding model override
    #[arg(long, env = "DOCRAG_EMBEDDING_MODEL", global = true)]
    pub embedding_model: Option<String>,

    /// Embedding size override
    #[arg(long, env = "DOCRAG_EMBEDDING_DIMENSIONS", global = true)]
    pub embedding_dimensions: Option<usize>,

    /// Answer synthesizer
    #[arg(long, env = "DOCRAG_SYNTHESIZER", value_enum, default_value_t = SynthesizerKind::Excerpt, global = true)]
    pub synthesizer: SynthesizerKind,

    /// Chat model override
    #[arg(long, env = "DOCRAG_CHAT_MODEL", global = true)]
    pub chat_model: Option<String>,

    /// Segment size in characters
    #[arg(long, env = "DOCRAG_CHUNK_SIZE", default_value_t = 1000, global = true)]
    pub chunk_size: usize,

    /// Characters shared by consecutive segments
    #[arg(long, env = "DOCRAG_CHUNK_OVERLAP", default_value_t = 200, global = true)]
    pub chunk_overlap: usize,

    /// Passages retrieved per question
    #[arg(long, env = "DOCRAG_TOP_K", default_value_t = 3, global = true)]
    pub top_k: usize,

    /// Timeout for each embedding, storage or model call
    #[arg(long, env = "DOCRAG_TIMEOUT_SECS", default_value_t = 30, global = true)]
    pub timeout_secs: u64,

    /// Answer from the model alone when the index is empty
    #[arg(long, env = "DOCRAG_ANSWER_WITHOUT_CONTEXT", global = true)]
    pub answer_without_context: bool,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    pub gemini_api_key: Option<String>,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub openai_api_key: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index every supported document under the docs directory
    Index {
        /// Clear the index first
        #[arg(long)]
        rebuild: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the index
    Query {
        /// The question
        question: String,

        /// Passages to retrieve
        #[arg(short = 'k', long)]
        k: Option<usize>,

        /// Print the answer as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show index readiness
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Serve the engine over HTTP
    Serve {
        /// Address to bind
        #[arg(long, env = "DOCRAG_HOST", default_value = "127.0.0.1")]
        host: String,

        /// Port to bind
        #[arg(long, env = "DOCRAG_PORT", default_value_t = 5000)]
        port: u16,

        /// Index the docs directory before accepting requests
        #[arg(long)]
        index_on_start: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    Hash,
    Openai,
    Gemini,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SynthesizerKind {
    Excerpt,
    Gemini,
    Openai,
}

impl Cli {
    /// Engine configuration from the parsed options.
    pub fn rag_config(&self) -> docrag::Result<RagConfig> {
        RagConfig::builder()
            .chunk_size(self.chunk_size)
            .chunk_overlap(self.chunk_overlap)
            .top_k(self.top_k)
            .answer_without_context(self.answer_without_context)
            .retry(RetryPolicy::default().with_timeout(Duration::from_secs(self.timeout_secs)))
            .build()
    }

    pub fn embedding_settings(&self) -> EmbeddingSettings {
        match self.embedder {
            EmbedderKind::Hash => EmbeddingSettings::Hash {
                dimensions: self
                    .embedding_dimensions
                    .unwrap_or(docrag::HashEmbeddingProvider::DEFAULT_DIMENSIONS),
            },
            EmbedderKind::Openai => EmbeddingSettings::OpenAI {
                api_key: self.openai_api_key.clone(),
                model: self.embedding_model.clone(),
                dimensions: self.embedding_dimensions,
                base_url: None,
            },
            EmbedderKind::Gemini => EmbeddingSettings::Gemini {
                api_key: self.gemini_api_key.clone(),
                model: self.embedding_model.clone(),
                dimensions: self.embedding_dimensions,
                base_url: None,
            },
        }
    }

    pub fn synthesizer_settings(&self) -> SynthesizerSettings {
        match self.synthesizer {
            SynthesizerKind::Excerpt => SynthesizerSettings::default(),
            SynthesizerKind::Gemini => SynthesizerSettings::Gemini {
                api_key: self.gemini_api_key.clone(),
                model: self.chat_model.clone(),
                base_url: None,
            },
            SynthesizerKind::Openai => SynthesizerSettings::OpenAI {
                api_key: self.openai_api_key.clone(),
                model: self.chat_model.clone(),
                base_url: None,
            },
        }
    }

    /// Everything [`docrag::RagEngine::open`] needs.
    pub fn engine_settings(&self) -> docrag::Result<EngineSettings> {
        Ok(EngineSettings {
            store_path: self.store.clone(),
            embedding: self.embedding_settings(),
            synthesizer: self.synthesizer_settings(),
            config: self.rag_config()?,
        })
    }
}
