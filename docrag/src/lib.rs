//! # docrag
//!
//! Document indexing and retrieval for retrieval-augmented generation.
//!
//! ## Overview
//!
//! `docrag` ingests a corpus of PDF and plain-text documents, splits them into
//! overlapping segments, embeds and persists them in a vector index, and
//! answers questions from the most similar segments.
//!
//! - [`FileExtractor`] - PDF (per page) and text/markdown extraction
//! - [`FixedSizeChunker`] - character-based segments with exact overlap
//! - [`HashEmbeddingProvider`] - local deterministic embeddings
//! - [`InMemoryVectorStore`] / `SqliteVectorStore` (feature `sqlite`) - vector indexes
//! - [`ExcerptSynthesizer`] / [`ModelSynthesizer`] - answer synthesis
//! - [`RagEngine`] - the build and query phases
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docrag::{EngineSettings, QueryRequest, RagEngine, discover_documents};
//!
//! let engine = RagEngine::open(EngineSettings::new("docrag.db")).await?;
//! let report = engine.index(&discover_documents("docs")).await?;
//! let answer = engine.query(&QueryRequest::new("How long should a ribeye rest?")).await?;
//! println!("{} ({} sources)", answer.text, answer.sources.len());
//! ```
//!
//! ## Features
//!
//! | Feature | Enables |
//! |---------|---------|
//! | `sqlite` (default) | `SqliteVectorStore` and `RagEngine::open` |
//! | `openai` | OpenAI embeddings and chat model |
//! | `gemini` | Gemini embeddings and language model |
//! | `full` | all of the above |

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod inmemory;
pub mod retry;
pub mod synthesis;
pub mod vectorstore;

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(any(feature = "openai", feature = "gemini"))]
mod http;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use chunking::{Chunker, FixedSizeChunker, TextSpan};
pub use config::{EmbeddingSettings, EngineSettings, RagConfig, RagConfigBuilder, SynthesizerSettings};
pub use document::{
    DocumentHandle, Locator, PageText, SearchResult, Segment, SourceMetadata, SourceRef, Turn,
};
pub use embedding::{EmbeddingProvider, HashEmbeddingProvider};
pub use engine::{
    Answer, DocumentError, IndexReport, IndexStatus, QueryRequest, RagEngine, RagEngineBuilder,
    Retrieval,
};
pub use error::{RagError, Result};
pub use extract::{FileExtractor, SUPPORTED_EXTENSIONS, TextExtractor, discover_documents};
pub use inmemory::InMemoryVectorStore;
pub use retry::RetryPolicy;
pub use synthesis::{
    AnswerSynthesizer, ExcerptSynthesizer, LanguageModel, ModelSynthesizer, NO_PASSAGES_MESSAGE,
    Prompt, Synthesis,
};
pub use vectorstore::{VectorStore, cosine_similarity};

#[cfg(feature = "gemini")]
pub use gemini::{GeminiEmbeddingProvider, GeminiLanguageModel};
#[cfg(feature = "openai")]
pub use openai::{OpenAIChatModel, OpenAIEmbeddingProvider};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteVectorStore;
