//! Configuration for the retrieval engine.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::embedding::{EmbeddingProvider, HashEmbeddingProvider};
use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;
use crate::synthesis::{AnswerSynthesizer, ExcerptSynthesizer};

/// Configuration parameters for the [`RagEngine`](crate::RagEngine).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Segment size in characters.
    pub chunk_size: usize,
    /// Number of characters shared by consecutive segments.
    pub chunk_overlap: usize,
    /// Number of passages retrieved per question when the request names none.
    pub top_k: usize,
    /// Minimum similarity score for results (results below this are filtered out).
    pub similarity_threshold: Option<f32>,
    /// Most recent conversation turns forwarded to the synthesizer.
    pub max_history_turns: usize,
    /// Documents indexed concurrently.
    pub index_concurrency: usize,
    /// Segments sent to the embedder per request.
    pub embed_batch_size: usize,
    /// Answer from the question alone when the index is empty instead of
    /// failing with [`RagError::NoContext`].
    pub answer_without_context: bool,
    /// Timeout and retry policy for external calls.
    pub retry: RetryPolicy,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 3,
            similarity_threshold: None,
            max_history_turns: 5,
            index_concurrency: 1,
            embed_batch_size: 32,
            answer_without_context: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `index_concurrency == 0` or `embed_batch_size == 0`
    /// - the retry timeout is zero
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.index_concurrency == 0 {
            return Err(RagError::ConfigError(
                "index_concurrency must be greater than zero".to_string(),
            ));
        }
        if self.embed_batch_size == 0 {
            return Err(RagError::ConfigError(
                "embed_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.retry.timeout.is_zero() {
            return Err(RagError::ConfigError("retry timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the segment size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive segments in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the default number of passages retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = Some(threshold);
        self
    }

    /// Set how many recent conversation turns reach the synthesizer.
    pub fn max_history_turns(mut self, turns: usize) -> Self {
        self.config.max_history_turns = turns;
        self
    }

    /// Set how many documents are indexed concurrently.
    pub fn index_concurrency(mut self, concurrency: usize) -> Self {
        self.config.index_concurrency = concurrency;
        self
    }

    /// Set how many segments are embedded per request.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Answer from the question alone when the index is empty.
    pub fn answer_without_context(mut self, enabled: bool) -> Self {
        self.config.answer_without_context = enabled;
        self
    }

    /// Set the timeout and retry policy for external calls.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] as described in [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Which embedding backend to use.
///
/// Remote backends read their API key from the environment when `api_key` is
/// `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum EmbeddingSettings {
    /// The local [`HashEmbeddingProvider`].
    Hash {
        /// Vector size.
        dimensions: usize,
    },
    /// The OpenAI embeddings API (feature `openai`).
    OpenAI {
        /// API key, or `None` for `OPENAI_API_KEY`.
        api_key: Option<String>,
        /// Model override.
        model: Option<String>,
        /// Output dimension override.
        dimensions: Option<usize>,
        /// Base URL override.
        base_url: Option<String>,
    },
    /// The Gemini embedding API (feature `gemini`).
    Gemini {
        /// API key, or `None` for `GEMINI_API_KEY`.
        api_key: Option<String>,
        /// Model override.
        model: Option<String>,
        /// Output dimension override.
        dimensions: Option<usize>,
        /// Base URL override.
        base_url: Option<String>,
    },
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        EmbeddingSettings::Hash { dimensions: HashEmbeddingProvider::DEFAULT_DIMENSIONS }
    }
}

#[cfg(any(not(feature = "openai"), not(feature = "gemini")))]
fn feature_disabled(feature: &str) -> RagError {
    RagError::ConfigError(format!("docrag was built without the '{feature}' feature"))
}

impl EmbeddingSettings {
    /// Construct the configured provider.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the backend's feature is disabled or
    /// its API key is missing.
    #[cfg_attr(not(all(feature = "openai", feature = "gemini")), allow(unused_variables))]
    pub fn build(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        match self {
            EmbeddingSettings::Hash { dimensions } => {
                Ok(Arc::new(HashEmbeddingProvider::new(*dimensions)))
            }
            #[cfg(feature = "openai")]
            EmbeddingSettings::OpenAI { api_key, model, dimensions, base_url } => {
                use crate::openai::OpenAIEmbeddingProvider;

                let mut provider = match api_key {
                    Some(key) => OpenAIEmbeddingProvider::new(key.clone())?,
                    None => OpenAIEmbeddingProvider::from_env()?,
                };
                if let Some(model) = model {
                    provider = provider.with_model(model.clone());
                }
                if let Some(dimensions) = dimensions {
                    provider = provider.with_dimensions(*dimensions);
                }
                if let Some(base_url) = base_url {
                    provider = provider.with_base_url(base_url.clone());
                }
                Ok(Arc::new(provider))
            }
            #[cfg(not(feature = "openai"))]
            EmbeddingSettings::OpenAI { .. } => Err(feature_disabled("openai")),
            #[cfg(feature = "gemini")]
            EmbeddingSettings::Gemini { api_key, model, dimensions, base_url } => {
                use crate::gemini::GeminiEmbeddingProvider;

                let mut provider = match api_key {
                    Some(key) => GeminiEmbeddingProvider::new(key.clone())?,
                    None => GeminiEmbeddingProvider::from_env()?,
                };
                if let Some(model) = model {
                    provider = provider.with_model(model.clone());
                }
                if let Some(dimensions) = dimensions {
                    provider = provider.with_output_dimensionality(*dimensions);
                }
                if let Some(base_url) = base_url {
                    provider = provider.with_base_url(base_url.clone());
                }
                Ok(Arc::new(provider))
            }
            #[cfg(not(feature = "gemini"))]
            EmbeddingSettings::Gemini { .. } => Err(feature_disabled("gemini")),
        }
    }
}

/// Which answer synthesizer to use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "synthesizer", rename_all = "lowercase")]
pub enum SynthesizerSettings {
    /// The model-free [`ExcerptSynthesizer`].
    Excerpt {
        /// Excerpt length in characters.
        window_chars: usize,
    },
    /// A Gemini model (feature `gemini`).
    Gemini {
        /// API key, or `None` for `GEMINI_API_KEY`.
        api_key: Option<String>,
        /// Model override.
        model: Option<String>,
        /// Base URL override.
        base_url: Option<String>,
    },
    /// An OpenAI-compatible chat model (feature `openai`).
    OpenAI {
        /// API key, or `None` for `OPENAI_API_KEY`.
        api_key: Option<String>,
        /// Model override.
        model: Option<String>,
        /// Base URL override.
        base_url: Option<String>,
    },
}

impl Default for SynthesizerSettings {
    fn default() -> Self {
        SynthesizerSettings::Excerpt { window_chars: ExcerptSynthesizer::DEFAULT_WINDOW_CHARS }
    }
}

impl SynthesizerSettings {
    /// Construct the configured synthesizer.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the backend's feature is disabled or
    /// its API key is missing.
    #[cfg_attr(not(all(feature = "openai", feature = "gemini")), allow(unused_variables))]
    pub fn build(&self) -> Result<Arc<dyn AnswerSynthesizer>> {
        match self {
            SynthesizerSettings::Excerpt { window_chars } => {
                Ok(Arc::new(ExcerptSynthesizer::new(*window_chars)))
            }
            #[cfg(feature = "gemini")]
            SynthesizerSettings::Gemini { api_key, model, base_url } => {
                use crate::gemini::GeminiLanguageModel;
                use crate::synthesis::ModelSynthesizer;

                let mut llm = match api_key {
                    Some(key) => GeminiLanguageModel::new(key.clone())?,
                    None => GeminiLanguageModel::from_env()?,
                };
                if let Some(model) = model {
                    llm = llm.with_model(model.clone());
                }
                if let Some(base_url) = base_url {
                    llm = llm.with_base_url(base_url.clone());
                }
                Ok(Arc::new(ModelSynthesizer::new(llm)))
            }
            #[cfg(not(feature = "gemini"))]
            SynthesizerSettings::Gemini { .. } => Err(feature_disabled("gemini")),
            #[cfg(feature = "openai")]
            SynthesizerSettings::OpenAI { api_key, model, base_url } => {
                use crate::openai::OpenAIChatModel;
                use crate::synthesis::ModelSynthesizer;

                let mut llm = match api_key {
                    Some(key) => OpenAIChatModel::new(key.clone())?,
                    None => OpenAIChatModel::from_env()?,
                };
                if let Some(model) = model {
                    llm = llm.with_model(model.clone());
                }
                if let Some(base_url) = base_url {
                    llm = llm.with_base_url(base_url.clone());
                }
                Ok(Arc::new(ModelSynthesizer::new(llm)))
            }
            #[cfg(not(feature = "openai"))]
            SynthesizerSettings::OpenAI { .. } => Err(feature_disabled("openai")),
        }
    }
}

/// Everything needed to open a persisted engine with `RagEngine::open`
/// (feature `sqlite`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Path of the SQLite index file.
    pub store_path: PathBuf,
    /// Embedding backend.
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    /// Answer synthesizer.
    #[serde(default)]
    pub synthesizer: SynthesizerSettings,
    /// Engine parameters.
    #[serde(default)]
    pub config: RagConfig,
}

impl EngineSettings {
    /// Settings for an index at `store_path` with default components.
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            embedding: EmbeddingSettings::default(),
            synthesizer: SynthesizerSettings::default(),
            config: RagConfig::default(),
        }
    }
}
