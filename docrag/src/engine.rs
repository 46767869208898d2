//! The retrieval engine.
//!
//! [`RagEngine`] coordinates the build phase (extract → chunk → embed → store)
//! and the query phase (embed → search → synthesize) by composing a
//! [`TextExtractor`], a [`Chunker`], an [`EmbeddingProvider`], a
//! [`VectorStore`] and an [`AnswerSynthesizer`].
//!
//! # Example
//!
//! ```rust,ignore
//! use docrag::{DocumentHandle, HashEmbeddingProvider, InMemoryVectorStore, QueryRequest, RagEngine};
//!
//! let engine = RagEngine::builder()
//!     .embedding_provider(Arc::new(HashEmbeddingProvider::default()))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! let report = engine.index(&[DocumentHandle::file("docs/guide.pdf")]).await?;
//! let answer = engine.query(&QueryRequest::new("How long should a steak rest?")).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::chunking::{Chunker, FixedSizeChunker};
use crate::config::RagConfig;
use crate::document::{
    DocumentHandle, SearchResult, Segment, SourceMetadata, SourceRef, Turn,
};
use crate::embedding::{EmbeddingProvider, validate_embeddings};
use crate::error::{RagError, Result};
use crate::extract::{FileExtractor, TextExtractor};
use crate::retry::RetryPolicy;
use crate::synthesis::{AnswerSynthesizer, ExcerptSynthesizer};
use crate::vectorstore::{VectorStore, is_zero_vector};

/// A document that could not be indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentError {
    /// Name of the document.
    pub source: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Outcome of a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    /// Documents submitted.
    pub documents: usize,
    /// Segments newly written to the index.
    pub indexed: usize,
    /// Segments already present in the index.
    pub skipped: usize,
    /// Segments left out because they embed to the zero vector (no
    /// searchable terms, e.g. table rules or page ornaments).
    #[serde(default)]
    pub unsearchable: usize,
    /// Documents that failed to extract or chunk.
    pub errors: Vec<DocumentError>,
}

/// Result of the retrieval step.
#[derive(Debug, Clone)]
pub enum Retrieval {
    /// The index holds no records.
    NoContext,
    /// Ranked matches, possibly none.
    Matches(Vec<SearchResult>),
}

/// A question for [`RagEngine::query`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The question text.
    pub question: String,
    /// Passages to retrieve; the engine's `top_k` when `None`.
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Earlier turns, oldest first.
    #[serde(default)]
    pub history: Vec<Turn>,
    /// Per-attempt timeout override for this query.
    #[serde(default)]
    pub timeout: Option<Duration>,
}

impl QueryRequest {
    /// A request for `question` with engine defaults.
    pub fn new(question: impl Into<String>) -> Self {
        Self { question: question.into(), ..Self::default() }
    }

    /// Retrieve `k` passages.
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    /// Attach conversation history.
    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    /// Bound each external call made for this query.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// An answer with the sources it was drawn from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// The answer text.
    pub text: String,
    /// Distinct sources of the passages the answer used, in rank order.
    pub sources: Vec<SourceRef>,
    /// Every passage retrieved for the question.
    pub passages: Vec<SearchResult>,
}

/// Index readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    /// Records in the index.
    pub records: usize,
    /// Index dimensionality, once fixed.
    pub dimensions: Option<usize>,
    /// Whether there is anything to retrieve.
    pub ready: bool,
}

#[derive(Debug, Default)]
struct DocumentOutcome {
    indexed: usize,
    skipped: usize,
    unsearchable: usize,
}

/// The retrieval engine.
///
/// Construct one via [`RagEngine::builder()`], or with `RagEngine::open`
/// (feature `sqlite`) for a SQLite-backed index. Instances share no global
/// state; several may coexist in one process.
pub struct RagEngine {
    config: RagConfig,
    extractor: Arc<dyn TextExtractor>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    synthesizer: Arc<dyn AnswerSynthesizer>,
}

impl RagEngine {
    /// Create a new [`RagEngineBuilder`].
    pub fn builder() -> RagEngineBuilder {
        RagEngineBuilder::default()
    }

    /// Open the SQLite index and components described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for invalid settings and
    /// [`RagError::IndexUnavailable`] if the index cannot be opened.
    #[cfg(feature = "sqlite")]
    pub async fn open(settings: crate::config::EngineSettings) -> Result<Self> {
        settings.config.validate()?;
        let embedder = settings.embedding.build()?;
        let synthesizer = settings.synthesizer.build()?;
        let store = crate::sqlite::SqliteVectorStore::open(&settings.store_path).await?;

        info!(
            store = %settings.store_path.display(),
            model = embedder.model(),
            synthesizer = synthesizer.name(),
            "opened engine"
        );

        Self::builder()
            .config(settings.config)
            .embedding_provider(embedder)
            .vector_store(Arc::new(store))
            .synthesizer(synthesizer)
            .build()
    }

    /// Return a reference to the engine configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    fn retry(&self) -> &RetryPolicy {
        &self.config.retry
    }

    /// Fail fast when the embedder cannot produce vectors the index accepts.
    async fn check_dimensions(&self, policy: &RetryPolicy) -> Result<()> {
        let stored = policy.run("store.dimensions", || self.store.dimensions()).await?;
        match stored {
            Some(expected) if expected != self.embedder.dimensions() => {
                error!(expected, actual = self.embedder.dimensions(), "embedder does not match index");
                Err(RagError::DimensionMismatch { expected, actual: self.embedder.dimensions() })
            }
            _ => Ok(()),
        }
    }

    /// Index `documents`, skipping segments the index already holds.
    ///
    /// Documents that fail to extract or chunk are logged, listed in
    /// [`IndexReport::errors`], and do not stop their siblings.
    ///
    /// # Errors
    ///
    /// Embedding, dimension, storage and timeout failures abort the build.
    pub async fn index(&self, documents: &[DocumentHandle]) -> Result<IndexReport> {
        info!(documents = documents.len(), "indexing corpus");
        self.check_dimensions(self.retry()).await?;

        let mut report = IndexReport { documents: documents.len(), ..IndexReport::default() };
        let mut outcomes = stream::iter(documents)
            .map(|document| async move { (document, self.index_document(document).await) })
            .buffered(self.config.index_concurrency);

        while let Some((document, outcome)) = outcomes.next().await {
            match outcome {
                Ok(outcome) => {
                    report.indexed += outcome.indexed;
                    report.skipped += outcome.skipped;
                    report.unsearchable += outcome.unsearchable;
                }
                Err(e) if e.is_document_scoped() => {
                    warn!(document = document.name(), error = %e, "skipping document");
                    report
                        .errors
                        .push(DocumentError { source: document.name().to_string(), reason: e.to_string() });
                }
                Err(e) => {
                    error!(document = document.name(), error = %e, "indexing aborted");
                    return Err(e);
                }
            }
        }

        info!(
            documents = report.documents,
            indexed = report.indexed,
            skipped = report.skipped,
            unsearchable = report.unsearchable,
            failed = report.errors.len(),
            "indexing complete"
        );
        Ok(report)
    }

    /// Clear the index, then index `documents`.
    ///
    /// Use this after documents were edited or removed; a plain
    /// [`index`](Self::index) never deletes records.
    pub async fn rebuild(&self, documents: &[DocumentHandle]) -> Result<IndexReport> {
        info!("clearing index for rebuild");
        self.retry().run("store.clear", || self.store.clear()).await?;
        self.index(documents).await
    }

    async fn index_document(&self, document: &DocumentHandle) -> Result<DocumentOutcome> {
        let pages = self.extractor.extract(document).await?;
        let mut outcome = DocumentOutcome::default();
        let mut pending = Vec::new();

        for page in &pages {
            let spans = self.chunker.split(&page.text).map_err(|e| match e {
                RagError::Chunking { message, .. } => {
                    RagError::Chunking { document: document.name().to_string(), message }
                }
                other => other,
            })?;

            for span in spans.into_iter().filter(|span| !span.text.trim().is_empty()) {
                let metadata = SourceMetadata {
                    source: document.name().to_string(),
                    locator: page.locator,
                    start: span.start,
                    end: span.end,
                };
                let segment = Segment::new(span.text, metadata);
                if self.retry().run("store.has", || self.store.has(&segment.id)).await? {
                    outcome.skipped += 1;
                } else {
                    pending.push(segment);
                }
            }
        }

        for batch in pending.chunks(self.config.embed_batch_size) {
            let texts: Vec<&str> = batch.iter().map(|s| s.text.as_str()).collect();
            let vectors =
                self.retry().run("embed_batch", || self.embedder.embed_batch(&texts)).await?;
            validate_embeddings(
                self.embedder.model(),
                texts.len(),
                self.embedder.dimensions(),
                &vectors,
            )?;

            for (segment, vector) in batch.iter().zip(vectors) {
                if is_zero_vector(&vector) {
                    debug!(
                        document = document.name(),
                        start = segment.metadata.start,
                        "segment has no searchable terms"
                    );
                    outcome.unsearchable += 1;
                    continue;
                }
                let segment = segment.clone().with_vector(vector);
                let inserted = self
                    .retry()
                    .run("store.upsert_if_absent", || self.store.upsert_if_absent(&segment))
                    .await?;
                if inserted {
                    outcome.indexed += 1;
                } else {
                    outcome.skipped += 1;
                }
            }
        }

        info!(
            document = document.name(),
            pages = pages.len(),
            indexed = outcome.indexed,
            skipped = outcome.skipped,
            unsearchable = outcome.unsearchable,
            "indexed document"
        );
        Ok(outcome)
    }

    /// Retrieve the `k` passages most similar to `question`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidQuery`] for a blank question, a question
    /// the embedder maps to the zero vector (e.g. punctuation only), or
    /// `k == 0`.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Retrieval> {
        self.retrieve_with(question, k, self.retry()).await
    }

    async fn retrieve_with(&self, question: &str, k: usize, policy: &RetryPolicy) -> Result<Retrieval> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidQuery("question must not be empty".to_string()));
        }
        if k == 0 {
            return Err(RagError::InvalidQuery("k must be greater than zero".to_string()));
        }

        let records = policy.run("store.len", || self.store.len()).await?;
        if records == 0 {
            debug!("index is empty");
            return Ok(Retrieval::NoContext);
        }
        self.check_dimensions(policy).await?;

        let vector = policy.run("embed", || self.embedder.embed(question)).await?;
        validate_embeddings(
            self.embedder.model(),
            1,
            self.embedder.dimensions(),
            std::slice::from_ref(&vector),
        )?;

        if is_zero_vector(&vector) {
            return Err(RagError::InvalidQuery("question has no searchable terms".to_string()));
        }

        let mut results = policy.run("store.search", || self.store.search(&vector, k)).await?;
        if let Some(threshold) = self.config.similarity_threshold {
            results.retain(|r| r.score >= threshold);
        }

        debug!(k, result_count = results.len(), "retrieved passages");
        Ok(Retrieval::Matches(results))
    }

    /// Answer a question from the indexed corpus.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NoContext`] when the index is empty, unless
    /// [`RagConfig::answer_without_context`] is set.
    pub async fn query(&self, request: &QueryRequest) -> Result<Answer> {
        let policy = match request.timeout {
            Some(timeout) => self.retry().clone().with_timeout(timeout),
            None => self.retry().clone(),
        };
        let k = request.top_k.unwrap_or(self.config.top_k);

        let passages = match self.retrieve_with(&request.question, k, &policy).await? {
            Retrieval::Matches(results) => results,
            Retrieval::NoContext if self.config.answer_without_context => {
                info!("index is empty; answering without context");
                Vec::new()
            }
            Retrieval::NoContext => return Err(RagError::NoContext),
        };

        let skip = request.history.len().saturating_sub(self.config.max_history_turns);
        let history = &request.history[skip..];
        let question = request.question.trim();

        let synthesis = policy
            .run("synthesize", || self.synthesizer.synthesize(question, history, &passages))
            .await?;

        let mut sources: Vec<SourceRef> = Vec::new();
        for reference in synthesis
            .used
            .iter()
            .filter_map(|&i| passages.get(i))
            .map(|p| p.segment.metadata.source_ref())
        {
            if !sources.contains(&reference) {
                sources.push(reference);
            }
        }

        info!(
            k,
            passages = passages.len(),
            sources = sources.len(),
            synthesizer = self.synthesizer.name(),
            "query answered"
        );
        Ok(Answer { text: synthesis.text, sources, passages })
    }

    /// Report how many records the index holds and whether it can answer.
    pub async fn status(&self) -> Result<IndexStatus> {
        let records = self.retry().run("store.len", || self.store.len()).await?;
        let dimensions = self.retry().run("store.dimensions", || self.store.dimensions()).await?;
        Ok(IndexStatus { records, dimensions, ready: records > 0 })
    }
}

/// Builder for constructing a [`RagEngine`].
///
/// The embedding provider and vector store are required. The configuration
/// defaults to [`RagConfig::default()`], the chunker to a
/// [`FixedSizeChunker`] sized from the configuration, the extractor to
/// [`FileExtractor`] and the synthesizer to [`ExcerptSynthesizer`].
///
/// # Example
///
/// ```rust,ignore
/// let engine = RagEngine::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .vector_store(Arc::new(store))
///     .synthesizer(Arc::new(synthesizer))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagEngineBuilder {
    config: Option<RagConfig>,
    extractor: Option<Arc<dyn TextExtractor>>,
    chunker: Option<Arc<dyn Chunker>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    synthesizer: Option<Arc<dyn AnswerSynthesizer>>,
}

impl RagEngineBuilder {
    /// Set the engine configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the text extractor.
    pub fn extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Set the chunker, overriding the configured chunk sizes.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the answer synthesizer.
    pub fn synthesizer(mut self, synthesizer: Arc<dyn AnswerSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Build the [`RagEngine`], validating the configuration and that all
    /// required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<RagEngine> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let embedder = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let chunker = self.chunker.unwrap_or_else(|| {
            Arc::new(FixedSizeChunker::new(config.chunk_size, config.chunk_overlap))
        });

        Ok(RagEngine {
            extractor: self.extractor.unwrap_or_else(|| Arc::new(FileExtractor::new())),
            synthesizer: self.synthesizer.unwrap_or_else(|| Arc::new(ExcerptSynthesizer::default())),
            config,
            chunker,
            embedder,
            store,
        })
    }
}
