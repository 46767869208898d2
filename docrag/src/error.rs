//! Error types for the `docrag` crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while indexing or querying a corpus.
#[derive(Debug, Error)]
pub enum RagError {
    /// A source document could not be read or decoded.
    #[error("Extraction error ({document}): {message}")]
    Extraction {
        /// Name of the offending document.
        document: String,
        /// A description of the failure.
        message: String,
    },

    /// A document could not be split into segments.
    #[error("Chunking error ({document}): {message}")]
    Chunking {
        /// Name of the offending document.
        document: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding backend was unreachable or returned malformed output.
    #[error("Embedding unavailable ({provider}): {message}")]
    EmbeddingUnavailable {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
        /// Whether a later attempt may succeed.
        retryable: bool,
    },

    /// A vector did not match the dimensionality of the index.
    #[error("Dimension mismatch: index holds {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch {
        /// Dimensionality of the index.
        expected: usize,
        /// Dimensionality of the rejected vector.
        actual: usize,
    },

    /// The persisted vector index could not be opened, read or written.
    #[error("Index unavailable ({backend}): {message}")]
    IndexUnavailable {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
        /// Whether a later attempt may succeed.
        retryable: bool,
    },

    /// An external call exceeded its time budget.
    #[error("Timeout: {operation} did not complete within {timeout:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The budget that was exceeded.
        timeout: Duration,
    },

    /// The answer synthesizer failed to produce an answer.
    #[error("Synthesis error ({synthesizer}): {message}")]
    Synthesis {
        /// The synthesizer or language model that produced the error.
        synthesizer: String,
        /// A description of the failure.
        message: String,
        /// Whether a later attempt may succeed.
        retryable: bool,
    },

    /// The index holds no records, so there is no context to answer from.
    #[error("No context available: the index is empty")]
    NoContext,

    /// The query was rejected before reaching any backend.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl RagError {
    /// Whether the failed operation may succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            RagError::EmbeddingUnavailable { retryable, .. }
            | RagError::IndexUnavailable { retryable, .. }
            | RagError::Synthesis { retryable, .. } => *retryable,
            RagError::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Whether the error only affects the document being indexed.
    ///
    /// Document-scoped errors are reported in the build report; every other
    /// error aborts the build.
    pub fn is_document_scoped(&self) -> bool {
        matches!(self, RagError::Extraction { .. } | RagError::Chunking { .. })
    }

    /// A stable, machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::Extraction { .. } => "extraction_error",
            RagError::Chunking { .. } => "chunking_error",
            RagError::EmbeddingUnavailable { .. } => "embedding_unavailable",
            RagError::DimensionMismatch { .. } => "dimension_mismatch",
            RagError::IndexUnavailable { .. } => "index_unavailable",
            RagError::Timeout { .. } => "timeout",
            RagError::Synthesis { .. } => "synthesis_error",
            RagError::NoContext => "no_context",
            RagError::InvalidQuery(_) => "invalid_query",
            RagError::ConfigError(_) => "config_error",
        }
    }
}

/// A convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_flags_are_honoured() {
        let transient = RagError::EmbeddingUnavailable {
            provider: "OpenAI".into(),
            message: "503".into(),
            retryable: true,
        };
        let fatal = RagError::DimensionMismatch { expected: 3, actual: 4 };
        let timeout = RagError::Timeout { operation: "embed".into(), timeout: Duration::from_secs(1) };

        assert!(transient.is_retryable());
        assert!(timeout.is_retryable());
        assert!(!fatal.is_retryable());
        assert!(!RagError::NoContext.is_retryable());
    }

    #[test]
    fn only_extraction_and_chunking_are_document_scoped() {
        let extraction = RagError::Extraction { document: "a.pdf".into(), message: "bad".into() };
        let chunking = RagError::Chunking { document: "a.txt".into(), message: "bad".into() };
        let index = RagError::IndexUnavailable {
            backend: "sqlite".into(),
            message: "gone".into(),
            retryable: false,
        };

        assert!(extraction.is_document_scoped());
        assert!(chunking.is_document_scoped());
        assert!(!index.is_document_scoped());
        assert_eq!(index.kind(), "index_unavailable");
    }
}
