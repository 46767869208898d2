//! Data types for documents, segments, and search results.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A handle to a source document in the corpus.
///
/// Documents are identified by `name`, which is what source attribution
/// reports back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentHandle {
    /// A document on disk, read through a [`TextExtractor`](crate::TextExtractor).
    File {
        /// Name used for attribution, usually the path relative to the corpus root.
        name: String,
        /// Location of the file.
        path: PathBuf,
    },
    /// Text already held in memory.
    Inline {
        /// Name used for attribution.
        name: String,
        /// The document text.
        text: String,
    },
}

impl DocumentHandle {
    /// Create a file handle named after `path` as given.
    ///
    /// The full path keeps names distinct across directories; two files that
    /// share a file name never collide in attribution or segment ids. Use
    /// [`named_file`](Self::named_file) for shorter names, as
    /// [`discover_documents`](crate::discover_documents) does with paths
    /// relative to the corpus root.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.to_string_lossy().into_owned();
        Self::File { name, path }
    }

    /// Create a file handle with an explicit attribution name.
    ///
    /// Names must be unique within a corpus: segments of equal text at the
    /// same position in two documents of the same name share an id.
    pub fn named_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::File { name: name.into(), path: path.into() }
    }

    /// Create an inline text handle.
    pub fn inline(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Inline { name: name.into(), text: text.into() }
    }

    /// The attribution name of the document.
    pub fn name(&self) -> &str {
        match self {
            Self::File { name, .. } | Self::Inline { name, .. } => name,
        }
    }

    /// The on-disk path, if this handle refers to a file.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File { path, .. } => Some(path),
            Self::Inline { .. } => None,
        }
    }
}

/// Position of a text block inside its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Locator {
    /// A 1-based page number.
    Page(u32),
    /// A character offset into the document text.
    Offset(usize),
}

impl Locator {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Locator::Page(_) => "page",
            Locator::Offset(_) => "offset",
        }
    }

    pub(crate) fn value(&self) -> u64 {
        match self {
            Locator::Page(page) => u64::from(*page),
            Locator::Offset(offset) => *offset as u64,
        }
    }

    pub(crate) fn from_parts(kind: &str, value: u64) -> Option<Self> {
        match kind {
            "page" => u32::try_from(value).ok().map(Locator::Page),
            "offset" => usize::try_from(value).ok().map(Locator::Offset),
            _ => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Page(page) => write!(f, "page {page}"),
            Locator::Offset(offset) => write!(f, "offset {offset}"),
        }
    }
}

/// A block of raw text produced by extraction: one page of a PDF, or a whole
/// plain-text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// The extracted text.
    pub text: String,
    /// Where the block sits in its document.
    pub locator: Locator,
}

/// Where a segment came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Name of the source document.
    pub source: String,
    /// Page or offset of the block the segment was cut from.
    pub locator: Locator,
    /// Start character offset within the block.
    pub start: usize,
    /// End character offset (exclusive) within the block.
    pub end: usize,
}

impl SourceMetadata {
    /// The attribution reference for this segment.
    pub fn source_ref(&self) -> SourceRef {
        let locator = match self.locator {
            Locator::Page(_) => self.locator,
            Locator::Offset(base) => Locator::Offset(base + self.start),
        };
        SourceRef { source: self.source.clone(), locator: locator.to_string() }
    }
}

/// The atomic retrievable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Deterministic identifier, see [`Segment::derive_id`].
    pub id: String,
    /// The segment text; never blank.
    pub text: String,
    /// Source attribution for the segment.
    pub metadata: SourceMetadata,
    /// The embedding vector. Empty until the segment is embedded, and left
    /// empty in search results.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vector: Vec<f32>,
}

impl Segment {
    /// Build a segment without a vector, deriving its id from its content.
    pub fn new(text: impl Into<String>, metadata: SourceMetadata) -> Self {
        let text = text.into();
        let id = Self::derive_id(&metadata, &text);
        Self { id, text, metadata, vector: Vec::new() }
    }

    /// Derive the id for a segment of `text` at the position described by
    /// `metadata`.
    ///
    /// The id is the first 32 hex characters of a SHA-256 over the source name,
    /// locator, start offset and text, so re-indexing unchanged content always
    /// lands on the same record.
    pub fn derive_id(metadata: &SourceMetadata, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(metadata.source.as_bytes());
        hasher.update([0]);
        hasher.update(metadata.locator.kind().as_bytes());
        hasher.update(metadata.locator.value().to_le_bytes());
        hasher.update((metadata.start as u64).to_le_bytes());
        hasher.update([0]);
        hasher.update(text.as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        hash.chars().take(32).collect()
    }

    /// Attach an embedding vector.
    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = vector;
        self
    }
}

/// A retrieved [`Segment`] paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved segment.
    pub segment: Segment,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
}

/// A source reference returned alongside an answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    /// Name of the source document.
    pub source: String,
    /// Human-readable locator, e.g. `page 3` or `offset 800`.
    pub locator: String,
}

/// One prior exchange in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// The question asked.
    pub question: String,
    /// The answer given.
    pub answer: String,
}
