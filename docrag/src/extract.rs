//! Text extraction from source documents.
//!
//! [`FileExtractor`] turns a [`DocumentHandle`] into [`PageText`] blocks: one
//! per page for PDFs, one per file for plain text and markdown. Extraction
//! reads the document afresh every time, so repeating it yields the same
//! blocks.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::document::{DocumentHandle, Locator, PageText};
use crate::error::{RagError, Result};

/// File extensions [`FileExtractor`] understands.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md", "markdown"];

/// Converts a document into raw text blocks.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract the text blocks of `document` in document order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Extraction`] if the document is unreadable, corrupt
    /// or of an unsupported type.
    async fn extract(&self, document: &DocumentHandle) -> Result<Vec<PageText>>;
}

/// Extracts PDFs page by page and reads text files whole.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileExtractor;

impl FileExtractor {
    /// Create a new extractor.
    pub fn new() -> Self {
        Self
    }

    fn failure(document: &DocumentHandle, message: impl Into<String>) -> RagError {
        RagError::Extraction { document: document.name().to_string(), message: message.into() }
    }

    async fn extract_pdf(&self, document: &DocumentHandle, path: &Path) -> Result<Vec<PageText>> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Self::failure(document, format!("failed to read file: {e}")))?;

        // The PDF parser is synchronous and may panic on malformed input; both
        // a parse error and a panic surface as an extraction error.
        let pages =
            tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem_by_pages(&bytes))
                .await
                .map_err(|e| Self::failure(document, format!("PDF parser aborted: {e}")))?
                .map_err(|e| Self::failure(document, format!("PDF extraction error: {e}")))?;

        debug!(document = document.name(), pages = pages.len(), "extracted pdf");
        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| PageText { text, locator: Locator::Page(i as u32 + 1) })
            .collect())
    }

    async fn extract_text(&self, document: &DocumentHandle, path: &Path) -> Result<Vec<PageText>> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Self::failure(document, format!("failed to read file: {e}")))?;
        let text = String::from_utf8(bytes)
            .map_err(|e| Self::failure(document, format!("file is not valid UTF-8: {e}")))?;

        Ok(vec![PageText { text, locator: Locator::Offset(0) }])
    }
}

#[async_trait]
impl TextExtractor for FileExtractor {
    async fn extract(&self, document: &DocumentHandle) -> Result<Vec<PageText>> {
        let path = match document {
            DocumentHandle::Inline { text, .. } => {
                return Ok(vec![PageText { text: text.clone(), locator: Locator::Offset(0) }]);
            }
            DocumentHandle::File { path, .. } => path,
        };

        match extension_of(path).as_deref() {
            Some("pdf") => self.extract_pdf(document, path).await,
            Some("txt" | "md" | "markdown") => self.extract_text(document, path).await,
            other => Err(Self::failure(
                document,
                format!("unsupported document type '{}'", other.unwrap_or("")),
            )),
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

/// Find every supported document under `root`.
///
/// Handles are named by their path relative to `root` (with `/` separators)
/// and returned sorted by that name. A missing root yields an empty corpus.
pub fn discover_documents(root: impl AsRef<Path>) -> Vec<DocumentHandle> {
    let root = root.as_ref();
    if !root.is_dir() {
        warn!(root = %root.display(), "document directory not found; corpus is empty");
        return Vec::new();
    }

    let mut documents: Vec<DocumentHandle> = WalkDir::new(root)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            extension_of(entry.path()).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        })
        .map(|entry| {
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            DocumentHandle::named_file(name, entry.into_path())
        })
        .collect();

    documents.sort_by(|a, b| a.name().cmp(b.name()));
    documents
}
