//! Reference corpus: the fixed documents sent with every turn.
//!
//! Loaded once at startup; a single unreadable path aborts startup (there is
//! no partial-corpus mode). Documents are shared by `Arc` afterwards.

use crate::error::StartupError;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// An immutable document blob with its MIME type.
#[derive(Clone, PartialEq, Eq)]
pub struct ReferenceDocument {
    /// File name, used as the stable identifier in logs and history summaries.
    pub name: String,
    pub mime_type: String,
    pub bytes: Arc<[u8]>,
}

impl std::fmt::Debug for ReferenceDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceDocument")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ReferenceDocument {
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        Self {
            name,
            mime_type: mime_type.into(),
            bytes: Arc::from(bytes),
        }
    }

    /// Read one document from disk.
    pub fn load(path: &Path) -> Result<Self, StartupError> {
        let bytes = std::fs::read(path).map_err(|source| StartupError::UnreadableDocument {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            name,
            mime_type: mime_type_for(path).to_string(),
            bytes: Arc::from(bytes),
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Text-like documents can be inlined into providers without binary parts.
    pub fn is_text(&self) -> bool {
        self.mime_type.starts_with("text/") || self.mime_type == "application/json"
    }

    /// UTF-8 view for text documents.
    pub fn as_text(&self) -> Option<&str> {
        if self.is_text() { std::str::from_utf8(&self.bytes).ok() } else { None }
    }
}

/// Guess the MIME type from the file extension.
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// Ordered, read-only set of reference documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    documents: Vec<Arc<ReferenceDocument>>,
}

impl Corpus {
    /// Load every path in order. Fails on the first unreadable file.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, StartupError> {
        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let doc = ReferenceDocument::load(path.as_ref())?;
            debug!(target: "corpus", name = %doc.name, mime = %doc.mime_type, bytes = doc.len(), "document_loaded");
            documents.push(Arc::new(doc));
        }
        info!(target: "corpus", count = documents.len(), "corpus_loaded");
        Ok(Self { documents })
    }

    /// Like `load`, but an empty path list is an error.
    pub fn load_required<P: AsRef<Path>>(paths: &[P]) -> Result<Self, StartupError> {
        if paths.is_empty() {
            return Err(StartupError::EmptyCorpus);
        }
        Self::load(paths)
    }

    pub fn from_documents(documents: Vec<ReferenceDocument>) -> Self {
        Self { documents: documents.into_iter().map(Arc::new).collect() }
    }

    pub fn documents(&self) -> &[Arc<ReferenceDocument>] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.documents.iter().map(|d| d.len()).sum()
    }
}
