//! Document store trait definitions

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid document path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// A document known to the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    /// Store-relative, `/`-separated path
    pub path: String,
    /// File name without its extension
    pub basename: String,
}

impl DocumentRef {
    /// Build a reference, deriving the basename from the path.
    pub fn from_path(path: impl Into<String>) -> Self {
        let path = path.into();
        let basename = basename_of(&path).to_string();
        Self { path, basename }
    }
}

/// File stem of a `/` or `\` separated path.
pub fn basename_of(path: &str) -> &str {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    }
}

/// Notification that a document was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChange {
    pub path: String,
}

/// Trait for document store backends
///
/// The store serializes access per path; callers never write one document
/// concurrently. Every completed write is announced to subscribers,
/// including writes made by the harvester itself.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// List every document, in a stable order
    async fn list_documents(&self) -> StoreResult<Vec<DocumentRef>>;

    /// Read a document's full text
    async fn read(&self, path: &str) -> StoreResult<String>;

    /// Replace an existing document's text
    async fn write(&self, path: &str, text: &str) -> StoreResult<()>;

    /// Create a new document
    async fn create(&self, path: &str, text: &str) -> StoreResult<()>;

    /// Check whether a document exists
    async fn exists(&self, path: &str) -> StoreResult<bool>;

    /// Subscribe to change notifications
    fn subscribe(&self) -> broadcast::Receiver<DocumentChange>;
}
