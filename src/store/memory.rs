//! In-memory document store
//!
//! Announces every write to subscribers, the way an editor host calls back
//! into its plugins after each save.

use super::traits::{DocumentChange, DocumentRef, DocumentStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Insertion-ordered in-memory store.
pub struct MemoryStore {
    documents: Mutex<Vec<(String, String)>>,
    /// Paths written through `write`/`create`, in order
    writes: Mutex<Vec<String>>,
    /// Paths whose writes fail, for exercising partial passes
    failing: Mutex<HashSet<String>>,
    changes: broadcast::Sender<DocumentChange>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            documents: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            changes,
        }
    }

    /// Add a document without recording a write or announcing it.
    pub fn with_document(self, path: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    /// Insert or replace a document silently.
    pub fn insert(&self, path: impl Into<String>, text: impl Into<String>) {
        let path = path.into();
        let text = text.into();
        let mut documents = self.documents.lock().unwrap_or_else(|e| e.into_inner());
        match documents.iter_mut().find(|(p, _)| *p == path) {
            Some((_, existing)) => *existing = text,
            None => documents.push((path, text)),
        }
    }

    /// Current text of a document, bypassing the async API.
    pub fn get(&self, path: &str) -> Option<String> {
        let documents = self.documents.lock().unwrap_or_else(|e| e.into_inner());
        documents.iter().find(|(p, _)| p == path).map(|(_, t)| t.clone())
    }

    /// Paths written so far, in order.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Make every later write to `path` fail.
    pub fn fail_writes_to(&self, path: impl Into<String>) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.into());
    }

    fn check_writable(&self, path: &str) -> StoreResult<()> {
        let failing = self.failing.lock().unwrap_or_else(|e| e.into_inner());
        if failing.contains(path) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("write to {} rejected", path),
            )));
        }
        Ok(())
    }

    fn announce(&self, path: &str) {
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(path.to_string());
        // No subscribers is fine.
        let _ = self.changes.send(DocumentChange {
            path: path.to_string(),
        });
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_documents(&self) -> StoreResult<Vec<DocumentRef>> {
        let documents = self.documents.lock().unwrap_or_else(|e| e.into_inner());
        Ok(documents
            .iter()
            .map(|(path, _)| DocumentRef::from_path(path.clone()))
            .collect())
    }

    async fn read(&self, path: &str) -> StoreResult<String> {
        self.get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn write(&self, path: &str, text: &str) -> StoreResult<()> {
        self.check_writable(path)?;
        {
            let mut documents = self.documents.lock().unwrap_or_else(|e| e.into_inner());
            let Some((_, existing)) = documents.iter_mut().find(|(p, _)| p == path) else {
                return Err(StoreError::NotFound(path.to_string()));
            };
            *existing = text.to_string();
        }
        self.announce(path);
        Ok(())
    }

    async fn create(&self, path: &str, text: &str) -> StoreResult<()> {
        self.check_writable(path)?;
        {
            let mut documents = self.documents.lock().unwrap_or_else(|e| e.into_inner());
            if documents.iter().any(|(p, _)| p == path) {
                return Err(StoreError::AlreadyExists(path.to_string()));
            }
            documents.push((path.to_string(), text.to_string()));
        }
        self.announce(path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        Ok(self.get(path).is_some())
    }

    fn subscribe(&self) -> broadcast::Receiver<DocumentChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_requires_existing_document() {
        let store = MemoryStore::new();
        let err = store.write("missing.md", "x").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn create_then_read() {
        let store = MemoryStore::new();
        store.create("a/b.md", "hello").await.unwrap();
        assert_eq!(store.read("a/b.md").await.unwrap(), "hello");
        assert!(store.exists("a/b.md").await.unwrap());

        let err = store.create("a/b.md", "again").await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn writes_are_announced() {
        let store = MemoryStore::new().with_document("n.md", "old");
        let mut changes = store.subscribe();

        store.write("n.md", "new").await.unwrap();

        assert_eq!(changes.recv().await.unwrap().path, "n.md");
        assert_eq!(store.writes(), vec!["n.md"]);
    }

    #[tokio::test]
    async fn listing_keeps_insertion_order() {
        let store = MemoryStore::new()
            .with_document("z/last.md", "")
            .with_document("a/first.md", "");
        let listed = store.list_documents().await.unwrap();
        assert_eq!(listed[0].path, "z/last.md");
        assert_eq!(listed[1].basename, "first");
    }

    #[tokio::test]
    async fn failing_writes() {
        let store = MemoryStore::new().with_document("locked.md", "");
        store.fail_writes_to("locked.md");
        assert!(matches!(
            store.write("locked.md", "x").await.unwrap_err(),
            StoreError::Io(_)
        ));
        assert!(store.writes().is_empty());
    }
}
