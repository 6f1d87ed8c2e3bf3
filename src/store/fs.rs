//! Filesystem document store
//!
//! Serves the markdown files below a root directory. Paths handed in and out
//! are relative to the root and always use `/`.

use super::traits::{DocumentChange, DocumentRef, DocumentStore, StoreError, StoreResult};
use async_trait::async_trait;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Component, Path, PathBuf};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

const CHANNEL_CAPACITY: usize = 1024;

/// Markdown files under a root directory.
pub struct FsStore {
    root: PathBuf,
    changes: broadcast::Sender<DocumentChange>,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("md"))
        .unwrap_or(false)
}

/// Root-relative, `/`-separated form of `path`.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

impl FsStore {
    /// Open a store rooted at an existing directory.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = std::fs::canonicalize(root.as_ref())?;
        if !root.is_dir() {
            return Err(StoreError::InvalidPath(root.display().to_string()));
        }
        let (changes, _) = broadcast::channel(CHANNEL_CAPACITY);
        Ok(Self { root, changes })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a store path to a filesystem path inside the root.
    fn resolve(&self, path: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Start watching the root; changes to markdown files are published to
    /// subscribers. The returned watcher must be kept alive.
    pub fn watch(&self) -> StoreResult<RecommendedWatcher> {
        let root = self.root.clone();
        let changes = self.changes.clone();

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "file watcher error");
                    return;
                }
            };
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                return;
            }
            for path in event.paths.iter().filter(|p| is_markdown(p)) {
                if let Some(relative) = relative_path(&root, path) {
                    debug!(path = %relative, "document changed on disk");
                    let _ = changes.send(DocumentChange { path: relative });
                }
            }
        })?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        Ok(watcher)
    }
}

#[async_trait]
impl DocumentStore for FsStore {
    async fn list_documents(&self) -> StoreResult<Vec<DocumentRef>> {
        let root = self.root.clone();
        let walked = tokio::task::spawn_blocking(move || {
            WalkDir::new(&root)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| !is_hidden(e))
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && is_markdown(e.path()))
                .filter_map(|e| relative_path(&root, e.path()))
                .map(DocumentRef::from_path)
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;
        Ok(walked)
    }

    async fn read(&self, path: &str) -> StoreResult<String> {
        let full = self.resolve(path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &str, text: &str) -> StoreResult<()> {
        let full = self.resolve(path)?;
        if !tokio::fs::try_exists(&full).await? {
            return Err(StoreError::NotFound(path.to_string()));
        }
        tokio::fs::write(&full, text).await?;
        Ok(())
    }

    async fn create(&self, path: &str, text: &str) -> StoreResult<()> {
        let full = self.resolve(path)?;
        if tokio::fs::try_exists(&full).await? {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, text).await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        let full = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&full).await?)
    }

    fn subscribe(&self) -> broadcast::Receiver<DocumentChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> (tempfile::TempDir, FsStore) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("projects/sub")).unwrap();
        std::fs::create_dir_all(dir.path().join(".obsidian")).unwrap();
        std::fs::write(dir.path().join("projects/plan.md"), "#TODO a\n").unwrap();
        std::fs::write(dir.path().join("projects/sub/deep.md"), "").unwrap();
        std::fs::write(dir.path().join("projects/image.png"), "").unwrap();
        std::fs::write(dir.path().join(".obsidian/workspace.md"), "").unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn lists_markdown_outside_hidden_dirs() {
        let (_dir, store) = vault();
        let paths: Vec<_> = store
            .list_documents()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.path)
            .collect();
        assert_eq!(paths, vec!["projects/plan.md", "projects/sub/deep.md"]);
    }

    #[tokio::test]
    async fn read_write_create() {
        let (_dir, store) = vault();
        assert_eq!(store.read("projects/plan.md").await.unwrap(), "#TODO a\n");

        store.write("projects/plan.md", "changed").await.unwrap();
        assert_eq!(store.read("projects/plan.md").await.unwrap(), "changed");

        assert!(matches!(
            store.write("nope.md", "x").await.unwrap_err(),
            StoreError::NotFound(_)
        ));

        store.create("out/TODO.md", "- [ ] x (y)\n").await.unwrap();
        assert!(store.exists("out/TODO.md").await.unwrap());
        assert!(matches!(
            store.create("out/TODO.md", "").await.unwrap_err(),
            StoreError::AlreadyExists(_)
        ));
    }

    #[tokio::test]
    async fn rejects_paths_escaping_the_root() {
        let (_dir, store) = vault();
        for bad in ["../outside.md", "/etc/passwd", ""] {
            assert!(
                matches!(store.read(bad).await.unwrap_err(), StoreError::InvalidPath(_)),
                "path: {:?}",
                bad
            );
        }
    }
}
