//! In-memory vault fixture for harvest tests
//!
//! Wraps a `MemoryStore` with the settings and harvester a test needs, so a
//! scenario reads as: build the vault, run a pass, look at the documents.

use std::sync::Arc;
use todo_harvest::{
    ChangeOutcome, Classifier, DocumentStore, HarvestError, HarvestReport, Harvester, MemoryStore,
    Settings,
};

/// Fixed clock for deterministic retention math.
pub const NOW: i64 = 1_700_000_000_000;
pub const HOUR: i64 = 3_600_000;

pub struct TestVault {
    pub store: Arc<MemoryStore>,
    pub settings: Settings,
    classifier: Option<Arc<dyn Classifier>>,
}

impl TestVault {
    /// An empty vault scanning `project/`, writing to `TODO.md`.
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            settings: Settings {
                target_directories: vec!["project".to_string()],
                ..Settings::default()
            },
            classifier: None,
        }
    }

    pub fn with_document(self, path: &str, text: &str) -> Self {
        self.store.insert(path, text);
        self
    }

    pub fn with_settings(mut self, configure: impl FnOnce(&mut Settings)) -> Self {
        configure(&mut self.settings);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn harvester(&self) -> Harvester {
        let harvester = Harvester::new(Arc::clone(&self.store) as Arc<dyn DocumentStore>);
        match &self.classifier {
            Some(classifier) => harvester.with_classifier(Arc::clone(classifier)),
            None => harvester,
        }
    }

    pub async fn collect_at(&mut self, now_ms: i64) -> Result<HarvestReport, HarvestError> {
        let harvester = self.harvester();
        harvester.collect(&mut self.settings, now_ms).await
    }

    pub async fn collect(&mut self) -> Result<HarvestReport, HarvestError> {
        self.collect_at(NOW).await
    }

    pub async fn sweep_at(&mut self, now_ms: i64) -> Result<bool, HarvestError> {
        let harvester = self.harvester();
        harvester.sweep(&mut self.settings, now_ms).await
    }

    pub async fn change(&mut self, path: &str) -> Result<ChangeOutcome, HarvestError> {
        let harvester = self.harvester();
        harvester.handle_change(path, &mut self.settings, NOW).await
    }

    /// Current text of a document; panics if it does not exist.
    pub fn text(&self, path: &str) -> String {
        self.store
            .get(path)
            .unwrap_or_else(|| panic!("document {} does not exist", path))
    }

    pub fn output(&self) -> String {
        self.text(&self.settings.output_path)
    }

    /// Apply an edit to a document the way a user would, without any
    /// change notification.
    pub fn edit(&self, path: &str, edit: impl FnOnce(&str) -> String) {
        let updated = edit(&self.text(path));
        self.store.insert(path, updated);
    }
}
