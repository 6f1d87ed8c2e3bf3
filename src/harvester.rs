//! Harvest orchestration
//!
//! `Harvester` ties the engine to a document store and a classifier: full
//! collection passes, on-demand sweeps of the output document, and handling
//! of change notifications from the store.

use crate::classify::{Classifier, ClassifyError, ClassifyRequest, HttpClassifier};
use crate::config::{ConfigError, Settings};
use crate::document::Frontmatter;
use crate::harvest::{
    rebuild_output, reconcile, store_path, sweep_grouped, ClassificationResult, Collector, CompletedRecord,
    GroupedDocument, SourceDocument,
};
use crate::store::{DocumentRef, DocumentStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that abort a harvest operation
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("output document is protected for another {remaining_secs}s")]
    Protected { remaining_secs: i64 },

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Summary of a collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestReport {
    /// Lines added to the output
    pub new_items: usize,
    /// Source documents marked with the sentinel
    pub documents_marked: usize,
    pub output_written: bool,
    pub classified: bool,
}

/// What a change notification led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Not a document the harvester cares about, or nothing to do
    Ignored,
    /// The output document was swept; `changed` tells whether it was rewritten
    Swept { changed: bool },
    /// A source document was harvested on its own
    Collected { new_items: usize },
}

/// The output document as rebuilt by one operation.
struct RebuiltOutput {
    text: String,
    records: Vec<CompletedRecord>,
    classified: bool,
}

pub struct Harvester {
    store: Arc<dyn DocumentStore>,
    classifier: Option<Arc<dyn Classifier>>,
}

fn output_path(settings: &Settings) -> String {
    store_path(&settings.output_path)
}

impl Harvester {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            classifier: None,
        }
    }

    /// Use `classifier` instead of an HTTP client built from the settings.
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    fn classifier_for(&self, settings: &Settings) -> Result<Arc<dyn Classifier>, ClassifyError> {
        match &self.classifier {
            Some(classifier) => Ok(Arc::clone(classifier)),
            None => Ok(Arc::new(HttpClassifier::from_settings(settings)?)),
        }
    }

    /// Read the output document; an absent one reads as empty.
    async fn read_output(&self, path: &str) -> Result<(String, bool), StoreError> {
        match self.store.read(path).await {
            Ok(text) => Ok((text, true)),
            Err(StoreError::NotFound(_)) => Ok((String::new(), false)),
            Err(e) => Err(e),
        }
    }

    /// Write the output if its text changed. Returns whether it was written.
    async fn write_output(
        &self,
        path: &str,
        old: &str,
        existed: bool,
        new: &str,
    ) -> Result<bool, StoreError> {
        if old == new {
            return Ok(false);
        }
        if existed {
            self.store.write(path, new).await?;
        } else {
            self.store.create(path, new).await?;
        }
        Ok(true)
    }

    /// Rebuild the output text around `new_lines`, applying the retention
    /// policy. Classifies the new lines when `classify` is set and there
    /// are any.
    async fn rebuild(
        &self,
        output_text: &str,
        new_lines: &[String],
        settings: &Settings,
        classify: bool,
        now_ms: i64,
    ) -> Result<RebuiltOutput, HarvestError> {
        let retention = settings.retention();
        let grouped = settings.classification_enabled || GroupedDocument::has_headers(output_text);

        if !grouped {
            let existing: Vec<&str> = output_text.lines().collect();
            let rebuilt = rebuild_output(&existing, new_lines, &settings.completed, &retention, now_ms);
            return Ok(RebuiltOutput {
                text: rebuilt.text(),
                records: rebuilt.records,
                classified: false,
            });
        }

        let existing = GroupedDocument::parse(output_text);
        let (swept, records) = sweep_grouped(&existing, &settings.completed, &retention, now_ms);

        if new_lines.is_empty() {
            return Ok(RebuiltOutput {
                text: swept.render(),
                records,
                classified: false,
            });
        }

        let (result, classified) = if classify {
            let classifier = self.classifier_for(settings)?;
            let request =
                ClassifyRequest::classify(new_lines, Some(&swept), settings.credential.trim());
            let raw = classifier.classify(&request).await?;
            debug!(bytes = raw.len(), "classifier replied");
            (ClassificationResult::decode(&raw), true)
        } else {
            (ClassificationResult::Freeform(String::new()), false)
        };

        Ok(RebuiltOutput {
            text: reconcile(&swept.render(), new_lines, result),
            records,
            classified,
        })
    }

    /// Read the candidate documents in scan order. Unreadable documents are
    /// skipped.
    async fn read_candidates(&self, collector: &Collector) -> Result<Vec<SourceDocument>, StoreError> {
        let listed = self.store.list_documents().await?;
        let mut documents = Vec::new();
        for reference in collector.candidates(&listed) {
            match self.store.read(&reference.path).await {
                Ok(text) => documents.push(SourceDocument::from_ref(reference, text)),
                Err(e) => warn!(path = %reference.path, error = %e, "skipping unreadable document"),
            }
        }
        Ok(documents)
    }

    /// Run a full collection pass.
    ///
    /// Nothing is written if configuration is invalid, the output is
    /// protected, or classification fails. Source documents are marked
    /// after the output is written; a failed write stops the pass and
    /// leaves earlier writes in place.
    pub async fn collect(
        &self,
        settings: &mut Settings,
        now_ms: i64,
    ) -> Result<HarvestReport, HarvestError> {
        settings.validate(settings.classification_enabled)?;
        if let Some(remaining) = settings.protection_remaining(now_ms) {
            return Err(HarvestError::Protected {
                remaining_secs: (remaining + 999) / 1000,
            });
        }

        let path = output_path(settings);
        let (output_text, existed) = self.read_output(&path).await?;

        let mut collector = Collector::new(settings);
        collector.seed_output(&output_text);
        for document in self.read_candidates(&collector).await? {
            collector.collect_document(&document);
        }
        let outcome = collector.finish();

        let rebuilt = self
            .rebuild(
                &output_text,
                &outcome.new_lines,
                settings,
                settings.classification_enabled,
                now_ms,
            )
            .await?;

        let output_written = self
            .write_output(&path, &output_text, existed, &rebuilt.text)
            .await?;
        settings.completed = rebuilt.records;
        if rebuilt.classified {
            settings.last_classified_at = Some(now_ms);
        }

        for mutation in &outcome.mutations {
            self.store.write(&mutation.path, &mutation.text).await?;
        }

        let report = HarvestReport {
            new_items: outcome.new_lines.len(),
            documents_marked: outcome.mutations.len(),
            output_written,
            classified: rebuilt.classified,
        };
        info!(
            new_items = report.new_items,
            documents_marked = report.documents_marked,
            output_written = report.output_written,
            classified = report.classified,
            "collection pass finished"
        );
        Ok(report)
    }

    /// Apply the retention policy to the output document.
    ///
    /// Returns whether the output was rewritten. Sweeping twice in a row
    /// leaves the output unchanged the second time.
    pub async fn sweep(&self, settings: &mut Settings, now_ms: i64) -> Result<bool, HarvestError> {
        let path = output_path(settings);
        if path.is_empty() {
            return Err(ConfigError::MissingOutputPath.into());
        }
        let (output_text, existed) = self.read_output(&path).await?;
        if !existed {
            return Ok(false);
        }

        let rebuilt = self.rebuild(&output_text, &[], settings, false, now_ms).await?;
        let changed = self
            .write_output(&path, &output_text, existed, &rebuilt.text)
            .await?;
        settings.completed = rebuilt.records;
        if changed {
            debug!(path = %path, "output swept");
        }
        Ok(changed)
    }

    /// React to a document change reported by the store.
    ///
    /// The output document gets swept; a candidate source document that has
    /// not been harvested yet gets harvested on its own, its lines added to
    /// the output without classification. The writes this makes come back
    /// as change events and are no-ops.
    pub async fn handle_change(
        &self,
        path: &str,
        settings: &mut Settings,
        now_ms: i64,
    ) -> Result<ChangeOutcome, HarvestError> {
        settings.validate(false)?;
        let output = output_path(settings);
        let mut collector = Collector::new(settings);

        if collector.is_output(path) {
            let changed = self.sweep(settings, now_ms).await?;
            return Ok(ChangeOutcome::Swept { changed });
        }

        if !collector.is_candidate(path) {
            return Ok(ChangeOutcome::Ignored);
        }

        let text = match self.store.read(path).await {
            Ok(text) => text,
            Err(StoreError::NotFound(_)) => return Ok(ChangeOutcome::Ignored),
            Err(e) => return Err(e.into()),
        };
        // Cheap check before touching the output.
        if Frontmatter::parse(&text).is_harvested() {
            return Ok(ChangeOutcome::Ignored);
        }

        let (output_text, existed) = self.read_output(&output).await?;
        collector.seed_output(&output_text);
        let reference = DocumentRef::from_path(path);
        if collector.collect_document(&SourceDocument::from_ref(&reference, text)) == 0 {
            return Ok(ChangeOutcome::Ignored);
        }
        let outcome = collector.finish();

        let rebuilt = self
            .rebuild(&output_text, &outcome.new_lines, settings, false, now_ms)
            .await?;
        self.write_output(&output, &output_text, existed, &rebuilt.text)
            .await?;
        settings.completed = rebuilt.records;

        for mutation in &outcome.mutations {
            self.store.write(&mutation.path, &mutation.text).await?;
        }

        info!(path = %path, new_items = outcome.new_lines.len(), "harvested changed document");
        Ok(ChangeOutcome::Collected {
            new_items: outcome.new_lines.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::MockClassifier;
    use crate::config::RetentionPolicy;
    use crate::store::MemoryStore;

    const NOW: i64 = 1_700_000_000_000;

    fn settings() -> Settings {
        Settings {
            target_directories: vec!["project".to_string()],
            ..Settings::default()
        }
    }

    fn harvester(store: &Arc<MemoryStore>) -> Harvester {
        Harvester::new(Arc::clone(store) as Arc<dyn DocumentStore>)
    }

    #[tokio::test]
    async fn collect_creates_output_and_marks_source() {
        let store = Arc::new(MemoryStore::new().with_document("project/plan.md", "#TODO buy milk\n"));
        let mut settings = settings();

        let report = harvester(&store).collect(&mut settings, NOW).await.unwrap();

        assert_eq!(report.new_items, 1);
        assert_eq!(report.documents_marked, 1);
        assert!(report.output_written);
        assert_eq!(store.get("TODO.md").unwrap(), "- [ ] buy milk (plan)\n");
        assert_eq!(
            store.get("project/plan.md").unwrap(),
            "---\nadd_todo: true\n---\n#TODO buy milk\n"
        );
        assert_eq!(store.writes(), vec!["TODO.md", "project/plan.md"]);
    }

    #[tokio::test]
    async fn second_collect_is_a_no_op() {
        let store = Arc::new(MemoryStore::new().with_document("project/plan.md", "#TODO a\n"));
        let harvester = harvester(&store);
        let mut settings = settings();

        harvester.collect(&mut settings, NOW).await.unwrap();
        let report = harvester.collect(&mut settings, NOW).await.unwrap();

        assert_eq!(report, HarvestReport::default());
        assert_eq!(store.writes().len(), 2);
    }

    #[tokio::test]
    async fn invalid_config_touches_nothing() {
        let store = Arc::new(MemoryStore::new().with_document("project/plan.md", "#TODO a\n"));
        let mut settings = Settings {
            classification_enabled: true,
            ..settings()
        };

        let err = harvester(&store).collect(&mut settings, NOW).await.unwrap_err();

        assert!(matches!(err, HarvestError::Config(ConfigError::MissingEndpoint)));
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn protection_window_refuses_pass() {
        let store = Arc::new(MemoryStore::new().with_document("project/plan.md", "#TODO a\n"));
        let mut settings = Settings {
            protect_output: true,
            protection_minutes: 10,
            last_classified_at: Some(NOW - 60_000),
            ..settings()
        };

        let err = harvester(&store).collect(&mut settings, NOW).await.unwrap_err();

        match err {
            HarvestError::Protected { remaining_secs } => assert_eq!(remaining_secs, 540),
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn classification_failure_leaves_output_untouched() {
        let existing = "## Work\n- [ ] report (w)\n";
        let store = Arc::new(
            MemoryStore::new()
                .with_document("TODO.md", existing)
                .with_document("project/plan.md", "#TODO call bank\n"),
        );
        let classifier = Arc::new(MockClassifier::failing(ClassifyError::Transport(
            "connection refused".into(),
        )));
        let harvester = harvester(&store).with_classifier(classifier);
        let mut settings = Settings {
            classification_enabled: true,
            classification_endpoint: "http://localhost:9/classify".into(),
            credential: "k".into(),
            ..settings()
        };

        let err = harvester.collect(&mut settings, NOW).await.unwrap_err();

        assert!(matches!(err, HarvestError::Classify(_)));
        assert_eq!(store.get("TODO.md").unwrap(), existing);
        assert_eq!(store.get("project/plan.md").unwrap(), "#TODO call bank\n");
        assert!(settings.last_classified_at.is_none());
    }

    #[tokio::test]
    async fn classified_pass_groups_new_lines() {
        let store = Arc::new(
            MemoryStore::new()
                .with_document("TODO.md", "## Work\n- [ ] report (w)\n")
                .with_document("project/plan.md", "#TODO call bank\n"),
        );
        let classifier = Arc::new(MockClassifier::responding(
            r#"{"groups": {"Finance": [{"text": "call bank", "source": "plan"}]}}"#,
        ));
        let harvester = harvester(&store).with_classifier(classifier.clone());
        let mut settings = Settings {
            classification_enabled: true,
            classification_endpoint: "http://localhost:9/classify".into(),
            credential: "k".into(),
            ..settings()
        };

        let report = harvester.collect(&mut settings, NOW).await.unwrap();

        assert!(report.classified);
        assert_eq!(settings.last_classified_at, Some(NOW));
        assert_eq!(
            store.get("TODO.md").unwrap(),
            "## Work\n- [ ] report (w)\n\n## Finance\n- [ ] call bank (plan)\n"
        );
        let requests = classifier.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].content, "- [ ] call bank (plan)");
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let store = Arc::new(
            MemoryStore::new().with_document("TODO.md", "- [ ] open (a)\n- [x] done (a)\n"),
        );
        let harvester = harvester(&store);
        let mut settings = Settings {
            retention_policy: RetentionPolicy::Immediate,
            ..settings()
        };

        assert!(harvester.sweep(&mut settings, NOW).await.unwrap());
        assert_eq!(store.get("TODO.md").unwrap(), "- [ ] open (a)\n");
        assert!(!harvester.sweep(&mut settings, NOW).await.unwrap());
    }

    #[tokio::test]
    async fn change_to_source_document_harvests_it_once() {
        let store = Arc::new(
            MemoryStore::new()
                .with_document("TODO.md", "- [ ] old (x)\n")
                .with_document("project/new.md", "#TODO fresh\n"),
        );
        let harvester = harvester(&store);
        let mut settings = settings();

        let outcome = harvester
            .handle_change("project/new.md", &mut settings, NOW)
            .await
            .unwrap();
        assert_eq!(outcome, ChangeOutcome::Collected { new_items: 1 });
        assert_eq!(store.get("TODO.md").unwrap(), "- [ ] old (x)\n- [ ] fresh (new)\n");

        let again = harvester
            .handle_change("project/new.md", &mut settings, NOW)
            .await
            .unwrap();
        assert_eq!(again, ChangeOutcome::Ignored);
    }

    #[tokio::test]
    async fn change_outside_targets_is_ignored() {
        let store = Arc::new(MemoryStore::new().with_document("elsewhere/n.md", "#TODO x\n"));
        let mut settings = settings();

        let outcome = harvester(&store)
            .handle_change("elsewhere/n.md", &mut settings, NOW)
            .await
            .unwrap();

        assert_eq!(outcome, ChangeOutcome::Ignored);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn change_on_output_spelled_differently_is_swept() {
        let store = Arc::new(MemoryStore::new().with_document("TODO.md", "- [x] done (x)\n- [ ] open (x)\n"));
        let mut settings = Settings {
            output_path: "./TODO.md".to_string(),
            ..settings()
        };

        let outcome = harvester(&store)
            .handle_change("TODO.md", &mut settings, NOW)
            .await
            .unwrap();

        assert_eq!(outcome, ChangeOutcome::Swept { changed: true });
        assert_eq!(store.get("TODO.md").unwrap(), "- [ ] open (x)\n");
        assert!(store.get("./TODO.md").is_none());
    }

    #[tokio::test]
    async fn change_on_output_with_backslashes_is_a_sweep() {
        let store = Arc::new(MemoryStore::new().with_document("project/TODO.md", "- [ ] a (x)\n"));
        let mut settings = Settings {
            output_path: "project\\todo.md".to_string(),
            ..settings()
        };

        let outcome = harvester(&store)
            .handle_change("project/TODO.md", &mut settings, NOW)
            .await
            .unwrap();

        assert!(matches!(outcome, ChangeOutcome::Swept { .. }));
        assert_eq!(store.get("project/TODO.md").unwrap(), "- [ ] a (x)\n");
    }
}
