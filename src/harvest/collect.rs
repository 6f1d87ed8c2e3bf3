//! Collection engine
//!
//! Walks the candidate documents, harvests tagged lines from the ones that
//! have not contributed yet, and marks them with the `add_todo` sentinel.

use crate::config::Settings;
use crate::document::{set_key, Frontmatter, Item, TagScanner, HARVESTED_KEY};
use crate::store::DocumentRef;
use std::collections::HashSet;
use tracing::debug;

/// A document snapshot handed to the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub path: String,
    /// File stem, used as the item source
    pub basename: String,
    pub text: String,
}

impl SourceDocument {
    pub fn new(path: impl Into<String>, basename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            basename: basename.into(),
            text: text.into(),
        }
    }

    pub fn from_ref(reference: &DocumentRef, text: impl Into<String>) -> Self {
        Self::new(reference.path.clone(), reference.basename.clone(), text)
    }
}

/// New text for a source document after collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMutation {
    pub path: String,
    pub text: String,
}

/// Result of a collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectOutcome {
    /// Rendered lines not yet present in the output, in discovery order
    pub new_lines: Vec<String>,
    /// Sentinel rewrites, one per contributing document, in scan order
    pub mutations: Vec<DocumentMutation>,
}

impl CollectOutcome {
    pub fn is_empty(&self) -> bool {
        self.new_lines.is_empty() && self.mutations.is_empty()
    }
}

/// `path` relative to the store root, `/`-separated, case kept.
pub(crate) fn store_path(path: &str) -> String {
    let mut normalized = path.trim().replace('\\', "/");
    loop {
        if let Some(rest) = normalized.strip_prefix("./") {
            normalized = rest.to_string();
        } else if let Some(rest) = normalized.strip_prefix('/') {
            normalized = rest.to_string();
        } else {
            break;
        }
    }
    normalized.trim_end_matches('/').to_string()
}

/// Lowercased form of [`store_path`] used for path comparisons.
fn normalize_path(path: &str) -> String {
    store_path(path).to_lowercase()
}

/// True if `path` lies inside `directory` (both normalized).
fn in_directory(directory: &str, path: &str) -> bool {
    if directory.is_empty() || path == directory {
        return true;
    }
    path.strip_prefix(directory)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Incremental collection state for one pass.
///
/// Seed it with the current output document, feed it documents, then call
/// [`Collector::finish`].
#[derive(Debug)]
pub struct Collector {
    scanner: TagScanner,
    directories: Vec<String>,
    output_path: String,
    seen: HashSet<String>,
    visited: HashSet<String>,
    outcome: CollectOutcome,
}

impl Collector {
    pub fn new(settings: &Settings) -> Self {
        let mut directories: Vec<String> = settings
            .target_directories
            .iter()
            .map(|d| normalize_path(d))
            .collect();
        // No configured directory means the whole store.
        if directories.is_empty() {
            directories.push(String::new());
        }

        Self {
            scanner: TagScanner::new(&settings.tags),
            directories,
            output_path: normalize_path(&settings.output_path),
            seen: HashSet::new(),
            visited: HashSet::new(),
            outcome: CollectOutcome::default(),
        }
    }

    /// Register the lines already present in the output document.
    pub fn seed_output(&mut self, output_text: &str) {
        for line in output_text.lines() {
            let line = line.trim_end();
            if !line.trim().is_empty() {
                self.seen.insert(line.to_string());
            }
        }
    }

    /// True if `path` names the output document.
    pub fn is_output(&self, path: &str) -> bool {
        normalize_path(path) == self.output_path
    }

    /// True if `path` is inside a target directory and is not the output.
    pub fn is_candidate(&self, path: &str) -> bool {
        let path = normalize_path(path);
        path != self.output_path && self.directories.iter().any(|d| in_directory(d, &path))
    }

    /// Candidate documents in scan order: by target directory, then by
    /// listing order. A document is listed once even if several
    /// directories contain it.
    pub fn candidates<'a>(&self, documents: &'a [DocumentRef]) -> Vec<&'a DocumentRef> {
        self.order(documents, |d| d.path.as_str())
    }

    fn order<'a, T>(&self, documents: &'a [T], path_of: impl Fn(&T) -> &str) -> Vec<&'a T> {
        let normalized: Vec<String> = documents.iter().map(|d| normalize_path(path_of(d))).collect();
        let mut picked = vec![false; documents.len()];
        let mut ordered = Vec::new();

        for directory in &self.directories {
            for (index, path) in normalized.iter().enumerate() {
                if !picked[index] && *path != self.output_path && in_directory(directory, path) {
                    picked[index] = true;
                    ordered.push(&documents[index]);
                }
            }
        }
        ordered
    }

    /// Harvest one document. Returns the number of tagged lines found.
    ///
    /// Documents carrying the sentinel, documents already visited in this
    /// pass, and non-candidates are skipped and report zero.
    pub fn collect_document(&mut self, document: &SourceDocument) -> usize {
        if !self.is_candidate(&document.path) {
            return 0;
        }
        if !self.visited.insert(normalize_path(&document.path)) {
            return 0;
        }

        let parsed = Frontmatter::parse(&document.text);
        if parsed.is_harvested() {
            debug!(path = %document.path, "already harvested, skipping");
            return 0;
        }

        let mut found = 0;
        for tagged in self.scanner.scan(parsed.body) {
            found += 1;
            let line = Item::new(tagged.text, document.basename.as_str()).render();
            if self.seen.insert(line.clone()) {
                self.outcome.new_lines.push(line);
            }
        }

        if found > 0 {
            debug!(path = %document.path, found, "harvested tagged lines");
            self.outcome.mutations.push(DocumentMutation {
                path: document.path.clone(),
                text: set_key(&document.text, HARVESTED_KEY, true),
            });
        }
        found
    }

    pub fn finish(self) -> CollectOutcome {
        self.outcome
    }
}

/// Run a whole collection pass over in-memory documents.
pub fn collect(documents: &[SourceDocument], existing_output: &str, settings: &Settings) -> CollectOutcome {
    let mut collector = Collector::new(settings);
    collector.seed_output(existing_output);
    for document in collector.order(documents, |d| d.path.as_str()) {
        collector.collect_document(document);
    }
    collector.finish()
}
