//! todo-harvest: TODO extraction and reconciliation engine
//!
//! Scans a collection of markdown documents for tag-marked lines, gathers
//! them into a single output document, and optionally sorts them into groups
//! with an external classification service.
//!
//! # Core Concepts
//!
//! - **Sentinel**: the `add_todo: true` frontmatter key marking a document
//!   as already harvested
//! - **Output document**: the checklist every harvested line lands in, flat
//!   or grouped under `##` headers
//! - **Retention**: how long checked lines stay in the output
//!
//! # Example
//!
//! ```
//! use todo_harvest::harvest::{collect, SourceDocument};
//! use todo_harvest::Settings;
//!
//! let documents = vec![SourceDocument::new("plan.md", "plan", "#TODO buy milk\n")];
//! let outcome = collect(&documents, "", &Settings::default());
//! assert_eq!(outcome.new_lines, vec!["- [ ] buy milk (plan)"]);
//! ```

pub mod classify;
pub mod config;
pub mod document;
pub mod harvest;
mod harvester;
pub mod store;

pub use classify::{Classifier, ClassifyError, ClassifyRequest, HttpClassifier, MockClassifier};
pub use config::{ConfigError, Retention, RetentionPolicy, Settings, SettingsError};
pub use harvester::{ChangeOutcome, HarvestError, HarvestReport, Harvester};
pub use store::{DocumentChange, DocumentRef, DocumentStore, FsStore, MemoryStore, StoreError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
