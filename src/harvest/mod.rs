//! The harvesting engine: collection, completed-item lifecycle, and
//! reconciliation of classified groups

mod collect;
mod lifecycle;
mod reconcile;

pub use collect::{collect, CollectOutcome, Collector, DocumentMutation, SourceDocument};
pub(crate) use collect::store_path;
pub use lifecycle::{rebuild_output, render_lines, sweep_grouped, CompletedRecord, Rebuilt};
pub use reconcile::{
    reconcile, ClassificationResult, Group, GroupedDocument, CANONICAL_GROUPS, CATCH_ALL_GROUP,
};
