//! Completed-item lifecycle
//!
//! Decides which checked lines survive a rewrite of the output document and
//! keeps the completion timestamps the delayed policy needs.

use super::reconcile::GroupedDocument;
use crate::config::{Retention, RetentionPolicy};
use crate::document::{is_checked_line, line_key};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// When a checked output line was first seen checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedRecord {
    /// Line key: the rendered line without its checkbox
    pub text: String,
    /// Epoch milliseconds
    pub completed_at: i64,
}

impl CompletedRecord {
    pub fn new(text: impl Into<String>, completed_at: i64) -> Self {
        Self {
            text: text.into(),
            completed_at,
        }
    }
}

/// Output of [`rebuild_output`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rebuilt {
    pub lines: Vec<String>,
    /// Records of the checked lines that were kept
    pub records: Vec<CompletedRecord>,
}

impl Rebuilt {
    /// The lines joined as document text, newline-terminated.
    pub fn text(&self) -> String {
        render_lines(&self.lines)
    }
}

/// Join lines into document text with a trailing newline.
pub fn render_lines(lines: &[String]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Rebuild a flat output document.
///
/// Kept checked lines come first, then kept unchecked existing lines, then
/// `new_lines`, each in input order. Blank lines are dropped and the result
/// holds every line at most once. A checked line without a record gets one
/// stamped `now_ms`; the returned records are exactly those of the kept
/// checked lines.
pub fn rebuild_output<E, N>(
    existing_lines: &[E],
    new_lines: &[N],
    records: &[CompletedRecord],
    retention: &Retention,
    now_ms: i64,
) -> Rebuilt
where
    E: AsRef<str>,
    N: AsRef<str>,
{
    let mut known: HashMap<&str, i64> = HashMap::new();
    for record in records {
        known.entry(record.text.as_str()).or_insert(record.completed_at);
    }

    let window = retention.duration_millis();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut recorded: HashSet<&str> = HashSet::new();
    let mut checked = Vec::new();
    let mut unchecked = Vec::new();
    let mut fresh = Vec::new();
    let mut kept_records = Vec::new();

    for line in existing_lines {
        let line = line.as_ref().trim_end();
        if line.trim().is_empty() || !seen.insert(line) {
            continue;
        }

        if !is_checked_line(line) {
            unchecked.push(line.to_string());
            continue;
        }

        let key = line_key(line);
        let completed_at = known.get(key).copied().unwrap_or(now_ms);
        let keep = match retention.policy {
            RetentionPolicy::Immediate => false,
            RetentionPolicy::Delayed => now_ms.saturating_sub(completed_at) < window,
            RetentionPolicy::Keep => true,
        };
        if keep {
            checked.push(line.to_string());
            if recorded.insert(key) {
                kept_records.push(CompletedRecord::new(key, completed_at));
            }
        }
    }

    for line in new_lines {
        let line = line.as_ref().trim_end();
        if !line.trim().is_empty() && seen.insert(line) {
            fresh.push(line.to_string());
        }
    }

    let mut lines = checked;
    lines.extend(unchecked);
    lines.extend(fresh);

    Rebuilt {
        lines,
        records: kept_records,
    }
}

/// Apply the retention policy inside every group of a grouped document.
///
/// Group order is preserved; groups left empty are dropped.
pub fn sweep_grouped(
    document: &GroupedDocument,
    records: &[CompletedRecord],
    retention: &Retention,
    now_ms: i64,
) -> (GroupedDocument, Vec<CompletedRecord>) {
    let mut swept = GroupedDocument::with_preamble(document.preamble().to_vec());
    let mut kept_records: Vec<CompletedRecord> = Vec::new();
    let mut recorded: HashSet<String> = HashSet::new();

    for group in document.groups() {
        let rebuilt = rebuild_output::<_, String>(&group.lines, &[], records, retention, now_ms);
        for line in rebuilt.lines {
            swept.push_line(&group.name, line);
        }
        for record in rebuilt.records {
            if recorded.insert(record.text.clone()) {
                kept_records.push(record);
            }
        }
    }

    (swept, kept_records)
}
