//! Reconciliation of classifier output with the grouped output document
//!
//! The classifier answers either with structured JSON
//! (`{"groups": {"Work": [{"text", "completed", "source"}]}}`) or with
//! markdown shaped like the output document itself. Whatever comes back,
//! reconciliation never drops an existing line and never drops a new item:
//! anything the classifier did not place ends up in the catch-all group.

use crate::document::{is_item_line, line_key, Item};
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

/// Groups emitted first, in this order.
pub const CANONICAL_GROUPS: [&str; 7] = [
    "Work", "Study", "Life", "Health", "Finance", "Shopping", "Other",
];

/// Group receiving items that cannot be attributed anywhere else.
pub const CATCH_ALL_GROUP: &str = "Other";

/// One `## name` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    pub lines: Vec<String>,
}

/// An output document split into its group sections.
///
/// Lines that are not items and appear before the first header (a title,
/// a note) are kept as the preamble.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupedDocument {
    preamble: Vec<String>,
    groups: Vec<Group>,
}

/// `## name` (or `# name` when `allow_h1`) header text.
fn header_name(line: &str, allow_h1: bool) -> Option<&str> {
    let trimmed = line.trim();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    let allowed = hashes == 2 || (allow_h1 && hashes == 1);
    if !allowed {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let name = rest.trim();
    (!name.is_empty()).then_some(name)
}

impl GroupedDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preamble(preamble: Vec<String>) -> Self {
        Self {
            preamble,
            groups: Vec::new(),
        }
    }

    /// Parse an existing output document.
    ///
    /// `## ` lines start groups. Item lines before any header go to the
    /// catch-all group; other non-blank lines there form the preamble.
    /// Inside a group every non-blank line is kept.
    pub fn parse(text: &str) -> Self {
        let mut document = Self::new();
        let mut current: Option<String> = None;

        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(name) = header_name(line, false) {
                document.ensure_group(name);
                current = Some(name.to_string());
                continue;
            }
            let line = line.trim_end().to_string();
            match &current {
                Some(name) => document.push_line(name, line),
                None if is_item_line(&line) => document.push_line(CATCH_ALL_GROUP, line),
                None => document.preamble.push(line),
            }
        }
        document
    }

    /// Parse classifier markdown: `#`/`##` headers, checkbox lines only.
    pub fn parse_classified(text: &str) -> Self {
        let mut document = Self::new();
        let mut current: Option<String> = None;

        for line in text.lines() {
            if let Some(name) = header_name(line, true) {
                current = Some(name.to_string());
                continue;
            }
            if !is_item_line(line) {
                continue;
            }
            let group = current.as_deref().unwrap_or(CATCH_ALL_GROUP);
            document.push_line(group, line.trim().to_string());
        }
        document
    }

    /// True if `text` contains at least one `## ` group header.
    pub fn has_headers(text: &str) -> bool {
        text.lines().any(|line| header_name(line, false).is_some())
    }

    pub fn preamble(&self) -> &[String] {
        &self.preamble
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&[String]> {
        self.groups
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.lines.as_slice())
    }

    /// Every line of every group, in document order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.groups
            .iter()
            .flat_map(|g| g.lines.iter().map(String::as_str))
    }

    /// True if no group holds a line.
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.lines.is_empty())
    }

    fn ensure_group(&mut self, name: &str) -> &mut Group {
        let index = match self.groups.iter().position(|g| g.name == name) {
            Some(index) => index,
            None => {
                self.groups.push(Group {
                    name: name.to_string(),
                    lines: Vec::new(),
                });
                self.groups.len() - 1
            }
        };
        &mut self.groups[index]
    }

    /// Append a line to `group`, creating the group at the end if needed.
    pub fn push_line(&mut self, group: &str, line: impl Into<String>) {
        self.ensure_group(group).lines.push(line.into());
    }

    /// Render as markdown; empty groups are omitted.
    pub fn render(&self) -> String {
        let mut sections: Vec<String> = Vec::new();
        if !self.preamble.is_empty() {
            sections.push(format!("{}\n", self.preamble.join("\n")));
        }
        for group in self.groups.iter().filter(|g| !g.lines.is_empty()) {
            sections.push(format!("## {}\n{}\n", group.name, group.lines.join("\n")));
        }
        sections.join("\n")
    }
}

/// What the classifier returned, decoded by shape rather than content type.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationResult {
    /// JSON with a `groups` object: group name → items
    Structured(Vec<(String, Vec<Item>)>),
    /// Anything else, read as grouped markdown
    Freeform(String),
}

/// Extract a JSON object from classifier text.
///
/// Accepts a bare object or one wrapped in a ```` ```json ```` fence.
fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        if v.is_object() {
            return Some(v);
        }
    }

    let fenced = if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        after.find("```").map(|end| &after[..end])
    } else if let Some(start) = trimmed.find("```\n") {
        let after = &trimmed[start + 4..];
        after.find("```").map(|end| &after[..end])
    } else {
        None
    };

    fenced
        .and_then(|block| serde_json::from_str::<Value>(block.trim()).ok())
        .filter(Value::is_object)
}

impl ClassificationResult {
    /// Probe `raw` for the structured form, falling back to freeform.
    pub fn decode(raw: &str) -> Self {
        let groups = extract_json(raw).and_then(|v| match v.get("groups") {
            Some(Value::Object(groups)) => Some(groups.clone()),
            _ => None,
        });

        let Some(groups) = groups else {
            return Self::Freeform(raw.to_string());
        };

        let mut decoded = Vec::with_capacity(groups.len());
        for (name, entries) in groups {
            let Value::Array(entries) = entries else {
                warn!(group = %name, "classifier group is not an array, ignoring it");
                continue;
            };
            let items = entries
                .into_iter()
                .filter_map(|entry| serde_json::from_value::<Item>(entry).ok())
                .filter(|item| !item.text.trim().is_empty())
                .map(|item| item.in_group(name.clone()))
                .collect();
            decoded.push((name, items));
        }
        Self::Structured(decoded)
    }

    /// The result as a grouped document of rendered lines.
    pub fn into_document(self) -> GroupedDocument {
        match self {
            Self::Structured(groups) => {
                let mut document = GroupedDocument::new();
                for (name, items) in groups {
                    let name = name.trim();
                    let name = if name.is_empty() { CATCH_ALL_GROUP } else { name };
                    for item in items {
                        document.push_line(name, item.render());
                    }
                }
                document
            }
            Self::Freeform(text) => GroupedDocument::parse_classified(&text),
        }
    }
}

/// Merge a classification of `new_lines` into the existing grouped text.
///
/// Canonical groups come first (existing lines, then classified ones), then
/// every other group in first-seen order. New lines the classifier did not
/// return go to the catch-all group. A line is emitted once.
pub fn reconcile<S: AsRef<str>>(
    existing_text: &str,
    new_lines: &[S],
    result: ClassificationResult,
) -> String {
    let existing = GroupedDocument::parse(existing_text);
    let mut incoming = result.into_document();

    let returned: HashSet<String> = incoming.lines().map(|l| line_key(l).to_string()).collect();
    let mut missing = 0usize;
    for line in new_lines {
        let line = line.as_ref().trim();
        if !line.is_empty() && !returned.contains(line_key(line)) {
            incoming.push_line(CATCH_ALL_GROUP, line);
            missing += 1;
        }
    }
    if missing > 0 {
        warn!(missing, "classifier did not place every new item, using catch-all group");
    }

    let merged = merge(&existing, &incoming);
    if !merged.is_empty() {
        return merged.render();
    }

    // Degenerate response: keep the existing structure, add new lines to
    // the catch-all group.
    let mut fallback = existing.clone();
    let mut seen: HashSet<String> = existing.lines().map(str::to_string).collect();
    for line in new_lines {
        let line = line.as_ref().trim();
        if !line.is_empty() && seen.insert(line.to_string()) {
            fallback.push_line(CATCH_ALL_GROUP, line);
        }
    }
    fallback.render()
}

fn merge(existing: &GroupedDocument, incoming: &GroupedDocument) -> GroupedDocument {
    let mut names: Vec<&str> = CANONICAL_GROUPS.to_vec();
    for group in existing.groups().iter().chain(incoming.groups()) {
        if !names.contains(&group.name.as_str()) {
            names.push(&group.name);
        }
    }

    let mut merged = GroupedDocument::with_preamble(existing.preamble().to_vec());
    let mut emitted: HashSet<&str> = HashSet::new();
    for name in names {
        let lines = existing
            .group(name)
            .unwrap_or_default()
            .iter()
            .chain(incoming.group(name).unwrap_or_default());
        for line in lines {
            if emitted.insert(line.as_str()) {
                merged.push_line(name, line.clone());
            }
        }
    }
    merged
}
