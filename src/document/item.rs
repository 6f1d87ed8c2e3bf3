//! TODO items and their rendered line form
//!
//! An item is identified by its rendered line, not by a structured key:
//! `- [ ] buy milk (groceries)` and `- [ ]  buy milk (groceries)` are two
//! different items.

use serde::{Deserialize, Serialize};

/// Checkbox prefix of an open item line.
pub const UNCHECKED_PREFIX: &str = "- [ ] ";

/// Checkbox prefix of a completed item line.
pub const CHECKED_PREFIX: &str = "- [x] ";

/// A single TODO entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub text: String,
    /// Basename of the document the item was harvested from
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl Item {
    /// Create an open item harvested from `source`.
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            completed: false,
            group: None,
        }
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Render the item as an output-document line.
    ///
    /// Items without a source render without the parenthesized suffix.
    pub fn render(&self) -> String {
        let prefix = if self.completed {
            CHECKED_PREFIX
        } else {
            UNCHECKED_PREFIX
        };
        if self.source.is_empty() {
            format!("{}{}", prefix, self.text)
        } else {
            format!("{}{} ({})", prefix, self.text, self.source)
        }
    }

    /// Reconstruct an item from a rendered checkbox line.
    ///
    /// The source is taken from a trailing `(name)` token. Returns `None`
    /// for lines that are not checkbox lines or carry no text.
    pub fn parse_line(line: &str) -> Option<Item> {
        let (completed, rest) = split_checkbox(line)?;
        let rest = rest.trim();

        let (text, source) = match split_source(rest) {
            Some((text, source)) => (text, source),
            None => (rest, ""),
        };
        if text.is_empty() {
            return None;
        }

        Some(Item {
            text: text.to_string(),
            source: source.to_string(),
            completed,
            group: None,
        })
    }
}

/// Split a checkbox line into its completion state and the remainder.
fn split_checkbox(line: &str) -> Option<(bool, &str)> {
    let trimmed = line.trim_start();
    let rest = trimmed
        .strip_prefix("- [")
        .or_else(|| trimmed.strip_prefix("* ["))?;
    let mut chars = rest.chars();
    let mark = chars.next()?;
    let rest = chars.as_str().strip_prefix(']')?;

    let completed = match mark {
        ' ' => false,
        'x' | 'X' => true,
        _ => return None,
    };

    match rest.strip_prefix(' ') {
        Some(rest) => Some((completed, rest)),
        None if rest.is_empty() => Some((completed, rest)),
        None => None,
    }
}

/// Split `text (source)` at its trailing parenthesized token.
fn split_source(rest: &str) -> Option<(&str, &str)> {
    let inner = rest.strip_suffix(')')?;
    let open = inner.rfind(" (")?;
    let source = &inner[open + 2..];
    if source.is_empty() || source.contains('(') {
        return None;
    }
    Some((inner[..open].trim_end(), source))
}

/// True if the line is a checkbox item line (checked or not).
pub fn is_item_line(line: &str) -> bool {
    split_checkbox(line).is_some()
}

/// True if the line is a checked checkbox item.
pub fn is_checked_line(line: &str) -> bool {
    matches!(split_checkbox(line), Some((true, _)))
}

/// The completion-independent key of a line.
///
/// For checkbox lines this is everything after the checkbox, so the checked
/// and unchecked rendering of one item share a key. Other lines key on their
/// trimmed text.
pub fn line_key(line: &str) -> &str {
    match split_checkbox(line) {
        Some((_, rest)) => rest.trim(),
        None => line.trim(),
    }
}
