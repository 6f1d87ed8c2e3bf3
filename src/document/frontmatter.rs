//! Frontmatter codec
//!
//! Reads and rewrites the leading `---` metadata block of a markdown
//! document as an ordered, flat key/value mapping.
//!
//! Only `key: value` lines are interpreted. YAML continuation lines inside
//! the block (list items, comments, indented values) are carried verbatim so
//! that rewriting one key never loses what the document owner wrote. Any
//! other line means the `---` pair is not frontmatter, e.g. two horizontal
//! rules around prose.

use std::fmt;
use std::ops::Range;

/// Frontmatter key marking a document whose TODOs were already collected.
pub const HARVESTED_KEY: &str = "add_todo";

const MARKER: &str = "---";

/// One line of a frontmatter block.
#[derive(Debug, Clone, PartialEq)]
enum Line {
    Field {
        key: String,
        value: String,
        /// Original bytes of the line; cleared once the value is changed.
        raw: Option<String>,
    },
    Verbatim(String),
}

/// Ordered flat mapping parsed from a frontmatter block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    lines: Vec<Line>,
}

/// Result of splitting a document into frontmatter and body.
#[derive(Debug, Clone)]
pub struct ParsedDocument<'a> {
    pub frontmatter: Frontmatter,
    /// Byte range of the whole block, markers included
    pub span: Option<Range<usize>>,
    pub body: &'a str,
}

impl ParsedDocument<'_> {
    pub fn had_frontmatter(&self) -> bool {
        self.span.is_some()
    }

    /// Byte offset at which the body starts.
    pub fn body_start(&self) -> usize {
        self.span.as_ref().map(|s| s.end).unwrap_or(0)
    }

    /// True if the document carries `add_todo: true`.
    pub fn is_harvested(&self) -> bool {
        self.frontmatter.get_bool(HARVESTED_KEY) == Some(true)
    }
}

fn is_marker(line: &str) -> bool {
    line.trim_end() == MARKER
}

/// YAML lines that carry no key of their own: blanks, indented values,
/// list items and comments.
fn is_continuation(line: &str) -> bool {
    let trimmed = line.trim_end();
    trimmed.is_empty()
        || line.starts_with(char::is_whitespace)
        || trimmed == "-"
        || trimmed.starts_with("- ")
        || trimmed == "#"
        || trimmed.starts_with("# ")
}

/// Classify a line inside a block. `None` means the line cannot belong to
/// frontmatter.
fn parse_line(line: &str) -> Option<Line> {
    if is_continuation(line) {
        return Some(Line::Verbatim(line.to_string()));
    }
    let colon = line.find(':')?;
    let key = line[..colon].trim();
    if key.is_empty() || key.starts_with('#') {
        return None;
    }
    Some(Line::Field {
        key: key.to_string(),
        value: line[colon + 1..].trim().to_string(),
        raw: Some(line.to_string()),
    })
}

impl Frontmatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split `text` into frontmatter and body.
    ///
    /// Leading blank lines may precede the opening marker. An unterminated
    /// block, or one holding a line that is neither `key: value` nor a YAML
    /// continuation, is not frontmatter: the whole text becomes the body.
    pub fn parse(text: &str) -> ParsedDocument<'_> {
        let mut chunks = text.split_inclusive('\n');
        let mut pos = 0;
        let mut start = None;

        for chunk in chunks.by_ref() {
            let line = chunk.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                pos += chunk.len();
                continue;
            }
            if is_marker(line) {
                start = Some(pos);
                pos += chunk.len();
            }
            break;
        }

        let Some(start) = start else {
            return Self::no_frontmatter(text);
        };

        let mut frontmatter = Frontmatter::new();
        for chunk in chunks {
            let line = chunk.trim_end_matches(['\n', '\r']);
            pos += chunk.len();
            if is_marker(line) {
                return ParsedDocument {
                    frontmatter,
                    span: Some(start..pos),
                    body: &text[pos..],
                };
            }
            match parse_line(line) {
                Some(parsed) => frontmatter.lines.push(parsed),
                None => return Self::no_frontmatter(text),
            }
        }

        Self::no_frontmatter(text)
    }

    fn no_frontmatter(text: &str) -> ParsedDocument<'_> {
        ParsedDocument {
            frontmatter: Frontmatter::new(),
            span: None,
            body: text,
        }
    }

    /// Value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Field { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Value of `key` read as a boolean (quotes and case ignored).
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        let value = self.get(key)?.trim_matches('"').trim_matches('\'');
        if value.eq_ignore_ascii_case("true") {
            Some(true)
        } else if value.eq_ignore_ascii_case("false") {
            Some(false)
        } else {
            None
        }
    }

    /// Set `key`, keeping its position if it already exists.
    pub fn set(&mut self, key: &str, value: impl fmt::Display) {
        let value = value.to_string();
        for line in &mut self.lines {
            if let Line::Field { key: k, value: v, raw } = line {
                if *k == key {
                    if *v != value {
                        *v = value;
                        *raw = None;
                    }
                    return;
                }
            }
        }
        self.lines.push(Line::Field {
            key: key.to_string(),
            value,
            raw: None,
        });
    }

    /// Remove `key`, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self
            .lines
            .iter()
            .position(|line| matches!(line, Line::Field { key: k, .. } if k == key))?;
        match self.lines.remove(index) {
            Line::Field { value, .. } => Some(value),
            Line::Verbatim(_) => None,
        }
    }

    /// Iterate `(key, value)` pairs in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.lines.iter().filter_map(|line| match line {
            Line::Field { key, value, .. } => Some((key.as_str(), value.as_str())),
            Line::Verbatim(_) => None,
        })
    }

    /// Number of key/value fields.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Render the block, markers included, with a trailing newline.
    pub fn render(&self) -> String {
        let mut out = String::from(MARKER);
        out.push('\n');
        for line in &self.lines {
            match line {
                Line::Field { raw: Some(raw), .. } => out.push_str(raw),
                Line::Field { key, value, raw: None } if value.is_empty() => {
                    out.push_str(key);
                    out.push(':');
                }
                Line::Field { key, value, raw: None } => {
                    out.push_str(key);
                    out.push_str(": ");
                    out.push_str(value);
                }
                Line::Verbatim(text) => out.push_str(text),
            }
            out.push('\n');
        }
        out.push_str(MARKER);
        out.push('\n');
        out
    }
}

/// Set `key` in the frontmatter of `text`, returning the new document.
///
/// Without a block, a new one holding only `key` is prepended. With a block,
/// only the block is rewritten; the bytes around it are untouched. Setting a
/// key to the value it already has returns the text unchanged.
pub fn set_key(text: &str, key: &str, value: impl fmt::Display) -> String {
    let value = value.to_string();
    let parsed = Frontmatter::parse(text);

    let Some(span) = parsed.span else {
        let mut frontmatter = Frontmatter::new();
        frontmatter.set(key, &value);
        return format!("{}{}", frontmatter.render(), text);
    };

    if parsed.frontmatter.get(key) == Some(value.as_str()) {
        return text.to_string();
    }

    let mut frontmatter = parsed.frontmatter;
    frontmatter.set(key, &value);
    let block = frontmatter.render();

    let mut out = String::with_capacity(text.len() + block.len());
    out.push_str(&text[..span.start]);
    out.push_str(&block);
    out.push_str(&text[span.end..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_block() {
        let text = "---\ntitle: Groceries\ntags: [home]\n---\n#TODO buy milk\n";
        let parsed = Frontmatter::parse(text);

        assert!(parsed.had_frontmatter());
        assert_eq!(parsed.frontmatter.get("title"), Some("Groceries"));
        assert_eq!(parsed.frontmatter.get("tags"), Some("[home]"));
        assert_eq!(parsed.body, "#TODO buy milk\n");
        assert_eq!(parsed.body_start(), text.len() - parsed.body.len());
    }

    #[test]
    fn parse_without_block() {
        let parsed = Frontmatter::parse("# Heading\n\ntext");
        assert!(!parsed.had_frontmatter());
        assert!(parsed.frontmatter.is_empty());
        assert_eq!(parsed.body, "# Heading\n\ntext");
    }

    #[test]
    fn unterminated_block_is_body() {
        let text = "---\ntitle: broken\n#TODO still scanned\n";
        let parsed = Frontmatter::parse(text);
        assert!(!parsed.had_frontmatter());
        assert_eq!(parsed.body, text);
        assert_eq!(parsed.frontmatter.len(), 0);
    }

    #[test]
    fn leading_blank_lines_are_allowed() {
        let parsed = Frontmatter::parse("\n\n---\nadd_todo: true\n---\nbody");
        assert!(parsed.is_harvested());
        assert_eq!(parsed.span, Some(2..25));
        assert_eq!(parsed.body, "body");
    }

    #[test]
    fn empty_block() {
        let parsed = Frontmatter::parse("---\n---\nbody");
        assert!(parsed.had_frontmatter());
        assert_eq!(parsed.frontmatter.len(), 0);
        assert_eq!(parsed.body, "body");
    }

    #[test]
    fn crlf_line_endings() {
        let parsed = Frontmatter::parse("---\r\nadd_todo: true\r\n---\r\nbody\r\n");
        assert!(parsed.is_harvested());
        assert_eq!(parsed.body, "body\r\n");
    }

    #[test]
    fn prose_between_rules_is_not_frontmatter() {
        let text = "---\nMeeting with Bob went well\n#TODO send the minutes\n---\n#TODO after\n";
        let parsed = Frontmatter::parse(text);
        assert!(!parsed.had_frontmatter());
        assert_eq!(parsed.body, text);
    }

    #[test]
    fn tag_line_between_rules_is_not_frontmatter() {
        let parsed = Frontmatter::parse("---\ntitle: x\n#TODO hidden?\n---\nbody\n");
        assert!(!parsed.had_frontmatter());
    }

    #[test]
    fn yaml_continuations_stay_in_the_block() {
        let text = "---\n# comment\ntags:\n  - home\n- loose item\n\nnested:\n    deep: 1\n---\nbody\n";
        let parsed = Frontmatter::parse(text);
        assert!(parsed.had_frontmatter());
        assert_eq!(parsed.frontmatter.len(), 2);
        assert_eq!(parsed.body, "body\n");
        assert_eq!(parsed.frontmatter.render(), &text[..text.len() - "body\n".len()]);
    }

    #[test]
    fn set_key_on_prose_between_rules_prepends_a_block() {
        let text = "---\nJust a note\n---\n";
        let out = set_key(text, HARVESTED_KEY, true);
        assert_eq!(out, "---\nadd_todo: true\n---\n---\nJust a note\n---\n");
        assert!(Frontmatter::parse(&out).is_harvested());
    }

    #[test]
    fn get_bool_accepts_quotes_and_case() {
        let parsed = Frontmatter::parse("---\na: \"true\"\nb: False\nc: maybe\n---\n");
        assert_eq!(parsed.frontmatter.get_bool("a"), Some(true));
        assert_eq!(parsed.frontmatter.get_bool("b"), Some(false));
        assert_eq!(parsed.frontmatter.get_bool("c"), None);
        assert_eq!(parsed.frontmatter.get_bool("missing"), None);
    }

    #[test]
    fn set_key_synthesizes_block() {
        let out = set_key("#TODO buy milk\n", HARVESTED_KEY, true);
        assert_eq!(out, "---\nadd_todo: true\n---\n#TODO buy milk\n");
    }

    #[test]
    fn set_key_preserves_unknown_keys_and_order() {
        let text = "---\ntitle:   Spaced  \naliases:\n  - one\n  - two\nzeta: 1\n---\nbody\n";
        let out = set_key(text, HARVESTED_KEY, true);
        assert_eq!(
            out,
            "---\ntitle:   Spaced  \naliases:\n  - one\n  - two\nzeta: 1\nadd_todo: true\n---\nbody\n"
        );
    }

    #[test]
    fn set_key_replaces_in_place() {
        let text = "---\nadd_todo: false\nother: x\n---\nbody";
        let out = set_key(text, HARVESTED_KEY, true);
        assert_eq!(out, "---\nadd_todo: true\nother: x\n---\nbody");
    }

    #[test]
    fn set_key_leaves_surroundings_byte_identical() {
        let text = "\n---\nk: v\n---\n\n  indented body\r\n";
        let out = set_key(text, "new", "value");
        assert!(out.starts_with("\n---\n"));
        assert!(out.ends_with("---\n\n  indented body\r\n"));
        assert!(out.contains("k: v\nnew: value\n"));
    }

    #[test]
    fn set_key_twice_is_identity() {
        let texts = [
            "",
            "#TODO a\n",
            "---\ntitle: t\n---\nbody",
            "---\nbroken\n#TODO b",
        ];
        for text in texts {
            let once = set_key(text, HARVESTED_KEY, true);
            let twice = set_key(&once, HARVESTED_KEY, true);
            assert_eq!(once, twice, "input: {:?}", text);
        }
    }

    #[test]
    fn set_and_remove() {
        let mut fm = Frontmatter::new();
        fm.set("a", 1);
        fm.set("b", "two");
        fm.set("a", 3);
        assert_eq!(fm.iter().collect::<Vec<_>>(), vec![("a", "3"), ("b", "two")]);
        assert_eq!(fm.remove("a"), Some("3".to_string()));
        assert_eq!(fm.remove("a"), None);
        assert_eq!(fm.render(), "---\nb: two\n---\n");
    }
}
