//! Tag scanner
//!
//! Finds lines of the form `<tag> <text>` in a document body.

use regex_lite::Regex;

/// A tagged line found by [`TagScanner::scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMatch<'a> {
    /// The tag that matched, as configured
    pub tag: &'a str,
    /// Text after the tag, trimmed
    pub text: &'a str,
    /// Zero-based line number within the scanned body
    pub line: usize,
}

/// Matches body lines against an ordered list of tags.
///
/// Tags are tried in configuration order and the first match wins, so a
/// line yields at most one item even when tags overlap as prefixes.
#[derive(Debug, Clone)]
pub struct TagScanner {
    patterns: Vec<(String, Regex)>,
}

impl TagScanner {
    /// Build a scanner; blank tags are ignored.
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = tags
            .into_iter()
            .filter_map(|tag| {
                let tag = tag.as_ref().trim();
                if tag.is_empty() {
                    return None;
                }
                let pattern = format!(r"^\s*{}\s+(.+)$", regex_lite::escape(tag));
                // An escaped literal always compiles.
                Regex::new(&pattern).ok().map(|re| (tag.to_string(), re))
            })
            .collect();
        Self { patterns }
    }

    /// The tags this scanner recognizes, in match order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|(tag, _)| tag.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Lazily scan `body`, one match per tagged line.
    pub fn scan<'a>(&'a self, body: &'a str) -> impl Iterator<Item = TagMatch<'a>> + 'a {
        body.lines()
            .enumerate()
            .filter_map(move |(line_no, line)| self.match_line(line).map(|(tag, text)| TagMatch {
                tag,
                text,
                line: line_no,
            }))
    }

    fn match_line<'a>(&'a self, line: &'a str) -> Option<(&'a str, &'a str)> {
        for (tag, re) in &self.patterns {
            if let Some(caps) = re.captures(line) {
                let text = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
                if text.is_empty() {
                    continue;
                }
                return Some((tag.as_str(), text));
            }
        }
        None
    }
}
