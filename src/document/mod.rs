//! Document-level building blocks: frontmatter, tag scanning, item lines

pub mod frontmatter;
mod item;
mod scanner;

pub use frontmatter::{set_key, Frontmatter, ParsedDocument, HARVESTED_KEY};
pub use item::{
    is_checked_line, is_item_line, line_key, Item, CHECKED_PREFIX, UNCHECKED_PREFIX,
};
pub use scanner::{TagMatch, TagScanner};
