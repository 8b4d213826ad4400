//! Markdown handling for docweave.
//!
//! - [`parse_document`] separates front-matter metadata from the body and
//!   resolves a title, returning both explicitly
//! - [`section_body`] prepares a body for embedding in the consolidated artifact
//! - [`rewrite_links`] maps intra-corpus links to their consolidated locations
//! - [`slug`] builds table-of-contents anchors

mod cleanup;
mod frontmatter;
mod links;

use std::collections::BTreeMap;

use docweave_shared::DocumentId;
use tracing::debug;

pub use frontmatter::{render_front_matter, split_front_matter};
pub use links::{LinkTarget, RewriteStats, resolve_target, rewrite_links};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A normalized document split into metadata and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    /// Front-matter `key: value` pairs.
    pub metadata: BTreeMap<String, String>,
    /// Resolved title: metadata `title`, else the first H1, else the file name.
    pub title: String,
    /// Body text without the metadata block.
    pub body: String,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Split metadata from body and resolve the document title.
pub fn parse_document(text: &str, id: &DocumentId) -> ParsedDocument {
    let (metadata, body) = split_front_matter(text);
    let title = metadata
        .get("title")
        .filter(|t| !t.trim().is_empty())
        .map(|t| t.trim().to_string())
        .or_else(|| cleanup::first_h1(body))
        .unwrap_or_else(|| title_from_path(id.stem()));

    debug!(doc = %id, title = %title, metadata_keys = metadata.len(), "parsed document");

    ParsedDocument {
        title,
        body: cleanup::ensure_trailing_newline(body),
        metadata,
    }
}

/// Prepare a body for its section: drop a leading H1 equal to the title,
/// demote the remaining headings one level, and tidy whitespace.
pub fn section_body(body: &str, title: &str) -> String {
    cleanup::run_pipeline(body, title)
}

/// Human-readable title from a file stem: `01_getting-started` → `Getting Started`.
///
/// A leading numeric ordering prefix is dropped.
pub fn title_from_path(stem: &str) -> String {
    let without_prefix = stem
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start_matches(['_', '-', ' ', '.']);
    let source = if without_prefix.is_empty() {
        stem
    } else {
        without_prefix
    };

    source
        .replace(['-', '_'], " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(c) => {
                    let upper: String = c.to_uppercase().collect();
                    format!("{upper}{}", chars.collect::<String>())
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Anchor slug: lower-cased, spaces replaced by hyphens, periods removed.
///
/// Collisions are not deduplicated.
pub fn slug(title: &str) -> String {
    title.to_lowercase().replace(' ', "-").replace('.', "")
}
