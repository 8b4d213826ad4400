//! Intra-corpus link rewriting.
//!
//! Inline links and images are resolved against the linking document's
//! directory (or the corpus root for `/`-rooted targets) and handed to a
//! caller-supplied resolver. Anything the resolver does not claim passes
//! through unchanged.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    // ![alt](target "title") and [text](target "title")
    Regex::new(r#"(!?)\[([^\]]*)\]\(\s*([^)\s]+)(\s+"[^"]*")?\s*\)"#).expect("valid regex")
});

/// Where a resolved link points in the consolidated tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Another document; the path is its location in the consolidated tree.
    Document(String),
    /// An attachment; the reference id is appended after the link.
    Attachment { path: String, reference_id: String },
}

/// Counts reported by [`rewrite_links`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    pub rewritten: usize,
    pub passed_through: usize,
}

/// Rewrite every inline link in `md`.
///
/// `doc_dir` is the linking document's directory relative to the corpus root
/// (`""` at the root). `resolve` receives the normalized, root-relative
/// target path (fragment removed) and returns its new location.
pub fn rewrite_links<F>(md: &str, doc_dir: &str, resolve: F) -> (String, RewriteStats)
where
    F: Fn(&str) -> Option<LinkTarget>,
{
    let mut stats = RewriteStats::default();
    let mut in_fence = false;
    let mut out = Vec::new();

    for line in md.split('\n') {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if in_fence || !line.contains("](") {
            out.push(line.to_string());
            continue;
        }

        let rewritten = LINK_RE.replace_all(line, |caps: &Captures| {
            let bang = &caps[1];
            let text = &caps[2];
            let href = &caps[3];
            let title = caps.get(4).map_or("", |m| m.as_str());

            let (path, fragment) = match href.split_once('#') {
                Some((p, f)) => (p, Some(f)),
                None => (href, None),
            };
            let target = resolve_target(doc_dir, path).and_then(|p| resolve(&p));
            let Some(target) = target else {
                stats.passed_through += 1;
                return caps[0].to_string();
            };

            stats.rewritten += 1;
            let fragment = fragment.map(|f| format!("#{f}")).unwrap_or_default();
            match target {
                LinkTarget::Document(new_path) => {
                    format!("{bang}[{text}]({new_path}{fragment}{title})")
                }
                LinkTarget::Attachment { path, reference_id } => {
                    format!("{bang}[{text}]({path}{fragment}{title}) {reference_id}")
                }
            }
        });
        out.push(rewritten.into_owned());
    }

    (out.join("\n"), stats)
}

/// Normalize a link target to a root-relative `/`-separated path.
///
/// Returns `None` for external URLs, `mailto:` and other schemes, bare
/// anchors, and paths escaping the root.
pub fn resolve_target(doc_dir: &str, path: &str) -> Option<String> {
    if path.is_empty() || is_external(path) {
        return None;
    }

    let (base, rel) = match path.strip_prefix('/') {
        Some(rooted) => ("", rooted),
        None => (doc_dir, path),
    };

    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for segment in rel.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return None;
    }
    Some(decode_spaces(&segments.join("/")))
}

fn is_external(target: &str) -> bool {
    match Url::parse(target) {
        // Single-letter schemes are Windows drive letters, not URLs.
        Ok(url) => url.scheme().len() > 1,
        Err(_) => false,
    }
}

fn decode_spaces(path: &str) -> String {
    path.replace("%20", " ")
}
