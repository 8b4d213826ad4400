//! Attachment discovery within a phase tree.

use std::path::Path;

use docweave_shared::{Attachment, DocweaveError, Result};
use tracing::debug;
use walkdir::WalkDir;

use crate::classify::{base_name, classify, converted_original};

/// Placeholder preview for attachments without readable text.
pub const BINARY_PLACEHOLDER: &str = "(binary content, no preview)";

/// Discovery settings.
#[derive(Debug, Clone)]
pub struct DiscoverOptions {
    /// Directory name whose subtree is skipped (converter by-products).
    pub media_dir: String,
    /// Characters kept in text previews.
    pub preview_chars: usize,
}

impl Default for DiscoverOptions {
    fn default() -> Self {
        Self {
            media_dir: "media".into(),
            preview_chars: 200,
        }
    }
}

/// Enumerate the attachments of one document.
///
/// `tree_root` is the phase tree; `owner_dir` is the attachment directory
/// relative to it (e.g. `notes/b`). A missing directory yields no attachments.
/// Hidden files and the media subtree are skipped. Results are sorted by
/// source path and carry no reference id yet.
pub fn discover(
    tree_root: &Path,
    owner_dir: &Path,
    options: &DiscoverOptions,
) -> Result<Vec<Attachment>> {
    let dir = tree_root.join(owner_dir);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let owner = to_slash(owner_dir);

    let walker = WalkDir::new(&dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !(e.file_type().is_dir() && name == options.media_dir)
        });

    let mut out = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            DocweaveError::io(
                e.path().unwrap_or(&dir).to_path_buf(),
                std::io::Error::other(e.to_string()),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(tree_root) else {
            continue;
        };
        let source_path = to_slash(rel);
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let converted = converted_original(&file_name).is_some();
        let original_path = if converted {
            source_path
                .strip_suffix(".md")
                .unwrap_or(&source_path)
                .to_string()
        } else {
            source_path.clone()
        };
        let kind = classify(&file_name);
        let text_preview = if converted || kind.is_text_like() {
            preview(entry.path(), options.preview_chars)
        } else {
            BINARY_PLACEHOLDER.to_string()
        };

        out.push(Attachment {
            source_path,
            original_path,
            kind,
            base_name: base_name(&file_name),
            reference_id: String::new(),
            preview: text_preview,
            owner_dir: owner.clone(),
        });
    }

    debug!(owner = %owner, count = out.len(), "discovered attachments");
    Ok(out)
}

/// First `chars` characters of a text file with whitespace runs collapsed.
///
/// Unreadable or non-UTF-8 content falls back to [`BINARY_PLACEHOLDER`].
pub fn preview(path: &Path, chars: usize) -> String {
    let Ok(content) = std::fs::read_to_string(path) else {
        return BINARY_PLACEHOLDER.to_string();
    };
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= chars {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(chars).collect();
    cut.push_str("...");
    cut
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use docweave_shared::FileCategory;

    use super::*;

    fn temp_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("docweave-attach-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn discovers_recursively_excluding_media_and_hidden() {
        let tmp = temp_dir();
        std::fs::create_dir_all(tmp.join("b/sub")).unwrap();
        std::fs::create_dir_all(tmp.join("b/media")).unwrap();
        std::fs::write(tmp.join("b/img.png"), [0u8, 159, 146]).unwrap();
        std::fs::write(tmp.join("b/sub/report.pdf.md"), "Quarterly   report\n\ntext").unwrap();
        std::fs::write(tmp.join("b/media/fig.png"), [1u8]).unwrap();
        std::fs::write(tmp.join("b/.DS_Store"), [1u8]).unwrap();

        let found = discover(&tmp, Path::new("b"), &DiscoverOptions::default()).unwrap();
        let paths: Vec<&str> = found.iter().map(|a| a.source_path.as_str()).collect();
        assert_eq!(paths, vec!["b/img.png", "b/sub/report.pdf.md"]);

        let img = &found[0];
        assert_eq!(img.kind, FileCategory::Image);
        assert_eq!(img.preview, BINARY_PLACEHOLDER);
        assert_eq!(img.owner_dir, "b");

        let report = &found[1];
        assert_eq!(report.kind, FileCategory::Pdf);
        assert_eq!(report.original_path, "b/sub/report.pdf");
        assert_eq!(report.base_name, "report");
        assert_eq!(report.preview, "Quarterly report text");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_directory_has_no_attachments() {
        let tmp = temp_dir();
        let found = discover(&tmp, Path::new("a"), &DiscoverOptions::default()).unwrap();
        assert!(found.is_empty());
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let tmp = temp_dir();
        let path = tmp.join("n.txt");
        std::fs::write(&path, "héllo wörld").unwrap();
        assert_eq!(preview(&path, 4), "héll...");
        assert_eq!(preview(&path, 50), "héllo wörld");
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
