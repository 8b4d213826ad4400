//! The merged attachment index of a run.

use std::collections::BTreeMap;

use docweave_shared::Attachment;
use serde::{Deserialize, Serialize};

use crate::reference::assign_reference_ids;

/// Every attachment of a run, sorted by source path, with ids assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentIndex {
    pub attachments: Vec<Attachment>,
}

impl AttachmentIndex {
    /// Merge per-document attachment lists and assign reference ids once.
    pub fn build(lists: impl IntoIterator<Item = Vec<Attachment>>) -> Self {
        let mut attachments: Vec<Attachment> = lists.into_iter().flatten().collect();
        attachments.sort_by(|a, b| a.source_path.cmp(&b.source_path));
        attachments.dedup_by(|a, b| a.source_path == b.source_path);
        assign_reference_ids(&mut attachments);
        Self { attachments }
    }

    pub fn len(&self) -> usize {
        self.attachments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }

    /// Attachments owned by one attachment directory, in source-path order.
    pub fn for_owner(&self, owner_dir: &str) -> Vec<&Attachment> {
        self.attachments
            .iter()
            .filter(|a| a.owner_dir == owner_dir)
            .collect()
    }

    /// Look up by the path an author would link to, or by the converted path.
    pub fn find(&self, path: &str) -> Option<&Attachment> {
        self.attachments
            .iter()
            .find(|a| a.original_path == path || a.source_path == path)
    }

    /// `source_path` → reference id, used to detect corpus-wide changes.
    pub fn id_map(&self) -> BTreeMap<&str, &str> {
        self.attachments
            .iter()
            .map(|a| (a.source_path.as_str(), a.reference_id.as_str()))
            .collect()
    }

    /// Render the index grouped by owning directory, then type, then
    /// reference id, all lexicographic. Output is byte-identical for
    /// identical inputs.
    pub fn to_markdown(&self) -> String {
        let mut grouped: BTreeMap<&str, BTreeMap<&str, BTreeMap<&str, &Attachment>>> =
            BTreeMap::new();
        for a in &self.attachments {
            grouped
                .entry(a.owner_dir.as_str())
                .or_default()
                .entry(a.kind.as_str())
                .or_default()
                .insert(a.reference_id.as_str(), a);
        }

        let mut out = String::from("# Attachment Index\n\n");
        if grouped.is_empty() {
            out.push_str("_No attachments._\n");
            return out;
        }

        for (owner, by_type) in &grouped {
            out.push_str(&format!("## {owner}\n\n"));
            for (kind, by_id) in by_type {
                out.push_str(&format!("### {kind}\n\n"));
                for (id, a) in by_id {
                    out.push_str(&format!("- `{id}` {} (`{}`)\n", a.display_name(), a.original_path));
                    out.push_str(&format!("  > {}\n", a.preview));
                }
                out.push('\n');
            }
        }
        out
    }
}
