//! Canonical reference ids: `[ATTACH:<TYPE>:<label>]`.
//!
//! Ids depend only on path and type, never on discovery order or a counter,
//! so identical inputs produce identical ids on every run.

use std::collections::{BTreeMap, BTreeSet};

use docweave_shared::{Attachment, FileCategory};

/// Format a reference id.
pub fn reference_id(kind: FileCategory, label: &str) -> String {
    format!("[ATTACH:{kind}:{label}]")
}

/// Assign reference ids to every attachment of a run.
///
/// Attachments sharing type and base name are disambiguated by their nearest
/// enclosing directories, widened one level at a time until every label in
/// the group is distinct. If directories cannot separate them, the full
/// original path is used.
pub fn assign_reference_ids(attachments: &mut [Attachment]) {
    let mut groups: BTreeMap<(FileCategory, String), Vec<usize>> = BTreeMap::new();
    for (idx, attachment) in attachments.iter().enumerate() {
        groups
            .entry((attachment.kind, attachment.base_name.clone()))
            .or_default()
            .push(idx);
    }

    for ((kind, base), members) in groups {
        if members.len() == 1 {
            attachments[members[0]].reference_id = reference_id(kind, &base);
            continue;
        }
        let group: Vec<&Attachment> = members.iter().map(|&i| &attachments[i]).collect();
        let labels = disambiguate(&base, &group);
        for (idx, label) in members.into_iter().zip(labels) {
            attachments[idx].reference_id = reference_id(kind, &label);
        }
    }
}

fn disambiguate(base: &str, group: &[&Attachment]) -> Vec<String> {
    let dirs: Vec<Vec<&str>> = group
        .iter()
        .map(|a| {
            let mut segments: Vec<&str> = a.original_path.split('/').collect();
            segments.pop();
            segments
        })
        .collect();
    let max_depth = dirs.iter().map(Vec::len).max().unwrap_or(0);

    for depth in 1..=max_depth {
        let labels: Vec<String> = dirs
            .iter()
            .map(|segments| {
                let start = segments.len().saturating_sub(depth);
                let mut parts = segments[start..].to_vec();
                parts.push(base);
                parts.join("/")
            })
            .collect();
        if all_distinct(&labels) {
            return labels;
        }
    }

    let originals: Vec<String> = group.iter().map(|a| a.original_path.clone()).collect();
    if all_distinct(&originals) {
        return originals;
    }
    group.iter().map(|a| a.source_path.clone()).collect()
}

fn all_distinct(labels: &[String]) -> bool {
    labels.iter().collect::<BTreeSet<_>>().len() == labels.len()
}
