//! Table of contents for the consolidated artifact.
//!
//! One top-level entry per document section in final order, with one nested
//! entry per attachment. Anchors come from [`docweave_markdown::slug`] and are
//! not deduplicated.

use docweave_markdown::slug;
use docweave_shared::{Toc, TocEntry};
use tracing::{debug, instrument};

use crate::assembler::Section;

/// Build the TOC for `sections`, which must already be in final order.
#[instrument(skip_all, fields(sections = sections.len()))]
pub fn build_toc(sections: &[Section]) -> Toc {
    let entries: Vec<TocEntry> = sections
        .iter()
        .map(|section| TocEntry {
            title: section.title.clone(),
            anchor: slug(&section.title),
            children: section
                .attachments
                .iter()
                .map(|a| TocEntry {
                    title: a.display_name().to_string(),
                    anchor: slug(a.display_name()),
                    children: Vec::new(),
                })
                .collect(),
        })
        .collect();

    debug!(
        entries = entries.len(),
        nested = entries.iter().map(|e| e.children.len()).sum::<usize>(),
        "TOC built"
    );
    Toc { entries }
}

/// Render as a `# Table of Contents` section with nested link lists.
pub fn render_toc(toc: &Toc) -> String {
    let mut out = String::from("# Table of Contents\n\n");
    for entry in &toc.entries {
        render_entry(&mut out, entry, 0);
    }
    out
}

fn render_entry(out: &mut String, entry: &TocEntry, depth: usize) {
    out.push_str(&"  ".repeat(depth));
    out.push_str(&format!("- [{}](#{})\n", entry.title, entry.anchor));
    for child in &entry.children {
        render_entry(out, child, depth + 1);
    }
}
