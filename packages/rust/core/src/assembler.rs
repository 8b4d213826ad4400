//! Consolidated artifact assembler.
//!
//! Takes the rendered per-document sections (already in final order), the
//! run's attachment index and generation metadata, then writes the
//! consolidated artifact, the standalone attachment index and the run
//! manifest into the consolidate tree.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use docweave_attachments::AttachmentIndex;
use docweave_markdown::render_front_matter;
use docweave_shared::{ArtifactMetadata, Attachment, CURRENT_SCHEMA_VERSION, DocumentId, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::fs::{write_atomic, write_json};
use crate::toc::{build_toc, render_toc};

/// File name of the consolidated artifact.
pub const ARTIFACT_NAME: &str = "consolidated.md";
/// File name of the standalone attachment index.
pub const ATTACHMENT_INDEX_NAME: &str = "attachment_index.md";
/// File name of the run manifest.
pub const MANIFEST_NAME: &str = "run_manifest.json";

/// One document's section, ready for assembly.
#[derive(Debug, Clone)]
pub struct Section {
    pub id: DocumentId,
    pub title: String,
    /// Rendered section text (see [`render_section`]).
    pub content: String,
    /// Attachments shown in the section, in source-path order.
    pub attachments: Vec<Attachment>,
}

/// Written next to the artifact on every consolidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub duration_ms: u128,
    pub artifact: String,
    pub artifact_sha256: String,
    pub documents: usize,
    pub attachments: usize,
    pub sources: Vec<DocumentId>,
}

/// Paths written by [`write_artifact`].
#[derive(Debug, Clone)]
pub struct AssembleResult {
    pub artifact_path: PathBuf,
    pub index_path: PathBuf,
    pub manifest_path: PathBuf,
    pub manifest: RunManifest,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Render one document section: heading, prepared body, attachment list.
pub fn render_section(title: &str, body: &str, attachments: &[&Attachment]) -> String {
    let mut out = format!("# {title}\n\n");
    if !body.trim().is_empty() {
        out.push_str(body.trim_end());
        out.push_str("\n\n");
    }

    if !attachments.is_empty() {
        out.push_str("## Attachments\n\n");
        for a in attachments {
            out.push_str(&format!("### {}\n\n", a.display_name()));
            out.push_str(&format!("- Reference: `{}`\n", a.reference_id));
            out.push_str(&format!("- Path: `{}`\n", a.source_path));
            out.push_str(&format!("- Preview: {}\n\n", a.preview));
        }
    }

    let mut out = out.trim_end().to_string();
    out.push('\n');
    out
}

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

/// Build the artifact text.
///
/// ```text
/// ---
/// generated_at: ...
/// duration_ms: ...
/// documents: N
/// attachments: M
/// sources: a.md, b.md
/// ---
///
/// # Table of Contents
/// ...
/// ---
/// <section>
/// ---
/// # Attachment Index
/// ```
pub fn assemble(sections: &[Section], index: &AttachmentIndex, meta: &ArtifactMetadata) -> String {
    let sources = meta
        .sources
        .iter()
        .map(DocumentId::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    let mut out = render_front_matter([
        (
            "generated_at",
            meta.generated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        ),
        ("duration_ms", meta.duration_ms.to_string()),
        ("documents", meta.sources.len().to_string()),
        ("attachments", meta.attachment_count.to_string()),
        ("sources", sources),
    ]);
    out.push('\n');
    out.push_str(&render_toc(&build_toc(sections)));

    for section in sections {
        out.push_str("\n---\n\n");
        out.push_str(&section.content);
    }

    out.push_str("\n---\n\n");
    out.push_str(index.to_markdown().trim_end());
    out.push('\n');
    out
}

/// Write the artifact, the attachment index and the run manifest into `dir`.
///
/// Each file is written atomically; a reader never sees a partial artifact.
#[instrument(skip_all, fields(dir = %dir.display(), sections = sections.len()))]
pub fn write_artifact(
    dir: &Path,
    sections: &[Section],
    index: &AttachmentIndex,
    meta: &ArtifactMetadata,
) -> Result<AssembleResult> {
    let artifact = assemble(sections, index, meta);
    let artifact_path = dir.join(ARTIFACT_NAME);
    let artifact_sha256 = write_atomic(&artifact_path, artifact.as_bytes())?;

    let index_path = dir.join(ATTACHMENT_INDEX_NAME);
    write_atomic(&index_path, index.to_markdown().as_bytes())?;

    let manifest = RunManifest {
        schema_version: CURRENT_SCHEMA_VERSION,
        run_id: Uuid::now_v7(),
        generated_at: meta.generated_at,
        duration_ms: meta.duration_ms,
        artifact: ARTIFACT_NAME.to_string(),
        artifact_sha256,
        documents: sections.len(),
        attachments: index.len(),
        sources: meta.sources.clone(),
    };
    let manifest_path = dir.join(MANIFEST_NAME);
    write_json(&manifest_path, &manifest)?;

    info!(
        path = %artifact_path.display(),
        documents = manifest.documents,
        attachments = manifest.attachments,
        run_id = %manifest.run_id,
        "consolidated artifact written"
    );

    Ok(AssembleResult {
        artifact_path,
        index_path,
        manifest_path,
        manifest,
    })
}

#[cfg(test)]
mod tests {
    use docweave_shared::FileCategory;

    use super::*;

    fn image(path: &str, id: &str) -> Attachment {
        Attachment {
            source_path: path.into(),
            original_path: path.into(),
            kind: FileCategory::Image,
            base_name: "img".into(),
            reference_id: id.into(),
            preview: "(binary content, no preview)".into(),
            owner_dir: "b".into(),
        }
    }

    fn sections() -> (Vec<Section>, AttachmentIndex) {
        let img = image("b/img.png", "[ATTACH:IMAGE:img]");
        let a = Section {
            id: DocumentId::from("a.md"),
            title: "A".into(),
            content: render_section("A", "Alpha.\n", &[]),
            attachments: Vec::new(),
        };
        let b = Section {
            id: DocumentId::from("b.md"),
            title: "B".into(),
            content: render_section("B", "## Detail\n\nBeta.\n", &[&img]),
            attachments: vec![img.clone()],
        };
        let index = AttachmentIndex {
            attachments: vec![img],
        };
        (vec![a, b], index)
    }

    fn metadata() -> ArtifactMetadata {
        ArtifactMetadata {
            generated_at: Utc::now(),
            duration_ms: 12,
            sources: vec![DocumentId::from("a.md"), DocumentId::from("b.md")],
            attachment_count: 1,
        }
    }

    #[test]
    fn section_lists_attachments() {
        let img = image("b/img.png", "[ATTACH:IMAGE:img]");
        let section = render_section("B", "Body.\n", &[&img]);
        assert!(section.starts_with("# B\n\nBody.\n\n## Attachments\n\n### img.png\n"));
        assert!(section.contains("- Reference: `[ATTACH:IMAGE:img]`\n"));
        assert!(section.ends_with("no preview)\n"));
    }

    #[test]
    fn empty_body_section_is_just_the_heading() {
        assert_eq!(render_section("Empty", "", &[]), "# Empty\n");
    }

    #[test]
    fn artifact_layout() {
        let (sections, index) = sections();
        let text = assemble(&sections, &index, &metadata());

        assert!(text.starts_with("---\ngenerated_at: "));
        assert!(text.contains("duration_ms: 12\ndocuments: 2\nattachments: 1\nsources: a.md, b.md\n---\n"));

        let toc = text.find("# Table of Contents").unwrap();
        let a = text.find("# A\n").unwrap();
        let b = text.find("# B\n").unwrap();
        let index_at = text.find("# Attachment Index").unwrap();
        assert!(toc < a && a < b && b < index_at);
        // Metadata block close, two sections, attachment index.
        assert_eq!(text.matches("\n---\n\n").count(), 4);
        assert!(text.ends_with('\n') && !text.ends_with("\n\n"));
    }

    #[test]
    fn writes_artifact_index_and_manifest() {
        let dir = std::env::temp_dir().join(format!("docweave-asm-{}", Uuid::now_v7()));
        let (sections, index) = sections();

        let result = write_artifact(&dir, &sections, &index, &metadata()).unwrap();
        assert!(result.artifact_path.exists());
        assert!(result.index_path.exists());

        let manifest: RunManifest =
            serde_json::from_str(&std::fs::read_to_string(&result.manifest_path).unwrap()).unwrap();
        assert_eq!(manifest, result.manifest);
        assert_eq!(manifest.documents, 2);
        assert_eq!(manifest.artifact_sha256.len(), 64);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
