//! Parse: validate each document and convert it to normalized text.
//!
//! The main file goes through the converter registry into
//! `phases/parse/<output-path>`. The attachment directory is copied alongside;
//! attachments with a non-text converter are converted into `<name>.md`
//! instead, falling back to a raw copy (with a warning) on failure.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use docweave_shared::{
    DocumentId, DocweaveError, FileCategory, PhaseKind, Result, SourceDocument,
};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use super::{ARTIFACT_NAME, ATTACHMENT_INDEX_NAME, DocumentOutput, Phase, PhaseContext};
use crate::fs::{remove_dir_if_exists, to_slash, write_atomic};

#[derive(Debug, Default)]
pub struct ParsePhase {
    /// Documents rejected before conversion (reserved or colliding output paths).
    rejected: OnceLock<BTreeMap<DocumentId, String>>,
}

#[async_trait]
impl Phase for ParsePhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Parse
    }

    fn expected_outputs(&self, ctx: &PhaseContext, doc: &SourceDocument) -> Vec<PathBuf> {
        vec![ctx.phase_dir(PhaseKind::Parse).join(doc.id.output_path())]
    }

    async fn prepare(&self, _ctx: &PhaseContext, docs: &[SourceDocument]) -> Result<()> {
        let _ = self.rejected.set(reject_output_conflicts(docs));
        Ok(())
    }

    #[instrument(skip_all, fields(doc = %doc.id, category = %doc.category))]
    async fn process_document(
        &self,
        ctx: &PhaseContext,
        doc: &SourceDocument,
    ) -> Result<DocumentOutput> {
        if let Some(reason) = self.rejected.get().and_then(|r| r.get(&doc.id)) {
            return Err(DocweaveError::validation(reason.clone()));
        }
        if doc.fingerprint.size > ctx.config.max_file_size_bytes {
            return Err(DocweaveError::validation(format!(
                "{} is {} bytes, limit is {}",
                doc.id, doc.fingerprint.size, ctx.config.max_file_size_bytes
            )));
        }

        let tree = ctx.phase_dir(PhaseKind::Parse);
        let target = tree.join(doc.id.output_path());
        let attachments_out = tree.join(doc.id.attachment_dir());
        let media_out = attachments_out.join(&ctx.config.media_dir);

        remove_dir_if_exists(&attachments_out)?;
        std::fs::create_dir_all(&media_out).map_err(|e| DocweaveError::io(&media_out, e))?;

        let text = ctx
            .registry
            .convert(doc.category, &doc.path, &media_out)
            .await?;
        let text = if text.ends_with('\n') || text.is_empty() {
            text
        } else {
            format!("{text}\n")
        };
        write_atomic(&target, text.as_bytes())?;

        let attachments_in = ctx.config.input_dir.join(doc.id.attachment_dir());
        let warnings = copy_attachments(ctx, &attachments_in, &attachments_out).await?;

        // Drop directories nothing was written to.
        let _ = std::fs::remove_dir(&media_out);
        let _ = std::fs::remove_dir(&attachments_out);

        debug!(bytes = text.len(), warnings = warnings.len(), "parsed document");
        Ok(DocumentOutput {
            outputs: vec![target],
            warnings,
        })
    }
}

/// Reject documents whose output path is reserved at the tree root or already
/// taken by an earlier document (`report.docx` and `report.md` both map to
/// `report.md`).
fn reject_output_conflicts(docs: &[SourceDocument]) -> BTreeMap<DocumentId, String> {
    let mut taken: BTreeMap<PathBuf, &DocumentId> = BTreeMap::new();
    let mut rejected = BTreeMap::new();

    for doc in docs {
        let output = doc.id.output_path();
        let reserved = output == Path::new(ARTIFACT_NAME) || output == Path::new(ATTACHMENT_INDEX_NAME);
        if reserved {
            rejected.insert(
                doc.id.clone(),
                format!("{} maps to reserved artifact name {}", doc.id, output.display()),
            );
            continue;
        }
        match taken.get(&output) {
            Some(owner) => {
                rejected.insert(
                    doc.id.clone(),
                    format!("{} and {owner} both map to {}", doc.id, output.display()),
                );
            }
            None => {
                taken.insert(output, &doc.id);
            }
        }
    }
    rejected
}

/// Copy (or convert) every file of an attachment directory. Returns warnings.
async fn copy_attachments(ctx: &PhaseContext, src: &Path, dst: &Path) -> Result<Vec<String>> {
    let mut warnings = Vec::new();
    if !src.is_dir() {
        return Ok(warnings);
    }

    let files: Vec<PathBuf> = WalkDir::new(src)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.path().strip_prefix(src).ok().map(Path::to_path_buf))
        .collect();

    for rel in files {
        let source = src.join(&rel);
        let raw_target = dst.join(&rel);
        if let Some(parent) = raw_target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DocweaveError::io(parent, e))?;
        }

        let in_media = rel
            .components()
            .next()
            .is_some_and(|c| c.as_os_str() == OsStr::new(&ctx.config.media_dir));
        let category = FileCategory::from_path(&rel);
        let convertible = !in_media
            && !category.is_text_like()
            && category != FileCategory::Other
            && ctx.registry.supports(category);

        if convertible {
            let media = dst.join(&ctx.config.media_dir);
            match ctx.registry.convert(category, &source, &media).await {
                Ok(text) => {
                    let mut name = raw_target.clone().into_os_string();
                    name.push(".md");
                    write_atomic(Path::new(&name), text.as_bytes())?;
                    continue;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let rel = to_slash(&rel);
                    warn!(attachment = %rel, error = %e, "attachment conversion failed, copying raw");
                    warnings.push(format!("attachment {rel}: {e}; copied raw"));
                }
            }
        }

        std::fs::copy(&source, &raw_target).map_err(|e| DocweaveError::io(&raw_target, e))?;
    }

    Ok(warnings)
}
