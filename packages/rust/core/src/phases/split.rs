//! Split: separate metadata from body and discover attachments.
//!
//! Each worker writes the body plus a `.meta.json` sidecar carrying the title,
//! metadata and the document's attachment list. Nothing is shared between
//! workers; `finish` merges the sidecars once, assigns reference ids for the
//! whole run and writes the attachment index.

use std::path::PathBuf;

use async_trait::async_trait;
use docweave_attachments::{AttachmentIndex, DiscoverOptions, discover};
use docweave_shared::{CURRENT_SCHEMA_VERSION, DocweaveError, PhaseKind, Result, SourceDocument};
use tracing::{debug, info, instrument};

use super::{
    ATTACHMENT_INDEX_NAME, DocumentMeta, DocumentOutput, FinishOutput, Phase, PhaseContext,
    sidecar_path,
};
use crate::fs::{mirror_dir, read_json, write_atomic, write_json};

/// Directory under the processing root holding run-wide indexes.
pub const INDEX_DIR_NAME: &str = "index";
/// Machine-readable attachment index.
pub(crate) const INDEX_JSON_NAME: &str = "attachments.json";

#[derive(Debug, Default)]
pub struct SplitPhase;

#[async_trait]
impl Phase for SplitPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Split
    }

    fn expected_outputs(&self, ctx: &PhaseContext, doc: &SourceDocument) -> Vec<PathBuf> {
        let tree = ctx.phase_dir(PhaseKind::Split);
        vec![tree.join(doc.id.output_path()), sidecar_path(&tree, &doc.id)]
    }

    #[instrument(skip_all, fields(doc = %doc.id))]
    async fn process_document(
        &self,
        ctx: &PhaseContext,
        doc: &SourceDocument,
    ) -> Result<DocumentOutput> {
        let input = ctx.input_dir(PhaseKind::Split);
        let tree = ctx.phase_dir(PhaseKind::Split);

        let source = input.join(doc.id.output_path());
        let text = std::fs::read_to_string(&source).map_err(|e| DocweaveError::io(&source, e))?;
        let parsed = docweave_markdown::parse_document(&text, &doc.id);

        let options = DiscoverOptions {
            media_dir: ctx.config.media_dir.clone(),
            preview_chars: ctx.config.preview_chars,
        };
        let attachments = discover(&input, &doc.id.attachment_dir(), &options)?;
        mirror_dir(
            &input.join(doc.id.attachment_dir()),
            &tree.join(doc.id.attachment_dir()),
        )?;

        let body_path = tree.join(doc.id.output_path());
        write_atomic(&body_path, parsed.body.as_bytes())?;

        let meta = DocumentMeta {
            schema_version: CURRENT_SCHEMA_VERSION,
            document: doc.id.clone(),
            title: parsed.title,
            metadata: parsed.metadata,
            attachments,
        };
        let meta_path = sidecar_path(&tree, &doc.id);
        write_json(&meta_path, &meta)?;

        debug!(title = %meta.title, attachments = meta.attachments.len(), "split document");
        Ok(DocumentOutput {
            outputs: vec![body_path, meta_path],
            warnings: Vec::new(),
        })
    }

    /// Merge every successful document's attachments and assign reference ids.
    #[instrument(skip_all, fields(documents = succeeded.len()))]
    async fn finish(&self, ctx: &PhaseContext, succeeded: &[SourceDocument]) -> Result<FinishOutput> {
        let tree = ctx.phase_dir(PhaseKind::Split);
        let mut lists = Vec::with_capacity(succeeded.len());
        for doc in succeeded {
            let meta: DocumentMeta = read_json(&sidecar_path(&tree, &doc.id))?;
            lists.push(meta.attachments);
        }
        let index = AttachmentIndex::build(lists);

        let dir = ctx.index_dir();
        let json_path = dir.join(INDEX_JSON_NAME);
        let md_path = dir.join(ATTACHMENT_INDEX_NAME);
        write_json(&json_path, &index)?;
        write_atomic(&md_path, index.to_markdown().as_bytes())?;

        info!(attachments = index.len(), "attachment index written");
        Ok(FinishOutput {
            outputs: vec![json_path, md_path],
            warnings: Vec::new(),
        })
    }
}
