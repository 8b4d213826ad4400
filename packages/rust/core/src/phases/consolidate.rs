//! Consolidate: resolve references and assemble the artifact.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::Utc;
use docweave_attachments::AttachmentIndex;
use docweave_markdown::{LinkTarget, rewrite_links, section_body, title_from_path};
use docweave_shared::{
    ArtifactMetadata, Attachment, DocumentId, DocweaveError, PhaseKind, Result, SourceDocument,
};
use tracing::{debug, instrument, warn};

use super::split::INDEX_JSON_NAME;
use super::{DocumentMeta, DocumentOutput, FinishOutput, Phase, PhaseContext, sidecar_path};
use crate::assembler::{Section, render_section, write_artifact};
use crate::fs::{mirror_dir, read_json, to_slash, write_atomic};
use crate::ordering::compare_paths;

/// Corpus-wide inputs loaded once in `prepare`.
#[derive(Debug)]
struct Corpus {
    index: AttachmentIndex,
    metas: BTreeMap<DocumentId, DocumentMeta>,
    /// Original path or output path → output path, for every document.
    documents: BTreeMap<String, String>,
}

impl Corpus {
    fn resolve(&self, path: &str) -> Option<LinkTarget> {
        if let Some(output) = self.documents.get(path) {
            return Some(LinkTarget::Document(output.clone()));
        }
        self.index.find(path).map(|a| LinkTarget::Attachment {
            path: a.source_path.clone(),
            reference_id: a.reference_id.clone(),
        })
    }

    fn title(&self, id: &DocumentId) -> String {
        self.metas
            .get(id)
            .map(|m| m.title.clone())
            .unwrap_or_else(|| title_from_path(id.stem()))
    }

    fn attachments(&self, id: &DocumentId) -> Vec<&Attachment> {
        let owner = to_slash(&id.attachment_dir());
        self.index.for_owner(&owner)
    }
}

#[derive(Debug, Default)]
pub struct ConsolidatePhase {
    corpus: OnceLock<Corpus>,
}

impl ConsolidatePhase {
    fn corpus(&self) -> Result<&Corpus> {
        self.corpus
            .get()
            .ok_or_else(|| DocweaveError::consolidation_fatal("consolidate phase was not prepared"))
    }
}

#[async_trait]
impl Phase for ConsolidatePhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Consolidate
    }

    fn expected_outputs(&self, ctx: &PhaseContext, doc: &SourceDocument) -> Vec<PathBuf> {
        vec![ctx.phase_dir(PhaseKind::Consolidate).join(doc.id.output_path())]
    }

    async fn prepare(&self, ctx: &PhaseContext, docs: &[SourceDocument]) -> Result<()> {
        let index_path = ctx.index_dir().join(INDEX_JSON_NAME);
        if !index_path.exists() {
            return Err(DocweaveError::consolidation_fatal(format!(
                "{} is missing; run the split phase first",
                index_path.display()
            )));
        }
        let index: AttachmentIndex = read_json(&index_path)?;

        let split_tree = ctx.input_dir(PhaseKind::Consolidate);
        let mut metas = BTreeMap::new();
        let mut documents = BTreeMap::new();
        for doc in docs {
            let output = to_slash(&doc.id.output_path());
            documents.insert(doc.id.as_str().to_string(), output.clone());
            documents.insert(output.clone(), output);

            match read_json::<DocumentMeta>(&sidecar_path(&split_tree, &doc.id)) {
                Ok(meta) => {
                    metas.insert(doc.id.clone(), meta);
                }
                Err(e) => warn!(doc = %doc.id, error = %e, "no split metadata"),
            }
        }

        let _ = self.corpus.set(Corpus {
            index,
            metas,
            documents,
        });
        Ok(())
    }

    /// Hash of the document set and the attachment id map. Either changing
    /// alters links or reference ids in otherwise unchanged documents.
    fn corpus_key(&self, _ctx: &PhaseContext, _docs: &[SourceDocument]) -> Option<String> {
        let corpus = self.corpus.get()?;
        let mut hasher = blake3::Hasher::new();
        for (from, to) in &corpus.documents {
            hasher.update(from.as_bytes());
            hasher.update(b"\0");
            hasher.update(to.as_bytes());
            hasher.update(b"\n");
        }
        for (path, id) in corpus.index.id_map() {
            hasher.update(path.as_bytes());
            hasher.update(b"\0");
            hasher.update(id.as_bytes());
            hasher.update(b"\n");
        }
        Some(hasher.finalize().to_hex().to_string())
    }

    #[instrument(skip_all, fields(doc = %doc.id))]
    async fn process_document(
        &self,
        ctx: &PhaseContext,
        doc: &SourceDocument,
    ) -> Result<DocumentOutput> {
        let corpus = self.corpus()?;
        if !corpus.metas.contains_key(&doc.id) {
            return Err(DocweaveError::consolidation(format!(
                "no split metadata for {}",
                doc.id
            )));
        }

        let split_tree = ctx.input_dir(PhaseKind::Consolidate);
        let tree = ctx.phase_dir(PhaseKind::Consolidate);
        let source = split_tree.join(doc.id.output_path());
        let body = std::fs::read_to_string(&source).map_err(|e| DocweaveError::io(&source, e))?;

        let (body, stats) = rewrite_links(&body, doc.id.parent(), |p| corpus.resolve(p));
        let title = corpus.title(&doc.id);
        let section = render_section(&title, &section_body(&body, &title), &corpus.attachments(&doc.id));

        let target = tree.join(doc.id.output_path());
        write_atomic(&target, section.as_bytes())?;
        mirror_dir(
            &split_tree.join(doc.id.attachment_dir()),
            &tree.join(doc.id.attachment_dir()),
        )?;

        debug!(
            rewritten = stats.rewritten,
            passed_through = stats.passed_through,
            "section written"
        );
        Ok(DocumentOutput {
            outputs: vec![target],
            warnings: Vec::new(),
        })
    }

    /// Order the surviving sections and write the artifact.
    #[instrument(skip_all, fields(documents = succeeded.len()))]
    async fn finish(&self, ctx: &PhaseContext, succeeded: &[SourceDocument]) -> Result<FinishOutput> {
        if succeeded.is_empty() {
            return Err(DocweaveError::consolidation_fatal(
                "no document reached consolidation; nothing to assemble",
            ));
        }
        let corpus = self.corpus()?;
        let tree = ctx.phase_dir(PhaseKind::Consolidate);

        let mut ids: Vec<&DocumentId> = succeeded.iter().map(|d| &d.id).collect();
        ids.sort_by(|a, b| compare_paths(a.as_str(), b.as_str()));

        let mut sections = Vec::with_capacity(ids.len());
        let mut owners = BTreeSet::new();
        for id in ids {
            let path = tree.join(id.output_path());
            let content = std::fs::read_to_string(&path).map_err(|e| DocweaveError::io(&path, e))?;
            owners.insert(to_slash(&id.attachment_dir()));
            sections.push(Section {
                id: id.clone(),
                title: corpus.title(id),
                content,
                attachments: corpus.attachments(id).into_iter().cloned().collect(),
            });
        }

        let index = AttachmentIndex {
            attachments: corpus
                .index
                .attachments
                .iter()
                .filter(|a| owners.contains(&a.owner_dir))
                .cloned()
                .collect(),
        };
        let meta = ArtifactMetadata {
            generated_at: Utc::now(),
            duration_ms: ctx.started.elapsed().as_millis(),
            sources: sections.iter().map(|s| s.id.clone()).collect(),
            attachment_count: index.len(),
        };

        let result = write_artifact(&tree, &sections, &index, &meta)?;
        Ok(FinishOutput {
            outputs: vec![result.artifact_path, result.index_path, result.manifest_path],
            warnings: Vec::new(),
        })
    }
}
