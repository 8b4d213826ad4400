//! The four pipeline phases and the contract the runner drives them through.
//!
//! Each phase reads its predecessor's tree (`<processing-root>/phases/<prev>/`,
//! or the input directory for Parse) and writes its own tree under the same
//! relative paths.

mod consolidate;
mod parse;
mod render;
mod split;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use docweave_converters::{ConverterRegistry, Renderer};
use docweave_shared::{Attachment, DocumentId, PhaseKind, Result, RunConfig, SourceDocument};
use serde::{Deserialize, Serialize};

pub use crate::assembler::{ARTIFACT_NAME, ATTACHMENT_INDEX_NAME, MANIFEST_NAME, RunManifest};
pub use consolidate::ConsolidatePhase;
pub use parse::ParsePhase;
pub use render::RenderPhase;
pub use split::{INDEX_DIR_NAME, SplitPhase};

/// Directory holding the phase trees under the processing root.
pub const PHASES_DIR_NAME: &str = "phases";

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything a phase needs that is fixed for the whole run.
pub struct PhaseContext {
    pub config: RunConfig,
    pub registry: Arc<ConverterRegistry>,
    pub renderer: Option<Arc<dyn Renderer>>,
    /// When the run started, for the artifact's duration field.
    pub started: Instant,
}

impl PhaseContext {
    pub fn new(
        config: RunConfig,
        registry: Arc<ConverterRegistry>,
        renderer: Option<Arc<dyn Renderer>>,
    ) -> Self {
        Self {
            config,
            registry,
            renderer,
            started: Instant::now(),
        }
    }

    /// `<processing-root>/phases/<kind>/`.
    pub fn phase_dir(&self, kind: PhaseKind) -> PathBuf {
        self.config
            .processing_root
            .join(PHASES_DIR_NAME)
            .join(kind.as_str())
    }

    /// The tree a phase reads from.
    pub fn input_dir(&self, kind: PhaseKind) -> PathBuf {
        match kind.previous() {
            Some(prev) => self.phase_dir(prev),
            None => self.config.input_dir.clone(),
        }
    }

    /// `<processing-root>/index/`.
    pub fn index_dir(&self) -> PathBuf {
        self.config.processing_root.join(INDEX_DIR_NAME)
    }
}

impl std::fmt::Debug for PhaseContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseContext")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("renderer", &self.renderer.as_ref().map(|r| r.name().to_string()))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Phase contract
// ---------------------------------------------------------------------------

/// What a phase produced for one document.
#[derive(Debug, Clone, Default)]
pub struct DocumentOutput {
    pub outputs: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// What a phase produced once every document was resolved.
#[derive(Debug, Clone, Default)]
pub struct FinishOutput {
    pub outputs: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// One pipeline stage.
///
/// The runner calls [`prepare`](Phase::prepare) with the full input set,
/// then [`process_document`](Phase::process_document) concurrently per
/// document, then [`finish`](Phase::finish) with the documents that
/// succeeded. Per-document errors stay with their document unless fatal.
#[async_trait]
pub trait Phase: Send + Sync {
    fn kind(&self) -> PhaseKind;

    /// Files this phase writes for `doc`; all must exist for cached reuse.
    fn expected_outputs(&self, ctx: &PhaseContext, doc: &SourceDocument) -> Vec<PathBuf>;

    /// Load corpus-wide inputs. Errors here are fatal for the phase.
    async fn prepare(&self, _ctx: &PhaseContext, _docs: &[SourceDocument]) -> Result<()> {
        Ok(())
    }

    /// Key over corpus-wide inputs that shape per-document output. A key
    /// different from the previous run's disables cached reuse for the phase.
    fn corpus_key(&self, _ctx: &PhaseContext, _docs: &[SourceDocument]) -> Option<String> {
        None
    }

    async fn process_document(
        &self,
        ctx: &PhaseContext,
        doc: &SourceDocument,
    ) -> Result<DocumentOutput>;

    async fn finish(&self, _ctx: &PhaseContext, _succeeded: &[SourceDocument]) -> Result<FinishOutput> {
        Ok(FinishOutput::default())
    }
}

/// All phases in pipeline order.
pub fn all_phases() -> Vec<Arc<dyn Phase>> {
    PhaseKind::ALL.into_iter().map(phase_for).collect()
}

/// A fresh phase instance for `kind`.
pub fn phase_for(kind: PhaseKind) -> Arc<dyn Phase> {
    match kind {
        PhaseKind::Parse => Arc::new(ParsePhase::default()),
        PhaseKind::Split => Arc::new(SplitPhase),
        PhaseKind::Consolidate => Arc::new(ConsolidatePhase::default()),
        PhaseKind::Render => Arc::new(RenderPhase),
    }
}

// ---------------------------------------------------------------------------
// Sidecar
// ---------------------------------------------------------------------------

/// Per-document metadata written by Split next to the body
/// (`<output-path>.meta.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub schema_version: u32,
    pub document: DocumentId,
    pub title: String,
    #[serde(default)]
    pub metadata: std::collections::BTreeMap<String, String>,
    /// Attachments discovered for this document, without reference ids.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// `<tree>/<output-path>.meta.json`.
pub(crate) fn sidecar_path(tree: &Path, doc: &DocumentId) -> PathBuf {
    let mut name = doc.output_path().into_os_string();
    name.push(".meta.json");
    tree.join(PathBuf::from(name))
}
