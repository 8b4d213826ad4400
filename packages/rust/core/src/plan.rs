//! Directory scan and change plan.
//!
//! Scans the input tree for documents, fingerprints each one together with its
//! attachment directory, and compares against persisted state to decide what
//! re-enters the pipeline.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use docweave_converters::{ConverterRegistry, Renderer};
use docweave_shared::{
    DocumentId, DocweaveError, FileCategory, ProcessingFingerprint, Result, RunConfig,
    SourceDocument,
};
use docweave_state::{Assessment, ChangeDetector, ChangeReason};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::fs::to_slash;
use crate::ordering::compare_paths;

/// Version of the attachment discovery and id assignment rules.
pub const ATTACHMENT_RESOLVER_VERSION: &str = "1";
/// Version of the link rewriting rules.
pub const REFERENCE_REWRITER_VERSION: &str = "1";
/// Version of the consolidated artifact layout.
pub const ASSEMBLER_VERSION: &str = "1";

// ---------------------------------------------------------------------------
// Scan
// ---------------------------------------------------------------------------

/// A candidate document found by [`scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub id: DocumentId,
    pub path: PathBuf,
    pub category: FileCategory,
}

/// Find every document under `input_dir`.
///
/// A document is a non-hidden regular file whose category has a registered
/// converter and that does not live inside another document's attachment
/// directory. `exclude` (the processing root, when nested) is never entered.
#[instrument(skip_all, fields(input = %input_dir.display()))]
pub fn scan(
    input_dir: &Path,
    registry: &ConverterRegistry,
    exclude: Option<&Path>,
) -> Result<Vec<ScannedFile>> {
    let walker = WalkDir::new(input_dir).into_iter().filter_entry(|e| {
        if e.depth() == 0 {
            return true;
        }
        if exclude.is_some_and(|x| e.path() == x) {
            return false;
        }
        !e.file_name().to_string_lossy().starts_with('.')
    });

    let mut candidates = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            DocweaveError::io(input_dir, std::io::Error::other(e.to_string()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let category = FileCategory::from_path(entry.path());
        if !registry.supports(category) {
            debug!(path = %entry.path().display(), %category, "no converter, ignoring");
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(input_dir) else {
            continue;
        };
        candidates.push(ScannedFile {
            id: DocumentId::from_relative(rel),
            path: entry.path().to_path_buf(),
            category,
        });
    }

    // Shallow files first, so a document's attachment directory is known
    // before anything inside it is considered.
    candidates.sort_by(|a, b| {
        depth(&a.id)
            .cmp(&depth(&b.id))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut attachment_dirs: BTreeSet<String> = BTreeSet::new();
    let mut documents = Vec::new();
    for candidate in candidates {
        if inside_any(&candidate.id, &attachment_dirs) {
            continue;
        }
        attachment_dirs.insert(to_slash(&candidate.id.attachment_dir()));
        documents.push(candidate);
    }

    documents.sort_by(|a, b| compare_paths(a.id.as_str(), b.id.as_str()));
    info!(documents = documents.len(), "scan complete");
    Ok(documents)
}

fn depth(id: &DocumentId) -> usize {
    id.as_str().matches('/').count()
}

fn inside_any(id: &DocumentId, dirs: &BTreeSet<String>) -> bool {
    let mut prefix = String::new();
    for segment in id.parent().split('/').filter(|s| !s.is_empty()) {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(segment);
        if dirs.contains(&prefix) {
            return true;
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Processing fingerprint
// ---------------------------------------------------------------------------

/// Version vector over every component whose behavior shapes the output.
pub fn processing_fingerprint(
    config: &RunConfig,
    registry: &ConverterRegistry,
    renderer: Option<&dyn Renderer>,
    extra: &BTreeMap<String, String>,
) -> ProcessingFingerprint {
    let mut fp = ProcessingFingerprint::new()
        .with("docweave", env!("CARGO_PKG_VERSION"))
        .with("attachment-resolver", ATTACHMENT_RESOLVER_VERSION)
        .with("reference-rewriter", REFERENCE_REWRITER_VERSION)
        .with("assembler", ASSEMBLER_VERSION)
        .with("attachments.media_dir", config.media_dir.as_str())
        .with("attachments.preview_chars", config.preview_chars.to_string());

    for (component, version) in registry.fingerprint_entries() {
        fp.insert(component, version);
    }
    let renderer = renderer
        .map(|r| format!("{}@{}", r.name(), r.version()))
        .unwrap_or_else(|| "none".into());
    fp.insert("renderer", renderer);
    for (component, version) in extra {
        fp.insert(format!("extra:{component}"), version.clone());
    }
    fp
}

// ---------------------------------------------------------------------------
// Change plan
// ---------------------------------------------------------------------------

/// One scanned document and its change assessment.
#[derive(Debug, Clone)]
pub struct PlannedDocument {
    pub source: SourceDocument,
    pub assessment: Assessment,
}

/// What a run will do, document by document.
#[derive(Debug, Clone, Default)]
pub struct ChangePlan {
    /// Documents in consolidation order.
    pub documents: Vec<PlannedDocument>,
    /// Documents that could not be fingerprinted, with the reason.
    pub unreadable: BTreeMap<DocumentId, String>,
}

impl ChangePlan {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.unreadable.is_empty()
    }

    /// Ids whose assessment is [`ChangeReason::Unchanged`].
    pub fn unchanged(&self) -> BTreeSet<DocumentId> {
        self.documents
            .iter()
            .filter(|d| !d.assessment.needs_processing())
            .map(|d| d.source.id.clone())
            .collect()
    }

    pub fn needing_processing(&self) -> impl Iterator<Item = &PlannedDocument> {
        self.documents
            .iter()
            .filter(|d| d.assessment.needs_processing())
    }

    pub fn sources(&self) -> Vec<SourceDocument> {
        self.documents.iter().map(|d| d.source.clone()).collect()
    }

    /// Every id the plan knows about, readable or not.
    pub fn ids(&self) -> BTreeSet<DocumentId> {
        self.documents
            .iter()
            .map(|d| d.source.id.clone())
            .chain(self.unreadable.keys().cloned())
            .collect()
    }
}

/// Assess every scanned document against persisted state.
#[instrument(skip_all, fields(documents = scanned.len()))]
pub fn build_plan(
    input_dir: &Path,
    scanned: Vec<ScannedFile>,
    detector: &ChangeDetector,
) -> ChangePlan {
    let mut plan = ChangePlan::default();

    for file in scanned {
        let attachment_dir = input_dir.join(file.id.attachment_dir());
        match detector.assess(&file.id, &file.path, &attachment_dir) {
            Ok(assessment) => {
                let source = SourceDocument {
                    id: file.id,
                    path: file.path,
                    fingerprint: assessment.current.file.clone(),
                    category: file.category,
                    last_processed: assessment.previous.as_ref().map(|s| s.processed_at),
                };
                plan.documents.push(PlannedDocument { source, assessment });
            }
            Err(e) => {
                warn!(doc = %file.id, error = %e, "could not fingerprint document");
                plan.unreadable.insert(file.id, e.to_string());
            }
        }
    }

    let changed = plan
        .documents
        .iter()
        .filter(|d| d.assessment.reason != ChangeReason::Unchanged)
        .count();
    info!(
        total = plan.documents.len(),
        changed,
        unchanged = plan.documents.len() - changed,
        unreadable = plan.unreadable.len(),
        "change plan built"
    );
    plan
}
