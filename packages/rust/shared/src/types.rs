//! Core domain types for docweave runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version for persisted state records and sidecars.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// DocumentId
// ---------------------------------------------------------------------------

/// Stable identity of a source document: its input-relative path with `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Build an id from a path relative to the input root.
    pub fn from_relative(path: &Path) -> Self {
        let joined = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        Self(joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Relative path (platform separators).
    pub fn relative_path(&self) -> PathBuf {
        self.0.split('/').collect()
    }

    /// File stem of the last segment (`notes/b.md` → `b`).
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        }
    }

    /// Last path segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Parent directory as an id-style string (`""` at the root).
    pub fn parent(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[..idx],
            None => "",
        }
    }

    /// Relative path of the sibling attachment directory (`notes/b.md` → `notes/b`).
    pub fn attachment_dir(&self) -> PathBuf {
        let mut path = self.relative_path();
        path.set_file_name(self.stem());
        path
    }

    /// Relative path of this document's normalized-text output (`report.docx` → `report.md`).
    pub fn output_path(&self) -> PathBuf {
        let mut path = self.relative_path();
        path.set_extension("md");
        path
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.trim_start_matches('/').to_string())
    }
}

// ---------------------------------------------------------------------------
// FileCategory
// ---------------------------------------------------------------------------

/// Fixed file taxonomy used for converter selection and attachment classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileCategory {
    Doc,
    Pdf,
    Image,
    Excel,
    Json,
    Text,
    Other,
}

impl FileCategory {
    pub const ALL: [FileCategory; 7] = [
        Self::Doc,
        Self::Pdf,
        Self::Image,
        Self::Excel,
        Self::Json,
        Self::Text,
        Self::Other,
    ];

    /// Classify a bare extension (case-insensitive, without the dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "doc" | "docx" | "odt" | "rtf" => Self::Doc,
            "pdf" => Self::Pdf,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "svg" | "tif" | "tiff" | "heic" => {
                Self::Image
            }
            "xls" | "xlsx" | "xlsm" | "ods" | "csv" => Self::Excel,
            "json" => Self::Json,
            "txt" | "md" | "markdown" | "text" => Self::Text,
            _ => Self::Other,
        }
    }

    /// Classify a path by its final extension.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Other)
    }

    /// Upper-case label used in reference ids and the attachment index.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Doc => "DOC",
            Self::Pdf => "PDF",
            Self::Image => "IMAGE",
            Self::Excel => "EXCEL",
            Self::Json => "JSON",
            Self::Text => "TEXT",
            Self::Other => "OTHER",
        }
    }

    /// Whether files of this category are already readable text.
    pub fn is_text_like(&self) -> bool {
        matches!(self, Self::Text | Self::Json)
    }
}

impl std::fmt::Display for FileCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FileCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown file category '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Fingerprints & state
// ---------------------------------------------------------------------------

/// Content fingerprint of a single file.
///
/// Only `hash` and `size` take part in change detection; `modified` is informational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fingerprint {
    /// BLAKE3 hex digest of the file bytes.
    pub hash: String,
    /// File size in bytes.
    pub size: u64,
    /// Last modification time reported by the filesystem.
    pub modified: DateTime<Utc>,
}

impl Fingerprint {
    /// Content equality (hash + size).
    pub fn same_content(&self, other: &Fingerprint) -> bool {
        self.hash == other.hash && self.size == other.size
    }
}

/// Version vector over every behavior-affecting processing component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessingFingerprint(pub BTreeMap<String, String>);

impl ProcessingFingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, component: impl Into<String>, version: impl Into<String>) -> Self {
        self.0.insert(component.into(), version.into());
        self
    }

    pub fn insert(&mut self, component: impl Into<String>, version: impl Into<String>) {
        self.0.insert(component.into(), version.into());
    }

    pub fn get(&self, component: &str) -> Option<&str> {
        self.0.get(component).map(String::as_str)
    }
}

/// Persisted per-document processing record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingState {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    /// The document this record belongs to.
    pub document: DocumentId,
    /// Fingerprint of the main file.
    pub file: Fingerprint,
    /// Attachment name (relative to the attachment directory) → fingerprint.
    #[serde(default)]
    pub attachments: BTreeMap<String, Fingerprint>,
    /// Processing fingerprint in force when the record was written.
    pub processing: ProcessingFingerprint,
    /// When the document last completed every phase.
    pub processed_at: DateTime<Utc>,
}

/// A document found by the directory scan.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub id: DocumentId,
    /// Absolute path to the main file.
    pub path: PathBuf,
    /// Fingerprint computed at scan time.
    pub fingerprint: Fingerprint,
    /// Category used to select a converter.
    pub category: FileCategory,
    /// Timestamp of the last successful run for this document, if any.
    pub last_processed: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// The ordered pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    Parse,
    Split,
    Consolidate,
    Render,
}

impl PhaseKind {
    pub const ALL: [PhaseKind; 4] = [Self::Parse, Self::Split, Self::Consolidate, Self::Render];

    /// Directory name under `<processing-root>/phases/`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Split => "split",
            Self::Consolidate => "consolidate",
            Self::Render => "render",
        }
    }

    /// The phase whose output tree this phase reads, if any.
    pub fn previous(&self) -> Option<PhaseKind> {
        match self {
            Self::Parse => None,
            Self::Split => Some(Self::Parse),
            Self::Consolidate => Some(Self::Split),
            Self::Render => Some(Self::Consolidate),
        }
    }
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PhaseKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown phase '{s}' (expected parse, split, consolidate or render)"))
    }
}

/// Outcome of one phase for one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseResult {
    /// `true` when the phase recomputed output, `false` when cached output was reused.
    pub processed: bool,
    /// Output files written (or reused) by the phase, absolute paths.
    pub outputs: Vec<PathBuf>,
    /// Error kind → message. Non-empty means the document failed the phase.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
    /// Non-fatal issues encountered while processing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl PhaseResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

/// A file discovered in a document's attachment directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Path relative to the phase tree root (e.g. `b/report.pdf.md`).
    pub source_path: String,
    /// Path the author would link to, with conversion markers removed (e.g. `b/report.pdf`).
    pub original_path: String,
    /// Classified type.
    pub kind: FileCategory,
    /// Base name used in the reference id.
    pub base_name: String,
    /// Canonical reference id, assigned once per run (e.g. `[ATTACH:IMAGE:img]`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reference_id: String,
    /// Short text preview or a fixed placeholder.
    pub preview: String,
    /// Attachment directory that owns this file, relative to the tree root.
    pub owner_dir: String,
}

impl Attachment {
    /// File name of the attachment as the author saw it.
    pub fn display_name(&self) -> &str {
        self.original_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.original_path)
    }
}

// ---------------------------------------------------------------------------
// Table of contents & artifact
// ---------------------------------------------------------------------------

/// A single entry in the consolidated table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    /// Display title.
    pub title: String,
    /// Anchor slug within the consolidated artifact.
    pub anchor: String,
    /// Nested entries (one per attachment).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TocEntry>,
}

/// Root structure for the table of contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toc {
    pub entries: Vec<TocEntry>,
}

/// Generation metadata written at the top of the consolidated artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub generated_at: DateTime<Utc>,
    pub duration_ms: u128,
    /// Source document ids in final order.
    pub sources: Vec<DocumentId>,
    pub attachment_count: usize,
}
