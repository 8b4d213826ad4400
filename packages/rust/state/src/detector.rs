//! Skip-versus-reprocess decisions.
//!
//! A document needs processing iff there is no prior record, its main file
//! changed, its attachment name-set changed, any attachment changed, or the
//! processing fingerprint moved.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use docweave_shared::{
    CURRENT_SCHEMA_VERSION, DocumentId, ProcessingFingerprint, ProcessingState, Result,
};

use crate::fingerprint::{fingerprint, fingerprint_dir};
use crate::store::StateStore;

/// Why a document does (or does not) need processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeReason {
    NoPriorState,
    FingerprintChanged,
    FileChanged,
    AttachmentsAdded(Vec<String>),
    AttachmentsRemoved(Vec<String>),
    AttachmentChanged(String),
    Unchanged,
}

impl std::fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoPriorState => f.write_str("no prior state"),
            Self::FingerprintChanged => f.write_str("processing fingerprint changed"),
            Self::FileChanged => f.write_str("file changed"),
            Self::AttachmentsAdded(names) => write!(f, "attachments added: {}", names.join(", ")),
            Self::AttachmentsRemoved(names) => {
                write!(f, "attachments removed: {}", names.join(", "))
            }
            Self::AttachmentChanged(name) => write!(f, "attachment changed: {name}"),
            Self::Unchanged => f.write_str("unchanged"),
        }
    }
}

/// Result of assessing one document.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub reason: ChangeReason,
    /// The record that would be persisted if this run succeeds.
    pub current: ProcessingState,
    /// The persisted record, if one was readable.
    pub previous: Option<ProcessingState>,
}

impl Assessment {
    pub fn needs_processing(&self) -> bool {
        self.reason != ChangeReason::Unchanged
    }
}

/// Compares live fingerprints against persisted [`ProcessingState`].
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    store: Arc<StateStore>,
    processing: ProcessingFingerprint,
}

impl ChangeDetector {
    pub fn new(store: Arc<StateStore>, processing: ProcessingFingerprint) -> Self {
        Self { store, processing }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Fingerprint `main_file` and every file under `attachment_dir`, then
    /// compare with the stored record for `doc`.
    pub fn assess(
        &self,
        doc: &DocumentId,
        main_file: &Path,
        attachment_dir: &Path,
    ) -> Result<Assessment> {
        let current = ProcessingState {
            schema_version: CURRENT_SCHEMA_VERSION,
            document: doc.clone(),
            file: fingerprint(main_file)?,
            attachments: fingerprint_dir(attachment_dir)?,
            processing: self.processing.clone(),
            processed_at: Utc::now(),
        };
        let previous = self.store.load(doc);
        let reason = compare(previous.as_ref(), &current);

        tracing::debug!(doc = %doc, reason = %reason, "assessed document");
        Ok(Assessment {
            reason,
            current,
            previous,
        })
    }

    /// Boolean view of [`assess`](Self::assess).
    pub fn needs_processing(
        &self,
        doc: &DocumentId,
        main_file: &Path,
        attachment_dir: &Path,
    ) -> Result<bool> {
        Ok(self.assess(doc, main_file, attachment_dir)?.needs_processing())
    }
}

fn compare(previous: Option<&ProcessingState>, current: &ProcessingState) -> ChangeReason {
    let Some(previous) = previous else {
        return ChangeReason::NoPriorState;
    };
    if previous.processing != current.processing {
        return ChangeReason::FingerprintChanged;
    }
    if !previous.file.same_content(&current.file) {
        return ChangeReason::FileChanged;
    }

    let added: Vec<String> = current
        .attachments
        .keys()
        .filter(|name| !previous.attachments.contains_key(*name))
        .cloned()
        .collect();
    if !added.is_empty() {
        return ChangeReason::AttachmentsAdded(added);
    }
    let removed: Vec<String> = previous
        .attachments
        .keys()
        .filter(|name| !current.attachments.contains_key(*name))
        .cloned()
        .collect();
    if !removed.is_empty() {
        return ChangeReason::AttachmentsRemoved(removed);
    }

    let changed = current.attachments.iter().find(|(name, fp)| {
        previous
            .attachments
            .get(*name)
            .is_some_and(|old| !old.same_content(fp))
    });
    if let Some((name, _)) = changed {
        return ChangeReason::AttachmentChanged(name.clone());
    }

    ChangeReason::Unchanged
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    struct Fixture {
        root: PathBuf,
        input: PathBuf,
        detector: ChangeDetector,
    }

    impl Fixture {
        fn new(processing: ProcessingFingerprint) -> Self {
            let root = std::env::temp_dir().join(format!("docweave-detect-{}", uuid::Uuid::now_v7()));
            let input = root.join("input");
            std::fs::create_dir_all(input.join("b")).unwrap();
            std::fs::write(input.join("a.md"), "# A\n").unwrap();
            std::fs::write(input.join("b.md"), "# B\n").unwrap();
            std::fs::write(input.join("b/img.png"), [1u8, 2, 3]).unwrap();
            let store = Arc::new(StateStore::open(&root.join("processing")).unwrap());
            Self {
                root,
                input,
                detector: ChangeDetector::new(store, processing),
            }
        }

        fn assess(&self, name: &str) -> Assessment {
            let doc = DocumentId::from(name);
            let main = self.input.join(doc.relative_path());
            let dir = self.input.join(doc.attachment_dir());
            self.detector.assess(&doc, &main, &dir).unwrap()
        }

        fn commit(&self, name: &str) {
            let assessment = self.assess(name);
            self.detector.store().save(&assessment.current).unwrap();
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }

    fn base_fingerprint() -> ProcessingFingerprint {
        ProcessingFingerprint::new().with("docweave", "0.1.0")
    }

    #[test]
    fn first_run_needs_processing_then_unchanged() {
        let fx = Fixture::new(base_fingerprint());
        assert_eq!(fx.assess("a.md").reason, ChangeReason::NoPriorState);
        assert_eq!(fx.assess("b.md").reason, ChangeReason::NoPriorState);

        fx.commit("a.md");
        fx.commit("b.md");

        assert!(!fx.assess("a.md").needs_processing());
        assert!(!fx.assess("b.md").needs_processing());
    }

    #[test]
    fn attachment_bytes_change_only_affects_owner() {
        let fx = Fixture::new(base_fingerprint());
        fx.commit("a.md");
        fx.commit("b.md");

        std::fs::write(fx.input.join("b/img.png"), [9u8, 9, 9]).unwrap();

        assert!(!fx.assess("a.md").needs_processing());
        assert_eq!(
            fx.assess("b.md").reason,
            ChangeReason::AttachmentChanged("img.png".into())
        );
    }

    #[test]
    fn attachment_set_changes_are_detected() {
        let fx = Fixture::new(base_fingerprint());
        fx.commit("b.md");

        std::fs::write(fx.input.join("b/notes.txt"), "hi").unwrap();
        assert_eq!(
            fx.assess("b.md").reason,
            ChangeReason::AttachmentsAdded(vec!["notes.txt".into()])
        );
        fx.commit("b.md");

        std::fs::remove_file(fx.input.join("b/img.png")).unwrap();
        assert_eq!(
            fx.assess("b.md").reason,
            ChangeReason::AttachmentsRemoved(vec!["img.png".into()])
        );
    }

    #[test]
    fn main_file_change_is_detected() {
        let fx = Fixture::new(base_fingerprint());
        fx.commit("a.md");
        std::fs::write(fx.input.join("a.md"), "# A, revised\n").unwrap();
        assert_eq!(fx.assess("a.md").reason, ChangeReason::FileChanged);
    }

    #[test]
    fn processing_fingerprint_bump_forces_reprocessing() {
        let fx = Fixture::new(base_fingerprint());
        fx.commit("a.md");

        let bumped = ChangeDetector::new(
            fx.detector.store().clone(),
            base_fingerprint().with("converter:PDF", "2"),
        );
        let doc = DocumentId::from("a.md");
        let needs = bumped
            .needs_processing(&doc, &fx.input.join("a.md"), &fx.input.join("a"))
            .unwrap();
        assert!(needs);
    }

    #[test]
    fn touching_without_content_change_is_unchanged() {
        let fx = Fixture::new(base_fingerprint());
        fx.commit("a.md");
        std::fs::write(fx.input.join("a.md"), "# A\n").unwrap();
        assert_eq!(fx.assess("a.md").reason, ChangeReason::Unchanged);
    }
}
