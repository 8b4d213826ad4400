//! JSON-per-document persistence of [`ProcessingState`] records.
//!
//! Records live under `<processing-root>/state/`, one file per document, named
//! deterministically from the document's relative path. Every write goes to a
//! `.name.tmp` sibling first and is renamed into place, so a crash mid-write
//! leaves the previous record intact.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use docweave_shared::{CURRENT_SCHEMA_VERSION, DocumentId, DocweaveError, ProcessingState, Result};
use tracing::{debug, warn};

/// Directory name under the processing root.
pub const STATE_DIR_NAME: &str = "state";

/// Handle to the on-disk state directory.
///
/// Writes are serialized through a store-wide lock; reads are lock-free since
/// renames are atomic.
#[derive(Debug)]
pub struct StateStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl StateStore {
    /// Open (creating if needed) the state directory under `processing_root`.
    pub fn open(processing_root: &Path) -> Result<Self> {
        let dir = processing_root.join(STATE_DIR_NAME);
        std::fs::create_dir_all(&dir).map_err(|e| DocweaveError::io(&dir, e))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic record path for a document.
    pub fn record_path(&self, doc: &DocumentId) -> PathBuf {
        self.dir.join(record_file_name(doc))
    }

    /// Load the persisted record for `doc`.
    ///
    /// Any read or parse failure is logged and reported as "no prior state".
    pub fn load(&self, doc: &DocumentId) -> Option<ProcessingState> {
        let path = self.record_path(doc);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(doc = %doc, error = %e, "unreadable state record, treating as absent");
                return None;
            }
        };

        match serde_json::from_str::<ProcessingState>(&content) {
            Ok(state) if state.schema_version != CURRENT_SCHEMA_VERSION => {
                warn!(
                    doc = %doc,
                    found = state.schema_version,
                    expected = CURRENT_SCHEMA_VERSION,
                    "state record schema mismatch, treating as absent"
                );
                None
            }
            Ok(state) if state.document != *doc => {
                warn!(doc = %doc, recorded = %state.document, "state record belongs to another document");
                None
            }
            Ok(state) => Some(state),
            Err(e) => {
                warn!(doc = %doc, error = %e, "corrupt state record, treating as absent");
                None
            }
        }
    }

    /// Persist a record atomically (temp file + rename).
    pub fn save(&self, state: &ProcessingState) -> Result<()> {
        let target = self.record_path(&state.document);
        let temp = self.dir.join(format!(".{}.tmp", record_file_name(&state.document)));
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| DocweaveError::State(format!("serialize {}: {e}", state.document)))?;

        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        std::fs::write(&temp, json).map_err(|e| DocweaveError::io(&temp, e))?;
        std::fs::rename(&temp, &target).map_err(|e| DocweaveError::io(&target, e))?;

        debug!(doc = %state.document, path = %target.display(), "saved state record");
        Ok(())
    }

    /// Remove the record for one document. Returns whether a record existed.
    pub fn clear(&self, doc: &DocumentId) -> Result<bool> {
        let path = self.record_path(doc);
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DocweaveError::io(&path, e)),
        }
    }

    /// Remove every record. Returns the number removed.
    pub fn clear_all(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut removed = 0;
        for path in self.record_files()? {
            std::fs::remove_file(&path).map_err(|e| DocweaveError::io(&path, e))?;
            removed += 1;
        }
        Ok(removed)
    }

    /// All readable records, sorted by document id. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<ProcessingState>> {
        let mut states: Vec<ProcessingState> = self
            .record_files()?
            .into_iter()
            .filter_map(|path| {
                let content = std::fs::read_to_string(&path).ok()?;
                serde_json::from_str(&content).ok()
            })
            .collect();
        states.sort_by(|a, b| a.document.cmp(&b.document));
        Ok(states)
    }

    /// Delete records whose document is not in `live`. Returns the pruned ids.
    ///
    /// Only ever called on demand; a run never prunes.
    pub fn prune(&self, live: &BTreeSet<DocumentId>) -> Result<Vec<DocumentId>> {
        let stale: Vec<DocumentId> = self
            .list()?
            .into_iter()
            .map(|s| s.document)
            .filter(|doc| !live.contains(doc))
            .collect();
        for doc in &stale {
            self.clear(doc)?;
        }
        Ok(stale)
    }

    fn record_files(&self) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| DocweaveError::io(&self.dir, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DocweaveError::io(&self.dir, e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || !name.ends_with(".json") {
                continue;
            }
            files.push(entry.path());
        }
        files.sort();
        Ok(files)
    }
}

/// `notes/02 b.md` → `notes_02_b.md-<8 hex chars>.json`.
///
/// The hash suffix keeps ids that sanitize identically apart.
fn record_file_name(doc: &DocumentId) -> String {
    let sanitized: String = doc
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let hash = blake3::hash(doc.as_str().as_bytes()).to_hex();
    format!("{sanitized}-{}.json", &hash.as_str()[..8])
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use docweave_shared::{Fingerprint, ProcessingFingerprint};

    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("docweave-state-{}", uuid::Uuid::now_v7()))
    }

    fn make_state(doc: &str) -> ProcessingState {
        ProcessingState {
            schema_version: CURRENT_SCHEMA_VERSION,
            document: DocumentId::from(doc),
            file: Fingerprint {
                hash: "h".into(),
                size: 1,
                modified: Utc::now(),
            },
            attachments: BTreeMap::new(),
            processing: ProcessingFingerprint::new().with("docweave", "0.1.0"),
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn record_names_are_deterministic_and_distinct() {
        let a = record_file_name(&DocumentId::from("notes/a b.md"));
        let b = record_file_name(&DocumentId::from("notes/a_b.md"));
        assert_eq!(a, record_file_name(&DocumentId::from("notes/a b.md")));
        assert!(a.starts_with("notes_a_b.md-"));
        assert_ne!(a, b);
    }

    #[test]
    fn save_then_load() {
        let tmp = temp_dir();
        let store = StateStore::open(&tmp).unwrap();
        let state = make_state("b.md");

        store.save(&state).unwrap();
        let loaded = store.load(&state.document).expect("record exists");
        assert_eq!(loaded.file.hash, "h");
        assert_eq!(loaded.processing, state.processing);

        // No temp files left behind.
        let leftovers: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn corrupt_record_is_no_prior_state() {
        let tmp = temp_dir();
        let store = StateStore::open(&tmp).unwrap();
        let doc = DocumentId::from("a.md");
        std::fs::write(store.record_path(&doc), "{ not json").unwrap();

        assert!(store.load(&doc).is_none());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn clear_and_clear_all() {
        let tmp = temp_dir();
        let store = StateStore::open(&tmp).unwrap();
        store.save(&make_state("a.md")).unwrap();
        store.save(&make_state("b.md")).unwrap();

        assert!(store.clear(&DocumentId::from("a.md")).unwrap());
        assert!(!store.clear(&DocumentId::from("a.md")).unwrap());
        assert_eq!(store.list().unwrap().len(), 1);

        assert_eq!(store.clear_all().unwrap(), 1);
        assert!(store.list().unwrap().is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn prune_removes_only_stale_records() {
        let tmp = temp_dir();
        let store = StateStore::open(&tmp).unwrap();
        store.save(&make_state("a.md")).unwrap();
        store.save(&make_state("gone.md")).unwrap();

        let live = BTreeSet::from([DocumentId::from("a.md")]);
        let pruned = store.prune(&live).unwrap();
        assert_eq!(pruned, vec![DocumentId::from("gone.md")]);
        assert!(store.load(&DocumentId::from("a.md")).is_some());
        assert!(store.load(&DocumentId::from("gone.md")).is_none());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
