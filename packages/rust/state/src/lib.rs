//! Incremental change detection for docweave.
//!
//! - [`fingerprint`] / [`fingerprint_dir`]: BLAKE3 content fingerprints
//! - [`StateStore`]: one JSON record per document, written atomically
//! - [`ChangeDetector`]: decides whether a document re-enters the pipeline

mod detector;
mod fingerprint;
mod store;

pub use detector::{Assessment, ChangeDetector, ChangeReason};
pub use fingerprint::{fingerprint, fingerprint_dir};
pub use store::{STATE_DIR_NAME, StateStore};
