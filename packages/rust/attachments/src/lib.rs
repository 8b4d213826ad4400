//! Attachment discovery, classification and reference ids.
//!
//! Each document may own a sibling directory named after its base name
//! (`b.md` → `b/`). Everything under it, apart from the media subtree and
//! hidden files, is an attachment:
//!
//! 1. [`discover`] enumerates and classifies one document's attachments
//! 2. [`AttachmentIndex::build`] merges every document's list and assigns
//!    stable `[ATTACH:<TYPE>:<label>]` ids
//! 3. [`AttachmentIndex::to_markdown`] renders the deterministic index

mod classify;
mod discover;
mod index;
mod reference;

pub use classify::{PROCESSING_SUFFIXES, base_name, classify, converted_original};
pub use discover::{BINARY_PLACEHOLDER, DiscoverOptions, discover, preview};
pub use index::AttachmentIndex;
pub use reference::{assign_reference_ids, reference_id};
