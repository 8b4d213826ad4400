//! Shared types, error model, and configuration for docweave.
//!
//! This crate is the foundation depended on by all other docweave crates.
//! It provides:
//! - [`DocweaveError`]: the unified error type
//! - Domain types ([`DocumentId`], [`Fingerprint`], [`ProcessingState`], [`PhaseResult`], [`Attachment`])
//! - Configuration ([`AppConfig`], [`RunConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, AttachmentsSection, CONFIG_FILE_NAME, CommandSpec, FingerprintSection,
    PipelineSection, RenderSection, RunConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, validate_converters,
};
pub use error::{DocweaveError, Result, Severity};
pub use types::{
    ArtifactMetadata, Attachment, CURRENT_SCHEMA_VERSION, DocumentId, FileCategory, Fingerprint,
    PhaseKind, PhaseResult, ProcessingFingerprint, ProcessingState, SourceDocument, Toc, TocEntry,
};
