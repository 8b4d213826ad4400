//! Pipeline orchestration and domain logic for docweave.
//!
//! This crate scans the input tree into a change plan, drives the four
//! phases (Parse, Split, Consolidate, Render) through [`PhaseRunner`], and
//! assembles the consolidated artifact.

pub mod assembler;
mod fs;
pub mod ordering;
pub mod phases;
pub mod pipeline;
pub mod plan;
pub mod toc;

pub use assembler::{AssembleResult, RunManifest, Section};
pub use ordering::{compare_paths, sort_documents};
pub use phases::{Phase, PhaseContext};
pub use pipeline::{
    PhaseReport, PhaseRunner, Pipeline, ProgressReporter, RunSummary, SilentProgress,
};
pub use plan::{ChangePlan, PlannedDocument, ScannedFile};
