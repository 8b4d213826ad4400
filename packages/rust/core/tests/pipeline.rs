//! End-to-end runs over temporary input trees.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docweave_converters::{Converter, ConverterRegistry, Renderer};
use docweave_core::{Pipeline, RunSummary, SilentProgress};
use docweave_shared::{AppConfig, DocweaveError, FileCategory, PhaseKind, Result, RunConfig};
use docweave_state::ChangeReason;

struct Fixture {
    root: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let root = std::env::temp_dir().join(format!("docweave-e2e-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(root.join("input")).unwrap();
        Self { root }
    }

    fn input(&self) -> PathBuf {
        self.root.join("input")
    }

    fn processing_root(&self) -> PathBuf {
        self.root.join("proc")
    }

    fn write(&self, rel: &str, content: &[u8]) {
        let path = self.input().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn config(&self) -> RunConfig {
        let mut config = RunConfig::from(&AppConfig::default());
        config.input_dir = self.input();
        config.processing_root = self.processing_root();
        config.concurrency = 2;
        config
    }

    fn pipeline(&self, config: RunConfig, registry: ConverterRegistry) -> Pipeline {
        Pipeline::new(config, registry, None, &BTreeMap::new(), Arc::new(SilentProgress)).unwrap()
    }

    fn default_pipeline(&self) -> Pipeline {
        self.pipeline(self.config(), builtins())
    }

    fn artifact(&self) -> String {
        std::fs::read_to_string(self.processing_root().join("phases/consolidate/consolidated.md"))
            .unwrap()
    }

    fn state_files(&self) -> Vec<(String, Vec<u8>)> {
        let mut files: Vec<(String, Vec<u8>)> = std::fs::read_dir(self.processing_root().join("state"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .map(|p| {
                let name = p.file_name().unwrap().to_string_lossy().into_owned();
                (name, std::fs::read(&p).unwrap())
            })
            .collect();
        files.sort();
        files
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

fn builtins() -> ConverterRegistry {
    ConverterRegistry::with_builtins(Duration::from_secs(5))
}

/// Artifact text without the fields that change on every run.
fn stable(artifact: &str) -> String {
    artifact
        .lines()
        .filter(|l| !l.starts_with("generated_at:") && !l.starts_with("duration_ms:"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn needing(pipeline: &Pipeline) -> Vec<String> {
    pipeline
        .plan()
        .unwrap()
        .needing_processing()
        .map(|d| d.source.id.as_str().to_string())
        .collect()
}

struct FailingPdf;

#[async_trait]
impl Converter for FailingPdf {
    fn name(&self) -> &str {
        "failing-pdf"
    }

    fn version(&self) -> &str {
        "0"
    }

    async fn convert(&self, _source: &Path, _output_dir: &Path) -> Result<String> {
        Err(DocweaveError::conversion("corrupt xref table"))
    }
}

struct CopyRenderer;

#[async_trait]
impl Renderer for CopyRenderer {
    fn name(&self) -> &str {
        "copy"
    }

    fn version(&self) -> &str {
        "1"
    }

    fn output_name(&self) -> &str {
        "final.md"
    }

    async fn render(&self, input: &Path, output: &Path) -> Result<()> {
        std::fs::copy(input, output).map_err(|e| DocweaveError::io(output, e))?;
        Ok(())
    }
}

fn scenario(fx: &Fixture) {
    fx.write("a.md", b"# A\n\nAlpha links to [B](b.md#usage).\n");
    fx.write("b.md", b"# B\n\nSee ![diagram](b/img.png).\n\n## Usage\n\nText.\n");
    fx.write("b/img.png", b"\x89PNG old");
}

#[tokio::test]
async fn scenario_reprocesses_only_what_changed() {
    let fx = Fixture::new();
    scenario(&fx);

    let pipeline = fx.default_pipeline();
    assert_eq!(needing(&pipeline), vec!["a.md", "b.md"]);
    let summary = pipeline.run_all().await.unwrap();
    assert_eq!(summary.saved_states, 2);
    assert!(!summary.has_failures());

    let pipeline = fx.default_pipeline();
    assert!(needing(&pipeline).is_empty());

    fx.write("b/img.png", b"\x89PNG new bytes");
    let plan = fx.default_pipeline().plan().unwrap();
    let changed: Vec<_> = plan.needing_processing().collect();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].source.id.as_str(), "b.md");
    assert_eq!(
        changed[0].assessment.reason,
        ChangeReason::AttachmentChanged("img.png".into())
    );
}

#[tokio::test]
async fn second_run_is_idempotent() {
    let fx = Fixture::new();
    scenario(&fx);

    fx.default_pipeline().run_all().await.unwrap();
    let first_artifact = fx.artifact();
    let first_state = fx.state_files();
    let first_index =
        std::fs::read_to_string(fx.processing_root().join("index/attachments.json")).unwrap();

    let summary = fx.default_pipeline().run_all().await.unwrap();
    assert_eq!(summary.saved_states, 0);
    for report in &summary.reports {
        assert_eq!(report.skipped(), 2, "{} should reuse cached output", report.kind);
    }

    assert_eq!(stable(&fx.artifact()), stable(&first_artifact));
    assert_eq!(fx.state_files(), first_state);
    assert_eq!(
        std::fs::read_to_string(fx.processing_root().join("index/attachments.json")).unwrap(),
        first_index
    );
}

#[tokio::test]
async fn artifact_has_sections_references_and_index() {
    let fx = Fixture::new();
    scenario(&fx);
    fx.default_pipeline().run_all().await.unwrap();

    let artifact = fx.artifact();
    assert!(artifact.starts_with("---\ngenerated_at: "));
    assert!(artifact.contains("documents: 2\nattachments: 1\nsources: a.md, b.md\n---\n"));
    assert!(artifact.contains("# Table of Contents\n\n- [A](#a)\n- [B](#b)\n  - [img.png](#imgpng)\n"));
    assert!(artifact.contains("![diagram](b/img.png) [ATTACH:IMAGE:img]"));
    assert!(artifact.contains("[B](b.md#usage)"));
    // Headings below the title are demoted one level.
    assert!(artifact.contains("\n### Usage\n"));
    assert!(artifact.contains("## Attachments\n\n### img.png\n"));
    assert!(artifact.trim_end().contains("# Attachment Index"));

    let index = std::fs::read_to_string(
        fx.processing_root().join("phases/consolidate/attachment_index.md"),
    )
    .unwrap();
    assert!(index.contains("`[ATTACH:IMAGE:img]` img.png (`b/img.png`)"));
    assert!(fx.processing_root().join("phases/consolidate/run_manifest.json").exists());
}

#[tokio::test]
async fn documents_are_consolidated_in_prefix_order() {
    let fx = Fixture::new();
    fx.write("no_prefix.md", b"# No Prefix\n");
    fx.write("02_b.md", b"# Second\n");
    fx.write("01_a.md", b"# First\n");

    let summary = fx.default_pipeline().run_all().await.unwrap();
    assert!(summary.artifact.is_some());

    let artifact = fx.artifact();
    assert!(artifact.contains("sources: 01_a.md, 02_b.md, no_prefix.md\n"));
    let first = artifact.find("\n# First\n").unwrap();
    let second = artifact.find("\n# Second\n").unwrap();
    let third = artifact.find("\n# No Prefix\n").unwrap();
    assert!(first < second && second < third);
}

#[tokio::test]
async fn links_are_rewritten_to_consolidated_paths() {
    let fx = Fixture::new();
    fx.write("a.md", b"# A\n");
    fx.write("data.json", br#"{"k": 1}"#);
    fx.write(
        "guide/intro.md",
        b"# Intro\n\n[home](../a.md#top) [data](/data.json) [web](https://example.com/a.md) [gone](missing.md)\n",
    );

    fx.default_pipeline().run_all().await.unwrap();
    let artifact = fx.artifact();

    assert!(artifact.contains("[home](a.md#top)"));
    assert!(artifact.contains("[data](data.md)"));
    assert!(artifact.contains("[web](https://example.com/a.md)"));
    assert!(artifact.contains("[gone](missing.md)"));
}

#[tokio::test]
async fn one_failing_document_does_not_stop_the_others() {
    let fx = Fixture::new();
    scenario(&fx);
    fx.write("c.pdf", b"%PDF-1.7 broken");

    let mut registry = builtins();
    registry.register(FileCategory::Pdf, Arc::new(FailingPdf));
    let summary: RunSummary = fx.pipeline(fx.config(), registry).run_all().await.unwrap();

    let failed = summary.failed_documents();
    assert_eq!(failed.len(), 1);
    let messages = &failed[&docweave_shared::DocumentId::from("c.pdf")];
    assert!(messages[0].starts_with("parse: "));
    assert!(messages[0].contains("corrupt xref table"));

    let artifact = fx.artifact();
    assert!(artifact.contains("sources: a.md, b.md\n"));
    assert_eq!(summary.saved_states, 2);

    // The failed document stays pending for the next run.
    let mut registry = builtins();
    registry.register(FileCategory::Pdf, Arc::new(FailingPdf));
    assert_eq!(needing(&fx.pipeline(fx.config(), registry)), vec!["c.pdf"]);
}

#[tokio::test]
async fn run_where_every_document_fails_still_reports_them() {
    let fx = Fixture::new();
    fx.write("c.pdf", b"%PDF-1.7 broken");

    let mut registry = builtins();
    registry.register(FileCategory::Pdf, Arc::new(FailingPdf));
    let summary = fx.pipeline(fx.config(), registry).run_all().await.unwrap();

    assert!(summary.has_failures());
    assert!(summary.artifact.is_none());
    assert_eq!(summary.saved_states, 0);

    let failed = summary.failed_documents();
    let messages = &failed[&docweave_shared::DocumentId::from("c.pdf")];
    assert!(messages[0].starts_with("parse: "));
    assert!(messages[0].contains("corrupt xref table"));

    // Parse ran; the run stopped at Split with nothing left to process.
    assert_eq!(summary.reports.len(), 2);
    assert_eq!(summary.reports[1].kind, PhaseKind::Split);
    assert!(
        summary.reports[1]
            .finish_error
            .as_deref()
            .is_some_and(|e| e.contains("no document reached"))
    );
}

#[tokio::test]
async fn strict_mode_turns_a_document_failure_fatal() {
    let fx = Fixture::new();
    scenario(&fx);
    fx.write("c.pdf", b"%PDF-1.7 broken");

    let mut registry = builtins();
    registry.register(FileCategory::Pdf, Arc::new(FailingPdf));
    let mut config = fx.config();
    config.strict = true;

    let err = fx.pipeline(config, registry).run_all().await.unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("c.pdf"));
    assert!(fx.state_files().is_empty());
}

#[tokio::test]
async fn single_phase_requires_predecessor_output() {
    let fx = Fixture::new();
    scenario(&fx);
    let pipeline = fx.default_pipeline();

    let summary = pipeline.run_phase(PhaseKind::Split).await.unwrap();
    let failed = summary.failed_documents();
    assert_eq!(failed.len(), 2);
    assert!(failed.values().all(|m| m[0].contains("run the parse phase first")));

    pipeline.run_phase(PhaseKind::Parse).await.unwrap();
    let summary = pipeline.run_phase(PhaseKind::Split).await.unwrap();
    assert!(!summary.has_failures());
    assert!(fx.state_files().is_empty());
}

#[tokio::test]
async fn renderer_receives_the_artifact() {
    let fx = Fixture::new();
    scenario(&fx);

    let pipeline = Pipeline::new(
        fx.config(),
        builtins(),
        Some(Arc::new(CopyRenderer)),
        &BTreeMap::new(),
        Arc::new(SilentProgress),
    )
    .unwrap();
    pipeline.run_all().await.unwrap();

    let rendered = fx.processing_root().join("phases/render/final.md");
    assert_eq!(std::fs::read_to_string(rendered).unwrap(), fx.artifact());
}

#[tokio::test]
async fn prune_removes_state_of_deleted_documents() {
    let fx = Fixture::new();
    scenario(&fx);
    fx.default_pipeline().run_all().await.unwrap();

    std::fs::remove_file(fx.input().join("a.md")).unwrap();
    let pruned = fx.default_pipeline().prune_state().unwrap();
    assert_eq!(pruned.len(), 1);
    assert_eq!(pruned[0].as_str(), "a.md");
    assert_eq!(fx.state_files().len(), 1);
}
