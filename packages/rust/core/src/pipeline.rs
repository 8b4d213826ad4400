//! Phase runner and end-to-end pipeline.
//!
//! [`PhaseRunner`] drives one phase over a document set with a bounded worker
//! pool, isolating per-document failures. [`Pipeline`] builds the change plan,
//! chains the four phases (only successes move on) and persists state for the
//! documents that made it through.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use docweave_converters::{ConverterRegistry, Renderer};
use docweave_shared::{
    DocumentId, DocweaveError, PhaseKind, PhaseResult, Result, RunConfig, Severity, SourceDocument,
};
use docweave_state::{ChangeDetector, StateStore};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::fs::{remove_file_if_exists, write_atomic};
use crate::phases::{ARTIFACT_NAME, Phase, PhaseContext, all_phases, phase_for};
use crate::plan::{ChangePlan, build_plan, processing_fingerprint, scan};

/// Per-phase file holding the corpus key of the last completed run.
pub const CORPUS_KEY_FILE: &str = ".corpus_key";

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a phase starts with the number of documents it will see.
    fn phase_started(&self, kind: PhaseKind, documents: usize);
    /// Called once per document, in completion order.
    fn document_done(&self, kind: PhaseKind, doc: &DocumentId, result: &PhaseResult);
    /// Called after the phase barrier and `finish`.
    fn phase_finished(&self, report: &PhaseReport);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase_started(&self, _kind: PhaseKind, _documents: usize) {}
    fn document_done(&self, _kind: PhaseKind, _doc: &DocumentId, _result: &PhaseResult) {}
    fn phase_finished(&self, _report: &PhaseReport) {}
    fn done(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of one phase.
#[derive(Debug, Clone)]
pub struct PhaseReport {
    pub kind: PhaseKind,
    pub results: BTreeMap<DocumentId, PhaseResult>,
    pub finish_outputs: Vec<PathBuf>,
    pub finish_warnings: Vec<String>,
    /// Non-fatal failure of the phase's `finish` step.
    pub finish_error: Option<String>,
    pub elapsed: Duration,
}

impl PhaseReport {
    fn new(kind: PhaseKind) -> Self {
        Self {
            kind,
            results: BTreeMap::new(),
            finish_outputs: Vec::new(),
            finish_warnings: Vec::new(),
            finish_error: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.is_success()).count()
    }

    /// Successful documents whose cached output was reused.
    pub fn skipped(&self) -> usize {
        self.results
            .values()
            .filter(|r| r.is_success() && !r.processed)
            .count()
    }

    pub fn failed(&self) -> Vec<&DocumentId> {
        self.results
            .iter()
            .filter(|(_, r)| !r.is_success())
            .map(|(id, _)| id)
            .collect()
    }
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub reports: Vec<PhaseReport>,
    /// The consolidated artifact, when one was written.
    pub artifact: Option<PathBuf>,
    /// Number of state records written.
    pub saved_states: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Every failing document with `phase: message` lines.
    pub fn failed_documents(&self) -> BTreeMap<DocumentId, Vec<String>> {
        let mut failed: BTreeMap<DocumentId, Vec<String>> = BTreeMap::new();
        for report in &self.reports {
            for (id, result) in &report.results {
                for message in result.errors.values() {
                    failed
                        .entry(id.clone())
                        .or_default()
                        .push(format!("{}: {message}", report.kind));
                }
            }
        }
        failed
    }

    pub fn has_failures(&self) -> bool {
        self.reports
            .iter()
            .any(|r| !r.failed().is_empty() || r.finish_error.is_some())
    }
}

fn failed_result(kind: &str, message: impl Into<String>) -> PhaseResult {
    PhaseResult {
        processed: false,
        outputs: Vec::new(),
        errors: BTreeMap::from([(kind.to_string(), message.into())]),
        warnings: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Phase runner
// ---------------------------------------------------------------------------

/// Runs a single phase over a document set.
pub struct PhaseRunner {
    ctx: Arc<PhaseContext>,
    progress: Arc<dyn ProgressReporter>,
}

impl PhaseRunner {
    pub fn new(ctx: Arc<PhaseContext>, progress: Arc<dyn ProgressReporter>) -> Self {
        Self { ctx, progress }
    }

    /// Run `phase` over `docs`.
    ///
    /// Documents in `unchanged` reuse their cached outputs when all exist and
    /// the phase's corpus key matches the previous run. Returns the report and
    /// the documents that succeeded, in input order. A fatal error (or any
    /// document error in strict mode) cancels in-flight work and is returned.
    #[instrument(skip_all, fields(phase = %phase.kind(), documents = docs.len()))]
    pub async fn run(
        &self,
        phase: Arc<dyn Phase>,
        docs: Vec<SourceDocument>,
        unchanged: &BTreeSet<DocumentId>,
    ) -> Result<(PhaseReport, Vec<SourceDocument>)> {
        let kind = phase.kind();
        let started = Instant::now();
        let mut report = PhaseReport::new(kind);

        let dir = self.ctx.phase_dir(kind);
        std::fs::create_dir_all(&dir).map_err(|e| {
            DocweaveError::processing(
                Severity::Fatal,
                format!("cannot create phase directory {}: {e}", dir.display()),
            )
        })?;

        self.progress.phase_started(kind, docs.len());
        phase.prepare(&self.ctx, &docs).await.map_err(|e| {
            if e.is_fatal() {
                e
            } else {
                DocweaveError::processing(Severity::Fatal, format!("{kind} setup failed: {e}"))
            }
        })?;

        let key_path = dir.join(CORPUS_KEY_FILE);
        let key = phase.corpus_key(&self.ctx, &docs);
        let previous_key = std::fs::read_to_string(&key_path).ok();
        let key_unchanged = previous_key.as_deref().map(str::trim) == key.as_deref();

        let semaphore = Arc::new(Semaphore::new(self.ctx.config.concurrency));
        let mut tasks = JoinSet::new();

        for doc in &docs {
            let outputs = phase.expected_outputs(&self.ctx, doc);
            if unchanged.contains(&doc.id) && key_unchanged && outputs.iter().all(|p| p.exists()) {
                debug!(doc = %doc.id, "unchanged, reusing cached output");
                let result = PhaseResult {
                    processed: false,
                    outputs,
                    ..PhaseResult::default()
                };
                self.progress.document_done(kind, &doc.id, &result);
                report.results.insert(doc.id.clone(), result);
                continue;
            }

            let phase = Arc::clone(&phase);
            let ctx = Arc::clone(&self.ctx);
            let sem = Arc::clone(&semaphore);
            let doc = doc.clone();
            tasks.spawn(async move {
                let _permit = match sem.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let e = DocweaveError::processing(Severity::Fatal, "worker pool closed");
                        return (doc.id, Err(e));
                    }
                };
                let outcome = phase.process_document(&ctx, &doc).await;
                (doc.id, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (id, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tasks.abort_all();
                    return Err(DocweaveError::processing(
                        Severity::Fatal,
                        format!("{kind} worker crashed: {e}"),
                    ));
                }
            };

            let result = match outcome {
                Ok(output) => PhaseResult {
                    processed: true,
                    outputs: output.outputs,
                    errors: BTreeMap::new(),
                    warnings: output.warnings,
                },
                Err(e) if e.is_fatal() => {
                    tasks.abort_all();
                    error!(doc = %id, error = %e, "fatal error, cancelling phase");
                    return Err(e);
                }
                Err(e) if self.ctx.config.strict => {
                    tasks.abort_all();
                    return Err(e.escalate(id.as_str()));
                }
                Err(e) => {
                    warn!(doc = %id, error = %e, "document failed");
                    PhaseResult {
                        processed: true,
                        ..failed_result(e.kind(), e.to_string())
                    }
                }
            };
            self.progress.document_done(kind, &id, &result);
            report.results.insert(id, result);
        }

        let succeeded: Vec<SourceDocument> = docs
            .into_iter()
            .filter(|d| report.results.get(&d.id).is_some_and(PhaseResult::is_success))
            .collect();

        match phase.finish(&self.ctx, &succeeded).await {
            Ok(out) => {
                report.finish_outputs = out.outputs;
                report.finish_warnings = out.warnings;
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) if self.ctx.config.strict => {
                return Err(DocweaveError::processing(
                    Severity::Fatal,
                    format!("strict mode: {kind} phase failed: {e}"),
                ));
            }
            Err(e) => {
                warn!(error = %e, "phase finish failed");
                report.finish_error = Some(e.to_string());
            }
        }

        match key {
            Some(key) => {
                write_atomic(&key_path, key.as_bytes())?;
            }
            None => remove_file_if_exists(&key_path)?,
        }

        report.elapsed = started.elapsed();
        info!(
            succeeded = report.succeeded(),
            skipped = report.skipped(),
            failed = report.failed().len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "phase complete"
        );
        self.progress.phase_finished(&report);
        Ok((report, succeeded))
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The incremental pipeline over one input tree.
pub struct Pipeline {
    ctx: Arc<PhaseContext>,
    store: Arc<StateStore>,
    detector: ChangeDetector,
    progress: Arc<dyn ProgressReporter>,
}

impl Pipeline {
    /// Validate `config` and open the state store.
    ///
    /// `extra` adds components to the processing fingerprint.
    pub fn new(
        config: RunConfig,
        registry: ConverterRegistry,
        renderer: Option<Arc<dyn Renderer>>,
        extra: &BTreeMap<String, String>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<Self> {
        config.validate()?;
        let store = StateStore::open(&config.processing_root).map_err(|e| {
            DocweaveError::processing(Severity::Fatal, format!("cannot open state store: {e}"))
        })?;
        let store = Arc::new(store);

        let fingerprint = processing_fingerprint(&config, &registry, renderer.as_deref(), extra);
        let detector = ChangeDetector::new(Arc::clone(&store), fingerprint);
        let ctx = Arc::new(PhaseContext::new(config, Arc::new(registry), renderer));

        Ok(Self {
            ctx,
            store,
            detector,
            progress,
        })
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Scan the input tree and assess every document.
    pub fn plan(&self) -> Result<ChangePlan> {
        let config = &self.ctx.config;
        let exclude = nested_processing_root(config);
        let scanned = scan(&config.input_dir, &self.ctx.registry, exclude.as_deref())?;
        Ok(build_plan(&config.input_dir, scanned, &self.detector))
    }

    /// Run Parse → Split → Consolidate → Render and save state for every
    /// changed document that succeeded in all of them.
    #[instrument(skip_all, fields(input = %self.ctx.config.input_dir.display()))]
    pub async fn run_all(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let plan = self.plan()?;
        let mut summary = RunSummary::default();

        if plan.is_empty() {
            warn!("no documents found");
            summary.elapsed = started.elapsed();
            self.progress.done(&summary);
            return Ok(summary);
        }
        self.reject_unreadable_if_strict(&plan)?;

        let runner = PhaseRunner::new(Arc::clone(&self.ctx), Arc::clone(&self.progress));
        let unchanged = plan.unchanged();
        let mut docs = plan.sources();

        for phase in all_phases() {
            let kind = phase.kind();
            // Every document already failed: stop here and keep the reports.
            let stopped = docs.is_empty();
            let mut report = if stopped {
                warn!(phase = %kind, "no document reached this phase, stopping the run");
                let mut report = PhaseReport::new(kind);
                report.finish_error = Some(format!("no document reached the {kind} phase"));
                report
            } else {
                let (report, succeeded) =
                    runner.run(phase, std::mem::take(&mut docs), &unchanged).await?;
                docs = succeeded;
                report
            };
            if kind == PhaseKind::Parse {
                for (id, reason) in &plan.unreadable {
                    report.results.insert(id.clone(), failed_result("io", reason.clone()));
                }
            }
            if stopped {
                self.progress.phase_finished(&report);
            }
            summary.reports.push(report);
            if stopped {
                break;
            }
        }

        let survivors: BTreeSet<&DocumentId> = docs.iter().map(|d| &d.id).collect();
        for planned in plan.needing_processing() {
            if !survivors.contains(&planned.source.id) {
                continue;
            }
            match self.store.save(&planned.assessment.current) {
                Ok(()) => summary.saved_states += 1,
                Err(e) => warn!(doc = %planned.source.id, error = %e, "could not save state"),
            }
        }

        let artifact = self.ctx.phase_dir(PhaseKind::Consolidate).join(ARTIFACT_NAME);
        summary.artifact = artifact.is_file().then_some(artifact);
        summary.elapsed = started.elapsed();

        info!(
            documents = plan.documents.len(),
            saved = summary.saved_states,
            failed = summary.failed_documents().len(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "run complete"
        );
        self.progress.done(&summary);
        Ok(summary)
    }

    /// Run a single phase over the documents whose predecessor output exists.
    /// State is never saved.
    #[instrument(skip_all, fields(phase = %kind))]
    pub async fn run_phase(&self, kind: PhaseKind) -> Result<RunSummary> {
        let started = Instant::now();
        let plan = self.plan()?;
        self.reject_unreadable_if_strict(&plan)?;

        let previous = kind.previous().map(|p| (p, phase_for(p)));
        let mut ready = Vec::new();
        let mut missing = BTreeMap::new();
        for doc in plan.sources() {
            let has_input = previous.as_ref().is_none_or(|(_, phase)| {
                phase
                    .expected_outputs(&self.ctx, &doc)
                    .iter()
                    .all(|p| p.exists())
            });
            if has_input {
                ready.push(doc);
            } else if let Some((prev, _)) = &previous {
                missing.insert(doc.id, format!("no {prev} output; run the {prev} phase first"));
            }
        }

        if self.ctx.config.strict {
            if let Some((id, reason)) = missing.iter().next() {
                return Err(DocweaveError::validation(reason.clone()).escalate(id.as_str()));
            }
        }

        let runner = PhaseRunner::new(Arc::clone(&self.ctx), Arc::clone(&self.progress));
        let (mut report, _) = runner.run(phase_for(kind), ready, &plan.unchanged()).await?;
        for (id, reason) in missing {
            report.results.insert(id, failed_result("validation", reason));
        }
        if kind == PhaseKind::Parse {
            for (id, reason) in &plan.unreadable {
                report.results.insert(id.clone(), failed_result("io", reason.clone()));
            }
        }

        let mut summary = RunSummary {
            reports: vec![report],
            ..RunSummary::default()
        };
        if kind == PhaseKind::Consolidate {
            let artifact = self.ctx.phase_dir(kind).join(ARTIFACT_NAME);
            summary.artifact = artifact.is_file().then_some(artifact);
        }
        summary.elapsed = started.elapsed();
        self.progress.done(&summary);
        Ok(summary)
    }

    /// Delete state for documents no longer in the input tree.
    pub fn prune_state(&self) -> Result<Vec<DocumentId>> {
        let live = self.plan()?.ids();
        self.store.prune(&live)
    }

    fn reject_unreadable_if_strict(&self, plan: &ChangePlan) -> Result<()> {
        if !self.ctx.config.strict {
            return Ok(());
        }
        match plan.unreadable.iter().next() {
            Some((id, reason)) => Err(DocweaveError::validation(reason.clone()).escalate(id.as_str())),
            None => Ok(()),
        }
    }
}

/// The processing root as seen from the input walk, when it lives inside it.
fn nested_processing_root(config: &RunConfig) -> Option<PathBuf> {
    let input = config.input_dir.canonicalize().ok()?;
    let root = config.processing_root.canonicalize().ok()?;
    let rel = root.strip_prefix(&input).ok()?;
    if rel.as_os_str().is_empty() {
        return None;
    }
    Some(config.input_dir.join(rel))
}
