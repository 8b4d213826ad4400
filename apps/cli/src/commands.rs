//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use docweave_converters::{ConverterRegistry, renderer_from_config};
use docweave_core::{PhaseReport, Pipeline, ProgressReporter, RunSummary, SilentProgress};
use docweave_shared::{
    AppConfig, DocumentId, PhaseKind, PhaseResult, RunConfig, init_config, load_config,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// docweave: merge a document tree into one reference-complete artifact.
#[derive(Parser)]
#[command(
    name = "docweave",
    version,
    about = "Incrementally convert, split and consolidate a document tree.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ./docweave.toml, then ~/.docweave/docweave.toml).
    #[arg(long, global = true, env = "DOCWEAVE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Input and processing-root overrides shared by the pipeline commands.
#[derive(Args, Clone, Debug, Default)]
pub(crate) struct PathArgs {
    /// Source document tree (overrides `pipeline.input_dir`).
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Where phase trees and state live (overrides `pipeline.processing_root`).
    #[arg(long)]
    pub processing_root: Option<PathBuf>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run every phase, or a single one with --phase.
    Run {
        #[command(flatten)]
        paths: PathArgs,

        /// Run only this phase: parse, split, consolidate or render.
        #[arg(long)]
        phase: Option<PhaseKind>,

        /// Fail the run on the first document error.
        #[arg(long)]
        strict: bool,

        /// Maximum documents processed concurrently.
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Show which documents would be reprocessed and why.
    Status {
        #[command(flatten)]
        paths: PathArgs,
    },

    /// Inspect or reset persisted processing state.
    State {
        #[command(subcommand)]
        action: StateAction,

        #[command(flatten)]
        paths: PathArgs,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// State subcommands.
#[derive(Subcommand)]
pub(crate) enum StateAction {
    /// Forget state so documents are reprocessed on the next run.
    Clear {
        /// Only this document (path relative to the input tree).
        #[arg(long)]
        doc: Option<String>,
    },
    /// Delete state for documents no longer in the input tree.
    Prune,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "docweave=info",
        1 => "docweave=debug",
        _ => "docweave=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            paths,
            phase,
            strict,
            concurrency,
        } => cmd_run(config_path, &paths, phase, strict, concurrency).await,
        Command::Status { paths } => cmd_status(config_path, &paths),
        Command::State { action, paths } => match action {
            StateAction::Clear { doc } => cmd_state_clear(config_path, &paths, doc.as_deref()),
            StateAction::Prune => cmd_state_prune(config_path, &paths),
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

/// Load the config file and apply command-line overrides.
fn resolve_config(
    config_path: Option<&Path>,
    paths: &PathArgs,
) -> Result<(AppConfig, RunConfig)> {
    let app = load_config(config_path)?;
    let mut run = RunConfig::from(&app);
    if let Some(input) = &paths.input {
        run.input_dir = input.clone();
    }
    if let Some(root) = &paths.processing_root {
        run.processing_root = root.clone();
    }
    Ok((app, run))
}

fn build_pipeline(
    app: &AppConfig,
    run: RunConfig,
    progress: Arc<dyn ProgressReporter>,
) -> Result<Pipeline> {
    let registry = ConverterRegistry::from_config(app, run.converter_timeout)?;
    let renderer = renderer_from_config(app);
    Ok(Pipeline::new(run, registry, renderer, &app.fingerprint.extra, progress)?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config_path: Option<&Path>,
    paths: &PathArgs,
    phase: Option<PhaseKind>,
    strict: bool,
    concurrency: Option<usize>,
) -> Result<()> {
    let (app, mut run) = resolve_config(config_path, paths)?;
    run.strict |= strict;
    if let Some(n) = concurrency {
        run.concurrency = n;
    }
    info!(
        input = %run.input_dir.display(),
        processing_root = %run.processing_root.display(),
        phase = phase.map(|p| p.as_str()).unwrap_or("all"),
        strict = run.strict,
        "starting run"
    );

    let pipeline = build_pipeline(&app, run, Arc::new(CliProgress::new()))?;
    let summary = match phase {
        Some(kind) => pipeline.run_phase(kind).await?,
        None => pipeline.run_all().await?,
    };

    print_summary(&summary);
    Ok(())
}

fn cmd_status(config_path: Option<&Path>, paths: &PathArgs) -> Result<()> {
    let (app, run) = resolve_config(config_path, paths)?;
    let pipeline = build_pipeline(&app, run, Arc::new(SilentProgress))?;
    let plan = pipeline.plan()?;

    if plan.is_empty() {
        println!("No documents found.");
        return Ok(());
    }

    println!();
    for doc in &plan.documents {
        let action = if doc.assessment.needs_processing() {
            "process"
        } else {
            "skip"
        };
        println!("  {action:<8} {}  ({})", doc.source.id, doc.assessment.reason);
    }
    for (id, reason) in &plan.unreadable {
        println!("  {:<8} {id}  ({reason})", "error");
    }
    println!();
    println!(
        "  {} to process, {} unchanged, {} unreadable",
        plan.needing_processing().count(),
        plan.unchanged().len(),
        plan.unreadable.len()
    );
    println!();
    Ok(())
}

fn cmd_state_clear(config_path: Option<&Path>, paths: &PathArgs, doc: Option<&str>) -> Result<()> {
    let (app, run) = resolve_config(config_path, paths)?;
    let pipeline = build_pipeline(&app, run, Arc::new(SilentProgress))?;
    let store = pipeline.store();

    match doc {
        Some(doc) => {
            let id = DocumentId::from(doc);
            if store.clear(&id)? {
                println!("Cleared state for {id}");
            } else {
                return Err(eyre!("no state recorded for '{id}'"));
            }
        }
        None => {
            let count = store.clear_all()?;
            println!("Cleared {count} state record(s)");
        }
    }
    Ok(())
}

fn cmd_state_prune(config_path: Option<&Path>, paths: &PathArgs) -> Result<()> {
    let (app, run) = resolve_config(config_path, paths)?;
    let pipeline = build_pipeline(&app, run, Arc::new(SilentProgress))?;
    let pruned = pipeline.prune_state()?;

    if pruned.is_empty() {
        println!("Nothing to prune");
    } else {
        for id in &pruned {
            println!("  pruned {id}");
        }
        println!("Pruned {} state record(s)", pruned.len());
    }
    Ok(())
}

fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = init_config(config_path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config: AppConfig = load_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_summary(summary: &RunSummary) {
    println!();
    println!("  Run finished in {:.1}s", summary.elapsed.as_secs_f64());
    for report in &summary.reports {
        println!(
            "  {:<12} {} ok ({} cached), {} failed",
            report.kind.as_str(),
            report.succeeded(),
            report.skipped(),
            report.failed().len()
        );
        if let Some(error) = &report.finish_error {
            println!("  {:<12} finish failed: {error}", "");
        }
    }

    let failed = summary.failed_documents();
    if !failed.is_empty() {
        println!();
        println!("  Failed documents:");
        for (id, messages) in &failed {
            println!("    {id}");
            for message in messages {
                println!("      {message}");
            }
        }
    }

    println!();
    if let Some(artifact) = &summary.artifact {
        println!("  Artifact: {}", artifact.display());
    }
    println!("  States saved: {}", summary.saved_states);
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar per phase.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg:<12} [{bar:30}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", " "])
            .progress_chars("=> ");
        bar.set_style(style);
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }
}

impl ProgressReporter for CliProgress {
    fn phase_started(&self, kind: PhaseKind, documents: usize) {
        self.bar.reset();
        self.bar.set_length(documents as u64);
        self.bar.set_message(kind.as_str().to_string());
    }

    fn document_done(&self, _kind: PhaseKind, doc: &DocumentId, result: &PhaseResult) {
        if !result.is_success() {
            self.bar.println(format!("  failed: {doc}"));
        }
        self.bar.inc(1);
    }

    fn phase_finished(&self, report: &PhaseReport) {
        self.bar.println(format!(
            "  {} done: {} ok, {} failed",
            report.kind,
            report.succeeded(),
            report.failed().len()
        ));
    }

    fn done(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_phase_run() {
        let cli = Cli::try_parse_from([
            "docweave",
            "run",
            "--phase",
            "split",
            "--strict",
            "--input",
            "docs",
            "--concurrency",
            "8",
        ])
        .unwrap();

        match cli.command {
            Command::Run {
                paths,
                phase,
                strict,
                concurrency,
            } => {
                assert_eq!(phase, Some(PhaseKind::Split));
                assert!(strict);
                assert_eq!(concurrency, Some(8));
                assert_eq!(paths.input, Some(PathBuf::from("docs")));
                assert_eq!(paths.processing_root, None);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn rejects_unknown_phase() {
        assert!(Cli::try_parse_from(["docweave", "run", "--phase", "publish"]).is_err());
    }

    #[test]
    fn state_clear_takes_a_document() {
        let cli = Cli::try_parse_from(["docweave", "state", "clear", "--doc", "notes/b.md"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::State {
                action: StateAction::Clear { doc: Some(ref d) },
                ..
            } if d == "notes/b.md"
        ));
    }
}
