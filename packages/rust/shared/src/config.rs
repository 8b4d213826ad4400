//! Application configuration for docweave.
//!
//! Lookup order: an explicit `--config` path, then `./docweave.toml`, then
//! `~/.docweave/docweave.toml`, then built-in defaults.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DocweaveError, Result};
use crate::types::FileCategory;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "docweave.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docweave";

// ---------------------------------------------------------------------------
// Config structs (matching docweave.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Pipeline behaviour.
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Attachment discovery settings.
    #[serde(default)]
    pub attachments: AttachmentsSection,

    /// External converters keyed by lower-case category (`pdf`, `doc`, `image`, `excel`).
    #[serde(default)]
    pub converters: BTreeMap<String, CommandSpec>,

    /// Optional external renderer for the consolidated artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render: Option<RenderSection>,

    /// Extra processing-fingerprint entries.
    #[serde(default)]
    pub fingerprint: FingerprintSection,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Root of the source document tree.
    #[serde(default = "default_input_dir")]
    pub input_dir: String,

    /// Where phase trees, state records and indexes are written.
    #[serde(default = "default_processing_root")]
    pub processing_root: String,

    /// Maximum documents processed concurrently within a phase.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Escalate the first document failure to a fatal error.
    #[serde(default)]
    pub strict: bool,

    /// Per-invocation timeout for external converters and the renderer.
    #[serde(default = "default_converter_timeout")]
    pub converter_timeout_secs: u64,

    /// Documents larger than this fail validation.
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            processing_root: default_processing_root(),
            concurrency: default_concurrency(),
            strict: false,
            converter_timeout_secs: default_converter_timeout(),
            max_file_size_bytes: default_max_file_size(),
        }
    }
}

fn default_input_dir() -> String {
    ".".into()
}
fn default_processing_root() -> String {
    ".docweave".into()
}
fn default_concurrency() -> u32 {
    4
}
fn default_converter_timeout() -> u64 {
    120
}
fn default_max_file_size() -> u64 {
    50 * 1024 * 1024
}

/// `[attachments]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentsSection {
    /// Reserved media subtree (converter by-products) excluded from discovery.
    #[serde(default = "default_media_dir")]
    pub media_dir: String,

    /// Number of characters kept in text previews.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for AttachmentsSection {
    fn default() -> Self {
        Self {
            media_dir: default_media_dir(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_media_dir() -> String {
    "media".into()
}
fn default_preview_chars() -> usize {
    200
}

/// An external command, e.g. `[converters.pdf]`.
///
/// `args` may contain `{input}` and `{output_dir}` placeholders; stdout is the
/// normalized text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Bump to force reprocessing after upgrading the tool.
    #[serde(default = "default_tool_version")]
    pub version: String,
}

fn default_tool_version() -> String {
    "1".into()
}

/// `[render]` section. `args` may contain `{input}` and `{output}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSection {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// File name written under `phases/render/`.
    #[serde(default = "default_render_output")]
    pub output_name: String,
    #[serde(default = "default_tool_version")]
    pub version: String,
}

fn default_render_output() -> String {
    "consolidated.pdf".into()
}

/// `[fingerprint]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FingerprintSection {
    /// Additional component → version entries folded into the processing fingerprint.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Run config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, merged from the config file and CLI flags.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input_dir: PathBuf,
    pub processing_root: PathBuf,
    pub concurrency: usize,
    pub strict: bool,
    pub converter_timeout: std::time::Duration,
    pub max_file_size_bytes: u64,
    pub media_dir: String,
    pub preview_chars: usize,
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            input_dir: PathBuf::from(&config.pipeline.input_dir),
            processing_root: PathBuf::from(&config.pipeline.processing_root),
            concurrency: config.pipeline.concurrency as usize,
            strict: config.pipeline.strict,
            converter_timeout: std::time::Duration::from_secs(
                config.pipeline.converter_timeout_secs,
            ),
            max_file_size_bytes: config.pipeline.max_file_size_bytes,
            media_dir: config.attachments.media_dir.clone(),
            preview_chars: config.attachments.preview_chars,
        }
    }
}

impl RunConfig {
    /// Reject configurations that cannot start a run.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(DocweaveError::config("pipeline.concurrency must be at least 1"));
        }
        if self.converter_timeout.is_zero() {
            return Err(DocweaveError::config(
                "pipeline.converter_timeout_secs must be at least 1",
            ));
        }
        if self.media_dir.is_empty() || self.media_dir.contains(['/', '\\']) {
            return Err(DocweaveError::config(format!(
                "attachments.media_dir must be a single directory name, got '{}'",
                self.media_dir
            )));
        }
        if !self.input_dir.is_dir() {
            return Err(DocweaveError::config(format!(
                "input directory '{}' does not exist",
                self.input_dir.display()
            )));
        }
        // A nested processing root is allowed; the scan never enters it.
        if resolve_path(&self.processing_root) == resolve_path(&self.input_dir) {
            return Err(DocweaveError::config(format!(
                "processing root '{}' must not be the input directory",
                self.processing_root.display()
            )));
        }
        Ok(())
    }
}

/// Canonical form of `path`, resolving the longest existing ancestor so
/// that roots not yet created still compare correctly.
fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = path.canonicalize() {
        return resolved;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if parent.as_os_str().is_empty() => {
            resolve_path(Path::new(".")).join(name)
        }
        (Some(parent), Some(name)) => resolve_path(parent).join(name),
        _ => path.to_path_buf(),
    }
}

/// Validate converter keys before they reach the registry.
pub fn validate_converters(config: &AppConfig) -> Result<()> {
    for key in config.converters.keys() {
        let category: FileCategory = key.parse().map_err(DocweaveError::config)?;
        if category.is_text_like() || category == FileCategory::Other {
            return Err(DocweaveError::config(format!(
                "converters.{key}: {category} files are handled by built-in converters"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docweave/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DocweaveError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the user config file (`~/.docweave/docweave.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config, honouring the lookup order. Returns defaults if no file exists.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        return load_config_from(path);
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return load_config_from(&local);
    }

    let path = config_file_path()?;
    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DocweaveError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        DocweaveError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_converters(&config)?;
    Ok(config)
}

/// Write a default config file at `path` (or the user config path).
/// Returns the path to the created file.
pub fn init_config(path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| DocweaveError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DocweaveError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DocweaveError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
