//! Format conversion capabilities for docweave.
//!
//! A [`Converter`] turns one source file into normalized markdown text. The
//! [`ConverterRegistry`] maps each [`FileCategory`] to exactly one converter,
//! populated by explicit registration at startup. The Parse phase is the only
//! caller.

mod builtin;
mod command;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docweave_shared::{AppConfig, DocweaveError, FileCategory, Result};

pub use builtin::{JsonConverter, TextConverter};
pub use command::{CommandConverter, CommandRenderer, expand_args};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Converts a source file into normalized text.
///
/// `output_dir` is where the converter may drop by-products (extracted media,
/// for instance). The returned text is what the pipeline writes as the
/// document's canonical form.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Human-readable name for tracing.
    fn name(&self) -> &str;

    /// Version string folded into the processing fingerprint.
    fn version(&self) -> &str;

    async fn convert(&self, source: &Path, output_dir: &Path) -> Result<String>;
}

/// Renders the consolidated artifact into a final format.
#[async_trait]
pub trait Renderer: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// File name the renderer writes under the render phase directory.
    fn output_name(&self) -> &str;

    async fn render(&self, input: &Path, output: &Path) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Capability-keyed converter registry.
pub struct ConverterRegistry {
    converters: BTreeMap<FileCategory, Arc<dyn Converter>>,
    timeout: Duration,
}

impl ConverterRegistry {
    /// An empty registry. Nothing is converted until something is registered.
    pub fn empty(timeout: Duration) -> Self {
        Self {
            converters: BTreeMap::new(),
            timeout,
        }
    }

    /// A registry holding the built-in TEXT and JSON converters.
    pub fn with_builtins(timeout: Duration) -> Self {
        let mut registry = Self::empty(timeout);
        registry.register(FileCategory::Text, Arc::new(TextConverter));
        registry.register(FileCategory::Json, Arc::new(JsonConverter));
        registry
    }

    /// Built-ins plus one [`CommandConverter`] per `[converters.<category>]` entry.
    pub fn from_config(config: &AppConfig, timeout: Duration) -> Result<Self> {
        let mut registry = Self::with_builtins(timeout);
        for (key, spec) in &config.converters {
            let category: FileCategory = key.parse().map_err(DocweaveError::config)?;
            registry.register(category, Arc::new(CommandConverter::new(spec.clone())));
        }
        Ok(registry)
    }

    /// Register (or replace) the converter for `category`.
    pub fn register(&mut self, category: FileCategory, converter: Arc<dyn Converter>) {
        tracing::debug!(category = %category, converter = converter.name(), "registered converter");
        self.converters.insert(category, converter);
    }

    pub fn get(&self, category: FileCategory) -> Option<&Arc<dyn Converter>> {
        self.converters.get(&category)
    }

    pub fn supports(&self, category: FileCategory) -> bool {
        self.converters.contains_key(&category)
    }

    /// `converter:<CATEGORY>` → `<name>@<version>` for every registered converter.
    pub fn fingerprint_entries(&self) -> Vec<(String, String)> {
        self.converters
            .iter()
            .map(|(category, c)| {
                (
                    format!("converter:{category}"),
                    format!("{}@{}", c.name(), c.version()),
                )
            })
            .collect()
    }

    /// Convert `source` with the converter registered for `category`,
    /// bounded by the registry timeout.
    ///
    /// A missing converter is a validation error; a timeout is a conversion error.
    pub async fn convert(
        &self,
        category: FileCategory,
        source: &Path,
        output_dir: &Path,
    ) -> Result<String> {
        let converter = self.get(category).ok_or_else(|| {
            DocweaveError::validation(format!(
                "no converter registered for {category} ({})",
                source.display()
            ))
        })?;

        match tokio::time::timeout(self.timeout, converter.convert(source, output_dir)).await {
            Ok(result) => result,
            Err(_) => Err(DocweaveError::conversion(format!(
                "{} timed out after {}s on {}",
                converter.name(),
                self.timeout.as_secs(),
                source.display()
            ))),
        }
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("categories", &self.converters.keys().collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Build the optional renderer from `[render]`.
pub fn renderer_from_config(config: &AppConfig) -> Option<Arc<dyn Renderer>> {
    config
        .render
        .clone()
        .map(|section| Arc::new(CommandRenderer::new(section)) as Arc<dyn Renderer>)
}
