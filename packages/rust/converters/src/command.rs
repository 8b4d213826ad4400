//! External tools invoked as subprocesses.
//!
//! Placeholders in `args` are substituted per call: `{input}`, `{output_dir}`
//! for converters and `{input}`, `{output}` for the renderer. Child processes
//! are killed if the surrounding future is dropped (e.g. on timeout).

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use docweave_shared::{CommandSpec, DocweaveError, RenderSection, Result};
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::{Converter, Renderer};

/// Substitute `{key}` placeholders in each argument.
pub fn expand_args(args: &[String], vars: &[(&str, &Path)]) -> Vec<String> {
    args.iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |acc, (key, value)| {
                acc.replace(&format!("{{{key}}}"), &value.to_string_lossy())
            })
        })
        .collect()
}

/// Run a command to completion and return stdout, mapping failures to
/// conversion errors.
async fn run(command: &str, args: &[String]) -> Result<Vec<u8>> {
    let output = Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| DocweaveError::conversion(format!("failed to spawn '{command}': {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DocweaveError::conversion(format!(
            "'{command}' exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(output.stdout)
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Converter backed by an external command whose stdout is the normalized text.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    spec: CommandSpec,
}

impl CommandConverter {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl Converter for CommandConverter {
    fn name(&self) -> &str {
        &self.spec.command
    }

    fn version(&self) -> &str {
        &self.spec.version
    }

    #[instrument(skip_all, fields(command = %self.spec.command, source = %source.display()))]
    async fn convert(&self, source: &Path, output_dir: &Path) -> Result<String> {
        let args = expand_args(
            &self.spec.args,
            &[("input", source), ("output_dir", output_dir)],
        );
        debug!(?args, "running converter");
        let stdout = run(&self.spec.command, &args).await?;
        String::from_utf8(stdout).map_err(|_| {
            DocweaveError::conversion(format!(
                "'{}' produced non-UTF-8 output for {}",
                self.spec.command,
                source.display()
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Renderer backed by an external command that writes `{output}` itself.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    section: RenderSection,
}

impl CommandRenderer {
    pub fn new(section: RenderSection) -> Self {
        Self { section }
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    fn name(&self) -> &str {
        &self.section.command
    }

    fn version(&self) -> &str {
        &self.section.version
    }

    fn output_name(&self) -> &str {
        &self.section.output_name
    }

    #[instrument(skip_all, fields(command = %self.section.command))]
    async fn render(&self, input: &Path, output: &Path) -> Result<()> {
        let args = expand_args(&self.section.args, &[("input", input), ("output", output)]);
        run(&self.section.command, &args).await?;
        if !output.exists() {
            return Err(DocweaveError::conversion(format!(
                "'{}' did not produce {}",
                self.section.command,
                output.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_expanded() {
        let args = vec![
            "{input}".to_string(),
            "--media={output_dir}/media".to_string(),
            "-".to_string(),
        ];
        let expanded = expand_args(
            &args,
            &[
                ("input", Path::new("/in/report.pdf")),
                ("output_dir", Path::new("/out")),
            ],
        );
        assert_eq!(expanded, vec!["/in/report.pdf", "--media=/out/media", "-"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_converter_captures_stdout() {
        let converter = CommandConverter::new(CommandSpec {
            command: "echo".into(),
            args: vec!["converted {input}".into()],
            version: "1".into(),
        });
        let text = converter
            .convert(Path::new("x.pdf"), Path::new("/tmp"))
            .await
            .unwrap();
        assert_eq!(text.trim(), "converted x.pdf");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_is_conversion_error() {
        let converter = CommandConverter::new(CommandSpec {
            command: "false".into(),
            args: vec![],
            version: "1".into(),
        });
        let err = converter
            .convert(Path::new("x.pdf"), Path::new("/tmp"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocweaveError::Conversion { .. }));
    }

    #[tokio::test]
    async fn missing_binary_is_conversion_error() {
        let converter = CommandConverter::new(CommandSpec {
            command: "docweave-definitely-not-installed".into(),
            args: vec![],
            version: "1".into(),
        });
        let err = converter
            .convert(Path::new("x.pdf"), Path::new("/tmp"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }
}
