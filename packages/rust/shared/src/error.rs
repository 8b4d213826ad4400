//! Error types for docweave.
//!
//! Library crates use [`DocweaveError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Errors are either *document-scoped* (recorded against a single document's
//! phase result) or *fatal* (stop the whole run). [`DocweaveError::is_fatal`]
//! draws that line.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Severity tag carried by generic processing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Top-level error type for all docweave operations.
#[derive(Debug, thiserror::Error)]
pub enum DocweaveError {
    /// Configuration loading or validation error. Always raised before a run starts.
    #[error("config error: {message}")]
    Config { message: String },

    /// A document failed validation (size, type, encoding, reserved path).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// An external converter failed or timed out.
    #[error("conversion error: {message}")]
    Conversion { message: String },

    /// Consolidation failed. Fatal when no artifact can be produced at all.
    #[error("consolidation error: {message}")]
    Consolidation { message: String, fatal: bool },

    /// Generic processing failure.
    #[error("processing {severity}: {message}")]
    Processing { message: String, severity: Severity },

    /// Persisted state could not be written or enumerated.
    #[error("state error: {0}")]
    State(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocweaveError>;

impl DocweaveError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a conversion error from any displayable message.
    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::Conversion {
            message: msg.into(),
        }
    }

    /// Create a consolidation error scoped to a single document.
    pub fn consolidation(msg: impl Into<String>) -> Self {
        Self::Consolidation {
            message: msg.into(),
            fatal: false,
        }
    }

    /// Create a consolidation error that prevents any artifact from being produced.
    pub fn consolidation_fatal(msg: impl Into<String>) -> Self {
        Self::Consolidation {
            message: msg.into(),
            fatal: true,
        }
    }

    /// Create a generic processing error with a severity tag.
    pub fn processing(severity: Severity, msg: impl Into<String>) -> Self {
        Self::Processing {
            message: msg.into(),
            severity,
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must stop the run rather than be recorded per document.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Config { .. } => true,
            Self::Consolidation { fatal, .. } => *fatal,
            Self::Processing { severity, .. } => *severity == Severity::Fatal,
            Self::Validation { .. } | Self::Conversion { .. } | Self::State(_) | Self::Io { .. } => {
                false
            }
        }
    }

    /// Short key used in a document's error map.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Validation { .. } => "validation",
            Self::Conversion { .. } => "conversion",
            Self::Consolidation { .. } => "consolidation",
            Self::Processing { .. } => "processing",
            Self::State(_) => "state",
            Self::Io { .. } => "io",
        }
    }

    /// Escalate a document-scoped error into a run-stopping one (strict mode).
    pub fn escalate(self, document: &str) -> Self {
        if self.is_fatal() {
            return self;
        }
        Self::processing(
            Severity::Fatal,
            format!("strict mode: document '{document}' failed: {self}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = DocweaveError::config("concurrency must be at least 1");
        assert_eq!(err.to_string(), "config error: concurrency must be at least 1");

        let err = DocweaveError::processing(Severity::Warning, "slow disk");
        assert_eq!(err.to_string(), "processing warning: slow disk");
    }

    #[test]
    fn document_scoped_errors_are_not_fatal() {
        assert!(!DocweaveError::validation("too large").is_fatal());
        assert!(!DocweaveError::conversion("timed out").is_fatal());
        assert!(!DocweaveError::consolidation("bad link").is_fatal());
        assert!(
            !DocweaveError::io("/tmp/x", std::io::Error::other("boom")).is_fatal()
        );
    }

    #[test]
    fn fatal_errors() {
        assert!(DocweaveError::config("missing input").is_fatal());
        assert!(DocweaveError::consolidation_fatal("no documents").is_fatal());
        assert!(DocweaveError::processing(Severity::Fatal, "cannot create root").is_fatal());
        assert!(!DocweaveError::processing(Severity::Error, "meh").is_fatal());
    }

    #[test]
    fn escalate_wraps_document_errors() {
        let err = DocweaveError::conversion("converter exited with 2").escalate("notes/a.md");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("notes/a.md"));
        assert!(err.to_string().contains("converter exited with 2"));
    }
}
