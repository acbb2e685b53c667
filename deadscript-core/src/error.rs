//! Typed error handling for deadscript.
//!
//! Library consumers can match on the variant to tell recoverable,
//! per-item failures (a malformed unit, a function that was not found)
//! from fatal ones (a snapshot that could not be written, a rollback that
//! failed half-way).

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::PipelineState;

/// Main error type for deadscript operations.
#[derive(Error, Debug)]
pub enum DeadscriptError {
    /// I/O error when reading/writing files
    #[error("I/O error at {path}: {message}")]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A source unit could not be lexed (unterminated string, comment, ...)
    #[error("Extraction error in {path}: {message}")]
    Extract {
        path: PathBuf,
        message: String,
        /// Line number (1-indexed) if available
        line: Option<usize>,
    },

    /// Configuration file errors
    #[error("Config error at {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// Snapshot creation or verification failed
    #[error("Backup error: {message}")]
    Backup { message: String },

    /// Rollback failed; `recovery` tells the operator how to restore by hand
    #[error("Rollback error: {message}\nManual recovery: {recovery}")]
    Rollback { message: String, recovery: String },

    /// A single deletion failed
    #[error("Mutation error: {message}")]
    Mutation { message: String },

    /// The validation command could not be run
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Fatal pipeline failure, labelled with the phase it happened in
    #[error("Pipeline failed during {phase}: {message}{}", rollback_suffix(.rollback_hint))]
    Pipeline {
        phase: PipelineState,
        message: String,
        rollback_hint: Option<String>,
    },

    /// Invalid argument provided
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn rollback_suffix(hint: &Option<String>) -> String {
    hint.as_ref()
        .map(|h| format!("; files were already changed, restore with: {}", h))
        .unwrap_or_default()
}

impl DeadscriptError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an extraction error.
    pub fn extract(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Extract {
            path: path.into(),
            message: message.into(),
            line: None,
        }
    }

    /// Create an extraction error pointing at a line.
    pub fn extract_at(path: impl Into<PathBuf>, message: impl Into<String>, line: usize) -> Self {
        Self::Extract {
            path: path.into(),
            message: message.into(),
            line: Some(line),
        }
    }

    /// Create a config error.
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a backup error.
    pub fn backup(message: impl Into<String>) -> Self {
        Self::Backup {
            message: message.into(),
        }
    }

    /// Create a rollback error carrying manual recovery guidance.
    pub fn rollback(message: impl Into<String>, recovery: impl Into<String>) -> Self {
        Self::Rollback {
            message: message.into(),
            recovery: recovery.into(),
        }
    }

    /// Create a mutation error.
    pub fn mutation(message: impl Into<String>) -> Self {
        Self::Mutation {
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a fatal pipeline error for the given phase.
    pub fn pipeline(
        phase: PipelineState,
        message: impl Into<String>,
        rollback_hint: Option<String>,
    ) -> Self {
        Self::Pipeline {
            phase,
            message: message.into(),
            rollback_hint,
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Check if this is a recoverable error (the run can continue).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Extract { .. } | Self::Mutation { .. } | Self::Config { .. }
        )
    }

    /// Get the path associated with this error, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. } => Some(path),
            Self::Extract { path, .. } => Some(path),
            Self::Config { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Convenience type alias for deadscript results.
pub type DeadscriptResult<T> = Result<T, DeadscriptError>;

/// Extension trait for converting std::io::Error with path context.
pub trait IoResultExt<T> {
    /// Add path context to an I/O error.
    fn with_path(self, path: impl Into<PathBuf>) -> DeadscriptResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> DeadscriptResult<T> {
        self.map_err(|e| DeadscriptError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error() {
        let err = DeadscriptError::io(
            PathBuf::from("/project/Code.gs"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        );
        assert!(matches!(err, DeadscriptError::Io { .. }));
        assert_eq!(err.path(), Some(&PathBuf::from("/project/Code.gs")));
        assert!(err.to_string().contains("/project/Code.gs"));
    }

    #[test]
    fn test_extract_error_with_line() {
        let err = DeadscriptError::extract_at("Index.html", "unterminated string", 12);
        if let DeadscriptError::Extract { line, .. } = &err {
            assert_eq!(*line, Some(12));
        } else {
            panic!("Expected Extract error");
        }
    }

    #[test]
    fn test_is_recoverable() {
        assert!(DeadscriptError::extract("Code.gs", "bad").is_recoverable());
        assert!(DeadscriptError::mutation("not found").is_recoverable());
        assert!(!DeadscriptError::backup("disk full").is_recoverable());
        assert!(!DeadscriptError::rollback("copy failed", "copy by hand").is_recoverable());
    }

    #[test]
    fn test_pipeline_error_names_phase() {
        let err = DeadscriptError::pipeline(PipelineState::BackingUp, "snapshot not written", None);
        assert!(err.to_string().contains("backing up"));
    }

    #[test]
    fn test_pipeline_error_shows_rollback_hint() {
        let err = DeadscriptError::pipeline(
            PipelineState::Validating,
            "could not run 'npm test'",
            Some("deadscript /project rollback 20260101T000000000-pre-delete".to_string()),
        );
        let text = err.to_string();
        assert!(text.contains("validating"));
        assert!(text.ends_with("restore with: deadscript /project rollback 20260101T000000000-pre-delete"));
    }

    #[test]
    fn test_rollback_error_carries_recovery() {
        let err = DeadscriptError::rollback("restore failed", "cp -r snap/tree/. root/");
        assert!(err.to_string().contains("Manual recovery: cp -r"));
    }

    #[test]
    fn test_io_result_ext() {
        let result: std::io::Result<()> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
        let converted = result.with_path("/missing/Code.gs");
        assert!(converted.is_err());
    }
}
