//! Error types and result handling for upload-inspector.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for upload-inspector operations.
#[derive(Error, Debug)]
pub enum Error {
    // ===== I/O Errors =====
    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("File too large: {path} ({size} bytes, limit {limit} bytes)")]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    // ===== Configuration Errors =====
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(String),

    #[error("Failed to save configuration: {0}")]
    ConfigSave(String),

    #[error("Invalid configuration value: {field} - {message}")]
    ConfigInvalid { field: String, message: String },

    // ===== Database Errors =====
    #[error("Database operation failed: {0}")]
    Database(String),

    #[error("Failed to initialize database: {0}")]
    DatabaseInit(String),

    #[error("Scan not found: {0}")]
    ScanNotFound(String),

    // ===== Detection Errors =====
    #[error("Rule '{rule}' failed to compile: {reason}")]
    CorpusCompile { rule: String, reason: String },

    // ===== Concurrency Errors =====
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    // ===== Serialization Errors =====
    #[error("JSON serialization error")]
    JsonSerialize(#[from] serde_json::Error),

    // ===== Generic Errors =====
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Create a file read error.
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Create a corpus compile error for the named rule.
    pub fn corpus_compile(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorpusCompile {
            rule: rule.into(),
            reason: reason.into(),
        }
    }

    /// Create a lock poisoned error.
    pub fn lock_poisoned(context: impl Into<String>) -> Self {
        Self::LockPoisoned {
            context: context.into(),
        }
    }

    /// Check if this error means the input could not be read at all.
    pub fn is_read_error(&self) -> bool {
        matches!(
            self,
            Error::FileRead { .. } | Error::PathNotFound(_) | Error::FileTooLarge { .. }
        )
    }

    /// Get a user-friendly suggestion for how to resolve this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::PathNotFound(_) => Some("Check that the path exists and is accessible"),
            Error::FileTooLarge { .. } => {
                Some("Raise analysis.max_file_size_mb in the configuration, or set it to 0")
            }
            Error::ConfigLoad(_) | Error::ConfigInvalid { .. } => {
                Some("Check your configuration file for syntax errors or missing fields")
            }
            Error::DatabaseInit(_) | Error::Database(_) => {
                Some("Try deleting the database file and letting it be recreated")
            }
            Error::ScanNotFound(_) => Some("List known scans with: upload-inspector history"),
            Error::CorpusCompile { .. } => Some("Fix the rule definition and try again"),
            _ => None,
        }
    }
}

/// A non-fatal fault raised by a stage after the file was read.
///
/// Faults never cross the analysis boundary; they are folded into a degraded
/// [`ScanResult`](crate::core::types::ScanResult).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisFault {
    #[error("pattern matching failed: {0}")]
    PatternMatch(String),

    #[error("{stage} stage panicked: {message}")]
    Panicked { stage: &'static str, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PathNotFound(PathBuf::from("/test/path"));
        assert_eq!(err.to_string(), "Path not found: /test/path");
    }

    #[test]
    fn test_read_errors() {
        let err = Error::file_read(
            "/test",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.is_read_error());

        let err = Error::corpus_compile("broken_rule", "unknown atom $x");
        assert!(!err.is_read_error());
        assert_eq!(
            err.to_string(),
            "Rule 'broken_rule' failed to compile: unknown atom $x"
        );
    }

    #[test]
    fn test_fault_display() {
        let fault = AnalysisFault::Panicked {
            stage: "pattern matching",
            message: "boom".to_string(),
        };
        assert_eq!(fault.to_string(), "pattern matching stage panicked: boom");
    }
}
