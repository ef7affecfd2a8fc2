//! Error types for the MalGuard scanner.
//!
//! Per-artifact failures during a scan never surface here; the pipeline folds
//! them into a [`crate::models::Classification`]. These variants cover the
//! resource-level failures that abort the enclosing operation and the
//! user-actionable conditions (not found, ambiguous identifiers) the CLI and
//! API report back.

use std::path::PathBuf;

/// The main error type for MalGuard operations.
#[derive(Debug, thiserror::Error)]
pub enum MalguardError {
    /// I/O error (file read/write, permissions, etc.)
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Relational store error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Container could not be read
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Signature, quarantine entry or path does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A quarantine identifier matched more than one entry
    #[error("Identifier '{ident}' is ambiguous: {} matches", candidates.len())]
    Ambiguous {
        ident: String,
        candidates: Vec<String>,
    },

    /// Record is already present
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Signed signature file failed its integrity check
    #[error("Signature store integrity check failed: {0}")]
    StoreCorruption(String),

    /// Caller supplied something unusable
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Pattern rules could not be compiled
    #[error("Pattern rule error: {0}")]
    PatternRules(String),

    /// Tokio task join error
    #[error("Async task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// Generic error for external library errors
    #[error("{context}: {message}")]
    External { context: String, message: String },
}

/// Result type alias using MalguardError
pub type MalguardResult<T> = Result<T, MalguardError>;

impl MalguardError {
    /// Create an I/O error with path context
    pub fn io(source: std::io::Error, path: impl Into<Option<PathBuf>>) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an external error with context
    pub fn external(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::External {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable name used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io_failure",
            Self::Json(_) => "invalid_json",
            Self::Database(_) => "database_error",
            Self::Archive(_) => "malformed_archive",
            Self::NotFound(_) => "not_found",
            Self::Ambiguous { .. } => "ambiguous_identifier",
            Self::AlreadyExists(_) => "already_exists",
            Self::StoreCorruption(_) => "store_corruption",
            Self::InvalidInput(_) => "invalid_input",
            Self::PatternRules(_) => "pattern_rules",
            Self::TaskJoin(_) => "task_failed",
            Self::External { .. } => "external",
        }
    }
}

/// Convert from raw I/O errors (without path context)
impl From<std::io::Error> for MalguardError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { path: None, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let err = MalguardError::io(
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            Some(PathBuf::from("/test/path")),
        );
        assert!(err.to_string().contains("/test/path"));
    }

    #[test]
    fn test_ambiguous_error_counts_candidates() {
        let err = MalguardError::Ambiguous {
            ident: "abc".to_string(),
            candidates: vec!["abc1:a.exe".to_string(), "abc2:b.exe".to_string()],
        };
        assert!(err.to_string().contains("2 matches"));
        assert_eq!(err.kind(), "ambiguous_identifier");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: MalguardError = io_err.into();
        assert!(matches!(err, MalguardError::Io { path: None, .. }));
    }
}
