//! Error types for table resolution, transformation and replication
//!
//! All failures in this crate are fail-fast: nothing is retried. The binary
//! maps errors to process exit codes through [`TransformError::exit_code`].

use std::path::PathBuf;

/// Exit code for recognized user-facing failures
pub const EXIT_USER_ERROR: i32 = 1;

/// Exit code for anything unrecognized
pub const EXIT_INTERNAL_ERROR: i32 = 2;

/// Error type for transformation runs
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// Missing or contradictory configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Exact-name lookup matched no input table
    #[error("Table {0} not found.")]
    NotFound(String),

    /// Exact-name lookup matched more than one input table
    #[error("Multiple input tables with name {name} found ({count} matches).")]
    AmbiguousMatch { name: String, count: usize },

    /// A glob pattern matched no physical files
    #[error("No files found that match the pattern {0}")]
    NoFilesMatched(String),

    /// The embedded engine rejected a statement
    #[error("Error during query execution ({context}): {message}")]
    Engine { context: String, message: String },

    /// Connection, authentication or load failure against the warehouse
    #[error("Replication failed for {target}: {message}")]
    Replication { target: String, message: String },

    /// A manifest could not be read or written
    #[error("Invalid manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    /// IO error
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for transformation operations
pub type TransformResult<T> = Result<T, TransformError>;

impl TransformError {
    /// Build an engine error from any displayable engine failure
    pub fn engine(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        TransformError::Engine {
            context: context.into(),
            message: err.to_string(),
        }
    }

    /// Build a replication error for the given target
    pub fn replication(target: impl Into<String>, err: impl std::fmt::Display) -> Self {
        TransformError::Replication {
            target: target.into(),
            message: err.to_string(),
        }
    }

    /// Attach a path to an IO error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TransformError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is a recognized, user-facing failure
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            TransformError::Configuration(_)
                | TransformError::NotFound(_)
                | TransformError::AmbiguousMatch { .. }
                | TransformError::NoFilesMatched(_)
                | TransformError::Engine { .. }
                | TransformError::Replication { .. }
        )
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_user_error() {
            EXIT_USER_ERROR
        } else {
            EXIT_INTERNAL_ERROR
        }
    }
}
