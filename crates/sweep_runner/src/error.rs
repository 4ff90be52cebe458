//! Error types for running studies.

use thiserror::Error;

use sweep_core::StudyError;

/// Result type alias
pub type Result<T> = std::result::Result<T, RunError>;

/// Why one case failed. Case errors never stop the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaseError {
    #[error("expression resolution failed: {0}")]
    Resolution(String),

    #[error("staging failed: {0}")]
    Staging(String),

    #[error("command '{command}' {reason}")]
    Command { command: String, reason: String },

    #[error("capture of '{field}' from command '{command}' failed: {message}")]
    Capture {
        command: String,
        field: String,
        message: String,
    },
}

/// Errors that stop a run, a check or an export.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Study(#[from] StudyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("export failed: {0}")]
    Export(String),

    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}

impl RunError {
    /// True for integrity failures, which need a purge rather than a retry.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Study(StudyError::Integrity(_)))
    }
}
