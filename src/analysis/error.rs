//! Analysis error types.

use crate::ingest::IngestError;

/// Errors that stop the analysis of a single file.
#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    /// The file could not be opened, stat'ed or read.
    #[error(transparent)]
    FileAccess(#[from] IngestError),

    /// The caller cancelled before the file was analysed.
    #[error("Analysis cancelled")]
    Cancelled,

    /// The analysis task panicked or was aborted.
    #[error("Analysis task failed: {0}")]
    Join(String),
}

impl AnalysisError {
    #[must_use]
    pub fn is_file_access(&self) -> bool {
        matches!(self, Self::FileAccess(_))
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
