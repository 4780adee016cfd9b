//! Ingest error types.

use std::path::PathBuf;

use serde::Serialize;

/// Errors that make a file unreadable as a whole.
#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    /// File does not exist.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission denied accessing file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Path exists but is not a regular file.
    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),

    /// Other I/O error.
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl IngestError {
    /// Classify an I/O error raised while accessing `path`.
    #[must_use]
    pub fn from_io(path: PathBuf, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            _ => Self::Io { path, source: err },
        }
    }

    /// Path of the file that failed.
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::NotFound(p) | Self::PermissionDenied(p) | Self::NotAFile(p) => p,
            Self::Io { path, .. } => path,
        }
    }
}

/// A single line that could not be decoded. Parsing continues past it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{}:{line_number}: {reason}", path.display())]
pub struct ParseError {
    pub path: PathBuf,
    /// 1-based line number.
    pub line_number: u64,
    /// Byte offset of the start of the line.
    pub byte_offset: u64,
    pub raw_line: String,
    pub reason: String,
}
