//! Monitor error types.

use std::path::PathBuf;

use crate::ingest::IngestError;

/// Errors reading or writing persisted monitor state.
#[derive(thiserror::Error, Debug)]
pub enum StateError {
    /// State file exists but is not valid state.
    #[error("Corrupt state for {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// State file could not be read or written.
    #[error("State I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors raised while monitoring a file.
#[derive(thiserror::Error, Debug)]
pub enum MonitorError {
    /// The tracked file could not be accessed. Other files are unaffected.
    #[error(transparent)]
    FileAccess(#[from] IngestError),

    /// Persisted state was unusable; the file was rescanned from the start.
    #[error("Discarded state for {path}: {source}")]
    StateCorruption {
        path: PathBuf,
        #[source]
        source: StateError,
    },

    /// Fresh state could not be persisted.
    #[error("Failed to persist state: {0}")]
    State(#[from] StateError),

    /// The event receiver was dropped.
    #[error("Event channel closed")]
    ChannelClosed,
}
