//! Incremental, resumable monitoring of growing log files.

mod error;
mod fingerprint;
mod poller;
mod state;
mod store;

pub use error::{MonitorError, StateError};
pub use fingerprint::{fingerprint, tail_fingerprint};
pub use poller::{IncrementalMonitor, MonitorEvent, PollOutcome};
pub use state::{state_key, FileStatus, MonitorState};
pub use store::{JsonStateStore, MemoryStateStore, StateStore};
