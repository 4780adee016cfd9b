//! One-shot analysis across many files.

mod coordinator;
mod summary;

pub use coordinator::BatchCoordinator;
pub use summary::{BatchSummary, FileReport};
