//! Pipeline entry points.
//!
//! [`Pipeline`] holds the shared detectors and scorer; [`FileSession`] holds
//! the per-file graph and flow state that the pipeline feeds.

mod error;
mod pipeline;
mod session;

pub use error::AnalysisError;
pub use pipeline::{AnalysisReport, FileAnalysis, Pipeline};
pub use session::{FileSession, SessionUpdate};
