//! One-shot analysis of a whole file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::AnalyzerConfig;
use crate::graph::{ConversationGraph, FlowSummary, GraphWarning};
use crate::ingest::{Cursor, FileStamp, JsonlTailer, ParseError};
use crate::monitor::tail_fingerprint;
use crate::pattern::{DetectorRegistry, RuleError};
use crate::scoring::{rank, ScoredMessage, Scorer};

use super::error::AnalysisError;
use super::session::FileSession;

/// Shared, immutable analysis components.
///
/// Cloning is cheap; every clone shares the same registry and scorer.
#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: Arc<DetectorRegistry>,
    scorer: Arc<Scorer>,
    fingerprint_bytes: u64,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(DetectorRegistry::with_defaults(), Scorer::default())
    }
}

/// Everything derived from one full read of a file.
#[derive(Debug)]
pub struct FileAnalysis {
    pub path: PathBuf,
    pub graph: ConversationGraph,
    /// Ranked, highest score first.
    pub scored: Vec<ScoredMessage>,
    pub parse_errors: Vec<ParseError>,
    pub warnings: Vec<GraphWarning>,
    pub summary: FlowSummary,
    /// Bookkeeping records that were skipped.
    pub skipped: usize,
    /// Position after the last complete line.
    pub consumed: Cursor,
    pub stamp: FileStamp,
    /// Fingerprint of the bytes just before `consumed.offset`.
    pub fingerprint: String,
    pub elapsed: Duration,
}

/// Serializable digest of a [`FileAnalysis`].
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub path: PathBuf,
    pub messages: usize,
    pub parse_errors: usize,
    pub warnings: usize,
    pub summary: FlowSummary,
    pub top: Vec<ScoredMessage>,
}

impl FileAnalysis {
    /// Digest with the `top` highest scored messages.
    #[must_use]
    pub fn report(&self, top: usize) -> AnalysisReport {
        AnalysisReport {
            path: self.path.clone(),
            messages: self.graph.len(),
            parse_errors: self.parse_errors.len(),
            warnings: self.warnings.len(),
            summary: self.summary.clone(),
            top: self.scored.iter().take(top).cloned().collect(),
        }
    }
}

impl Pipeline {
    #[must_use]
    pub fn new(registry: DetectorRegistry, scorer: Scorer) -> Self {
        Self {
            registry: Arc::new(registry),
            scorer: Arc::new(scorer),
            fingerprint_bytes: 4096,
        }
    }

    /// Build from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured rule does not compile.
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, RuleError> {
        let registry = DetectorRegistry::from_config(&config.patterns)?;
        let scorer = Scorer::new(config.scoring.clone());
        Ok(Self::new(registry, scorer).with_fingerprint_bytes(config.monitor.fingerprint_bytes))
    }

    #[must_use]
    pub fn with_fingerprint_bytes(mut self, bytes: u64) -> Self {
        self.fingerprint_bytes = bytes;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &DetectorRegistry {
        &self.registry
    }

    #[must_use]
    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    #[must_use]
    pub fn fingerprint_bytes(&self) -> u64 {
        self.fingerprint_bytes
    }

    /// Fresh per-file state sharing this pipeline's components.
    #[must_use]
    pub fn session(&self, path: PathBuf) -> FileSession {
        FileSession::new(self.clone(), path)
    }

    /// Read, reconstruct, classify and score a whole file.
    ///
    /// Malformed lines and graph anomalies are collected, not fatal.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::FileAccess` if the file cannot be read.
    pub async fn analyze_file(&self, path: &Path) -> Result<FileAnalysis, AnalysisError> {
        let started = Instant::now();
        let mut tailer = JsonlTailer::new(path.to_path_buf());
        let read = tailer.read_new().await?;
        let fingerprint =
            tail_fingerprint(path, read.chunk.cursor.offset, self.fingerprint_bytes).await?;

        let mut session = self.session(path.to_path_buf());
        let update = session.ingest(read.chunk.messages);

        let summary = session.flow().summary(session.graph());
        let mut scored = session.score_all();
        rank(&mut scored);

        let elapsed = started.elapsed();
        tracing::debug!(
            path = %path.display(),
            messages = summary.nodes,
            parse_errors = read.chunk.errors.len(),
            warnings = update.warnings.len(),
            elapsed_ms = elapsed.as_millis(),
            "File analysed"
        );

        Ok(FileAnalysis {
            path: path.to_path_buf(),
            graph: session.into_graph(),
            scored,
            parse_errors: read.chunk.errors,
            warnings: update.warnings,
            summary,
            skipped: read.chunk.skipped,
            consumed: read.chunk.cursor,
            stamp: read.stamp,
            fingerprint,
            elapsed,
        })
    }
}
