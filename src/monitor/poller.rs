//! Polling monitor for growing log files.
//!
//! Each tracked file keeps its own graph and read position. A poll reads only
//! the bytes appended since the previous poll; a truncated or rewritten file
//! is rescanned from the start.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::analysis::{FileSession, Pipeline};
use crate::graph::{ConversationGraph, GraphDelta, GraphWarning};
use crate::ingest::{Cursor, FileStamp, JsonlTailer, ParseError};
use crate::scoring::ScoredMessage;

use super::error::MonitorError;
use super::fingerprint::tail_fingerprint;
use super::state::{state_key, FileStatus, MonitorState};
use super::store::StateStore;

/// Result of polling one file.
#[derive(Debug)]
pub struct PollOutcome {
    pub path: PathBuf,
    pub status: FileStatus,
    pub delta: GraphDelta,
    /// Scores for nodes added or re-attached by this poll, then for existing
    /// nodes whose branch or chain annotations changed.
    pub scored: Vec<ScoredMessage>,
    pub parse_errors: Vec<ParseError>,
    pub warnings: Vec<GraphWarning>,
    /// Previous graph was discarded and the file read from the start.
    pub rescanned: bool,
    /// Non-fatal problems with persisted state.
    pub diagnostics: Vec<MonitorError>,
    pub cursor: Cursor,
}

impl PollOutcome {
    fn unchanged(path: PathBuf, cursor: Cursor) -> Self {
        Self {
            path,
            status: FileStatus::Unchanged,
            delta: GraphDelta::default(),
            scored: Vec::new(),
            parse_errors: Vec::new(),
            warnings: Vec::new(),
            rescanned: false,
            diagnostics: Vec::new(),
            cursor,
        }
    }

    /// Whether anything worth reporting happened.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.rescanned
            || !self.delta.is_empty()
            || !self.parse_errors.is_empty()
            || !self.warnings.is_empty()
            || !self.diagnostics.is_empty()
    }
}

/// Events emitted by [`IncrementalMonitor::run`].
#[derive(Debug)]
pub enum MonitorEvent {
    /// A poll produced changes.
    Polled(Box<PollOutcome>),
    /// A poll failed; the file stays tracked.
    Failed { path: PathBuf, error: MonitorError },
}

#[derive(Debug)]
struct TrackedFile {
    status: FileStatus,
    state: Option<MonitorState>,
    session: FileSession,
}

/// Incremental monitor over a set of files.
pub struct IncrementalMonitor {
    pipeline: Pipeline,
    store: Arc<dyn StateStore>,
    files: BTreeMap<PathBuf, TrackedFile>,
    poll_interval: Duration,
}

impl std::fmt::Debug for IncrementalMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalMonitor")
            .field("files", &self.files.keys().collect::<Vec<_>>())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl IncrementalMonitor {
    #[must_use]
    pub fn new(pipeline: Pipeline, store: Arc<dyn StateStore>, poll_interval: Duration) -> Self {
        Self {
            pipeline,
            store,
            files: BTreeMap::new(),
            poll_interval,
        }
    }

    /// Start tracking `path`. Already tracked paths are left untouched.
    pub fn track(&mut self, path: &Path) {
        self.entry(&state_key(path));
    }

    fn entry(&mut self, key: &Path) -> &mut TrackedFile {
        let pipeline = &self.pipeline;
        self.files.entry(key.to_path_buf()).or_insert_with(|| {
            tracing::debug!(path = %key.display(), "Tracking file");
            TrackedFile {
                status: FileStatus::Unknown,
                state: None,
                session: pipeline.session(key.to_path_buf()),
            }
        })
    }

    /// Stop tracking `path`. Persisted state is kept.
    pub fn untrack(&mut self, path: &Path) -> bool {
        self.files.remove(&state_key(path)).is_some()
    }

    /// Tracked paths, in poll order.
    #[must_use]
    pub fn tracked(&self) -> Vec<PathBuf> {
        self.files.keys().cloned().collect()
    }

    #[must_use]
    pub fn status(&self, path: &Path) -> Option<FileStatus> {
        self.files.get(&state_key(path)).map(|f| f.status)
    }

    #[must_use]
    pub fn state(&self, path: &Path) -> Option<&MonitorState> {
        self.files.get(&state_key(path)).and_then(|f| f.state.as_ref())
    }

    #[must_use]
    pub fn graph(&self, path: &Path) -> Option<&ConversationGraph> {
        self.files.get(&state_key(path)).map(|f| f.session.graph())
    }

    /// Poll one file, tracking it first if needed.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::FileAccess` if the file cannot be stat'ed or
    /// read. State problems are reported in [`PollOutcome::diagnostics`].
    pub async fn poll_file(&mut self, path: &Path) -> Result<PollOutcome, MonitorError> {
        let key = state_key(path);
        let window = self.pipeline.fingerprint_bytes();
        let store = Arc::clone(&self.store);
        let file = self.entry(&key);
        let stamp = FileStamp::of(&key).await?;

        let mut diagnostics = Vec::new();
        let mut rescanned = false;

        if file.state.is_none() && file.status == FileStatus::Unknown {
            match store.load(&key) {
                Ok(Some(saved)) => {
                    if Self::is_continuation(&key, &saved, &stamp, window).await? {
                        Self::hydrate(file, &key, &saved).await?;
                    } else {
                        tracing::warn!(
                            path = %key.display(),
                            "Saved state does not match file, rescanning"
                        );
                        rescanned = true;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        path = %key.display(),
                        error = %e,
                        "Discarding unreadable monitor state"
                    );
                    diagnostics.push(MonitorError::StateCorruption {
                        path: key.clone(),
                        source: e,
                    });
                }
            }
        } else if let Some(state) = &file.state {
            if stamp.size == state.size && stamp.mtime == state.mtime {
                file.status = FileStatus::Tracked;
                return Ok(PollOutcome::unchanged(key, state.cursor()));
            }
            if !Self::is_continuation(&key, state, &stamp, window).await? {
                tracing::warn!(
                    path = %key.display(),
                    size = stamp.size,
                    offset = state.offset,
                    "File truncated or rewritten, rescanning"
                );
                file.session.reset();
                file.state = None;
                rescanned = true;
            }
        }

        let start = file.state.as_ref().map_or_else(Cursor::default, MonitorState::cursor);
        let had_state = file.state.is_some();
        let mut tailer = JsonlTailer::with_cursor(key.clone(), start);
        let read = tailer.read_new().await?;
        let cursor = read.chunk.cursor;
        let fingerprint = tail_fingerprint(&key, cursor.offset, window).await?;

        // No I/O past this point: a failed poll must leave the graph as it was.
        let update = file.session.ingest(read.chunk.messages);
        let state = MonitorState {
            path: key.clone(),
            offset: cursor.offset,
            size: read.stamp.size,
            mtime: read.stamp.mtime,
            tail_fingerprint: fingerprint,
            line: cursor.line,
        };
        if let Err(e) = store.save(&state) {
            tracing::warn!(path = %key.display(), error = %e, "Failed to persist monitor state");
            diagnostics.push(MonitorError::State(e));
        }

        let status = if rescanned {
            FileStatus::Rotated
        } else if had_state && cursor.offset > start.offset {
            FileStatus::Growing
        } else {
            FileStatus::Tracked
        };
        tracing::debug!(
            path = %key.display(),
            %status,
            added = update.delta.added.len(),
            offset = cursor.offset,
            "File polled"
        );

        file.state = Some(state);
        file.status = FileStatus::Tracked;

        Ok(PollOutcome {
            path: key,
            status,
            delta: update.delta,
            scored: update.scored,
            parse_errors: read.chunk.errors,
            warnings: update.warnings,
            rescanned,
            diagnostics,
            cursor,
        })
    }

    /// Whether the file still starts with the bytes `state` describes.
    async fn is_continuation(
        path: &Path,
        state: &MonitorState,
        stamp: &FileStamp,
        window: u64,
    ) -> Result<bool, MonitorError> {
        if stamp.size < state.size || stamp.size < state.offset {
            return Ok(false);
        }
        let current = tail_fingerprint(path, state.offset, window).await?;
        Ok(current == state.tail_fingerprint)
    }

    /// Rebuild the graph from content before the saved offset without
    /// reporting it.
    async fn hydrate(
        file: &mut TrackedFile,
        path: &Path,
        saved: &MonitorState,
    ) -> Result<(), MonitorError> {
        let mut tailer = JsonlTailer::new(path.to_path_buf());
        let read = tailer.read_until(saved.offset).await?;
        file.session.hydrate(read.chunk.messages);
        file.state = Some(MonitorState {
            offset: read.chunk.cursor.offset,
            line: read.chunk.cursor.line,
            ..saved.clone()
        });
        tracing::info!(
            path = %path.display(),
            offset = saved.offset,
            nodes = file.session.graph().len(),
            "Resumed from saved state"
        );
        Ok(())
    }

    /// Poll every tracked file until `cancel` fires.
    ///
    /// Files are polled one at a time; cancellation is checked between files
    /// and during the sleep between cycles. Returns when cancelled or when the
    /// receiver is dropped.
    pub async fn run(&mut self, cancel: CancellationToken, events: mpsc::Sender<MonitorEvent>) {
        tracing::info!(
            files = self.files.len(),
            interval_ms = self.poll_interval.as_millis(),
            "Monitor started"
        );

        'cycle: loop {
            for path in self.tracked() {
                if cancel.is_cancelled() {
                    break 'cycle;
                }
                let event = match self.poll_file(&path).await {
                    Ok(outcome) if outcome.has_changes() => MonitorEvent::Polled(Box::new(outcome)),
                    Ok(_) => continue,
                    Err(error) => {
                        tracing::warn!(path = %path.display(), error = %error, "Poll failed");
                        MonitorEvent::Failed { path, error }
                    }
                };
                if events.send(event).await.is_err() {
                    tracing::debug!("Event receiver dropped, stopping monitor");
                    break 'cycle;
                }
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        tracing::info!("Monitor stopped");
    }
}
