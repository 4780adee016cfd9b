//! Bounded concurrent analysis of many files.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::analysis::{AnalysisError, AnalysisReport, Pipeline};
use crate::monitor::{MonitorState, StateStore};

use super::summary::{BatchSummary, FileReport};

/// Messages kept per file in batch reports.
const DEFAULT_TOP: usize = 5;

/// Runs [`Pipeline::analyze_file`] over many files with a fixed number of
/// workers.
///
/// Each job builds its own graph and flow state; only the pipeline's
/// detectors and scorer are shared.
pub struct BatchCoordinator {
    pipeline: Pipeline,
    concurrency: usize,
    top: usize,
    store: Option<Arc<dyn StateStore>>,
}

impl std::fmt::Debug for BatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCoordinator")
            .field("concurrency", &self.concurrency)
            .field("top", &self.top)
            .field("store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl BatchCoordinator {
    /// Create a coordinator. A concurrency of 0 is treated as 1.
    #[must_use]
    pub fn new(pipeline: Pipeline, concurrency: usize) -> Self {
        Self {
            pipeline,
            concurrency: concurrency.max(1),
            top: DEFAULT_TOP,
            store: None,
        }
    }

    /// Save monitor state for every file analysed successfully.
    #[must_use]
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Number of top-scored messages kept per file.
    #[must_use]
    pub fn with_top(mut self, top: usize) -> Self {
        self.top = top;
        self
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Analyse `paths`. Never fails as a whole: each file gets a report.
    ///
    /// After `cancel` fires, files not yet started are reported as
    /// cancelled and in-flight files are abandoned before their state is
    /// saved.
    pub async fn analyze_batch(
        &self,
        paths: Vec<PathBuf>,
        cancel: CancellationToken,
    ) -> BatchSummary {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();

        tracing::info!(
            run_id = %run_id,
            files = paths.len(),
            concurrency = self.concurrency,
            "Batch started"
        );

        for (index, path) in paths.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let pipeline = self.pipeline.clone();
            let store = self.store.clone();
            let cancel = cancel.clone();
            let top = self.top;

            join_set.spawn(async move {
                let (result, elapsed) = tokio::select! {
                    biased;
                    () = cancel.cancelled() => (Err(AnalysisError::Cancelled), Duration::ZERO),
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(_permit) => {
                            // Queue time is not processing time.
                            let job_started = Instant::now();
                            let result =
                                run_job(&pipeline, store.as_deref(), &path, top, &cancel).await;
                            (result, job_started.elapsed())
                        }
                        Err(_) => (Err(AnalysisError::Cancelled), Duration::ZERO),
                    },
                };
                (index, FileReport { path, result, elapsed })
            });
        }

        let mut slots: Vec<Option<FileReport>> = paths.iter().map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, report)) => {
                    if let Err(e) = &report.result {
                        if !e.is_cancelled() {
                            tracing::warn!(
                                path = %report.path.display(),
                                error = %e,
                                "File failed"
                            );
                        }
                    }
                    slots[index] = Some(report);
                }
                Err(e) => tracing::error!(error = %e, "Batch job panicked"),
            }
        }

        let reports = slots
            .into_iter()
            .zip(paths)
            .map(|(slot, path)| {
                slot.unwrap_or_else(|| FileReport {
                    path,
                    result: Err(AnalysisError::Join("job did not complete".to_string())),
                    elapsed: Duration::ZERO,
                })
            })
            .collect();

        let summary = BatchSummary::from_reports(run_id, reports, started.elapsed());
        tracing::info!(
            run_id = %run_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            elapsed_ms = summary.wall_time.as_millis(),
            "Batch finished"
        );
        summary
    }
}

async fn run_job(
    pipeline: &Pipeline,
    store: Option<&dyn StateStore>,
    path: &std::path::Path,
    top: usize,
    cancel: &CancellationToken,
) -> Result<AnalysisReport, AnalysisError> {
    let analysis = tokio::select! {
        () = cancel.cancelled() => return Err(AnalysisError::Cancelled),
        analysis = pipeline.analyze_file(path) => analysis?,
    };

    if let Some(store) = store {
        if let Err(e) = store.save(&MonitorState::from_analysis(&analysis)) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to save monitor state");
        }
    }
    Ok(analysis.report(top))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::MemoryStateStore;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_session(dir: &TempDir, name: &str, uuids: &[&str]) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        let mut parent: Option<&str> = None;
        for (i, uuid) in uuids.iter().enumerate() {
            let parent_json = parent.map_or("null".to_string(), |p| format!("\"{p}\""));
            writeln!(
                file,
                r#"{{"type":"user","uuid":"{uuid}","parentUuid":{parent_json},"timestamp":"2026-01-29T10:00:{i:02}Z","message":{{"role":"user","content":"m"}}}}"#
            )
            .unwrap();
            parent = Some(uuid);
        }
        path
    }

    #[tokio::test]
    async fn test_batch_reports_in_input_order() {
        let dir = TempDir::new().unwrap();
        let paths = vec![
            write_session(&dir, "a.jsonl", &["a1", "a2"]),
            write_session(&dir, "b.jsonl", &["b1"]),
            write_session(&dir, "c.jsonl", &["c1", "c2", "c3"]),
        ];

        let coordinator = BatchCoordinator::new(Pipeline::default(), 2);
        let summary = coordinator
            .analyze_batch(paths.clone(), CancellationToken::new())
            .await;

        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.messages, 6);
        let order: Vec<_> = summary.reports.iter().map(|r| r.path.clone()).collect();
        assert_eq!(order, paths);
    }

    #[tokio::test]
    async fn test_batch_primes_state_store() {
        let dir = TempDir::new().unwrap();
        let path = write_session(&dir, "a.jsonl", &["a1", "a2"]);
        let store = Arc::new(MemoryStateStore::new());

        let coordinator =
            BatchCoordinator::new(Pipeline::default(), 1).with_state_store(store.clone());
        let summary = coordinator
            .analyze_batch(vec![path.clone()], CancellationToken::new())
            .await;
        assert_eq!(summary.succeeded, 1);

        let state = store.load(&path).unwrap().unwrap();
        assert_eq!(state.offset, std::fs::metadata(&path).unwrap().len());
        assert_eq!(state.line, 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let paths = vec![
            write_session(&dir, "a.jsonl", &["a1"]),
            write_session(&dir, "b.jsonl", &["b1"]),
        ];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = BatchCoordinator::new(Pipeline::default(), 1)
            .analyze_batch(paths, cancel)
            .await;
        assert_eq!(summary.cancelled, 2);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failed, 0);
        assert!(summary.reports.iter().all(|r| r.elapsed == Duration::ZERO));
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped() {
        assert_eq!(BatchCoordinator::new(Pipeline::default(), 0).concurrency(), 1);
    }
}
