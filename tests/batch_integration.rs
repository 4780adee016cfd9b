//! Integration tests for the batch coordinator.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use session_lens::analysis::{AnalysisError, Pipeline};
use session_lens::batch::BatchCoordinator;
use session_lens::ingest::IngestError;
use session_lens::monitor::{
    tail_fingerprint, JsonStateStore, MonitorState, StateError, StateStore,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn write_session(dir: &TempDir, name: &str, messages: usize) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).expect("Failed to create session file");
    for i in 0..messages {
        let parent = if i == 0 {
            serde_json::Value::Null
        } else {
            serde_json::Value::String(format!("{name}-{}", i - 1))
        };
        let line = serde_json::json!({
            "type": "user",
            "uuid": format!("{name}-{i}"),
            "parentUuid": parent,
            "timestamp": format!("2026-01-29T10:00:{i:02}Z"),
            "message": {"role": "user", "content": "hello"},
        });
        writeln!(file, "{line}").expect("Failed to write line");
    }
    path
}

/// Three files with an unreadable middle one: one file-access failure, two
/// successes, order preserved.
#[tokio::test]
async fn test_unreadable_middle_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let paths = vec![
        write_session(&dir, "first.jsonl", 3),
        dir.path().join("does-not-exist.jsonl"),
        write_session(&dir, "third.jsonl", 2),
    ];

    let summary = BatchCoordinator::new(Pipeline::default(), 3)
        .analyze_batch(paths.clone(), CancellationToken::new())
        .await;

    assert_eq!(summary.files, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.cancelled, 0);
    assert_eq!(summary.messages, 5);

    let failures: Vec<_> = summary.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].path, paths[1]);
    assert!(matches!(
        failures[0].result,
        Err(AnalysisError::FileAccess(IngestError::NotFound(_)))
    ));

    assert!(summary.reports[0].is_ok());
    assert!(summary.reports[2].is_ok());
}

/// A directory in the batch is a file-access failure like any other.
#[tokio::test]
async fn test_directory_in_batch() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let subdir = dir.path().join("nested");
    std::fs::create_dir(&subdir).expect("Failed to create dir");
    let paths = vec![write_session(&dir, "a.jsonl", 1), subdir];

    let summary = BatchCoordinator::new(Pipeline::default(), 1)
        .analyze_batch(paths, CancellationToken::new())
        .await;
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert!(matches!(
        summary.reports[1].result,
        Err(AnalysisError::FileAccess(IngestError::NotAFile(_)))
    ));
}

/// Results do not depend on the pool size.
#[tokio::test]
async fn test_results_independent_of_concurrency() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let paths: Vec<_> = (0..6)
        .map(|i| write_session(&dir, &format!("s{i}.jsonl"), i + 1))
        .collect();

    let mut totals = Vec::new();
    for concurrency in [1, 2, 8] {
        let summary = BatchCoordinator::new(Pipeline::default(), concurrency)
            .analyze_batch(paths.clone(), CancellationToken::new())
            .await;
        let per_file: Vec<usize> = summary
            .reports
            .iter()
            .map(|r| r.result.as_ref().map_or(0, |a| a.messages))
            .collect();
        totals.push(per_file);
    }
    assert_eq!(totals[0], vec![1, 2, 3, 4, 5, 6]);
    assert!(totals.windows(2).all(|w| w[0] == w[1]));
}

/// An empty batch is a valid, empty summary.
#[tokio::test]
async fn test_empty_batch() {
    let summary = BatchCoordinator::new(Pipeline::default(), 4)
        .analyze_batch(Vec::new(), CancellationToken::new())
        .await;
    assert_eq!(summary.files, 0);
    assert!(summary.reports.is_empty());
}

/// Store that reacts to the first completed save.
struct FirstSaveHook {
    inner: JsonStateStore,
    fired: AtomicBool,
    cancel: Option<CancellationToken>,
    delay: Duration,
}

impl FirstSaveHook {
    fn new(dir: PathBuf) -> Self {
        Self {
            inner: JsonStateStore::new(dir),
            fired: AtomicBool::new(false),
            cancel: None,
            delay: Duration::ZERO,
        }
    }
}

impl StateStore for FirstSaveHook {
    fn load(&self, path: &Path) -> Result<Option<MonitorState>, StateError> {
        self.inner.load(path)
    }

    fn save(&self, state: &MonitorState) -> Result<(), StateError> {
        self.inner.save(state)?;
        if !self.fired.swap(true, Ordering::SeqCst) {
            std::thread::sleep(self.delay);
            if let Some(cancel) = &self.cancel {
                cancel.cancel();
            }
        }
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), StateError> {
        self.inner.remove(path)
    }
}

/// Cancelling mid-batch: finished files have complete state, cancelled
/// files have none.
#[tokio::test]
async fn test_cancel_mid_batch_with_state_store() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let paths: Vec<_> = (0..4)
        .map(|i| write_session(&dir, &format!("s{i}.jsonl"), i + 2))
        .collect();

    let cancel = CancellationToken::new();
    let store = Arc::new(FirstSaveHook {
        cancel: Some(cancel.clone()),
        ..FirstSaveHook::new(dir.path().join("state"))
    });

    let summary = BatchCoordinator::new(Pipeline::default(), 1)
        .with_state_store(store.clone())
        .analyze_batch(paths.clone(), cancel)
        .await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.cancelled, 3);
    assert_eq!(summary.failed, 0);

    for report in &summary.reports {
        let saved = store.load(&report.path).expect("Load failed");
        if report.is_cancelled() {
            assert!(saved.is_none(), "{} has state", report.path.display());
            continue;
        }
        let saved = saved.expect("Finished file has no state");
        let len = std::fs::metadata(&report.path).expect("stat").len();
        assert_eq!(saved.offset, len);
        assert_eq!(saved.size, len);
        let messages = report.result.as_ref().map_or(0, |r| r.messages);
        assert_eq!(saved.line, u64::try_from(messages).expect("count"));
        let current = tail_fingerprint(&report.path, saved.offset, 4096)
            .await
            .expect("Fingerprint failed");
        assert_eq!(saved.tail_fingerprint, current);
    }
}

/// Time spent waiting for a worker is not counted against a file.
#[tokio::test]
async fn test_elapsed_excludes_queue_time() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let paths = vec![
        write_session(&dir, "first.jsonl", 1),
        write_session(&dir, "second.jsonl", 1),
    ];
    let delay = Duration::from_millis(300);
    let store = Arc::new(FirstSaveHook {
        delay,
        ..FirstSaveHook::new(dir.path().join("state"))
    });

    let summary = BatchCoordinator::new(Pipeline::default(), 1)
        .with_state_store(store)
        .analyze_batch(paths, CancellationToken::new())
        .await;

    assert_eq!(summary.succeeded, 2);
    assert!(summary.wall_time >= delay);
    let slow = summary.reports.iter().filter(|r| r.elapsed >= delay).count();
    assert_eq!(slow, 1);
}
