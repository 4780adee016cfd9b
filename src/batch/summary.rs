//! Batch results.

use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

use crate::analysis::{AnalysisError, AnalysisReport};

/// Outcome for one file of a batch.
#[derive(Debug)]
pub struct FileReport {
    /// Path as given to the batch.
    pub path: PathBuf,
    pub result: Result<AnalysisReport, AnalysisError>,
    /// Processing time once a worker picked the file up. Zero if it never started.
    pub elapsed: Duration,
}

impl FileReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(&self.result, Err(e) if e.is_cancelled())
    }
}

/// Aggregate over a whole batch. Reports are in input order.
#[derive(Debug)]
pub struct BatchSummary {
    /// Identifier of this run, for log correlation.
    pub run_id: Uuid,
    /// Number of files submitted.
    pub files: usize,
    /// Files analysed successfully.
    pub succeeded: usize,
    /// Failures other than cancellation.
    pub failed: usize,
    /// Files cancelled before or during analysis.
    pub cancelled: usize,
    /// Messages across all successful files.
    pub messages: usize,
    /// Malformed lines across all successful files.
    pub parse_errors: usize,
    /// Graph warnings across all successful files.
    pub warnings: usize,
    /// Time from batch start to the last report.
    pub wall_time: Duration,
    /// One report per submitted file.
    pub reports: Vec<FileReport>,
}

impl BatchSummary {
    #[must_use]
    pub fn from_reports(run_id: Uuid, reports: Vec<FileReport>, wall_time: Duration) -> Self {
        let mut summary = Self {
            run_id,
            files: reports.len(),
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            messages: 0,
            parse_errors: 0,
            warnings: 0,
            wall_time,
            reports: Vec::new(),
        };
        for report in &reports {
            match &report.result {
                Ok(r) => {
                    summary.succeeded += 1;
                    summary.messages += r.messages;
                    summary.parse_errors += r.parse_errors;
                    summary.warnings += r.warnings;
                }
                Err(e) if e.is_cancelled() => summary.cancelled += 1,
                Err(_) => summary.failed += 1,
            }
        }
        summary.reports = reports;
        summary
    }

    /// Reports that failed for a reason other than cancellation.
    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.reports
            .iter()
            .filter(|r| !r.is_ok() && !r.is_cancelled())
    }

    /// Slowest files first.
    #[must_use]
    pub fn timings(&self) -> Vec<(&PathBuf, Duration)> {
        let mut timings: Vec<_> = self.reports.iter().map(|r| (&r.path, r.elapsed)).collect();
        timings.sort_by(|a, b| b.1.cmp(&a.1));
        timings
    }
}
