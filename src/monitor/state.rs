//! Per-file monitor state.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::FileAnalysis;
use crate::ingest::Cursor;

/// Where reading stopped in a file, and how to recognise that file again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorState {
    pub path: PathBuf,
    /// Byte offset just past the last complete line.
    pub offset: u64,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    /// SHA-256 hex of the bytes just before `offset`.
    pub tail_fingerprint: String,
    /// Lines consumed up to `offset`.
    #[serde(default)]
    pub line: u64,
}

impl MonitorState {
    #[must_use]
    pub fn cursor(&self) -> Cursor {
        Cursor {
            offset: self.offset,
            line: self.line,
        }
    }

    /// State matching a completed full analysis.
    #[must_use]
    pub fn from_analysis(analysis: &FileAnalysis) -> Self {
        Self {
            path: state_key(&analysis.path),
            offset: analysis.consumed.offset,
            size: analysis.stamp.size,
            mtime: analysis.stamp.mtime,
            tail_fingerprint: analysis.fingerprint.clone(),
            line: analysis.consumed.line,
        }
    }
}

/// Lifecycle of a tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Registered, never polled.
    Unknown,
    /// Polled and up to date.
    Tracked,
    /// New bytes were read on this poll.
    Growing,
    /// Truncated or rewritten; rescanned from the start.
    Rotated,
    /// No change since the last poll.
    Unchanged,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Tracked => "tracked",
            Self::Growing => "growing",
            Self::Rotated => "rotated",
            Self::Unchanged => "unchanged",
        };
        f.write_str(s)
    }
}

/// Absolute form of `path`, used as the state key.
#[must_use]
pub fn state_key(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_state_json_layout() {
        let state = MonitorState {
            path: PathBuf::from("/tmp/a.jsonl"),
            offset: 120,
            size: 130,
            mtime: Utc.with_ymd_and_hms(2026, 1, 29, 10, 0, 0).unwrap(),
            tail_fingerprint: "abc".to_string(),
            line: 3,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["tailFingerprint"], "abc");
        assert_eq!(json["offset"], 120);
        assert_eq!(json["line"], 3);

        let back: MonitorState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
        assert_eq!(back.cursor(), Cursor { offset: 120, line: 3 });
    }

    #[test]
    fn test_state_without_line_defaults_to_zero() {
        let state: MonitorState = serde_json::from_str(
            r#"{"path":"/tmp/a.jsonl","offset":5,"size":5,"mtime":"2026-01-29T10:00:00Z","tailFingerprint":"x"}"#,
        )
        .unwrap();
        assert_eq!(state.line, 0);
    }

    #[test]
    fn test_state_key_is_absolute() {
        assert!(state_key(Path::new("relative/file.jsonl")).is_absolute());
        assert_eq!(
            state_key(Path::new("/tmp/a.jsonl")),
            PathBuf::from("/tmp/a.jsonl")
        );
    }
}
