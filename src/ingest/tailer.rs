//! Incremental JSONL file tailer.
//!
//! Reads new records from a JSONL file as they are appended.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::error::IngestError;
use super::stream::{parse_chunk, Cursor, ParsedChunk};

/// Size and modification time of a file at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub size: u64,
    pub mtime: DateTime<Utc>,
}

impl FileStamp {
    /// Read the stamp of `path` without opening it for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be stat'ed or is not a regular file.
    pub async fn of(path: &Path) -> Result<Self, IngestError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| IngestError::from_io(path.to_path_buf(), e))?;
        Self::from_metadata(path, &metadata)
    }

    fn from_metadata(path: &Path, metadata: &std::fs::Metadata) -> Result<Self, IngestError> {
        if !metadata.is_file() {
            return Err(IngestError::NotAFile(path.to_path_buf()));
        }
        let mtime = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .map_err(|e| IngestError::from_io(path.to_path_buf(), e))?;
        Ok(Self {
            size: metadata.len(),
            mtime,
        })
    }
}

/// Result of one tail read.
#[derive(Debug)]
pub struct TailRead {
    pub chunk: ParsedChunk,
    pub stamp: FileStamp,
}

/// Incremental JSONL file reader that tracks read position.
///
/// Reads only lines appended since the last read. The position only ever
/// advances past complete lines, so a line still being written is re-read
/// on the next call.
#[derive(Debug)]
pub struct JsonlTailer {
    path: PathBuf,
    cursor: Cursor,
}

impl JsonlTailer {
    /// Create a new tailer for the given path, starting at offset 0.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cursor: Cursor::default(),
        }
    }

    /// Create a new tailer starting at a specific cursor.
    #[must_use]
    pub fn with_cursor(path: PathBuf, cursor: Cursor) -> Self {
        Self { path, cursor }
    }

    /// Get the current cursor.
    #[must_use]
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Get the path being tailed.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse everything from the cursor to end of file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub async fn read_new(&mut self) -> Result<TailRead, IngestError> {
        self.read_to(None).await
    }

    /// Read and parse from the cursor up to (not past) byte `end`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub async fn read_until(&mut self, end: u64) -> Result<TailRead, IngestError> {
        self.read_to(Some(end)).await
    }

    async fn read_to(&mut self, end: Option<u64>) -> Result<TailRead, IngestError> {
        let io_err = |e| IngestError::from_io(self.path.clone(), e);

        let mut file = File::open(&self.path).await.map_err(io_err)?;
        let metadata = file.metadata().await.map_err(io_err)?;
        let stamp = FileStamp::from_metadata(&self.path, &metadata)?;

        let limit = end.map_or(stamp.size, |e| e.min(stamp.size));
        if limit <= self.cursor.offset {
            return Ok(TailRead {
                chunk: ParsedChunk {
                    cursor: self.cursor,
                    ..ParsedChunk::default()
                },
                stamp,
            });
        }

        file.seek(std::io::SeekFrom::Start(self.cursor.offset))
            .await
            .map_err(io_err)?;
        let mut buf = Vec::with_capacity(usize::try_from(limit - self.cursor.offset).unwrap_or(0));
        file.take(limit - self.cursor.offset)
            .read_to_end(&mut buf)
            .await
            .map_err(io_err)?;

        let chunk = parse_chunk(&buf, self.cursor, &self.path);
        for error in &chunk.errors {
            tracing::warn!(
                path = %self.path.display(),
                line = error.line_number,
                error = %error.reason,
                "Skipping malformed JSONL line"
            );
        }
        self.cursor = chunk.cursor;

        Ok(TailRead { chunk, stamp })
    }

    /// Reset the cursor to the beginning of the file.
    pub fn reset(&mut self) {
        self.cursor = Cursor::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_entry(uuid: &str) -> String {
        format!(
            r#"{{"type":"user","uuid":"{uuid}","parentUuid":null,"sessionId":"sess-1","timestamp":"2026-01-29T10:00:00Z","message":{{"role":"user","content":"Hello"}},"cwd":"/tmp"}}"#
        )
    }

    #[tokio::test]
    async fn test_tailer_reads_initial_content() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", create_test_entry("uuid-1")).unwrap();
        writeln!(file, "{}", create_test_entry("uuid-2")).unwrap();
        file.flush().unwrap();

        let mut tailer = JsonlTailer::new(file.path().to_path_buf());
        let read = tailer.read_new().await.unwrap();

        assert_eq!(read.chunk.messages.len(), 2);
        assert_eq!(tailer.cursor().offset, read.stamp.size);
        assert_eq!(tailer.cursor().line, 2);
    }

    #[tokio::test]
    async fn test_tailer_reads_only_new_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", create_test_entry("uuid-1")).unwrap();
        file.flush().unwrap();

        let mut tailer = JsonlTailer::new(file.path().to_path_buf());

        let first = tailer.read_new().await.unwrap();
        assert_eq!(first.chunk.messages.len(), 1);
        let offset_after_first = tailer.cursor().offset;

        let second = tailer.read_new().await.unwrap();
        assert!(second.chunk.messages.is_empty());
        assert_eq!(tailer.cursor().offset, offset_after_first);

        writeln!(file, "{}", create_test_entry("uuid-2")).unwrap();
        writeln!(file, "{}", create_test_entry("uuid-3")).unwrap();
        file.flush().unwrap();

        let third = tailer.read_new().await.unwrap();
        assert_eq!(third.chunk.messages.len(), 2);
        assert_eq!(third.chunk.messages[0].line_number, 2);
        assert!(tailer.cursor().offset > offset_after_first);
    }

    #[tokio::test]
    async fn test_tailer_holds_partial_line() {
        let mut file = NamedTempFile::new().unwrap();
        let entry = create_test_entry("uuid-1");
        write!(file, "{}", &entry[..30]).unwrap();
        file.flush().unwrap();

        let mut tailer = JsonlTailer::new(file.path().to_path_buf());
        let read = tailer.read_new().await.unwrap();
        assert!(read.chunk.messages.is_empty());
        assert_eq!(tailer.cursor().offset, 0);

        writeln!(file, "{}", &entry[30..]).unwrap();
        file.flush().unwrap();

        let read = tailer.read_new().await.unwrap();
        assert_eq!(read.chunk.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_tailer_read_until_stops_at_limit() {
        let mut file = NamedTempFile::new().unwrap();
        let first = create_test_entry("uuid-1");
        writeln!(file, "{first}").unwrap();
        writeln!(file, "{}", create_test_entry("uuid-2")).unwrap();
        file.flush().unwrap();

        let mut tailer = JsonlTailer::new(file.path().to_path_buf());
        let read = tailer.read_until(first.len() as u64 + 1).await.unwrap();
        assert_eq!(read.chunk.messages.len(), 1);
        assert_eq!(tailer.cursor().offset, first.len() as u64 + 1);
    }

    #[tokio::test]
    async fn test_tailer_handles_missing_file() {
        let path = PathBuf::from("/tmp/nonexistent-file-12345.jsonl");
        let mut tailer = JsonlTailer::new(path);

        let result = tailer.read_new().await;
        assert!(matches!(result, Err(IngestError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_tailer_skips_malformed_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", create_test_entry("uuid-1")).unwrap();
        writeln!(file, "not valid json").unwrap();
        writeln!(file, "{}", create_test_entry("uuid-2")).unwrap();
        writeln!(file, "{{\"incomplete\": true").unwrap();
        writeln!(file, "{}", create_test_entry("uuid-3")).unwrap();
        file.flush().unwrap();

        let mut tailer = JsonlTailer::new(file.path().to_path_buf());
        let read = tailer.read_new().await.unwrap();

        assert_eq!(read.chunk.messages.len(), 3);
        assert_eq!(read.chunk.errors.len(), 2);
    }

    #[test]
    fn test_tailer_reset() {
        let cursor = Cursor {
            offset: 1024,
            line: 10,
        };
        let mut tailer = JsonlTailer::with_cursor(PathBuf::from("/tmp/test.jsonl"), cursor);
        assert_eq!(tailer.cursor().offset, 1024);
        tailer.reset();
        assert_eq!(tailer.cursor(), Cursor::default());
    }
}
