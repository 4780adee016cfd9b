//! Streaming line parser.
//!
//! Turns a byte buffer that starts at a known file offset into a lazy
//! sequence of decoded messages, one per complete line.

use std::path::Path;

use super::error::ParseError;
use super::record::{decode_line, Decoded, Message};

/// Position in a file from which parsing (re)starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    /// Absolute byte offset of the first unread byte.
    pub offset: u64,
    /// Number of complete lines already consumed.
    pub line: u64,
}

/// Lazy parser over newline-delimited records.
///
/// Yields `Ok(Message)` or `Err(ParseError)` per non-empty complete line.
/// A trailing line without `\n` is left unconsumed: [`LineParser::cursor`]
/// stops before it so the next read can retry from there.
#[derive(Debug)]
pub struct LineParser<'a> {
    buf: &'a [u8],
    pos: usize,
    start: Cursor,
    lines: u64,
    skipped: usize,
    path: &'a Path,
}

impl<'a> LineParser<'a> {
    /// Parse `buf`, whose first byte sits at `start.offset` in `path`.
    #[must_use]
    pub fn new(buf: &'a [u8], start: Cursor, path: &'a Path) -> Self {
        Self {
            buf,
            pos: 0,
            start,
            lines: 0,
            skipped: 0,
            path,
        }
    }

    /// Cursor just past the last complete line consumed so far.
    #[must_use]
    pub fn cursor(&self) -> Cursor {
        Cursor {
            offset: self.start.offset + self.pos as u64,
            line: self.start.line + self.lines,
        }
    }

    /// Bookkeeping records skipped so far.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Bytes after the cursor that do not yet form a complete line.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buf.len() - self.pos
    }
}

impl Iterator for LineParser<'_> {
    type Item = Result<Message, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let buf = self.buf;
        loop {
            let rest = &buf[self.pos..];
            let newline = rest.iter().position(|&b| b == b'\n')?;

            let line_offset = self.start.offset + self.pos as u64;
            let line_number = self.start.line + self.lines + 1;
            let raw = &rest[..newline];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);

            self.pos += newline + 1;
            self.lines += 1;

            let text = match std::str::from_utf8(raw) {
                Ok(text) => text,
                Err(e) => {
                    return Some(Err(self.error(
                        line_number,
                        line_offset,
                        String::from_utf8_lossy(raw).into_owned(),
                        format!("invalid UTF-8: {e}"),
                    )));
                }
            };

            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }

            match decode_line(trimmed, self.path, line_number) {
                Ok(Decoded::Message(message)) => return Some(Ok(*message)),
                Ok(Decoded::Skipped) => {
                    self.skipped += 1;
                }
                Err(reason) => {
                    tracing::debug!(
                        path = %self.path.display(),
                        line = line_number,
                        reason = %reason,
                        "Malformed JSONL line"
                    );
                    return Some(Err(self.error(
                        line_number,
                        line_offset,
                        trimmed.to_string(),
                        reason,
                    )));
                }
            }
        }
    }
}

impl LineParser<'_> {
    fn error(
        &self,
        line_number: u64,
        byte_offset: u64,
        raw_line: String,
        reason: String,
    ) -> ParseError {
        ParseError {
            path: self.path.to_path_buf(),
            line_number,
            byte_offset,
            raw_line,
            reason,
        }
    }
}

/// Messages and errors collected from one parse pass.
#[derive(Debug, Default)]
pub struct ParsedChunk {
    pub messages: Vec<Message>,
    pub errors: Vec<ParseError>,
    pub skipped: usize,
    /// Where the next read should start.
    pub cursor: Cursor,
}

/// Drain a parser over `buf` into a [`ParsedChunk`].
#[must_use]
pub fn parse_chunk(buf: &[u8], start: Cursor, path: &Path) -> ParsedChunk {
    let mut parser = LineParser::new(buf, start, path);
    let mut chunk = ParsedChunk::default();
    for item in parser.by_ref() {
        match item {
            Ok(message) => chunk.messages.push(message),
            Err(e) => chunk.errors.push(e),
        }
    }
    chunk.skipped = parser.skipped();
    chunk.cursor = parser.cursor();
    chunk
}
