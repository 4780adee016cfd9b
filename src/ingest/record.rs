//! Record schema for conversation log lines.
//!
//! Decodes one JSONL line into a [`Message`]. Only the fields the pipeline
//! needs are typed; the message body is kept as an opaque payload.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    User,
    Assistant,
    ToolCall,
    ToolResult,
    System,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::System => "system",
        };
        f.write_str(s)
    }
}

/// A decoded conversation message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub uuid: String,
    pub parent_uuid: Option<String>,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    /// Opaque message body (`message` object, or top-level `content`).
    pub payload: serde_json::Value,
    pub session_id: Option<String>,
    pub source_path: PathBuf,
    /// 1-based line number in the source file.
    pub line_number: u64,
    pub cwd: Option<String>,
}

/// Record types that are written to session logs but are not messages.
const BOOKKEEPING_TYPES: &[&str] = &[
    "summary",
    "file-history-snapshot",
    "queue-operation",
    "progress",
];

/// Raw shape of a log line, before kind derivation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    #[serde(rename = "type")]
    record_type: String,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    parent_uuid: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    message: Option<serde_json::Value>,
    #[serde(default)]
    content: Option<serde_json::Value>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    cwd: Option<String>,
}

/// Message content - can be plain text or structured blocks.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text content
    Text(String),
    /// Structured content blocks
    Blocks(Vec<ContentBlock>),
}

/// A content block within a message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content
    Text { text: String },
    /// Tool use request
    ToolUse {
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    /// Tool result
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        content: serde_json::Value,
        #[serde(default)]
        is_error: Option<bool>,
    },
    /// Thinking block
    Thinking { thinking: String },
    /// Unknown block type
    #[serde(other)]
    Unknown,
}

/// Outcome of decoding one non-empty line.
#[derive(Debug)]
pub(crate) enum Decoded {
    Message(Box<Message>),
    /// A bookkeeping record that carries no conversation content.
    Skipped,
}

/// Decode a single line into a message.
///
/// Returns the failure reason as a string; the caller attaches location.
pub(crate) fn decode_line(line: &str, path: &Path, line_number: u64) -> Result<Decoded, String> {
    let raw: RawRecord = serde_json::from_str(line).map_err(|e| e.to_string())?;

    if BOOKKEEPING_TYPES.contains(&raw.record_type.as_str()) {
        return Ok(Decoded::Skipped);
    }

    let uuid = raw
        .uuid
        .filter(|u| !u.is_empty())
        .ok_or_else(|| "missing field `uuid`".to_string())?;
    let timestamp = raw
        .timestamp
        .ok_or_else(|| "missing field `timestamp`".to_string())?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| format!("invalid timestamp `{timestamp}`: {e}"))?
        .with_timezone(&Utc);

    let payload = match (raw.message, raw.content) {
        (Some(message), _) => message,
        (None, Some(content)) => serde_json::json!({ "content": content }),
        (None, None) => serde_json::Value::Null,
    };

    let kind = derive_kind(&raw.record_type, &payload)?;

    Ok(Decoded::Message(Box::new(Message {
        uuid,
        parent_uuid: raw.parent_uuid.filter(|p| !p.is_empty()),
        kind,
        timestamp,
        payload,
        session_id: raw.session_id,
        source_path: path.to_path_buf(),
        line_number,
        cwd: raw.cwd,
    })))
}

fn derive_kind(record_type: &str, payload: &serde_json::Value) -> Result<MessageKind, String> {
    let blocks = content_blocks(payload);
    match record_type {
        "user" => {
            if blocks
                .iter()
                .any(|b| matches!(b, ContentBlock::ToolResult { .. }))
            {
                Ok(MessageKind::ToolResult)
            } else {
                Ok(MessageKind::User)
            }
        }
        "assistant" => {
            if blocks
                .iter()
                .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
            {
                Ok(MessageKind::ToolCall)
            } else {
                Ok(MessageKind::Assistant)
            }
        }
        "tool_call" => Ok(MessageKind::ToolCall),
        "tool_result" => Ok(MessageKind::ToolResult),
        "system" => Ok(MessageKind::System),
        other => Err(format!("unknown record type `{other}`")),
    }
}

fn content_blocks(payload: &serde_json::Value) -> Vec<ContentBlock> {
    match payload.get("content") {
        Some(content) => match serde_json::from_value::<MessageContent>(content.clone()) {
            Ok(MessageContent::Blocks(blocks)) => blocks,
            _ => Vec::new(),
        },
        None => Vec::new(),
    }
}

impl Message {
    /// Structured content blocks of the payload, if any.
    #[must_use]
    pub fn blocks(&self) -> Vec<ContentBlock> {
        content_blocks(&self.payload)
    }

    /// Flatten the payload into plain text for content detectors.
    #[must_use]
    pub fn text(&self) -> String {
        let Some(content) = self.payload.get("content") else {
            return match &self.payload {
                serde_json::Value::String(s) => s.clone(),
                _ => String::new(),
            };
        };

        match serde_json::from_value::<MessageContent>(content.clone()) {
            Ok(MessageContent::Text(s)) => s,
            Ok(MessageContent::Blocks(blocks)) => blocks
                .iter()
                .filter_map(block_text)
                .collect::<Vec<_>>()
                .join("\n"),
            Err(_) => String::new(),
        }
    }
}

fn block_text(block: &ContentBlock) -> Option<String> {
    match block {
        ContentBlock::Text { text } => Some(text.clone()),
        ContentBlock::Thinking { thinking } => Some(thinking.clone()),
        ContentBlock::ToolUse { input, .. } => Some(input.to_string()),
        ContentBlock::ToolResult { content, .. } => Some(value_text(content)),
        ContentBlock::Unknown => None,
    }
}

fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                item.get("text")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
            })
            .collect::<Vec<_>>()
            .join("\n"),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
