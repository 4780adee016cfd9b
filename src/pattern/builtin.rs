//! Structural detectors that look at content blocks rather than raw text.

use comrak::nodes::NodeValue;
use comrak::{parse_document, Arena, Options};

use crate::ingest::{ContentBlock, Message};

use super::detector::{PatternCategory, PatternDetector, PatternMatch};

/// Tools whose input is source code written to disk.
const EDIT_TOOLS: &[&str] = &["Edit", "MultiEdit", "Write", "NotebookEdit"];

/// Detects code in markdown prose and file-editing tool calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeBlockDetector;

impl CodeBlockDetector {
    /// Confidence for the strongest code block in a markdown document, if any.
    ///
    /// Fenced blocks are an explicit signal; indented blocks are often just
    /// quoted output.
    fn markdown_confidence(text: &str) -> Option<f64> {
        if !text.contains("```") && !text.contains("~~~") && !text.contains("    ") {
            return None;
        }

        let arena = Arena::new();
        let options = Options::default();
        let root = parse_document(&arena, text, &options);

        let mut best: Option<f64> = None;
        for node in root.descendants() {
            if let NodeValue::CodeBlock(cb) = &node.data.borrow().value {
                if cb.literal.trim().is_empty() {
                    continue;
                }
                let confidence = if cb.fenced { 1.0 } else { 0.6 };
                best = Some(best.map_or(confidence, |b: f64| b.max(confidence)));
            }
        }
        best
    }

    fn prose(message: &Message) -> Vec<String> {
        let blocks = message.blocks();
        if blocks.is_empty() {
            return match message.payload.get("content") {
                Some(serde_json::Value::String(s)) => vec![s.clone()],
                _ => Vec::new(),
            };
        }
        blocks
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl PatternDetector for CodeBlockDetector {
    fn id(&self) -> &str {
        "code_blocks"
    }

    fn classify(&self, message: &Message) -> Vec<PatternMatch> {
        let mut matches = Vec::new();

        let confidence = Self::prose(message)
            .iter()
            .filter_map(|text| Self::markdown_confidence(text))
            .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.max(c))));
        if let Some(confidence) = confidence {
            matches.push(PatternMatch::new(
                PatternCategory::Code,
                "code.fenced_block",
                confidence,
            ));
        }

        let edits = message.blocks().into_iter().any(|block| {
            matches!(
                block,
                ContentBlock::ToolUse { ref name, .. } if EDIT_TOOLS.contains(&name.as_str())
            )
        });
        if edits {
            matches.push(PatternMatch::new(
                PatternCategory::Code,
                "code.tool_edit",
                0.8,
            ));
        }

        matches
    }
}

/// Flags tool results the tool itself reported as failed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolErrorDetector;

impl PatternDetector for ToolErrorDetector {
    fn id(&self) -> &str {
        "tool_errors"
    }

    fn classify(&self, message: &Message) -> Vec<PatternMatch> {
        let failed = message
            .blocks()
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolResult { is_error: Some(true), .. }));
        if failed {
            vec![PatternMatch::new(
                PatternCategory::Error,
                "error.tool_result",
                1.0,
            )]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{parse_chunk, Cursor};
    use std::path::Path;

    fn message(line: &str) -> Message {
        let buf = format!("{line}\n");
        let mut chunk = parse_chunk(buf.as_bytes(), Cursor::default(), Path::new("/tmp/s.jsonl"));
        assert!(chunk.errors.is_empty(), "{:?}", chunk.errors);
        chunk.messages.remove(0)
    }

    fn assistant_text(text: &str) -> Message {
        let line = serde_json::json!({
            "type": "assistant",
            "uuid": "a",
            "timestamp": "2026-01-29T10:00:00Z",
            "message": {"role": "assistant", "content": [{"type": "text", "text": text}]}
        });
        message(&line.to_string())
    }

    #[test]
    fn test_fenced_block_detected() {
        let m = assistant_text("Try this:\n\n```rust\nfn main() {}\n```\n");
        let matches = CodeBlockDetector.classify(&m);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].rule_id, "code.fenced_block");
        assert!((matches[0].confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_indented_block_lower_confidence() {
        let m = assistant_text("Output:\n\n    let x = 1;\n    let y = 2;\n");
        let matches = CodeBlockDetector.classify(&m);
        assert_eq!(matches.len(), 1);
        assert!((matches[0].confidence - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_plain_prose_has_no_code() {
        let m = assistant_text("The build is green and the tests pass.");
        assert!(CodeBlockDetector.classify(&m).is_empty());
    }

    #[test]
    fn test_empty_fence_ignored() {
        let m = assistant_text("```\n```");
        assert!(CodeBlockDetector.classify(&m).is_empty());
    }

    #[test]
    fn test_edit_tool_call_is_code() {
        let m = message(
            r#"{"type":"assistant","uuid":"b","timestamp":"2026-01-29T10:00:01Z","message":{"role":"assistant","content":[{"type":"tool_use","id":"t1","name":"Edit","input":{"file_path":"/src/lib.rs","old_string":"a","new_string":"b"}}]}}"#,
        );
        let matches = CodeBlockDetector.classify(&m);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].rule_id, "code.tool_edit");
    }

    #[test]
    fn test_read_tool_call_is_not_code() {
        let m = message(
            r#"{"type":"assistant","uuid":"b","timestamp":"2026-01-29T10:00:01Z","message":{"role":"assistant","content":[{"type":"tool_use","id":"t1","name":"Read","input":{"file_path":"/src/lib.rs"}}]}}"#,
        );
        assert!(CodeBlockDetector.classify(&m).is_empty());
    }

    #[test]
    fn test_tool_error_detected() {
        let m = message(
            r#"{"type":"user","uuid":"c","timestamp":"2026-01-29T10:00:02Z","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"No such file","is_error":true}]}}"#,
        );
        let matches = ToolErrorDetector.classify(&m);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].category, PatternCategory::Error);
        assert_eq!(matches[0].rule_id, "error.tool_result");
    }

    #[test]
    fn test_successful_tool_result_not_error() {
        let m = message(
            r#"{"type":"user","uuid":"c","timestamp":"2026-01-29T10:00:02Z","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"ok"}]}}"#,
        );
        assert!(ToolErrorDetector.classify(&m).is_empty());
    }
}
