//! Colored CLI output for analysis results.

use std::io::{self, Write};
use std::path::Path;

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::analysis::FileAnalysis;
use crate::batch::BatchSummary;
use crate::monitor::{FileStatus, PollOutcome};
use crate::pattern::PatternMatch;
use crate::scoring::ScoredMessage;

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Truncate a string to at most `max_len` characters, adding ellipsis if
/// truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}

/// Comma-separated `category:rule` list.
#[must_use]
pub fn format_matches(matches: &[PatternMatch]) -> String {
    if matches.is_empty() {
        return "-".to_string();
    }
    matches
        .iter()
        .map(|m| format!("{}:{}", m.category, m.rule_id))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One line for a scored message.
#[must_use]
pub fn format_scored(scored: &ScoredMessage) -> String {
    format!(
        "{:>6.1}  L{:<5} {:<11} {}  {}",
        scored.score.value,
        scored.line_number,
        scored.kind.to_string(),
        truncate(&scored.uuid, 12),
        format_matches(&scored.matches)
    )
}

fn print_scored(scored: &ScoredMessage) {
    let line = format_scored(scored);
    if scored.annotation.on_primary_chain {
        println!("  {}", line.bold());
    } else {
        println!("  {line}");
    }
}

/// Print a whole-file analysis with the `top` highest scored messages.
pub fn print_analysis(analysis: &FileAnalysis, top: usize) {
    let summary = &analysis.summary;
    println!(
        "{} {} messages={} roots={} broken={} cycles={} branches={} depth={} chain={} ({} ms)",
        "[FILE]".blue().bold(),
        analysis.path.display(),
        summary.nodes.cyan(),
        summary.roots,
        summary.broken_chains,
        summary.cycles_broken,
        summary.branch_points,
        summary.max_depth,
        summary.primary_chain_len,
        analysis.elapsed.as_millis()
    );

    for error in &analysis.parse_errors {
        println!("{} {}", "[PARSE]".yellow().bold(), error);
    }
    for warning in &analysis.warnings {
        println!("{} {}", "[GRAPH]".yellow().bold(), warning);
    }

    for scored in analysis.scored.iter().take(top) {
        print_scored(scored);
    }
    let _ = io::stdout().flush();
}

/// Print totals and failures of a batch.
pub fn print_batch_summary(summary: &BatchSummary) {
    for report in &summary.reports {
        match &report.result {
            Ok(r) => println!(
                "{} {} messages={} errors={} warnings={} ({} ms)",
                "[OK]".green().bold(),
                report.path.display(),
                r.messages,
                r.parse_errors,
                r.warnings,
                report.elapsed.as_millis()
            ),
            Err(e) if e.is_cancelled() => {
                println!("{} {}", "[CANCELLED]".yellow().bold(), report.path.display());
            }
            Err(e) => println!(
                "{} {} - {}",
                "[FAILED]".red().bold(),
                report.path.display(),
                e
            ),
        }
    }

    println!(
        "{} run={} files={} ok={} failed={} cancelled={} messages={} parse_errors={} warnings={} ({} ms)",
        "[BATCH]".blue().bold(),
        summary.run_id.dimmed(),
        summary.files,
        summary.succeeded.green(),
        summary.failed.red(),
        summary.cancelled,
        summary.messages,
        summary.parse_errors,
        summary.warnings,
        summary.wall_time.as_millis()
    );
    let _ = io::stdout().flush();
}

/// Print the result of one monitor poll.
pub fn print_poll(outcome: &PollOutcome) {
    let status = match outcome.status {
        FileStatus::Rotated => "[ROTATED]".red().bold().to_string(),
        FileStatus::Growing => "[GROWING]".green().bold().to_string(),
        _ => "[TRACKED]".blue().bold().to_string(),
    };
    println!(
        "{} {} {} new={} reattached={} offset={}",
        timestamp().dimmed(),
        status,
        outcome.path.display(),
        outcome.delta.added.len(),
        outcome.delta.reattached.len(),
        outcome.cursor.offset
    );

    for diagnostic in &outcome.diagnostics {
        println!("{} {}", "[STATE]".yellow().bold(), diagnostic);
    }
    for error in &outcome.parse_errors {
        println!("{} {}", "[PARSE]".yellow().bold(), error);
    }
    for warning in &outcome.warnings {
        println!("{} {}", "[GRAPH]".yellow().bold(), warning);
    }
    for scored in &outcome.scored {
        print_scored(scored);
    }
    let _ = io::stdout().flush();
}

/// Print a per-file failure.
pub fn print_failure(path: &Path, error: &dyn std::fmt::Display) {
    eprintln!(
        "{} {} {} - {}",
        timestamp().dimmed(),
        "[FAILED]".red().bold(),
        path.display(),
        error
    );
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), msg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FlowAnnotation;
    use crate::ingest::MessageKind;
    use crate::pattern::PatternCategory;
    use crate::scoring::Score;

    #[test]
    fn test_truncate_short_string() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_long_string() {
        assert_eq!(truncate("hello world", 8), "hello...");
    }

    #[test]
    fn test_truncate_tiny_max() {
        assert_eq!(truncate("hello", 2), "...");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("héllo wörld", 6), "hél...");
    }

    #[test]
    fn test_format_matches() {
        assert_eq!(format_matches(&[]), "-");
        let matches = vec![
            PatternMatch::new(PatternCategory::Error, "error.compiler", 0.9),
            PatternMatch::new(PatternCategory::Code, "code.fenced_block", 1.0),
        ];
        assert_eq!(
            format_matches(&matches),
            "error:error.compiler, code:code.fenced_block"
        );
    }

    #[test]
    fn test_format_scored() {
        let scored = ScoredMessage {
            uuid: "0123456789abcdef".to_string(),
            kind: MessageKind::ToolResult,
            timestamp: Utc::now(),
            line_number: 42,
            annotation: FlowAnnotation::default(),
            matches: Vec::new(),
            score: Score {
                value: 37.25,
                ..Score::default()
            },
        };
        let line = format_scored(&scored);
        assert!(line.contains("37.2") || line.contains("37.3"));
        assert!(line.contains("L42"));
        assert!(line.contains("tool_result"));
        assert!(line.contains("012345678..."));
    }
}
