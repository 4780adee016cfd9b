//! Regex rules grouped by category.
//!
//! Each category holds an ordered list of rules; within a category the first
//! matching rule wins, across categories every match is reported.

use regex::Regex;

use crate::config::{PatternConfig, RuleSpec};
use crate::ingest::Message;

use super::detector::{PatternCategory, PatternDetector, PatternMatch};

/// Error type for rule compilation.
#[derive(thiserror::Error, Debug)]
pub enum RuleError {
    /// Invalid regex pattern.
    #[error("Invalid pattern for rule {id}: {source}")]
    InvalidPattern {
        id: String,
        #[source]
        source: regex::Error,
    },
}

/// A single compiled rule.
#[derive(Debug, Clone)]
pub struct PatternRule {
    id: String,
    pattern: Regex,
    confidence: f64,
}

impl PatternRule {
    /// Compile a rule.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidPattern` if the regex is invalid.
    pub fn new(id: impl Into<String>, pattern: &str, confidence: f64) -> Result<Self, RuleError> {
        let id = id.into();
        let pattern = Regex::new(pattern).map_err(|source| RuleError::InvalidPattern {
            id: id.clone(),
            source,
        })?;
        Ok(Self {
            id,
            pattern,
            confidence,
        })
    }

    fn from_spec(spec: &RuleSpec) -> Result<Self, RuleError> {
        Self::new(spec.id.clone(), &spec.pattern, spec.confidence)
    }

    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the pattern string (for debugging/display).
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Detector driven by per-category regex rules.
#[derive(Debug, Clone, Default)]
pub struct RuleDetector {
    groups: Vec<(PatternCategory, Vec<PatternRule>)>,
}

impl RuleDetector {
    /// Create a detector with no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detector with the built-in rule set.
    ///
    /// Built-in rules that fail to compile are skipped with a warning.
    #[must_use]
    pub fn with_default_rules() -> Self {
        let mut detector = Self::new();
        for (category, specs) in default_rules() {
            for spec in specs {
                match PatternRule::from_spec(&spec) {
                    Ok(rule) => detector.add_rule(category.clone(), rule),
                    Err(e) => tracing::warn!(error = %e, "Failed to compile default pattern rule"),
                }
            }
        }
        detector
    }

    /// Build from configuration. Configured rules take precedence over the
    /// built-in ones of the same category.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured rule does not compile.
    pub fn from_config(config: &PatternConfig) -> Result<Self, RuleError> {
        let mut detector = Self::new();
        for (name, specs) in &config.rules {
            let category = PatternCategory::from(name.as_str());
            for spec in specs {
                detector.add_rule(category.clone(), PatternRule::from_spec(spec)?);
            }
        }
        if config.include_default_rules {
            let defaults = Self::with_default_rules();
            for (category, rules) in defaults.groups {
                for rule in rules {
                    detector.add_rule(category.clone(), rule);
                }
            }
        }
        Ok(detector)
    }

    /// Append a rule to its category's list.
    pub fn add_rule(&mut self, category: PatternCategory, rule: PatternRule) {
        match self.groups.iter_mut().find(|(c, _)| *c == category) {
            Some((_, rules)) => rules.push(rule),
            None => self.groups.push((category, vec![rule])),
        }
    }

    /// Get the number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, rules)| rules.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rules for one category, in match order.
    #[must_use]
    pub fn rules(&self, category: &PatternCategory) -> &[PatternRule] {
        self.groups
            .iter()
            .find(|(c, _)| c == category)
            .map_or(&[], |(_, rules)| rules.as_slice())
    }

    /// Classify raw text.
    #[must_use]
    pub fn classify_text(&self, text: &str) -> Vec<PatternMatch> {
        if text.is_empty() {
            return Vec::new();
        }
        self.groups
            .iter()
            .filter_map(|(category, rules)| {
                rules
                    .iter()
                    .find(|rule| rule.matches(text))
                    .map(|rule| {
                        PatternMatch::new(category.clone(), rule.id.clone(), rule.confidence)
                    })
            })
            .collect()
    }
}

impl PatternDetector for RuleDetector {
    fn id(&self) -> &str {
        "rules"
    }

    fn classify(&self, message: &Message) -> Vec<PatternMatch> {
        self.classify_text(&message.text())
    }
}

fn spec(id: &str, pattern: &str, confidence: f64) -> RuleSpec {
    RuleSpec {
        id: id.to_string(),
        pattern: pattern.to_string(),
        confidence,
    }
}

/// Built-in rules, per category, in match order.
#[must_use]
pub fn default_rules() -> Vec<(PatternCategory, Vec<RuleSpec>)> {
    vec![
        (
            PatternCategory::Error,
            vec![
                spec(
                    "error.stack_trace",
                    r"(?m)(Traceback \(most recent call last\)|thread '[^']*' panicked at|^\s+at [\w$.<>]+\(.*:\d+\))",
                    0.9,
                ),
                spec("error.compiler", r"(?m)^error(\[E\d{4}\])?: ", 0.9),
                spec(
                    "error.keyword",
                    r"(?i)\b(error|exception|failed|failure|fatal)\b",
                    0.5,
                ),
            ],
        ),
        (
            PatternCategory::ArchitecturalDecision,
            vec![
                spec(
                    "decision.explicit",
                    r"(?i)(\bwe (decided|chose|will go with)\b|\bdecision:|\badr[- ]?\d+\b|\barchitectural decision\b)",
                    1.0,
                ),
                spec(
                    "decision.tradeoff",
                    r"(?i)\b(trade-?offs?|alternatives? considered|pros and cons)\b",
                    0.6,
                ),
                spec(
                    "decision.design",
                    r"(?i)\b(architecture|design pattern|module boundar(y|ies)|data model|schema design)\b",
                    0.5,
                ),
            ],
        ),
        (
            PatternCategory::HookLog,
            vec![
                spec(
                    "hook.event",
                    r"\b(PreToolUse|PostToolUse|UserPromptSubmit|SessionStart|SubagentStop|PreCompact)\b",
                    1.0,
                ),
                spec(
                    "hook.output",
                    r"(?i)(\bhook (succeeded|failed|output|blocked)\b|<[a-z-]*hook[a-z-]*>)",
                    0.8,
                ),
            ],
        ),
        (
            PatternCategory::SystemValidation,
            vec![
                spec(
                    "validation.result",
                    r"(?i)(\ball tests pass(ed)?\b|test result: ok|\bbuild succeeded\b|\bvalidation (passed|failed)\b)",
                    1.0,
                ),
                spec("validation.reminder", r"<system-reminder>", 0.8),
                spec(
                    "validation.command",
                    r"(?i)\b(cargo (test|check|clippy)|npm (test|run lint)|pytest|go test)\b",
                    0.6,
                ),
            ],
        ),
        (
            PatternCategory::Code,
            vec![spec(
                "code.signature",
                r"(?m)^\s*(pub\s+)?(fn|def|class|impl|struct|interface|function|func)\s+\w+",
                0.7,
            )],
        ),
    ]
}
