//! Detector contract and match types.

use serde::{Deserialize, Serialize};

use crate::ingest::Message;

/// Content category a detector can assign.
///
/// The built-in set is fixed; `Custom` carries categories introduced by
/// configuration or additional detectors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PatternCategory {
    Code,
    Error,
    ArchitecturalDecision,
    HookLog,
    SystemValidation,
    Custom(String),
}

impl PatternCategory {
    /// Canonical snake_case name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Code => "code",
            Self::Error => "error",
            Self::ArchitecturalDecision => "architectural_decision",
            Self::HookLog => "hook_log",
            Self::SystemValidation => "system_validation",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for PatternCategory {
    fn from(name: String) -> Self {
        match name.as_str() {
            "code" => Self::Code,
            "error" => Self::Error,
            "architectural_decision" | "architectural-decision" => Self::ArchitecturalDecision,
            "hook_log" | "hook-log" => Self::HookLog,
            "system_validation" | "system-validation" => Self::SystemValidation,
            _ => Self::Custom(name),
        }
    }
}

impl From<&str> for PatternCategory {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<PatternCategory> for String {
    fn from(category: PatternCategory) -> Self {
        category.as_str().to_string()
    }
}

impl std::fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classification result for a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternMatch {
    pub category: PatternCategory,
    /// Identifier of the rule that matched, e.g. `error.tool_result`.
    pub rule_id: String,
    /// Strength of the match in `[0, 1]`.
    pub confidence: f64,
}

impl PatternMatch {
    #[must_use]
    pub fn new(category: PatternCategory, rule_id: impl Into<String>, confidence: f64) -> Self {
        Self {
            category,
            rule_id: rule_id.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// A content classifier.
///
/// Implementations must be pure functions of the message: no side effects
/// and no dependence on other detectors or call order.
pub trait PatternDetector: Send + Sync {
    /// Stable identifier, used in logs.
    fn id(&self) -> &str;

    /// Classify one message. An empty result means no match.
    fn classify(&self, message: &Message) -> Vec<PatternMatch>;
}
