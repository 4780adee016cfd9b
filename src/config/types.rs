//! Configuration types.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pattern::{PatternCategory, RuleDetector};
use crate::scoring::{DecayMode, ReferenceTime};

use super::ConfigError;

/// Top-level analyzer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub scoring: ScoringConfig,
    pub patterns: PatternConfig,
    pub monitor: MonitorConfig,
    pub batch: BatchConfig,
}

impl AnalyzerConfig {
    /// Check every section.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` describing the first bad value, or
    /// `ConfigError::Rule` if a pattern rule does not compile.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scoring.validate()?;
        RuleDetector::from_config(&self.patterns)?;
        if self.monitor.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "monitor.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.monitor.fingerprint_bytes == 0 {
            return Err(ConfigError::Invalid(
                "monitor.fingerprint_bytes must be greater than 0".to_string(),
            ));
        }
        if self.batch.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "batch.concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Weights and parameters for the importance scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Weight per category name.
    pub category_weights: BTreeMap<String, f64>,
    /// Weight for categories missing from `category_weights`.
    pub custom_category_weight: f64,
    pub branch_point_bonus: f64,
    pub primary_chain_bonus: f64,
    pub max_score: f64,
    pub decay: DecayMode,
    pub reference_time: ReferenceTime,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let category_weights = [
            (PatternCategory::Code, 15.0),
            (PatternCategory::Error, 25.0),
            (PatternCategory::ArchitecturalDecision, 30.0),
            (PatternCategory::HookLog, 5.0),
            (PatternCategory::SystemValidation, 10.0),
        ]
        .into_iter()
        .map(|(category, weight)| (category.as_str().to_string(), weight))
        .collect();

        Self {
            category_weights,
            custom_category_weight: 10.0,
            branch_point_bonus: 10.0,
            primary_chain_bonus: 5.0,
            max_score: 100.0,
            decay: DecayMode::default(),
            reference_time: ReferenceTime::default(),
        }
    }
}

impl ScoringConfig {
    /// Weight for a category.
    #[must_use]
    pub fn weight(&self, category: &PatternCategory) -> f64 {
        self.category_weights
            .get(category.as_str())
            .copied()
            .unwrap_or(self.custom_category_weight)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_score.is_finite() && self.max_score > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "scoring.max_score must be positive, got {}",
                self.max_score
            )));
        }
        let weights = self
            .category_weights
            .iter()
            .map(|(name, w)| (name.as_str(), *w))
            .chain([
                ("custom_category_weight", self.custom_category_weight),
                ("branch_point_bonus", self.branch_point_bonus),
                ("primary_chain_bonus", self.primary_chain_bonus),
            ]);
        for (name, weight) in weights {
            if !weight.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "scoring weight {name} must be finite"
                )));
            }
        }
        self.decay
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("scoring.decay: {e}")))
    }
}

/// A user-defined regex rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub id: String,
    pub pattern: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

/// Which detectors to run and the user rule set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Append the built-in rules after user rules.
    pub include_default_rules: bool,
    /// Run the markdown code block detector.
    pub code_blocks: bool,
    /// Run the failed tool result detector.
    pub tool_errors: bool,
    /// Category name to ordered rules.
    pub rules: BTreeMap<String, Vec<RuleSpec>>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            include_default_rules: true,
            code_blocks: true,
            tool_errors: true,
            rules: BTreeMap::new(),
        }
    }
}

/// Incremental monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
    /// Bytes hashed before the stored offset to detect rewrites.
    pub fingerprint_bytes: u64,
    /// Where per-file state is persisted. `None` keeps state in memory.
    pub state_dir: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            fingerprint_bytes: 4096,
            state_dir: None,
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Default on-disk state location: `<data_local_dir>/session-lens/state`.
    #[must_use]
    pub fn default_state_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|d| d.join("session-lens").join("state"))
    }
}

/// Batch coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum files analysed at once.
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map_or(4, std::num::NonZeroUsize::get),
        }
    }
}
