//! Ordered collection of detectors.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::PatternConfig;
use crate::ingest::Message;

use super::builtin::{CodeBlockDetector, ToolErrorDetector};
use super::detector::{PatternDetector, PatternMatch};
use super::rules::{RuleDetector, RuleError};

/// Runs every registered detector against a message and unions the results.
#[derive(Clone, Default)]
pub struct DetectorRegistry {
    detectors: Vec<Arc<dyn PatternDetector>>,
}

impl std::fmt::Debug for DetectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorRegistry")
            .field(
                "detectors",
                &self.detectors.iter().map(|d| d.id()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl DetectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry described by configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured rule does not compile.
    pub fn from_config(config: &PatternConfig) -> Result<Self, RuleError> {
        let mut registry = Self::new();
        let rules = RuleDetector::from_config(config)?;
        if !rules.is_empty() {
            registry.register(Arc::new(rules));
        }
        if config.code_blocks {
            registry.register(Arc::new(CodeBlockDetector));
        }
        if config.tool_errors {
            registry.register(Arc::new(ToolErrorDetector));
        }
        tracing::debug!(detectors = registry.len(), "Detector registry built");
        Ok(registry)
    }

    /// Registry with built-in rules and structural detectors.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(RuleDetector::with_default_rules()));
        registry.register(Arc::new(CodeBlockDetector));
        registry.register(Arc::new(ToolErrorDetector));
        registry
    }

    /// Add a detector. Detectors run in registration order.
    pub fn register(&mut self, detector: Arc<dyn PatternDetector>) {
        self.detectors.push(detector);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Ids of registered detectors, in order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.id()).collect()
    }

    /// Union of all detector results. A `(category, rule_id)` pair reported by
    /// more than one detector is kept once, first occurrence wins.
    #[must_use]
    pub fn classify(&self, message: &Message) -> Vec<PatternMatch> {
        let mut seen = HashSet::new();
        let mut matches = Vec::new();
        for detector in &self.detectors {
            for m in detector.classify(message) {
                if seen.insert((m.category.clone(), m.rule_id.clone())) {
                    matches.push(m);
                }
            }
        }
        matches
    }
}
