//! Content classification.
//!
//! Detectors are pure functions from a message to zero or more
//! [`PatternMatch`]es. The [`DetectorRegistry`] runs them in order and
//! unions the results.

mod builtin;
mod detector;
mod registry;
mod rules;

pub use builtin::{CodeBlockDetector, ToolErrorDetector};
pub use detector::{PatternCategory, PatternDetector, PatternMatch};
pub use registry::DetectorRegistry;
pub use rules::{default_rules, PatternRule, RuleDetector, RuleError};
