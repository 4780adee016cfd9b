//! Importance scoring from structure and content matches.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ScoringConfig;
use crate::graph::FlowAnnotation;
use crate::ingest::{Message, MessageKind};
use crate::pattern::PatternMatch;

use super::decay::age_hours;

/// Contribution of each scoring component before decay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    /// Sum of category weight times confidence over all matches.
    pub patterns: f64,
    /// Bonus for messages with more than one child.
    pub branch_point: f64,
    /// Bonus for messages on the primary chain.
    pub primary_chain: f64,
}

impl ScoreBreakdown {
    #[must_use]
    pub fn total(&self) -> f64 {
        self.patterns + self.branch_point + self.primary_chain
    }
}

/// Importance of one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Score {
    /// Final value in `[0, max_score]`.
    pub value: f64,
    /// Pre-decay value.
    pub raw: f64,
    /// Multiplier from the decay mode, in `[0, 1]`.
    pub decay_factor: f64,
    /// Components of `raw`.
    pub breakdown: ScoreBreakdown,
}

/// A message together with everything derived for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredMessage {
    pub uuid: String,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    /// 1-based line in the source file.
    pub line_number: u64,
    /// Flow position the score was computed from.
    pub annotation: FlowAnnotation,
    /// Classifications that contributed to the score.
    pub matches: Vec<PatternMatch>,
    pub score: Score,
}

/// Pure scoring function parameterized by [`ScoringConfig`].
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    #[must_use]
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score one message against `reference`.
    #[must_use]
    pub fn score(
        &self,
        message: &Message,
        annotation: &FlowAnnotation,
        matches: &[PatternMatch],
        reference: DateTime<Utc>,
    ) -> Score {
        let patterns: f64 = matches
            .iter()
            .map(|m| self.config.weight(&m.category) * m.confidence)
            .sum();
        let breakdown = ScoreBreakdown {
            patterns,
            branch_point: if annotation.is_branch_point() {
                self.config.branch_point_bonus
            } else {
                0.0
            },
            primary_chain: if annotation.on_primary_chain {
                self.config.primary_chain_bonus
            } else {
                0.0
            },
        };

        let raw = breakdown.total();
        let decay_factor = self
            .config
            .decay
            .factor(age_hours(message.timestamp, reference));
        let value = (raw * decay_factor).clamp(0.0, self.config.max_score);

        Score {
            value,
            raw,
            decay_factor,
            breakdown,
        }
    }

    /// Score and package a message.
    #[must_use]
    pub fn score_message(
        &self,
        message: &Message,
        annotation: FlowAnnotation,
        matches: Vec<PatternMatch>,
        reference: DateTime<Utc>,
    ) -> ScoredMessage {
        let score = self.score(message, &annotation, &matches, reference);
        ScoredMessage {
            uuid: message.uuid.clone(),
            kind: message.kind,
            timestamp: message.timestamp,
            line_number: message.line_number,
            annotation,
            matches,
            score,
        }
    }
}

/// Sort by score descending; ties go to the newer message, then the smaller uuid.
pub fn rank(scored: &mut [ScoredMessage]) {
    scored.sort_by(|a, b| {
        b.score
            .value
            .total_cmp(&a.score.value)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
            .then_with(|| a.uuid.cmp(&b.uuid))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::PatternCategory;
    use crate::scoring::DecayMode;
    use chrono::{Duration, TimeZone};
    use std::path::PathBuf;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 29, 10, 0, 0).unwrap()
    }

    fn msg(uuid: &str, at: DateTime<Utc>) -> Message {
        Message {
            uuid: uuid.to_string(),
            parent_uuid: None,
            kind: MessageKind::Assistant,
            timestamp: at,
            payload: serde_json::Value::Null,
            session_id: None,
            source_path: PathBuf::from("/tmp/s.jsonl"),
            line_number: 1,
            cwd: None,
        }
    }

    fn no_decay() -> ScoringConfig {
        ScoringConfig {
            decay: DecayMode::None,
            ..ScoringConfig::default()
        }
    }

    #[test]
    fn test_plain_message_scores_zero() {
        let scorer = Scorer::new(no_decay());
        let score = scorer.score(&msg("a", t0()), &FlowAnnotation::default(), &[], t0());
        assert!(score.value.abs() < f64::EPSILON);
        assert!((score.decay_factor - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_components_add_up() {
        let scorer = Scorer::new(no_decay());
        let annotation = FlowAnnotation {
            depth: 2,
            branch_factor: 2,
            height: 3,
            on_primary_chain: true,
        };
        let matches = vec![
            PatternMatch::new(PatternCategory::Error, "error.keyword", 0.5),
            PatternMatch::new(PatternCategory::Code, "code.fenced_block", 1.0),
        ];
        let score = scorer.score(&msg("a", t0()), &annotation, &matches, t0());

        // 25 * 0.5 + 15 * 1.0 + 10 + 5
        assert!((score.raw - 42.5).abs() < 1e-9);
        assert!((score.breakdown.patterns - 27.5).abs() < 1e-9);
        assert!((score.value - 42.5).abs() < 1e-9);
    }

    #[test]
    fn test_value_is_capped() {
        let config = ScoringConfig {
            max_score: 20.0,
            ..no_decay()
        };
        let scorer = Scorer::new(config);
        let matches = vec![PatternMatch::new(
            PatternCategory::ArchitecturalDecision,
            "decision.explicit",
            1.0,
        )];
        let score = scorer.score(&msg("a", t0()), &FlowAnnotation::default(), &matches, t0());
        assert!((score.value - 20.0).abs() < f64::EPSILON);
        assert!((score.raw - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_older_messages_score_lower() {
        let scorer = Scorer::new(ScoringConfig::default());
        let matches = vec![PatternMatch::new(PatternCategory::Error, "e", 1.0)];
        let reference = t0() + Duration::hours(48);
        let old = scorer.score(&msg("a", t0()), &FlowAnnotation::default(), &matches, reference);
        let new = scorer.score(
            &msg("b", reference),
            &FlowAnnotation::default(),
            &matches,
            reference,
        );
        assert!(old.value < new.value);
        assert!((old.raw - new.raw).abs() < f64::EPSILON);
    }

    #[test]
    fn test_custom_category_uses_fallback_weight() {
        let scorer = Scorer::new(no_decay());
        let matches = vec![PatternMatch::new(
            PatternCategory::Custom("security".to_string()),
            "security.secret",
            1.0,
        )];
        let score = scorer.score(&msg("a", t0()), &FlowAnnotation::default(), &matches, t0());
        assert!((score.raw - scorer.config().custom_category_weight).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rank_orders_by_value_then_recency() {
        let scorer = Scorer::new(no_decay());
        let error = vec![PatternMatch::new(PatternCategory::Error, "e", 1.0)];
        let mut scored = vec![
            scorer.score_message(&msg("low", t0()), FlowAnnotation::default(), vec![], t0()),
            scorer.score_message(&msg("old", t0()), FlowAnnotation::default(), error.clone(), t0()),
            scorer.score_message(
                &msg("new", t0() + Duration::seconds(1)),
                FlowAnnotation::default(),
                error,
                t0(),
            ),
        ];
        rank(&mut scored);
        let order: Vec<_> = scored.iter().map(|s| s.uuid.as_str()).collect();
        assert_eq!(order, vec!["new", "old", "low"]);
    }
}
