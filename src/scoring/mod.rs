//! Importance scoring with time decay.

mod decay;
mod scorer;

pub use decay::{age_hours, DecayMode, ReferenceTime};
pub use scorer::{rank, Score, ScoreBreakdown, ScoredMessage, Scorer};
