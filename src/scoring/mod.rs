pub mod engine;

pub use engine::{score, ScoreBreakdown, Scorer, WeightedScorer, RECENCY_PERIOD_DAYS};
