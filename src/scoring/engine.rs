use serde::{Deserialize, Serialize};

use crate::config::{DecayMode, WeightConfig};
use crate::types::{ContentHash, Metric, RepositoryRecord, ScoredRecord};

/// Days per unit of the linear `recency_decay` term.
pub const RECENCY_PERIOD_DAYS: f64 = 30.0;

/// Individual contributions behind a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Weighted (and possibly decayed) metric terms, in metric order.
    pub metric_terms: Vec<(Metric, f64)>,
    pub recency_term: f64,
    pub license_id: String,
    pub license_term: f64,
}

pub trait Scorer {
    fn breakdown(&self, record: &RepositoryRecord) -> ScoreBreakdown;

    fn score_value(&self, breakdown: &ScoreBreakdown) -> f64 {
        // fixed summation order keeps results bit-identical across runs
        let metrics: f64 = breakdown.metric_terms.iter().map(|(_, term)| term).sum();
        metrics + breakdown.recency_term + breakdown.license_term
    }

    fn score(&self, record: &RepositoryRecord) -> f64 {
        self.score_value(&self.breakdown(record))
    }
}

/// Linear weighted sum with license bonus and optional recency decay.
///
/// Pure: the only time input is the record's own snapshot time. Missing
/// metrics contribute nothing; negative totals are kept as is.
#[derive(Debug, Clone)]
pub struct WeightedScorer<'a> {
    weights: &'a WeightConfig,
    version: ContentHash,
}

impl<'a> WeightedScorer<'a> {
    pub fn new(weights: &'a WeightConfig) -> Self {
        WeightedScorer {
            weights,
            version: weights.version(),
        }
    }

    pub fn weights_version(&self) -> &ContentHash {
        &self.version
    }

    pub fn score_record(&self, record: RepositoryRecord) -> ScoredRecord {
        let score = self.score(&record);
        ScoredRecord {
            record,
            score,
            weights_version: self.version.clone(),
        }
    }
}

impl Scorer for WeightedScorer<'_> {
    fn breakdown(&self, record: &RepositoryRecord) -> ScoreBreakdown {
        let weights = self.weights;
        let days = record.days_since_commit().map(|d| d as f64);

        let multiplier = match (&weights.decay, days) {
            (Some(decay), Some(days)) if decay.mode == DecayMode::Multiply => {
                Some((decay, decay.factor(days)))
            }
            _ => None,
        };

        let metric_terms = weights
            .metric_weights()
            .map(|(metric, weight)| {
                let value = record.metric(metric).unwrap_or(0.0);
                let mut term = weight * value;
                if let Some((decay, factor)) = multiplier {
                    if decay.covers(metric) {
                        term *= factor;
                    }
                }
                (metric, term)
            })
            .collect();

        let mut recency_term = 0.0;
        if let Some(days) = days {
            if let Some(weight) = weights.recency_decay {
                recency_term += weight * (-days / RECENCY_PERIOD_DAYS);
            }
            if let Some(decay) = weights.decay.as_ref().filter(|d| d.mode == DecayMode::Additive) {
                recency_term += decay.weight * decay.factor(days);
            }
        }

        let license_id = record.license_id().to_string();
        let license_term = weights.license_bonus(&license_id);

        ScoreBreakdown {
            metric_terms,
            recency_term,
            license_id,
            license_term,
        }
    }
}

/// Score of `record` under `weights`.
pub fn score(record: &RepositoryRecord, weights: &WeightConfig) -> f64 {
    WeightedScorer::new(weights).score(record)
}
