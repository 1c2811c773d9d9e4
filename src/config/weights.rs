use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::types::{ContentHash, Metric, NO_LICENSE};

/// Weighting rules for the scoring engine.
///
/// Deserializes from the flat `weights:` mapping: every numeric key other than
/// the reserved ones is a metric weight.
///
/// ```yaml
/// weights:
///   stars: 0.3
///   open_issues: -0.1
///   recency_decay: 2.0
///   license: { MIT: 50, none: -100 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightConfig {
    /// Additive bonus/penalty by exact SPDX id. `none` is the fallback.
    #[serde(default)]
    pub license: BTreeMap<String, f64>,

    /// Linear staleness weight: contributes `-days / 30 * recency_decay`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recency_decay: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decay: Option<RecencyDecay>,

    /// Metric name -> weight. Names are checked by [`WeightConfig::validate`].
    #[serde(flatten)]
    pub metrics: BTreeMap<String, f64>,
}

impl WeightConfig {
    pub fn with_metric(mut self, metric: Metric, weight: f64) -> Self {
        self.metrics.insert(metric.as_str().to_string(), weight);
        self
    }

    pub fn with_license(mut self, license: impl Into<String>, bonus: f64) -> Self {
        self.license.insert(license.into(), bonus);
        self
    }

    pub fn with_recency_weight(mut self, weight: f64) -> Self {
        self.recency_decay = Some(weight);
        self
    }

    pub fn with_decay(mut self, decay: RecencyDecay) -> Self {
        self.decay = Some(decay);
        self
    }

    /// Weight for a metric; unconfigured metrics weigh nothing.
    pub fn weight(&self, metric: Metric) -> f64 {
        self.metrics.get(metric.as_str()).copied().unwrap_or(0.0)
    }

    /// Configured (metric, weight) pairs in [`Metric`] declaration order.
    pub fn metric_weights(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::ALL
            .into_iter()
            .filter_map(|m| self.metrics.get(m.as_str()).map(|w| (m, *w)))
    }

    /// License bonus for an SPDX id. Unknown ids use the `none` entry, which
    /// itself defaults to zero when absent.
    pub fn license_bonus(&self, license_id: &str) -> f64 {
        self.license
            .get(license_id)
            .or_else(|| self.license.get(NO_LICENSE))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, weight) in &self.metrics {
            name.parse::<Metric>()
                .map_err(|e| format!("weights: {e}"))?;
            if !weight.is_finite() {
                return Err(format!("weights.{name} must be finite"));
            }
        }
        for (license, bonus) in &self.license {
            if !bonus.is_finite() {
                return Err(format!("weights.license.{license} must be finite"));
            }
        }
        if let Some(w) = self.recency_decay {
            if !w.is_finite() {
                return Err("weights.recency_decay must be finite".to_string());
            }
        }
        if let Some(decay) = &self.decay {
            decay.validate()?;
        }
        Ok(())
    }

    /// Content hash of the canonical form. Two configs that score every record
    /// identically share a version.
    pub fn version(&self) -> ContentHash {
        // {:?} on f64 prints the shortest round-trip representation
        let mut canonical = String::new();
        for (metric, weight) in self.metric_weights() {
            let _ = writeln!(canonical, "metric:{metric}={weight:?}");
        }
        for (license, bonus) in &self.license {
            let _ = writeln!(canonical, "license:{license}={bonus:?}");
        }
        if let Some(w) = self.recency_decay {
            let _ = writeln!(canonical, "recency_decay={w:?}");
        }
        if let Some(decay) = &self.decay {
            let _ = writeln!(canonical, "decay:{}", decay.canonical());
        }
        ContentHash::from_bytes(canonical.as_bytes())
    }
}

/// Time-decay applied to a subset of metrics from the age of the last commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecencyDecay {
    pub curve: DecayCurve,
    #[serde(default)]
    pub mode: DecayMode,
    /// Metrics scaled in `multiply` mode. Empty means every weighted metric.
    #[serde(default)]
    pub applies_to: Vec<Metric>,
    /// Weight of the factor in `additive` mode.
    #[serde(default = "default_decay_weight")]
    pub weight: f64,
}

fn default_decay_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecayCurve {
    /// `0.5 ^ (days / half_life_days)`
    Exponential { half_life_days: f64 },
    /// `max(0, 1 - days / window_days)`
    Linear { window_days: f64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayMode {
    #[default]
    Multiply,
    Additive,
}

impl RecencyDecay {
    pub fn exponential(half_life_days: f64) -> Self {
        RecencyDecay {
            curve: DecayCurve::Exponential { half_life_days },
            mode: DecayMode::Multiply,
            applies_to: Vec::new(),
            weight: 1.0,
        }
    }

    pub fn linear(window_days: f64) -> Self {
        RecencyDecay {
            curve: DecayCurve::Linear { window_days },
            mode: DecayMode::Multiply,
            applies_to: Vec::new(),
            weight: 1.0,
        }
    }

    pub fn additive(mut self, weight: f64) -> Self {
        self.mode = DecayMode::Additive;
        self.weight = weight;
        self
    }

    pub fn applied_to(mut self, metrics: impl IntoIterator<Item = Metric>) -> Self {
        self.applies_to = metrics.into_iter().collect();
        self
    }

    /// Decay factor in `[0, 1]` for a commit age in days.
    pub fn factor(&self, days: f64) -> f64 {
        let days = days.max(0.0);
        match self.curve {
            DecayCurve::Exponential { half_life_days } => 0.5_f64.powf(days / half_life_days),
            DecayCurve::Linear { window_days } => (1.0 - days / window_days).max(0.0),
        }
    }

    pub fn covers(&self, metric: Metric) -> bool {
        self.applies_to.is_empty() || self.applies_to.contains(&metric)
    }

    fn validate(&self) -> Result<(), String> {
        let span = match self.curve {
            DecayCurve::Exponential { half_life_days } => half_life_days,
            DecayCurve::Linear { window_days } => window_days,
        };
        if !(span.is_finite() && span > 0.0) {
            return Err("weights.decay curve span must be a positive number of days".to_string());
        }
        if !self.weight.is_finite() {
            return Err("weights.decay.weight must be finite".to_string());
        }
        Ok(())
    }

    fn canonical(&self) -> String {
        let mut applies: Vec<&str> = self.applies_to.iter().map(Metric::as_str).collect();
        applies.sort_unstable();
        applies.dedup();
        format!(
            "{:?};{:?};{};{:?}",
            self.curve,
            self.mode,
            applies.join(","),
            self.weight
        )
    }
}
