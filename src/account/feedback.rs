//! Outcome feedback: bounded nudges of the metric weights

use super::MetricWeights;
use crate::config::LearningConfig;
use crate::error::{BrainError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failure,
    Pending,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Failure => "failure",
            OutcomeStatus::Pending => "pending",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutcomeStatus {
    type Err = BrainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "success" => Ok(OutcomeStatus::Success),
            "failure" => Ok(OutcomeStatus::Failure),
            "pending" => Ok(OutcomeStatus::Pending),
            other => Err(BrainError::validation(
                "status",
                format!("Unknown outcome status '{}'", other),
            )),
        }
    }
}

/// Measured performance of a published idea
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeMetrics {
    #[serde(default)]
    pub retention_pct: Option<f64>,
    #[serde(default)]
    pub saves_per_1k: Option<f64>,
    #[serde(default)]
    pub follows_per_1k: Option<f64>,
}

impl OutcomeMetrics {
    fn as_array(&self) -> [Option<f64>; 3] {
        [self.retention_pct, self.saves_per_1k, self.follows_per_1k]
    }

    pub fn is_empty(&self) -> bool {
        self.as_array().iter().all(Option::is_none)
    }
}

/// A content idea and what happened when it was published
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaOutcome {
    pub owner_id: String,
    pub idea_title: String,
    pub status: OutcomeStatus,
    #[serde(default)]
    pub metrics: Option<OutcomeMetrics>,
    #[serde(default = "Utc::now")]
    pub recorded_at: DateTime<Utc>,
}

impl IdeaOutcome {
    pub fn validate(&self) -> Result<()> {
        if self.owner_id.trim().is_empty() {
            return Err(BrainError::validation("owner_id", "Owner id cannot be empty"));
        }
        if self.idea_title.trim().is_empty() {
            return Err(BrainError::validation(
                "idea_title",
                "Idea title cannot be empty",
            ));
        }
        if let Some(metrics) = &self.metrics {
            if metrics
                .as_array()
                .iter()
                .flatten()
                .any(|v| !v.is_finite() || *v < 0.0)
            {
                return Err(BrainError::validation(
                    "metrics",
                    "Outcome metrics must be finite and non-negative",
                ));
            }
        }
        Ok(())
    }

    /// Whether this outcome should move the weights
    pub fn is_measured_success(&self) -> bool {
        self.status == OutcomeStatus::Success
            && self.metrics.as_ref().is_some_and(|m| !m.is_empty())
    }
}

/// Reference values an outcome's metrics are compared against
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricBaseline {
    pub retention_pct: f64,
    pub saves_per_1k: f64,
    pub follows_per_1k: f64,
}

impl Default for MetricBaseline {
    fn default() -> Self {
        Self {
            retention_pct: 40.0,
            saves_per_1k: 10.0,
            follows_per_1k: 2.0,
        }
    }
}

impl MetricBaseline {
    /// Baseline from corpus medians; a metric with no positive median keeps
    /// its default
    pub fn from_medians(retention: Option<f64>, saves: Option<f64>, follows: Option<f64>) -> Self {
        let default = Self::default();
        let pick = |median: Option<f64>, fallback: f64| {
            median.filter(|m| m.is_finite() && *m > 0.0).unwrap_or(fallback)
        };
        Self {
            retention_pct: pick(retention, default.retention_pct),
            saves_per_1k: pick(saves, default.saves_per_1k),
            follows_per_1k: pick(follows, default.follows_per_1k),
        }
    }

    fn as_array(&self) -> [f64; 3] {
        [self.retention_pct, self.saves_per_1k, self.follows_per_1k]
    }
}

/// Step size and per-weight bounds of the feedback loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightBounds {
    pub learning_rate: f64,
    pub min_weight: f64,
    pub max_weight: f64,
}

impl Default for WeightBounds {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            min_weight: 0.1,
            max_weight: 0.8,
        }
    }
}

impl From<&LearningConfig> for WeightBounds {
    fn from(config: &LearningConfig) -> Self {
        Self {
            learning_rate: config.learning_rate,
            min_weight: config.min_weight,
            max_weight: config.max_weight,
        }
    }
}

/// Move the weights one step toward the metric the outcome beat its baseline
/// by the most, then project back into bounds with a sum of 1.
///
/// Anything other than a measured success leaves the weights unchanged, as
/// does an outcome that beat no baseline.
pub fn nudge_weights(
    old: &MetricWeights,
    outcome: &IdeaOutcome,
    baseline: &MetricBaseline,
    bounds: &WeightBounds,
) -> MetricWeights {
    if !outcome.is_measured_success() {
        return *old;
    }
    let Some(metrics) = &outcome.metrics else {
        return *old;
    };

    let targets = baseline.as_array();
    let mut best: Option<(usize, f64)> = None;
    for (index, measured) in metrics.as_array().iter().enumerate() {
        let (Some(measured), target) = (measured, targets[index]) else {
            continue;
        };
        if target <= 0.0 {
            continue;
        }
        let lift = (measured - target) / target;
        if lift > 0.0 && best.map_or(true, |(_, b)| lift > b) {
            best = Some((index, lift));
        }
    }

    let Some((winner, _)) = best else {
        return *old;
    };

    let mut weights = old.as_array();
    weights[winner] += bounds.learning_rate;
    MetricWeights::from_array(project(weights, bounds.min_weight, bounds.max_weight))
}

/// Clamp into [min, max] and spread the residual over weights that still have
/// room until the sum is 1
fn project(mut weights: [f64; 3], min: f64, max: f64) -> [f64; 3] {
    for _ in 0..8 {
        for w in weights.iter_mut() {
            *w = w.clamp(min, max);
        }
        let residual = 1.0 - weights.iter().sum::<f64>();
        if residual.abs() < 1e-12 {
            break;
        }

        let free: Vec<usize> = (0..weights.len())
            .filter(|&i| {
                if residual > 0.0 {
                    weights[i] < max
                } else {
                    weights[i] > min
                }
            })
            .collect();
        if free.is_empty() {
            break;
        }

        let share = residual / free.len() as f64;
        for i in free {
            weights[i] += share;
        }
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: OutcomeStatus, metrics: Option<OutcomeMetrics>) -> IdeaOutcome {
        IdeaOutcome {
            owner_id: "alice".to_string(),
            idea_title: "Batch cooking in 10 minutes".to_string(),
            status,
            metrics,
            recorded_at: Utc::now(),
        }
    }

    fn saves_win() -> Option<OutcomeMetrics> {
        Some(OutcomeMetrics {
            retention_pct: Some(42.0),
            saves_per_1k: Some(25.0),
            follows_per_1k: Some(1.0),
        })
    }

    fn assert_invariants(weights: &MetricWeights, bounds: &WeightBounds) {
        assert!((weights.sum() - 1.0).abs() < 1e-9, "sum was {}", weights.sum());
        for w in weights.as_array() {
            assert!(w >= bounds.min_weight - 1e-9 && w <= bounds.max_weight + 1e-9);
        }
    }

    #[test]
    fn test_success_moves_toward_best_lift() {
        let old = MetricWeights::default();
        let bounds = WeightBounds::default();
        let new = nudge_weights(
            &old,
            &outcome(OutcomeStatus::Success, saves_win()),
            &MetricBaseline::default(),
            &bounds,
        );

        assert!(new.saves > old.saves);
        assert!(new.retention < old.retention);
        assert_invariants(&new, &bounds);
    }

    #[test]
    fn test_non_success_is_noop() {
        let old = MetricWeights::default();
        let bounds = WeightBounds::default();
        let baseline = MetricBaseline::default();

        for status in [OutcomeStatus::Failure, OutcomeStatus::Pending] {
            let new = nudge_weights(&old, &outcome(status, saves_win()), &baseline, &bounds);
            assert_eq!(new, old);
        }

        let new = nudge_weights(&old, &outcome(OutcomeStatus::Success, None), &baseline, &bounds);
        assert_eq!(new, old);
    }

    #[test]
    fn test_no_positive_lift_is_noop() {
        let old = MetricWeights::default();
        let metrics = Some(OutcomeMetrics {
            retention_pct: Some(10.0),
            saves_per_1k: None,
            follows_per_1k: Some(0.5),
        });
        let new = nudge_weights(
            &old,
            &outcome(OutcomeStatus::Success, metrics),
            &MetricBaseline::default(),
            &WeightBounds::default(),
        );
        assert_eq!(new, old);
    }

    #[test]
    fn test_repeated_nudges_stay_bounded() {
        let bounds = WeightBounds::default();
        let baseline = MetricBaseline::default();
        let win = outcome(OutcomeStatus::Success, saves_win());

        let mut weights = MetricWeights::default();
        for _ in 0..50 {
            weights = nudge_weights(&weights, &win, &baseline, &bounds);
            assert_invariants(&weights, &bounds);
        }
        assert!((weights.saves - bounds.max_weight).abs() < 1e-9);
        assert!((weights.retention - bounds.min_weight).abs() < 1e-9);
    }

    #[test]
    fn test_baseline_from_medians_falls_back() {
        let baseline = MetricBaseline::from_medians(Some(55.0), None, Some(0.0));
        assert_eq!(baseline.retention_pct, 55.0);
        assert_eq!(baseline.saves_per_1k, 10.0);
        assert_eq!(baseline.follows_per_1k, 2.0);
    }

    #[test]
    fn test_outcome_validation() {
        let mut bad = outcome(OutcomeStatus::Success, saves_win());
        bad.idea_title = "  ".to_string();
        assert!(bad.validate().is_err());

        let bad = outcome(
            OutcomeStatus::Success,
            Some(OutcomeMetrics {
                retention_pct: Some(f64::NAN),
                ..Default::default()
            }),
        );
        assert!(bad.validate().is_err());

        assert_eq!("SUCCESS".parse::<OutcomeStatus>().unwrap(), OutcomeStatus::Success);
        assert!("maybe".parse::<OutcomeStatus>().is_err());
    }
}
