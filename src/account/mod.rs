//! Per-owner account context: strategy metadata and ranking weights

mod feedback;

pub use feedback::{
    nudge_weights, IdeaOutcome, MetricBaseline, OutcomeMetrics, OutcomeStatus, WeightBounds,
};

use crate::config::ScoringWeights;
use crate::error::{BrainError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Relative importance of the three engagement metrics an owner optimises for.
/// Always sums to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricWeights {
    pub retention: f64,
    pub saves: f64,
    pub follows: f64,
}

impl Default for MetricWeights {
    fn default() -> Self {
        Self {
            retention: 0.4,
            saves: 0.35,
            follows: 0.25,
        }
    }
}

impl MetricWeights {
    pub fn sum(&self) -> f64 {
        self.retention + self.saves + self.follows
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.retention, self.saves, self.follows]
    }

    pub fn from_array(values: [f64; 3]) -> Self {
        Self {
            retention: values[0],
            saves: values[1],
            follows: values[2],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self
            .as_array()
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
        {
            return Err(BrainError::validation(
                "weights",
                "Metric weights must be finite and non-negative",
            ));
        }
        if (self.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(BrainError::validation(
                "weights",
                format!("Metric weights must sum to 1, got {:.4}", self.sum()),
            ));
        }
        Ok(())
    }

    /// Spread the ranking's metric budget (retention + saves + follows) across
    /// the three metrics in these proportions
    pub fn apply_to(&self, base: &ScoringWeights) -> ScoringWeights {
        let budget = base.retention + base.saves + base.follows;
        ScoringWeights {
            retention: budget * self.retention,
            saves: budget * self.saves,
            follows: budget * self.follows,
            ..*base
        }
    }
}

/// Strategy metadata and metric weights for one owner.
/// Created on first save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountContext {
    pub owner_id: String,
    #[serde(default)]
    pub mission: Option<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub strategic_bets: Vec<String>,
    #[serde(default)]
    pub weights: MetricWeights,
    pub updated_at: DateTime<Utc>,
}

impl AccountContext {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            mission: None,
            themes: Vec::new(),
            strategic_bets: Vec::new(),
            weights: MetricWeights::default(),
            updated_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.owner_id.trim().is_empty() {
            return Err(BrainError::validation("owner_id", "Owner id cannot be empty"));
        }
        self.weights.validate()
    }

    /// Themes and bets the owner wants covered, trimmed and deduplicated
    pub fn strategic_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = Vec::new();
        for topic in self.themes.iter().chain(self.strategic_bets.iter()) {
            let topic = topic.trim();
            if topic.is_empty() {
                continue;
            }
            if !topics.iter().any(|t| t.eq_ignore_ascii_case(topic)) {
                topics.push(topic.to_string());
            }
        }
        topics
    }
}

/// Persistence for account contexts and the outcome audit log
pub trait AccountStore: Send + Sync {
    fn get(&self, owner_id: &str) -> Result<Option<AccountContext>>;

    fn save(&self, context: &AccountContext) -> Result<()>;

    fn record_outcome(&self, outcome: &IdeaOutcome) -> Result<()>;

    /// Recorded outcomes, newest first
    fn outcomes(&self, owner_id: &str) -> Result<Vec<IdeaOutcome>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_valid() {
        let weights = MetricWeights::default();
        assert!(weights.validate().is_ok());
        assert!((weights.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let weights = MetricWeights {
            retention: 0.5,
            saves: 0.5,
            follows: 0.5,
        };
        assert!(weights.validate().is_err());

        let weights = MetricWeights {
            retention: 1.2,
            saves: -0.1,
            follows: -0.1,
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_apply_keeps_metric_budget() {
        let base = ScoringWeights::default();
        let weights = MetricWeights {
            retention: 0.2,
            saves: 0.6,
            follows: 0.2,
        };

        let applied = weights.apply_to(&base);
        let budget = applied.retention + applied.saves + applied.follows;
        assert!((budget - 0.45).abs() < 1e-9);
        assert!((applied.saves - 0.27).abs() < 1e-9);
        assert_eq!(applied.similarity, base.similarity);
        assert_eq!(applied.recency, base.recency);
    }

    #[test]
    fn test_strategic_topics_dedup() {
        let mut context = AccountContext::new("alice");
        context.themes = vec!["Cooking".to_string(), " ".to_string()];
        context.strategic_bets = vec!["cooking".to_string(), "meal prep".to_string()];

        assert_eq!(context.strategic_topics(), vec!["Cooking", "meal prep"]);
    }
}
