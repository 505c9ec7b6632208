//! Threshold scan turning clusters, predictions and history into insights

use super::clustering::Cluster;
use super::corpus::{Corpus, VideoProfile};
use super::prediction::ViralPrediction;
use crate::account::AccountContext;
use crate::config::AnalyticsConfig;
use crate::error::{BrainError, Result};
use crate::stats::{mean, std_dev};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

const OPPORTUNITY_MIN_SCORE: f64 = 70.0;
const OPPORTUNITY_MAX_VIDEOS: usize = 5;
const VIRAL_RECENT_VIDEOS: usize = 10;
const VIRAL_MIN_PROBABILITY: f64 = 0.5;
const VIRAL_MIN_CONFIDENCE: f64 = 60.0;
const GAP_MAX_SHARE: f64 = 0.05;
const ANOMALY_RECENT_VIDEOS: usize = 5;
const ANOMALY_MIN_BASELINE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    ClusterOpportunity,
    ViralPrediction,
    ContentGap,
    PerformanceAnomaly,
}

impl InsightKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightKind::ClusterOpportunity => "cluster_opportunity",
            InsightKind::ViralPrediction => "viral_prediction",
            InsightKind::ContentGap => "content_gap",
            InsightKind::PerformanceAnomaly => "performance_anomaly",
        }
    }
}

impl fmt::Display for InsightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InsightKind {
    type Err = BrainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cluster_opportunity" => Ok(InsightKind::ClusterOpportunity),
            "viral_prediction" => Ok(InsightKind::ViralPrediction),
            "content_gap" => Ok(InsightKind::ContentGap),
            "performance_anomaly" => Ok(InsightKind::PerformanceAnomaly),
            other => Err(BrainError::validation(
                "kind",
                format!("Unknown insight kind '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl FromStr for Priority {
    type Err = BrainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(BrainError::validation(
                "priority",
                format!("Unknown priority '{}'", other),
            )),
        }
    }
}

/// An actionable observation about an owner's catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// Derived from owner, kind and subject so regeneration is idempotent
    pub id: String,
    pub owner_id: String,
    pub kind: InsightKind,
    /// Cluster id, video id, theme or `video_id:metric`
    pub subject: String,
    pub priority: Priority,
    /// 0-100
    pub confidence: f64,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub dismissed: bool,
}

impl Insight {
    fn new(
        owner_id: &str,
        kind: InsightKind,
        subject: impl Into<String>,
        priority: Priority,
        confidence: f64,
        title: String,
        description: String,
    ) -> Self {
        let subject = subject.into();
        Self {
            id: insight_id(owner_id, kind, &subject),
            owner_id: owner_id.to_string(),
            kind,
            subject,
            priority,
            confidence: confidence.clamp(0.0, 100.0),
            title,
            description,
            created_at: Utc::now(),
            dismissed: false,
        }
    }
}

pub fn insight_id(owner_id: &str, kind: InsightKind, subject: &str) -> String {
    let key = format!("{}\n{}\n{}", owner_id, kind.as_str(), subject);
    blake3::hash(key.as_bytes()).to_hex()[..16].to_string()
}

/// Persistence for surfaced insights
pub trait InsightStore: Send + Sync {
    /// Insert new insights and refresh existing ones, keeping their dismissed
    /// flag and creation time
    fn save(&self, insights: &[Insight]) -> Result<()>;

    /// Stored insights, highest priority first
    fn list(&self, owner_id: &str, include_dismissed: bool) -> Result<Vec<Insight>>;

    fn dismiss(&self, owner_id: &str, insight_id: &str) -> Result<()>;

    /// Subjects of every stored insight of a kind, dismissed or not
    fn flagged_subjects(&self, owner_id: &str, kind: InsightKind) -> Result<HashSet<String>>;
}

#[derive(Debug, Clone, Copy)]
pub struct InsightParams {
    pub confidence_floor: f64,
    pub anomaly_std_devs: f64,
}

impl Default for InsightParams {
    fn default() -> Self {
        Self {
            confidence_floor: 50.0,
            anomaly_std_devs: 2.0,
        }
    }
}

impl From<&AnalyticsConfig> for InsightParams {
    fn from(config: &AnalyticsConfig) -> Self {
        Self {
            confidence_floor: config.insight_confidence_floor,
            anomaly_std_devs: config.anomaly_std_devs,
        }
    }
}

/// Everything the scan looks at
pub struct InsightInputs<'a> {
    pub corpus: &'a Corpus,
    pub clusters: &'a [Cluster],
    /// Predictions keyed by video id
    pub predictions: &'a HashMap<String, ViralPrediction>,
    pub context: Option<&'a AccountContext>,
    /// Videos already covered by a stored viral prediction insight
    pub flagged_videos: &'a HashSet<String>,
}

/// Videos whose predictions the viral scan needs
pub fn viral_candidates(corpus: &Corpus) -> Vec<String> {
    corpus
        .most_recent(VIRAL_RECENT_VIDEOS)
        .into_iter()
        .map(|p| p.video_id.clone())
        .collect()
}

/// Run every scan and keep insights at or above the confidence floor,
/// highest priority then highest confidence first
pub fn generate(inputs: &InsightInputs<'_>, params: &InsightParams) -> Vec<Insight> {
    let owner_id = inputs.corpus.owner_id.as_str();

    let mut insights = Vec::new();
    insights.extend(cluster_opportunities(owner_id, inputs.clusters));
    insights.extend(viral_flags(inputs));
    if let Some(context) = inputs.context {
        insights.extend(content_gaps(inputs.corpus, context));
    }
    insights.extend(anomalies(inputs.corpus, params.anomaly_std_devs));

    insights.retain(|i| i.confidence >= params.confidence_floor);
    insights.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
            .then_with(|| a.id.cmp(&b.id))
    });
    insights
}

fn cluster_opportunities(owner_id: &str, clusters: &[Cluster]) -> Vec<Insight> {
    clusters
        .iter()
        .filter(|c| {
            c.optimization_score >= OPPORTUNITY_MIN_SCORE && c.video_count <= OPPORTUNITY_MAX_VIDEOS
        })
        .map(|c| {
            let priority = if c.optimization_score >= 85.0 {
                Priority::High
            } else {
                Priority::Medium
            };
            Insight::new(
                owner_id,
                InsightKind::ClusterOpportunity,
                c.id.clone(),
                priority,
                c.optimization_score,
                format!("Make more '{}' content", c.name),
                format!(
                    "{} videos in this cluster score {:.0}/100 against your catalog average, \
                     but you have only made {} of them.",
                    c.video_count, c.optimization_score, c.video_count
                ),
            )
        })
        .collect()
}

fn viral_flags(inputs: &InsightInputs<'_>) -> Vec<Insight> {
    let owner_id = inputs.corpus.owner_id.as_str();
    viral_candidates(inputs.corpus)
        .into_iter()
        .filter(|id| !inputs.flagged_videos.contains(id))
        .filter_map(|id| inputs.predictions.get(&id))
        .filter(|p| {
            p.viral_probability >= VIRAL_MIN_PROBABILITY
                && p.confidence_score >= VIRAL_MIN_CONFIDENCE
        })
        .map(|p| {
            let priority = if p.viral_probability >= 0.75 {
                Priority::High
            } else {
                Priority::Medium
            };
            Insight::new(
                owner_id,
                InsightKind::ViralPrediction,
                p.video_id.clone(),
                priority,
                p.confidence_score,
                format!("Video {} looks like a breakout", p.video_id),
                format!(
                    "{:.0}% of its closest matches beat your top-10% view count; \
                     expected around {:.0} views.",
                    p.viral_probability * 100.0,
                    p.predicted_views
                ),
            )
        })
        .collect()
}

fn content_gaps(corpus: &Corpus, context: &AccountContext) -> Vec<Insight> {
    let total = corpus.len();
    if total == 0 {
        return Vec::new();
    }
    // More catalog means more certainty that a gap is real
    let confidence = 100.0 * (1.0 - (-(total as f64) / 10.0).exp());

    context
        .strategic_topics()
        .into_iter()
        .filter_map(|topic| {
            let covered = corpus.profiles().iter().filter(|p| p.mentions(&topic)).count();
            let share = covered as f64 / total as f64;
            if share >= GAP_MAX_SHARE {
                return None;
            }

            let (priority, title) = if covered == 0 {
                (Priority::High, format!("No content yet on '{}'", topic))
            } else {
                (Priority::Medium, format!("'{}' is underrepresented", topic))
            };
            Some(Insight::new(
                &corpus.owner_id,
                InsightKind::ContentGap,
                topic.to_lowercase(),
                priority,
                confidence,
                title,
                format!(
                    "'{}' is part of your strategy but appears in {} of {} indexed videos.",
                    topic, covered, total
                ),
            ))
        })
        .collect()
}

type MetricPick = fn(&VideoProfile) -> Option<f64>;

const ANOMALY_METRICS: [(&str, MetricPick); 4] = [
    ("retention_pct", |p| p.metrics.retention_pct),
    ("saves_per_1k", |p| p.metrics.saves_per_1k),
    ("follows_per_1k", |p| p.metrics.follows_per_1k),
    ("for_you_pct", |p| p.metrics.for_you_pct),
];

fn anomalies(corpus: &Corpus, std_devs: f64) -> Vec<Insight> {
    let ordered = corpus.chronological();
    let start = ordered.len().saturating_sub(ANOMALY_RECENT_VIDEOS);
    let mut insights = Vec::new();

    for (position, video) in ordered.iter().enumerate().skip(start) {
        for (metric, pick) in ANOMALY_METRICS {
            let Some(value) = pick(video) else {
                continue;
            };
            let baseline: Vec<f64> = ordered[..position].iter().filter_map(|p| pick(p)).collect();
            if baseline.len() < ANOMALY_MIN_BASELINE {
                continue;
            }
            let spread = std_dev(&baseline);
            if spread <= f64::EPSILON {
                continue;
            }

            let z = (value - mean(&baseline)) / spread;
            if z.abs() <= std_devs {
                continue;
            }

            let direction = if z > 0.0 { "spike" } else { "drop" };
            let priority = if z.abs() >= std_devs + 1.0 {
                Priority::High
            } else {
                Priority::Medium
            };
            insights.push(Insight::new(
                &corpus.owner_id,
                InsightKind::PerformanceAnomaly,
                format!("{}:{}", video.video_id, metric),
                priority,
                100.0 * (1.0 - (-z.abs() / 2.0).exp()),
                format!("Unusual {} {} on video {}", metric, direction, video.video_id),
                format!(
                    "{} is {:.1} standard deviations from its baseline of {} earlier videos.",
                    metric,
                    z.abs(),
                    baseline.len()
                ),
            ));
        }
    }
    insights
}
