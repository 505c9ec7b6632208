//! Nearest-neighbour viral potential estimates

use super::corpus::{Corpus, MetricZ, VideoProfile};
use crate::config::AnalyticsConfig;
use crate::content::DurationBucket;
use crate::stats::{cosine_similarity, mean, std_dev};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Mean neighbour z-score a metric needs to count as a success factor
const FACTOR_Z_THRESHOLD: f64 = 0.5;

/// Successful neighbours listed on a prediction
const MAX_SUCCESSFUL_NEIGHBORS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViralPrediction {
    pub video_id: String,
    pub predicted_views: f64,
    /// 0-1
    pub viral_probability: f64,
    /// 0-100
    pub confidence_score: f64,
    pub key_factors: Vec<String>,
    /// Neighbours that went viral, closest first
    pub successful_neighbors: Vec<String>,
    pub neighbor_count: usize,
}

impl ViralPrediction {
    /// Prediction for a video without usable vectors
    pub fn empty(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            predicted_views: 0.0,
            viral_probability: 0.0,
            confidence_score: 0.0,
            key_factors: Vec::new(),
            successful_neighbors: Vec::new(),
            neighbor_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PredictionParams {
    pub neighbors: usize,
    /// Confidence below which a prediction is not usable
    pub confidence_floor: f64,
}

impl Default for PredictionParams {
    fn default() -> Self {
        Self {
            neighbors: 10,
            confidence_floor: 40.0,
        }
    }
}

impl From<&AnalyticsConfig> for PredictionParams {
    fn from(config: &AnalyticsConfig) -> Self {
        Self {
            neighbors: config.prediction_neighbors,
            confidence_floor: config.confidence_floor,
        }
    }
}

struct Neighbor<'a> {
    profile: &'a VideoProfile,
    weight: f64,
}

/// Estimate a video's chance of beating the corpus p90 from its nearest
/// neighbours
pub fn predict_video(corpus: &Corpus, video_id: &str, params: &PredictionParams) -> ViralPrediction {
    let Some(target) = corpus.get(video_id) else {
        return ViralPrediction::empty(video_id);
    };

    let neighbors = nearest(corpus, target, params.neighbors);
    let n = neighbors.len();
    if n == 0 {
        return ViralPrediction::empty(video_id);
    }

    let total_weight: f64 = neighbors.iter().map(|nb| nb.weight).sum();
    let p90 = corpus.views_p90();
    let is_viral = |profile: &VideoProfile| profile.metrics.views as f64 > p90;

    let viral_weight: f64 = neighbors
        .iter()
        .filter(|nb| is_viral(nb.profile))
        .map(|nb| nb.weight)
        .sum();
    let predicted_views = neighbors
        .iter()
        .map(|nb| nb.weight * nb.profile.metrics.views as f64)
        .sum::<f64>()
        / total_weight;

    let views: Vec<f64> = neighbors
        .iter()
        .map(|nb| nb.profile.metrics.views as f64)
        .collect();
    let mean_views = mean(&views);
    let cv = if mean_views > 0.0 {
        std_dev(&views) / mean_views
    } else {
        0.0
    };

    let mut confidence = 100.0 * (1.0 - (-(n as f64) / 5.0).exp()) / (1.0 + cv);
    if n < 3 {
        confidence = confidence.min(params.confidence_floor - 1.0);
    }

    let successful: Vec<&VideoProfile> = neighbors
        .iter()
        .map(|nb| nb.profile)
        .filter(|p| is_viral(p))
        .collect();

    ViralPrediction {
        video_id: video_id.to_string(),
        predicted_views,
        viral_probability: (viral_weight / total_weight).clamp(0.0, 1.0),
        confidence_score: confidence.clamp(0.0, 100.0),
        key_factors: key_factors(&neighbors, &successful, corpus.views_median()),
        successful_neighbors: successful
            .iter()
            .take(MAX_SUCCESSFUL_NEIGHBORS)
            .map(|p| p.video_id.clone())
            .collect(),
        neighbor_count: n,
    }
}

/// The `k` most similar other videos, weights clamped at zero and uniform
/// when every similarity is non-positive
fn nearest<'a>(corpus: &'a Corpus, target: &VideoProfile, k: usize) -> Vec<Neighbor<'a>> {
    let mut scored: Vec<(&VideoProfile, f32)> = corpus
        .profiles()
        .iter()
        .filter(|p| p.video_id != target.video_id)
        .map(|p| (p, cosine_similarity(&target.embedding, &p.embedding)))
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.video_id.cmp(&b.0.video_id))
    });
    scored.truncate(k);

    let uniform = scored.iter().all(|(_, s)| *s <= 0.0);
    scored
        .into_iter()
        .map(|(profile, similarity)| Neighbor {
            profile,
            weight: if uniform {
                1.0
            } else {
                f64::from(similarity.max(0.0))
            },
        })
        .collect()
}

fn key_factors(neighbors: &[Neighbor<'_>], successful: &[&VideoProfile], median: f64) -> Vec<String> {
    let strong: Vec<&MetricZ> = neighbors
        .iter()
        .filter(|nb| nb.profile.metrics.views as f64 > median)
        .map(|nb| &nb.profile.z)
        .collect();

    let mut factors = Vec::new();
    if !strong.is_empty() {
        let avg = |pick: fn(&MetricZ) -> f64| mean(&strong.iter().map(|z| pick(z)).collect::<Vec<_>>());
        let labels: [(&str, fn(&MetricZ) -> f64); 4] = [
            ("high_retention", |z| z.retention),
            ("high_saves", |z| z.saves),
            ("high_follows", |z| z.follows),
            ("strong_fyp_reach", |z| z.for_you),
        ];
        for (label, pick) in labels {
            if avg(pick) > FACTOR_Z_THRESHOLD {
                factors.push(label.to_string());
            }
        }
    }

    // Duration counts only when at least two viral neighbours agree on it
    if successful.len() >= 2 {
        let bucket = DurationBucket::of(successful[0].metrics.duration_seconds);
        if successful
            .iter()
            .all(|p| DurationBucket::of(p.metrics.duration_seconds) == bucket)
        {
            factors.push(bucket.factor().to_string());
        }
    }

    factors
}
