//! Per-video view of an owner's indexed corpus

use crate::config::ScoringWeights;
use crate::content::{ContentTags, ContentType, ContentVector, MetricsSnapshot};
use crate::stats::{mean_vector, percentile, Population};
use serde::Serialize;
use std::collections::BTreeMap;

/// Metric z-scores of one video against a population
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricZ {
    pub retention: f64,
    pub saves: f64,
    pub follows: f64,
    pub for_you: f64,
}

impl MetricZ {
    /// Weighted sum of the z-scores, the performance part of the ranking score
    pub fn composite(&self, weights: &ScoringWeights) -> f64 {
        weights.retention * self.retention
            + weights.saves * self.saves
            + weights.follows * self.follows
            + weights.for_you * self.for_you
    }
}

/// Population statistics for the four ranked metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricPopulations {
    pub retention: Population,
    pub saves: Population,
    pub follows: Population,
    pub for_you: Population,
}

impl MetricPopulations {
    pub fn from_metrics<'a, I>(metrics: I) -> Self
    where
        I: IntoIterator<Item = &'a MetricsSnapshot>,
    {
        let metrics: Vec<&MetricsSnapshot> = metrics.into_iter().collect();
        Self {
            retention: Population::from_options(metrics.iter().map(|m| m.retention_pct)),
            saves: Population::from_options(metrics.iter().map(|m| m.saves_per_1k)),
            follows: Population::from_options(metrics.iter().map(|m| m.follows_per_1k)),
            for_you: Population::from_options(metrics.iter().map(|m| m.for_you_pct)),
        }
    }

    pub fn z_scores(&self, metrics: &MetricsSnapshot) -> MetricZ {
        MetricZ {
            retention: self.retention.z_score(metrics.retention_pct),
            saves: self.saves.z_score(metrics.saves_per_1k),
            follows: self.follows.z_score(metrics.follows_per_1k),
            for_you: self.for_you.z_score(metrics.for_you_pct),
        }
    }
}

/// One video collapsed from its fragment vectors
#[derive(Debug, Clone)]
pub struct VideoProfile {
    pub video_id: String,
    /// L2-normalised mean of the fragment embeddings
    pub embedding: Vec<f32>,
    pub metrics: MetricsSnapshot,
    pub tags: ContentTags,
    pub hook: Option<String>,
    pub fragments: Vec<(ContentType, String)>,
    pub vector_ids: Vec<String>,
    pub z: MetricZ,
    pub performance: f64,
}

impl VideoProfile {
    /// Whether a topic appears in the theme tag or any fragment text
    pub fn mentions(&self, topic: &str) -> bool {
        let topic = topic.trim().to_lowercase();
        if topic.is_empty() {
            return false;
        }
        self.tags
            .theme
            .as_deref()
            .is_some_and(|t| t.to_lowercase() == topic)
            || self
                .fragments
                .iter()
                .any(|(_, text)| text.to_lowercase().contains(&topic))
    }
}

/// An owner's indexed videos with corpus-wide statistics
#[derive(Debug, Clone)]
pub struct Corpus {
    pub owner_id: String,
    /// Sorted by video id
    profiles: Vec<VideoProfile>,
    populations: MetricPopulations,
    views_p90: f64,
    views_median: f64,
}

impl Corpus {
    /// Group vectors by video and score every video against the whole corpus
    pub fn build(owner_id: &str, vectors: Vec<ContentVector>, weights: &ScoringWeights) -> Self {
        let mut by_video: BTreeMap<String, Vec<ContentVector>> = BTreeMap::new();
        for vector in vectors {
            by_video
                .entry(vector.video_id.clone())
                .or_default()
                .push(vector);
        }

        let mut profiles = Vec::with_capacity(by_video.len());
        for (video_id, mut vectors) in by_video {
            vectors.sort_by_key(|v| v.content_type);

            let Some(embedding) = mean_vector(
                vectors
                    .iter()
                    .filter(|v| !v.embedding.is_empty())
                    .map(|v| v.embedding.as_slice()),
            ) else {
                tracing::debug!("Video {} has no usable embeddings, skipping", video_id);
                continue;
            };

            let first = &vectors[0];
            profiles.push(VideoProfile {
                video_id: video_id.clone(),
                embedding,
                metrics: first.metrics.clone(),
                tags: first.tags.clone(),
                hook: vectors
                    .iter()
                    .find(|v| v.content_type == ContentType::Hook)
                    .map(|v| v.text.clone()),
                fragments: vectors
                    .iter()
                    .map(|v| (v.content_type, v.text.clone()))
                    .collect(),
                vector_ids: vectors.iter().map(|v| v.vector_id()).collect(),
                z: MetricZ::default(),
                performance: 0.0,
            });
        }

        let populations = MetricPopulations::from_metrics(profiles.iter().map(|p| &p.metrics));
        for profile in profiles.iter_mut() {
            profile.z = populations.z_scores(&profile.metrics);
            profile.performance = profile.z.composite(weights);
        }

        let views: Vec<f64> = profiles.iter().map(|p| p.metrics.views as f64).collect();

        Self {
            owner_id: owner_id.to_string(),
            views_p90: percentile(&views, 0.9),
            views_median: percentile(&views, 0.5),
            profiles,
            populations,
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn profiles(&self) -> &[VideoProfile] {
        &self.profiles
    }

    pub fn get(&self, video_id: &str) -> Option<&VideoProfile> {
        self.profiles
            .binary_search_by(|p| p.video_id.as_str().cmp(video_id))
            .ok()
            .map(|i| &self.profiles[i])
    }

    pub fn populations(&self) -> &MetricPopulations {
        &self.populations
    }

    /// View count a video must exceed to count as viral
    pub fn views_p90(&self) -> f64 {
        self.views_p90
    }

    pub fn views_median(&self) -> f64 {
        self.views_median
    }

    /// Profiles oldest first, ties by id
    pub fn chronological(&self) -> Vec<&VideoProfile> {
        let mut ordered: Vec<&VideoProfile> = self.profiles.iter().collect();
        ordered.sort_by(|a, b| {
            a.metrics
                .published_date
                .cmp(&b.metrics.published_date)
                .then_with(|| a.video_id.cmp(&b.video_id))
        });
        ordered
    }

    /// The `n` most recently published profiles, newest first
    pub fn most_recent(&self, n: usize) -> Vec<&VideoProfile> {
        let mut ordered = self.chronological();
        ordered.reverse();
        ordered.truncate(n);
        ordered
    }
}
