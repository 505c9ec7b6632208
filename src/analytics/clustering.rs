//! Threshold single-linkage clustering over per-video embeddings

use super::corpus::{Corpus, VideoProfile};
use crate::config::AnalyticsConfig;
use crate::content::ContentType;
use crate::stats::{cosine_similarity, mean};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Words of the top hook used when a cluster has no theme tag
const NAME_HOOK_WORDS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTrend {
    Improving,
    Declining,
    Stable,
}

/// Exemplar video of a cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterVideo {
    pub video_id: String,
    pub views: u64,
    pub hook: Option<String>,
    pub performance: f64,
}

/// A group of thematically similar videos
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Stable across runs for the same member set
    pub id: String,
    pub name: String,
    pub video_ids: Vec<String>,
    pub member_vector_ids: Vec<String>,
    pub video_count: usize,
    pub vector_count: usize,
    pub dominant_content_type: ContentType,
    pub avg_performance: f64,
    pub avg_views: f64,
    /// 0-100, 50 is the corpus average
    pub optimization_score: f64,
    pub performance_trend: PerformanceTrend,
    pub top_videos: Vec<ClusterVideo>,
}

#[derive(Debug, Clone, Copy)]
pub struct ClusterParams {
    pub similarity_threshold: f32,
    pub min_cluster_size: usize,
    pub max_top_videos: usize,
    pub trend_margin: f64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.80,
            min_cluster_size: 3,
            max_top_videos: 5,
            trend_margin: 0.25,
        }
    }
}

impl From<&AnalyticsConfig> for ClusterParams {
    fn from(config: &AnalyticsConfig) -> Self {
        Self {
            similarity_threshold: config.cluster_similarity_threshold,
            min_cluster_size: config.min_cluster_size,
            max_top_videos: config.max_top_videos,
            trend_margin: config.trend_margin,
        }
    }
}

/// Disjoint sets with path halving; the smaller index becomes the root so
/// results do not depend on link order
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}

/// Link every pair of videos at or above the similarity threshold and keep
/// connected groups of at least `min_cluster_size` videos, best first
pub fn cluster_corpus(corpus: &Corpus, params: &ClusterParams) -> Vec<Cluster> {
    let profiles = corpus.profiles();
    let mut sets = UnionFind::new(profiles.len());

    for i in 0..profiles.len() {
        for j in (i + 1)..profiles.len() {
            let similarity = cosine_similarity(&profiles[i].embedding, &profiles[j].embedding);
            if similarity >= params.similarity_threshold {
                sets.union(i, j);
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<&VideoProfile>> = BTreeMap::new();
    for (index, profile) in profiles.iter().enumerate() {
        groups.entry(sets.find(index)).or_default().push(profile);
    }

    let mut clusters: Vec<Cluster> = groups
        .into_values()
        .filter(|members| members.len() >= params.min_cluster_size.max(1))
        .map(|members| summarize(members, params))
        .collect();

    clusters.sort_by(|a, b| {
        b.optimization_score
            .total_cmp(&a.optimization_score)
            .then_with(|| a.id.cmp(&b.id))
    });

    tracing::debug!(
        "Clustered {} videos of {} into {} clusters",
        profiles.len(),
        corpus.owner_id,
        clusters.len()
    );
    clusters
}

/// Logistic map of a z-composite onto 0-100
pub fn optimization_score(avg_performance: f64) -> f64 {
    100.0 / (1.0 + (-avg_performance).exp())
}

fn summarize(members: Vec<&VideoProfile>, params: &ClusterParams) -> Cluster {
    let video_ids: Vec<String> = members.iter().map(|p| p.video_id.clone()).collect();
    let member_vector_ids: Vec<String> = members
        .iter()
        .flat_map(|p| p.vector_ids.iter().cloned())
        .collect();

    let performances: Vec<f64> = members.iter().map(|p| p.performance).collect();
    let avg_performance = mean(&performances);
    let views: Vec<f64> = members.iter().map(|p| p.metrics.views as f64).collect();

    let mut by_views = members.clone();
    by_views.sort_by(|a, b| {
        b.metrics
            .views
            .cmp(&a.metrics.views)
            .then_with(|| a.video_id.cmp(&b.video_id))
    });
    let top_videos: Vec<ClusterVideo> = by_views
        .iter()
        .take(params.max_top_videos)
        .map(|p| ClusterVideo {
            video_id: p.video_id.clone(),
            views: p.metrics.views,
            hook: p.hook.clone(),
            performance: p.performance,
        })
        .collect();

    let id = cluster_id(&video_ids);
    let name = cluster_name(&members, top_videos.first()).unwrap_or_else(|| format!("Cluster {}", id));

    Cluster {
        video_count: members.len(),
        vector_count: member_vector_ids.len(),
        dominant_content_type: dominant_content_type(&members),
        avg_performance,
        avg_views: mean(&views),
        optimization_score: optimization_score(avg_performance),
        performance_trend: trend(&members, params.trend_margin),
        top_videos,
        id,
        name,
        video_ids,
        member_vector_ids,
    }
}

/// Truncated BLAKE3 of the sorted member ids
fn cluster_id(video_ids: &[String]) -> String {
    let mut sorted: Vec<&str> = video_ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let digest = blake3::hash(sorted.join("\n").as_bytes()).to_hex();
    digest[..12].to_string()
}

/// Most common theme tag, else the start of the top video's hook
fn cluster_name(members: &[&VideoProfile], top: Option<&ClusterVideo>) -> Option<String> {
    let mut themes: BTreeMap<String, (usize, String)> = BTreeMap::new();
    for theme in members.iter().filter_map(|p| p.tags.theme.as_deref()) {
        let entry = themes
            .entry(theme.to_lowercase())
            .or_insert_with(|| (0, theme.to_string()));
        entry.0 += 1;
    }

    // BTreeMap order breaks count ties alphabetically
    let best = themes
        .into_values()
        .fold(None::<(usize, String)>, |best, (count, label)| match best {
            Some((n, _)) if n >= count => best,
            _ => Some((count, label)),
        });
    if let Some((_, label)) = best {
        return Some(label);
    }

    top.and_then(|t| t.hook.as_deref()).map(|hook| {
        hook.split_whitespace()
            .take(NAME_HOOK_WORDS)
            .collect::<Vec<_>>()
            .join(" ")
    })
}

fn dominant_content_type(members: &[&VideoProfile]) -> ContentType {
    let mut counts = [0usize; 3];
    for (content_type, _) in members.iter().flat_map(|p| p.fragments.iter()) {
        let slot = ContentType::ALL
            .iter()
            .position(|t| t == content_type)
            .unwrap_or(0);
        counts[slot] += 1;
    }

    let mut best = 0;
    for slot in 1..counts.len() {
        if counts[slot] > counts[best] {
            best = slot;
        }
    }
    ContentType::ALL[best]
}

/// Recent half against earlier half by publish date
fn trend(members: &[&VideoProfile], margin: f64) -> PerformanceTrend {
    let mut ordered: Vec<&VideoProfile> = members.to_vec();
    ordered.sort_by(|a, b| {
        a.metrics
            .published_date
            .cmp(&b.metrics.published_date)
            .then_with(|| a.video_id.cmp(&b.video_id))
    });

    let split = ordered.len() / 2;
    if split == 0 {
        return PerformanceTrend::Stable;
    }
    let earlier: Vec<f64> = ordered[..split].iter().map(|p| p.performance).collect();
    let recent: Vec<f64> = ordered[split..].iter().map(|p| p.performance).collect();

    let delta = mean(&recent) - mean(&earlier);
    if delta > margin {
        PerformanceTrend::Improving
    } else if delta < -margin {
        PerformanceTrend::Declining
    } else {
        PerformanceTrend::Stable
    }
}
