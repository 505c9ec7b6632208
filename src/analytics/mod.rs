//! Analytics derived from the vector index
//!
//! Clustering, viral prediction and insight generation all work on a
//! [`Corpus`]: one profile per indexed video, scored against the owner's whole
//! catalog. Results are memoised per corpus version.

mod cache;
mod clustering;
mod corpus;
mod insights;
mod prediction;

pub use cache::AnalyticsCache;
pub use clustering::{
    cluster_corpus, optimization_score, Cluster, ClusterParams, ClusterVideo, PerformanceTrend,
};
pub use corpus::{Corpus, MetricPopulations, MetricZ, VideoProfile};
pub use insights::{
    generate as generate_insights, insight_id, viral_candidates, Insight, InsightInputs,
    InsightKind, InsightParams, InsightStore, Priority,
};
pub use prediction::{predict_video, PredictionParams, ViralPrediction};

use serde::Serialize;

/// Result of an analysis that needs a minimum corpus
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisReport<T> {
    Ready { items: Vec<T> },
    InsufficientData { indexed_videos: usize, required: usize },
}

impl<T> AnalysisReport<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, AnalysisReport::Ready { .. })
    }

    /// Items when ready, empty otherwise
    pub fn items(&self) -> &[T] {
        match self {
            AnalysisReport::Ready { items } => items,
            AnalysisReport::InsufficientData { .. } => &[],
        }
    }

    pub fn into_items(self) -> Vec<T> {
        match self {
            AnalysisReport::Ready { items } => items,
            AnalysisReport::InsufficientData { .. } => Vec::new(),
        }
    }
}
