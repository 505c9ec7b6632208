//! Ranked semantic search over indexed content
//!
//! A query is embedded, an oversampled candidate set is pulled from the vector
//! store, every candidate is scored by similarity, metric z-scores and recency,
//! and an optional diversity pass drops near-duplicate hits.

mod diversity;
mod engine;
mod facets;
mod scoring;

pub use diversity::diversify;
pub use engine::SearchEngine;
pub use facets::{compute_facets, DurationFacet, FacetValue, Facets, MetricPercentiles, Percentiles};
pub use scoring::{explain, final_score, score_candidates, time_decay};

use crate::analytics::MetricZ;
use crate::content::{ContentType, ContentVector};
use crate::error::{BrainError, Result};
use crate::storage::VectorFilter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Optional narrowing of the candidate set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Empty means every content type
    #[serde(default)]
    pub content_types: Vec<ContentType>,
    #[serde(default)]
    pub published_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub min_views: Option<u64>,
    #[serde(default)]
    pub theme: Option<String>,
}

impl SearchFilters {
    pub fn to_vector_filter(&self, owner_id: &str) -> VectorFilter {
        VectorFilter {
            owner_id: owner_id.to_string(),
            content_types: self.content_types.clone(),
            published_after: self.published_after,
            published_before: self.published_before,
            min_views: self.min_views,
            theme: self.theme.clone(),
            video_id: None,
        }
    }
}

/// Search query with optional filters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub owner_id: String,

    /// Query text
    pub text: String,

    /// Maximum number of results
    pub top_k: usize,

    #[serde(default)]
    pub filters: SearchFilters,

    /// Drop hits too similar to a better one
    #[serde(default)]
    pub diversify: bool,

    /// Overrides `retrieval.diversity_threshold` for this query
    #[serde(default)]
    pub diversity_threshold: Option<f32>,
}

impl SearchQuery {
    pub fn new(owner_id: impl Into<String>, text: impl Into<String>, top_k: usize) -> Self {
        Self {
            owner_id: owner_id.into(),
            text: text.into(),
            top_k,
            filters: SearchFilters::default(),
            diversify: false,
            diversity_threshold: None,
        }
    }

    /// Reject malformed queries before any work is done
    pub fn validate(&self, max_top_k: usize) -> Result<()> {
        if self.owner_id.trim().is_empty() {
            return Err(BrainError::validation("owner_id", "Owner id cannot be empty"));
        }
        if self.text.trim().is_empty() {
            return Err(BrainError::validation("text", "Query text cannot be empty"));
        }
        if self.top_k == 0 || self.top_k > max_top_k {
            return Err(BrainError::validation(
                "top_k",
                format!("top_k must be between 1 and {}, got {}", max_top_k, self.top_k),
            ));
        }
        if let (Some(after), Some(before)) =
            (self.filters.published_after, self.filters.published_before)
        {
            if after > before {
                return Err(BrainError::validation(
                    "filters.published_after",
                    "Date range start is after its end",
                ));
            }
        }
        if let Some(threshold) = self.diversity_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(BrainError::validation(
                    "diversity_threshold",
                    format!("Must be between 0.0 and 1.0, got {}", threshold),
                ));
            }
        }
        Ok(())
    }
}

/// One ranked search result
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub vector: ContentVector,
    pub similarity: f32,
    /// Metric z-scores against the candidate population
    pub z: MetricZ,
    pub time_decay: f64,
    pub final_score: f64,
    pub explanation: String,
}

impl SearchHit {
    pub fn vector_id(&self) -> String {
        self.vector.vector_id()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub facets: Facets,
    /// Vectors that matched the filters, before ranking and truncation
    pub total_results: usize,
    pub search_time_ms: u64,
    /// Similarity was unavailable and hits are ordered by recency
    pub degraded: bool,
}

impl SearchResponse {
    pub fn empty(search_time_ms: u64) -> Self {
        Self {
            hits: Vec::new(),
            facets: Facets::default(),
            total_results: 0,
            search_time_ms,
            degraded: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_query_validation() {
        assert!(SearchQuery::new("alice", "productivity tips", 10).validate(50).is_ok());
        assert!(SearchQuery::new("alice", "   ", 10).validate(50).is_err());
        assert!(SearchQuery::new("alice", "tips", 0).validate(50).is_err());
        assert!(SearchQuery::new("alice", "tips", 51).validate(50).is_err());
        assert!(SearchQuery::new("", "tips", 5).validate(50).is_err());

        let mut query = SearchQuery::new("alice", "tips", 5);
        query.diversity_threshold = Some(1.5);
        assert!(matches!(
            query.validate(50),
            Err(BrainError::Validation { field, .. }) if field == "diversity_threshold"
        ));
    }

    #[test]
    fn test_unordered_date_range_rejected() {
        let mut query = SearchQuery::new("alice", "tips", 5);
        query.filters.published_after = Some(Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap());
        query.filters.published_before = Some(Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap());
        assert!(query.validate(50).is_err());
    }

    #[test]
    fn test_filters_map_to_store_filter() {
        let filters = SearchFilters {
            content_types: vec![ContentType::Hook],
            min_views: Some(500),
            theme: Some("Cooking".to_string()),
            ..Default::default()
        };
        let filter = filters.to_vector_filter("alice");
        assert_eq!(filter.owner_id, "alice");
        assert_eq!(filter.content_types, vec![ContentType::Hook]);
        assert_eq!(filter.min_views, Some(500));
        assert_eq!(filter.video_id, None);
    }
}
