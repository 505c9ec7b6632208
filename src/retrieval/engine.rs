//! Search pipeline: validate, embed, retrieve, score, diversify

use super::{compute_facets, diversify, score_candidates, SearchQuery, SearchResponse};
use crate::account::AccountStore;
use crate::config::{RetrievalConfig, ScoringWeights};
use crate::embedding::RetryingEmbedder;
use crate::error::Result;
use crate::storage::VectorStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Ranked search over one owner's content vectors
pub struct SearchEngine {
    embedder: RetryingEmbedder,
    store: Arc<dyn VectorStore>,
    accounts: Arc<dyn AccountStore>,
    config: RetrievalConfig,
}

impl SearchEngine {
    pub fn new(
        embedder: RetryingEmbedder,
        store: Arc<dyn VectorStore>,
        accounts: Arc<dyn AccountStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            accounts,
            config,
        }
    }

    /// Ranking weights for an owner, shaped by their account context if any
    pub fn weights_for(&self, owner_id: &str) -> Result<ScoringWeights> {
        Ok(match self.accounts.get(owner_id)? {
            Some(context) => context.weights.apply_to(&self.config.weights),
            None => self.config.weights,
        })
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        let start = Instant::now();
        query.validate(self.config.max_top_k)?;

        if self.store.indexed_video_count(&query.owner_id)? == 0 {
            debug!("No indexed content for {}, returning no hits", query.owner_id);
            return Ok(SearchResponse::empty(start.elapsed().as_millis() as u64));
        }

        let embedding = self.embedder.embed(&query.text).await?;

        let filter = query.filters.to_vector_filter(&query.owner_id);
        let candidate_limit = query.top_k * self.config.oversample_factor.max(1);
        let response = self
            .store
            .similarity_query(&embedding, &filter, candidate_limit)?;

        if response.degraded {
            warn!(
                "Similarity search unavailable for {}, ranking by recency",
                query.owner_id
            );
        }

        let weights = self.weights_for(&query.owner_id)?;
        let ranked = score_candidates(
            response.matches,
            &weights,
            self.config.recency_halflife_days,
            Utc::now(),
        );

        // Facets and the total describe every filter match, not just the ranked slice
        let population = self.store.population(&filter)?;
        let total_results = population.len();
        let facets = compute_facets(&population, &weights);

        let hits = if query.diversify {
            let threshold = query
                .diversity_threshold
                .unwrap_or(self.config.diversity_threshold);
            diversify(ranked, threshold, query.top_k)
        } else {
            let mut ranked = ranked;
            ranked.truncate(query.top_k);
            ranked
        };

        let search_time_ms = start.elapsed().as_millis() as u64;
        debug!(
            "Search for {} returned {} of {} candidates in {}ms",
            query.owner_id,
            hits.len(),
            total_results,
            search_time_ms
        );

        Ok(SearchResponse {
            hits,
            facets,
            total_results,
            search_time_ms,
            degraded: response.degraded,
        })
    }
}
