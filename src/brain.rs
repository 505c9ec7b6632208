//! The content-intelligence facade
//!
//! `Brain` wires the stores, the embedding pipeline, search and analytics
//! from one [`Config`] and exposes the operations the CLI calls.

use crate::account::{
    nudge_weights, AccountContext, AccountStore, IdeaOutcome, MetricBaseline, MetricWeights,
    WeightBounds,
};
use crate::analytics::{
    cluster_corpus, generate_insights, predict_video, viral_candidates, AnalysisReport,
    AnalyticsCache, Cluster, ClusterParams, Corpus, Insight, InsightInputs, InsightKind,
    InsightParams, InsightStore, PredictionParams, ViralPrediction,
};
use crate::catalog::{import_file, ImportReport, VideoCatalog};
use crate::config::Config;
use crate::content::ContentExtractor;
use crate::embedding::{
    create_provider, EmbeddingProvider, Indexer, ReindexReport, RetryPolicy, RetryingEmbedder,
};
use crate::error::{BrainError, Result};
use crate::retrieval::{SearchEngine, SearchQuery, SearchResponse};
use crate::stats::percentile;
use crate::storage::{StorageManager, StorageStats, VectorFilter, VectorStore};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Weights before and after recording an idea outcome
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeReceipt {
    pub owner_id: String,
    pub previous_weights: MetricWeights,
    pub weights: MetricWeights,
    pub adjusted: bool,
}

pub struct Brain {
    config: Config,
    storage: StorageManager,
    indexer: Indexer,
    search: SearchEngine,
    vectors: Arc<dyn VectorStore>,
    catalog: Arc<dyn VideoCatalog>,
    accounts: Arc<dyn AccountStore>,
    insights: Arc<dyn InsightStore>,
    cache: AnalyticsCache,
}

impl Brain {
    /// Open the configured database and embedding model
    pub fn open(config: Config) -> Result<Self> {
        let storage = StorageManager::from_config(&config)?;
        let provider = create_provider(&config.embedding)?;
        Self::with_provider(config, storage, provider)
    }

    /// Build on an existing database with an explicit embedding provider
    pub fn with_provider(
        config: Config,
        storage: StorageManager,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let embedder = RetryingEmbedder::new(
            provider,
            RetryPolicy::from_config(&config.retry, &config.embedding),
        );

        let vectors: Arc<dyn VectorStore> = storage.vector_store();
        let catalog: Arc<dyn VideoCatalog> = storage.video_catalog();
        let accounts: Arc<dyn AccountStore> = storage.account_store();
        let insights: Arc<dyn InsightStore> = storage.insight_store();

        let indexer = Indexer::new(
            Arc::new(ContentExtractor::new()?),
            embedder.clone(),
            Arc::clone(&vectors),
            Arc::clone(&catalog),
            &config.indexing,
        );
        let search = SearchEngine::new(
            embedder,
            Arc::clone(&vectors),
            Arc::clone(&accounts),
            config.retrieval.clone(),
        );

        info!(
            "Brain ready (database {}, model {})",
            storage.db_path().display(),
            config.embedding.model
        );

        Ok(Self {
            config,
            storage,
            indexer,
            search,
            vectors,
            catalog,
            accounts,
            insights,
            cache: AnalyticsCache::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load a JSON array of video records into the catalog
    pub fn import_videos(&self, path: &Path) -> Result<ImportReport> {
        import_file(self.catalog.as_ref(), path)
    }

    /// Index one catalog video. Returns whether it now has vectors.
    pub async fn index_video(&self, video_id: &str) -> Result<bool> {
        self.indexer.index_video(video_id).await
    }

    pub async fn reindex_all(
        &self,
        owner_id: &str,
        cancel: CancellationToken,
    ) -> Result<ReindexReport> {
        self.indexer.reindex_all(owner_id, cancel).await
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        self.search.search(query).await
    }

    /// Thematic clusters of the owner's videos, best first
    pub fn get_cluster_analysis(&self, owner_id: &str) -> Result<AnalysisReport<Cluster>> {
        let (version, corpus) = self.corpus(owner_id)?;
        if let Some(report) = self.insufficient(&corpus) {
            return Ok(report);
        }

        let clusters = self.clusters(owner_id, version, &corpus);
        Ok(AnalysisReport::Ready {
            items: clusters.as_ref().clone(),
        })
    }

    /// Predictions for the given videos, or for every indexed video when
    /// `video_ids` is empty
    pub fn get_viral_predictions(
        &self,
        owner_id: &str,
        video_ids: &[String],
    ) -> Result<AnalysisReport<ViralPrediction>> {
        for video_id in video_ids {
            match self.catalog.get_video(video_id)? {
                Some(video) if video.owner_id == owner_id => {}
                _ => return Err(BrainError::not_found("Video", video_id.as_str())),
            }
        }

        let (_, corpus) = self.corpus(owner_id)?;
        if let Some(report) = self.insufficient(&corpus) {
            return Ok(report);
        }

        let params = PredictionParams::from(&self.config.analytics);
        let targets: Vec<String> = if video_ids.is_empty() {
            corpus.profiles().iter().map(|p| p.video_id.clone()).collect()
        } else {
            video_ids.to_vec()
        };

        Ok(AnalysisReport::Ready {
            items: targets
                .iter()
                .map(|id| predict_video(&corpus, id, &params))
                .collect(),
        })
    }

    /// Scan the corpus for insights, persist the ones that surface and
    /// return them
    pub fn generate_insights(&self, owner_id: &str) -> Result<AnalysisReport<Insight>> {
        let (version, corpus) = self.corpus(owner_id)?;
        if let Some(report) = self.insufficient(&corpus) {
            return Ok(report);
        }

        let clusters = self.clusters(owner_id, version, &corpus);
        let params = PredictionParams::from(&self.config.analytics);
        let predictions: HashMap<String, ViralPrediction> = viral_candidates(&corpus)
            .into_iter()
            .map(|id| {
                let prediction = predict_video(&corpus, &id, &params);
                (id, prediction)
            })
            .collect();
        let context = self.accounts.get(owner_id)?;
        let flagged_videos = self
            .insights
            .flagged_subjects(owner_id, InsightKind::ViralPrediction)?;

        let insights = generate_insights(
            &InsightInputs {
                corpus: &corpus,
                clusters: &clusters,
                predictions: &predictions,
                context: context.as_ref(),
                flagged_videos: &flagged_videos,
            },
            &InsightParams::from(&self.config.analytics),
        );

        self.insights.save(&insights)?;
        info!("Generated {} insights for {}", insights.len(), owner_id);

        Ok(AnalysisReport::Ready { items: insights })
    }

    pub fn list_insights(&self, owner_id: &str, include_dismissed: bool) -> Result<Vec<Insight>> {
        self.insights.list(owner_id, include_dismissed)
    }

    pub fn dismiss_insight(&self, owner_id: &str, insight_id: &str) -> Result<()> {
        self.insights.dismiss(owner_id, insight_id)
    }

    /// Log an outcome and, for a measured success, nudge the owner's weights
    /// toward the metric it beat the corpus median on the most
    pub fn record_idea_outcome(&self, outcome: &IdeaOutcome) -> Result<OutcomeReceipt> {
        outcome.validate()?;
        self.accounts.record_outcome(outcome)?;

        let owner_id = outcome.owner_id.as_str();
        let mut context = self
            .accounts
            .get(owner_id)?
            .unwrap_or_else(|| AccountContext::new(owner_id));
        let previous_weights = context.weights;

        if !outcome.is_measured_success() {
            debug!("Outcome '{}' does not move weights", outcome.idea_title);
            return Ok(OutcomeReceipt {
                owner_id: owner_id.to_string(),
                previous_weights,
                weights: previous_weights,
                adjusted: false,
            });
        }

        let baseline = self.baseline(owner_id)?;
        let weights = nudge_weights(
            &previous_weights,
            outcome,
            &baseline,
            &WeightBounds::from(&self.config.learning),
        );
        let adjusted = weights != previous_weights;

        if adjusted {
            context.weights = weights;
            context.updated_at = chrono::Utc::now();
            self.accounts.save(&context)?;
            self.cache.invalidate(owner_id);
            info!(
                "Adjusted weights for {}: retention {:.3}, saves {:.3}, follows {:.3}",
                owner_id, weights.retention, weights.saves, weights.follows
            );
        }

        Ok(OutcomeReceipt {
            owner_id: owner_id.to_string(),
            previous_weights,
            weights,
            adjusted,
        })
    }

    /// Recorded idea outcomes, newest first
    pub fn list_idea_outcomes(&self, owner_id: &str) -> Result<Vec<IdeaOutcome>> {
        self.accounts.outcomes(owner_id)
    }

    pub fn get_account_context(&self, owner_id: &str) -> Result<Option<AccountContext>> {
        self.accounts.get(owner_id)
    }

    pub fn save_account_context(&self, context: &AccountContext) -> Result<()> {
        self.accounts.save(context)?;
        self.cache.invalidate(&context.owner_id);
        Ok(())
    }

    pub fn corpus_stats(&self, owner_id: &str) -> Result<StorageStats> {
        self.storage.stats(owner_id)
    }

    /// The owner's corpus at its current version, built on a cache miss
    fn corpus(&self, owner_id: &str) -> Result<(u64, Arc<Corpus>)> {
        let version = self.vectors.corpus_version(owner_id)?;
        if let Some(corpus) = self.cache.corpus(owner_id, version) {
            return Ok((version, corpus));
        }

        let weights = self.search.weights_for(owner_id)?;
        let vectors = self.vectors.vectors(&VectorFilter::owner(owner_id))?;
        let corpus = Arc::new(Corpus::build(owner_id, vectors, &weights));
        debug!(
            "Built corpus for {} at version {} ({} videos)",
            owner_id,
            version,
            corpus.len()
        );

        self.cache.store_corpus(owner_id, version, Arc::clone(&corpus));
        Ok((version, corpus))
    }

    fn clusters(&self, owner_id: &str, version: u64, corpus: &Corpus) -> Arc<Vec<Cluster>> {
        if let Some(clusters) = self.cache.clusters(owner_id, version) {
            return clusters;
        }

        let clusters = Arc::new(cluster_corpus(
            corpus,
            &ClusterParams::from(&self.config.analytics),
        ));
        self.cache
            .store_clusters(owner_id, version, Arc::clone(&clusters));
        clusters
    }

    fn insufficient<T>(&self, corpus: &Corpus) -> Option<AnalysisReport<T>> {
        let required = self.config.analytics.min_corpus_videos;
        (corpus.len() < required).then(|| {
            debug!(
                "Corpus for {} has {} videos, {} required",
                corpus.owner_id,
                corpus.len(),
                required
            );
            AnalysisReport::InsufficientData {
                indexed_videos: corpus.len(),
                required,
            }
        })
    }

    /// Corpus medians of the learnable metrics
    fn baseline(&self, owner_id: &str) -> Result<MetricBaseline> {
        let (_, corpus) = self.corpus(owner_id)?;
        let median = |values: Vec<f64>| (!values.is_empty()).then(|| percentile(&values, 0.5));
        let profiles = corpus.profiles();

        Ok(MetricBaseline::from_medians(
            median(profiles.iter().filter_map(|p| p.metrics.retention_pct).collect()),
            median(profiles.iter().filter_map(|p| p.metrics.saves_per_1k).collect()),
            median(profiles.iter().filter_map(|p| p.metrics.follows_per_1k).collect()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{OutcomeMetrics, OutcomeStatus};
    use crate::catalog::fixtures::video;
    use crate::embedding::HashingEmbedder;
    use tempfile::TempDir;

    fn brain() -> (Brain, TempDir) {
        let temp = TempDir::new().unwrap();
        let storage = StorageManager::new(temp.path().join("brain.sqlite"), 4).unwrap();
        let brain = Brain::with_provider(
            Config::default(),
            storage,
            Arc::new(HashingEmbedder::new(64).unwrap()),
        )
        .unwrap();
        (brain, temp)
    }

    #[tokio::test]
    async fn test_small_corpus_is_insufficient() {
        let (brain, _temp) = brain();
        let mut record = video("v1", "alice", 1);
        record.hook = Some("one lonely hook".to_string());
        brain.catalog.upsert_video(&record).unwrap();
        assert!(brain.index_video("v1").await.unwrap());

        let report = brain.get_cluster_analysis("alice").unwrap();
        assert_eq!(
            report,
            AnalysisReport::InsufficientData {
                indexed_videos: 1,
                required: 5
            }
        );
        assert!(!brain.generate_insights("alice").unwrap().is_ready());
    }

    #[test]
    fn test_predictions_for_unknown_video() {
        let (brain, _temp) = brain();
        brain.catalog.upsert_video(&video("v1", "bob", 1)).unwrap();

        let result = brain.get_viral_predictions("alice", &["v1".to_string()]);
        assert!(matches!(result, Err(BrainError::NotFound { .. })));
    }

    #[test]
    fn test_outcome_adjusts_weights() {
        let (brain, _temp) = brain();
        let outcome = IdeaOutcome {
            owner_id: "alice".to_string(),
            idea_title: "Pantry swaps".to_string(),
            status: OutcomeStatus::Success,
            metrics: Some(OutcomeMetrics {
                retention_pct: Some(41.0),
                saves_per_1k: Some(30.0),
                follows_per_1k: None,
            }),
            recorded_at: chrono::Utc::now(),
        };

        let receipt = brain.record_idea_outcome(&outcome).unwrap();
        assert!(receipt.adjusted);
        assert!(receipt.weights.saves > receipt.previous_weights.saves);
        assert!((receipt.weights.sum() - 1.0).abs() < 1e-9);

        let stored = brain.get_account_context("alice").unwrap().unwrap();
        assert_eq!(stored.weights, receipt.weights);
    }

    #[test]
    fn test_pending_outcome_is_logged_only() {
        let (brain, _temp) = brain();
        let outcome = IdeaOutcome {
            owner_id: "alice".to_string(),
            idea_title: "Draft idea".to_string(),
            status: OutcomeStatus::Pending,
            metrics: None,
            recorded_at: chrono::Utc::now(),
        };

        let receipt = brain.record_idea_outcome(&outcome).unwrap();
        assert!(!receipt.adjusted);
        assert!(brain.get_account_context("alice").unwrap().is_none());
        assert_eq!(brain.corpus_stats("alice").unwrap().db.outcome_count, 1);

        let logged = brain.list_idea_outcomes("alice").unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].idea_title, "Draft idea");
        assert_eq!(logged[0].status, OutcomeStatus::Pending);
        assert!(brain.list_idea_outcomes("bob").unwrap().is_empty());
    }
}
