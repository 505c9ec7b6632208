/// Embedding indexer: fragments in, content vectors out
use super::RetryingEmbedder;
use crate::catalog::{VideoCatalog, VideoRecord};
use crate::config::IndexingConfig;
use crate::content::{hash_text, ContentExtractor, ContentType, ContentVector};
use crate::error::{BrainError, Result};
use crate::storage::{VectorFilter, VectorStore};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A video that could not be indexed during a bulk run
#[derive(Debug, Clone, Serialize)]
pub struct IndexFailure {
    pub video_id: String,
    pub error: String,
}

/// Result of a bulk reindex
#[derive(Debug, Clone, Serialize)]
pub struct ReindexReport {
    pub owner_id: String,
    /// False only when the run was cancelled; per-video failures are listed
    /// in `failures`
    pub success: bool,
    pub total_videos: usize,
    /// Videos now holding at least one vector
    pub indexed_count: usize,
    /// Videos without usable text
    pub empty_count: usize,
    pub failures: Vec<IndexFailure>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

/// Result of indexing one video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoIndexOutcome {
    pub vectors: usize,
    /// Vectors whose stored embedding was reused
    pub reused: usize,
}

/// Extracts, embeds and swaps in the vectors of videos
#[derive(Clone)]
pub struct Indexer {
    extractor: Arc<ContentExtractor>,
    embedder: RetryingEmbedder,
    store: Arc<dyn VectorStore>,
    catalog: Arc<dyn VideoCatalog>,
    max_concurrency: usize,
    reuse_unchanged: bool,
}

impl Indexer {
    pub fn new(
        extractor: Arc<ContentExtractor>,
        embedder: RetryingEmbedder,
        store: Arc<dyn VectorStore>,
        catalog: Arc<dyn VideoCatalog>,
        config: &IndexingConfig,
    ) -> Self {
        Self {
            extractor,
            embedder,
            store,
            catalog,
            max_concurrency: config.max_concurrency.max(1),
            reuse_unchanged: config.reuse_unchanged_embeddings,
        }
    }

    /// Index a catalog video by id. Returns whether it now has vectors.
    pub async fn index_video(&self, video_id: &str) -> Result<bool> {
        let video = self
            .catalog
            .get_video(video_id)?
            .ok_or_else(|| BrainError::not_found("Video", video_id))?;

        let outcome = self.reindex_video(&video).await?;
        Ok(outcome.vectors > 0)
    }

    /// Rebuild every vector of one video.
    ///
    /// All embeddings are computed before the store is touched, then the old
    /// vector set is swapped for the new one in a single transaction. A failed
    /// embedding leaves the previous vectors live.
    pub async fn reindex_video(&self, video: &VideoRecord) -> Result<VideoIndexOutcome> {
        video.validate()?;

        let fragments = self.extractor.extract(video);
        let reusable = if self.reuse_unchanged && !fragments.is_empty() {
            self.reusable_embeddings(video)
        } else {
            HashMap::new()
        };

        let model = self.embedder.model_name().to_string();
        let mut vectors = Vec::with_capacity(fragments.len());
        let mut reused = 0;

        for fragment in fragments {
            let hash = hash_text(&fragment.text);
            let embedding = match reusable.get(&fragment.content_type) {
                Some((stored_hash, embedding)) if *stored_hash == hash => {
                    reused += 1;
                    embedding.clone()
                }
                _ => self.embedder.embed(&fragment.text).await?,
            };
            vectors.push(ContentVector::new(video, fragment, embedding, model.clone()));
        }

        self.store
            .replace_video(&video.owner_id, &video.id, &vectors)?;

        debug!(
            "Indexed video {} with {} vectors ({} reused)",
            video.id,
            vectors.len(),
            reused
        );

        Ok(VideoIndexOutcome {
            vectors: vectors.len(),
            reused,
        })
    }

    /// Stored embeddings of this video that were produced by the current model
    fn reusable_embeddings(&self, video: &VideoRecord) -> HashMap<ContentType, (String, Vec<f32>)> {
        let existing = match self
            .store
            .vectors(&VectorFilter::video(&video.owner_id, &video.id))
        {
            Ok(existing) => existing,
            Err(e) => {
                debug!("Not reusing embeddings for {}: {}", video.id, e);
                return HashMap::new();
            }
        };

        existing
            .into_iter()
            .filter(|v| {
                v.model == self.embedder.model_name() && v.embedding.len() == self.embedder.dimension()
            })
            .map(|v| (v.content_type, (v.text_hash, v.embedding)))
            .collect()
    }

    /// Reindex every video of an owner with bounded concurrency.
    ///
    /// A failing video is logged and listed in the report; the batch goes on.
    /// Cancellation is honoured before each video starts, videos already in
    /// flight run to completion.
    pub async fn reindex_all(
        &self,
        owner_id: &str,
        cancel: CancellationToken,
    ) -> Result<ReindexReport> {
        let start = std::time::Instant::now();
        let videos = self.catalog.list_videos(owner_id)?;
        let total_videos = videos.len();

        info!(
            "Starting reindex of {} videos for {} (concurrency {})",
            total_videos, owner_id, self.max_concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut cancelled = false;

        for video in videos {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => Some(permit.map_err(|e| {
                    BrainError::Other(anyhow::anyhow!("Indexing semaphore closed: {}", e))
                })?),
            };

            let Some(permit) = permit.filter(|_| !cancel.is_cancelled()) else {
                cancelled = true;
                break;
            };

            let indexer = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let result = indexer.reindex_video(&video).await;
                (video.id, result)
            });
        }

        let mut indexed_count = 0;
        let mut empty_count = 0;
        let mut failures = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) if outcome.vectors > 0 => indexed_count += 1,
                Ok((_, Ok(_))) => empty_count += 1,
                Ok((video_id, Err(e))) => {
                    warn!("Failed to index video {}: {}", video_id, e);
                    failures.push(IndexFailure {
                        video_id,
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Indexing task aborted: {}", e);
                    failures.push(IndexFailure {
                        video_id: "unknown".to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        failures.sort_by(|a, b| a.video_id.cmp(&b.video_id));

        let duration_ms = start.elapsed().as_millis() as u64;
        if cancelled {
            warn!(
                "Reindex of {} cancelled after {} of {} videos",
                owner_id,
                indexed_count + empty_count + failures.len(),
                total_videos
            );
        }
        info!(
            "Reindex complete for {}: {} indexed, {} empty, {} failed, {}ms",
            owner_id,
            indexed_count,
            empty_count,
            failures.len(),
            duration_ms
        );

        Ok(ReindexReport {
            owner_id: owner_id.to_string(),
            success: !cancelled,
            total_videos,
            indexed_count,
            empty_count,
            failures,
            cancelled,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::video;
    use crate::embedding::{EmbeddingError, EmbeddingProvider, HashingEmbedder, RetryPolicy};
    use crate::storage::{SqliteVectorStore, SqliteVideoCatalog, StorageManager};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Hashing embedder that counts calls and rejects texts containing "poison"
    struct Counting {
        inner: HashingEmbedder,
        calls: AtomicUsize,
    }

    impl EmbeddingProvider for Counting {
        fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("poison") {
                return Err(EmbeddingError::InvalidInput("poisoned text".to_string()));
            }
            self.inner.embed(text)
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    struct Fixture {
        indexer: Indexer,
        store: Arc<SqliteVectorStore>,
        catalog: Arc<SqliteVideoCatalog>,
        provider: Arc<Counting>,
        _temp: TempDir,
    }

    fn fixture(reuse: bool) -> Fixture {
        let temp = TempDir::new().unwrap();
        let storage = StorageManager::new(temp.path().join("brain.sqlite"), 4).unwrap();
        let provider = Arc::new(Counting {
            inner: HashingEmbedder::new(64).unwrap(),
            calls: AtomicUsize::new(0),
        });
        let store = storage.vector_store();
        let catalog = storage.video_catalog();

        let indexer = Indexer::new(
            Arc::new(ContentExtractor::new().unwrap()),
            RetryingEmbedder::new(provider.clone(), RetryPolicy::default()),
            store.clone(),
            catalog.clone(),
            &IndexingConfig {
                max_concurrency: 2,
                reuse_unchanged_embeddings: reuse,
            },
        );

        Fixture {
            indexer,
            store,
            catalog,
            provider,
            _temp: temp,
        }
    }

    fn scripted(id: &str, script: &str) -> VideoRecord {
        let mut record = video(id, "alice", 1);
        record.script = Some(script.to_string());
        record
    }

    #[tokio::test]
    async fn test_no_text_yields_no_vectors() {
        let f = fixture(true);
        let outcome = f.indexer.reindex_video(&video("v1", "alice", 1)).await.unwrap();
        assert_eq!(outcome.vectors, 0);
        assert_eq!(f.store.indexed_video_count("alice").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reindex_is_idempotent() {
        let f = fixture(false);
        let record = scripted("v1", "Three pantry swaps.\nFollow for more");

        f.indexer.reindex_video(&record).await.unwrap();
        let first = f.store.vectors(&VectorFilter::video("alice", "v1")).unwrap();
        f.indexer.reindex_video(&record).await.unwrap();
        let second = f.store.vectors(&VectorFilter::video("alice", "v1")).unwrap();

        let types = |vs: &[ContentVector]| vs.iter().map(|v| v.content_type).collect::<Vec<_>>();
        assert_eq!(first.len(), 3);
        assert_eq!(types(&first), types(&second));
    }

    #[tokio::test]
    async fn test_other_owner_with_same_id_leaves_vectors_alone() {
        let f = fixture(true);
        f.indexer
            .reindex_video(&scripted("v1", "Three pantry swaps"))
            .await
            .unwrap();
        let version = f.store.corpus_version("alice").unwrap();

        let mut theirs = video("v1", "bob", 1);
        theirs.script = Some("Desk setup tour".to_string());
        f.indexer.reindex_video(&theirs).await.unwrap();

        let alice = f.store.vectors(&VectorFilter::video("alice", "v1")).unwrap();
        assert_eq!(alice.len(), 2);
        assert!(alice.iter().all(|v| v.text.contains("pantry")));
        assert_eq!(f.store.corpus_version("alice").unwrap(), version);
        assert_eq!(f.store.indexed_video_count("bob").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_text_reuses_embeddings() {
        let f = fixture(true);
        let mut record = scripted("v1", "Three pantry swaps");

        f.indexer.reindex_video(&record).await.unwrap();
        let calls = f.provider.calls.load(Ordering::SeqCst);

        record.views = 5000;
        let outcome = f.indexer.reindex_video(&record).await.unwrap();
        assert_eq!(outcome.reused, outcome.vectors);
        assert_eq!(f.provider.calls.load(Ordering::SeqCst), calls);

        let stored = f.store.vectors(&VectorFilter::video("alice", "v1")).unwrap();
        assert!(stored.iter().all(|v| v.metrics.views == 5000));
    }

    #[tokio::test]
    async fn test_failed_embedding_keeps_previous_vectors() {
        let f = fixture(true);
        f.indexer
            .reindex_video(&scripted("v1", "Good old script"))
            .await
            .unwrap();

        let result = f.indexer.reindex_video(&scripted("v1", "poison script")).await;
        assert!(result.is_err());

        let stored = f.store.vectors(&VectorFilter::video("alice", "v1")).unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|v| v.text.contains("Good old")));
    }

    #[tokio::test]
    async fn test_index_video_unknown_id() {
        let f = fixture(true);
        assert!(matches!(
            f.indexer.index_video("missing").await,
            Err(BrainError::NotFound { .. })
        ));

        f.catalog.upsert_video(&scripted("v1", "Hello there")).unwrap();
        assert!(f.indexer.index_video("v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_reindex_all_isolates_failures() {
        let f = fixture(true);
        for i in 1..=5 {
            let text = if i == 3 {
                "poison pill".to_string()
            } else {
                format!("video number {}", i)
            };
            f.catalog.upsert_video(&scripted(&format!("v{}", i), &text)).unwrap();
        }
        f.catalog.upsert_video(&video("silent", "alice", 2)).unwrap();

        let report = f
            .indexer
            .reindex_all("alice", CancellationToken::new())
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.total_videos, 6);
        assert_eq!(report.indexed_count, 4);
        assert_eq!(report.empty_count, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].video_id, "v3");
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let f = fixture(true);
        for i in 0..3 {
            f.catalog
                .upsert_video(&scripted(&format!("v{}", i), "some words"))
                .unwrap();
        }

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = f.indexer.reindex_all("alice", cancel).await.unwrap();

        assert!(report.cancelled);
        assert!(!report.success);
        assert_eq!(report.indexed_count, 0);
        assert_eq!(f.provider.calls.load(Ordering::SeqCst), 0);
    }
}
