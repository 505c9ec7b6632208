//! Memoised analytics keyed by owner and corpus version

use super::clustering::Cluster;
use super::corpus::Corpus;
use ahash::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Clone)]
struct Entry {
    version: u64,
    corpus: Arc<Corpus>,
    clusters: Option<Arc<Vec<Cluster>>>,
}

/// Caches the derived corpus and clusters of each owner until the owner's
/// corpus version moves or the owner is invalidated
#[derive(Default)]
pub struct AnalyticsCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl AnalyticsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn corpus(&self, owner_id: &str, version: u64) -> Option<Arc<Corpus>> {
        self.fresh(owner_id, version).map(|e| e.corpus)
    }

    pub fn clusters(&self, owner_id: &str, version: u64) -> Option<Arc<Vec<Cluster>>> {
        self.fresh(owner_id, version).and_then(|e| e.clusters)
    }

    pub fn store_corpus(&self, owner_id: &str, version: u64, corpus: Arc<Corpus>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            owner_id.to_string(),
            Entry {
                version,
                corpus,
                clusters: None,
            },
        );
    }

    /// Attach clusters to the cached corpus of the same version
    pub fn store_clusters(&self, owner_id: &str, version: u64, clusters: Arc<Vec<Cluster>>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get_mut(owner_id) {
            if entry.version == version {
                entry.clusters = Some(clusters);
            }
        }
    }

    /// Drop an owner's entry, e.g. after its ranking weights changed
    pub fn invalidate(&self, owner_id: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(owner_id);
    }

    fn fresh(&self, owner_id: &str, version: u64) -> Option<Entry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(owner_id)
            .filter(|e| e.version == version)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringWeights;

    fn corpus() -> Arc<Corpus> {
        Arc::new(Corpus::build("alice", Vec::new(), &ScoringWeights::default()))
    }

    #[test]
    fn test_version_mismatch_misses() {
        let cache = AnalyticsCache::new();
        cache.store_corpus("alice", 3, corpus());

        assert!(cache.corpus("alice", 3).is_some());
        assert!(cache.corpus("alice", 4).is_none());
        assert!(cache.corpus("bob", 3).is_none());
    }

    #[test]
    fn test_clusters_follow_corpus_version() {
        let cache = AnalyticsCache::new();
        cache.store_corpus("alice", 1, corpus());
        cache.store_clusters("alice", 2, Arc::new(Vec::new()));
        assert!(cache.clusters("alice", 1).is_none());

        cache.store_clusters("alice", 1, Arc::new(Vec::new()));
        assert!(cache.clusters("alice", 1).is_some());

        cache.store_corpus("alice", 2, corpus());
        assert!(cache.clusters("alice", 2).is_none());
    }

    #[test]
    fn test_invalidate() {
        let cache = AnalyticsCache::new();
        cache.store_corpus("alice", 1, corpus());
        cache.invalidate("alice");
        assert!(cache.corpus("alice", 1).is_none());
    }
}
