//! Content vector persistence with filterable cosine-similarity retrieval

use super::Database;
use crate::content::{ContentTags, ContentType, ContentVector, MetricsSnapshot};
use crate::error::{BrainError, Result};
use crate::stats::cosine_similarity;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Row, Transaction};
use std::cmp::Ordering;
use std::sync::Arc;

/// Score assigned to rows returned by the recency fallback
pub const DEGRADED_SCORE: f32 = 0.5;

/// Row predicates applied to every store query. Owner scoping is mandatory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorFilter {
    pub owner_id: String,
    /// Empty means every content type
    pub content_types: Vec<ContentType>,
    pub published_after: Option<DateTime<Utc>>,
    pub published_before: Option<DateTime<Utc>>,
    pub min_views: Option<u64>,
    pub theme: Option<String>,
    pub video_id: Option<String>,
}

impl VectorFilter {
    pub fn owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            ..Default::default()
        }
    }

    pub fn video(owner_id: impl Into<String>, video_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            video_id: Some(video_id.into()),
            ..Default::default()
        }
    }

    /// SQL WHERE clause and its bound parameters
    fn to_sql(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let mut clauses = vec!["owner_id = ?".to_string()];
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(self.owner_id.clone())];

        if !self.content_types.is_empty() {
            let placeholders = vec!["?"; self.content_types.len()].join(", ");
            clauses.push(format!("content_type IN ({})", placeholders));
            for content_type in &self.content_types {
                values.push(Box::new(content_type.as_str().to_string()));
            }
        }
        if let Some(after) = self.published_after {
            clauses.push("published_at >= ?".to_string());
            values.push(Box::new(after.timestamp()));
        }
        if let Some(before) = self.published_before {
            clauses.push("published_at <= ?".to_string());
            values.push(Box::new(before.timestamp()));
        }
        if let Some(min_views) = self.min_views {
            clauses.push("views >= ?".to_string());
            values.push(Box::new(min_views as i64));
        }
        if let Some(theme) = &self.theme {
            clauses.push("theme = ? COLLATE NOCASE".to_string());
            values.push(Box::new(theme.clone()));
        }
        if let Some(video_id) = &self.video_id {
            clauses.push("video_id = ?".to_string());
            values.push(Box::new(video_id.clone()));
        }

        (clauses.join(" AND "), values)
    }
}

/// A stored vector with its similarity to the query
#[derive(Debug, Clone)]
pub struct ScoredVector {
    pub vector: ContentVector,
    pub similarity: f32,
}

/// Result of a similarity query
#[derive(Debug, Clone, Default)]
pub struct SimilarityResponse {
    /// Best matches first
    pub matches: Vec<ScoredVector>,
    /// True when similarity search was unavailable and recency was used
    pub degraded: bool,
}

/// Vector-capable store
pub trait VectorStore: Send + Sync {
    /// Insert or replace the vector for (video_id, content_type)
    fn upsert(&self, vector: &ContentVector) -> Result<()>;

    /// Delete every matching vector, returning the number removed
    fn delete(&self, filter: &VectorFilter) -> Result<usize>;

    /// Atomically replace all vectors of a video
    fn replace_video(&self, owner_id: &str, video_id: &str, vectors: &[ContentVector])
        -> Result<()>;

    /// Top-k matching vectors by cosine similarity, or the k most recent
    /// matching rows with a neutral score when similarity is unavailable
    fn similarity_query(
        &self,
        embedding: &[f32],
        filter: &VectorFilter,
        k: usize,
    ) -> Result<SimilarityResponse>;

    /// Every matching vector, oldest first
    fn vectors(&self, filter: &VectorFilter) -> Result<Vec<ContentVector>>;

    /// Every matching vector without its embedding, oldest first. Never fails
    /// on undecodable embeddings.
    fn population(&self, filter: &VectorFilter) -> Result<Vec<ContentVector>>;

    /// Monotonic counter bumped on every mutation of the owner's vectors
    fn corpus_version(&self, owner_id: &str) -> Result<u64>;

    /// Number of distinct videos with at least one vector
    fn indexed_video_count(&self, owner_id: &str) -> Result<usize>;
}

/// Why a similarity scan could not be answered
#[derive(Debug)]
enum ScanError {
    Unavailable(String),
    Store(BrainError),
}

impl From<rusqlite::Error> for ScanError {
    fn from(e: rusqlite::Error) -> Self {
        ScanError::Store(e.into())
    }
}

/// SQLite-backed vector store. Scalar predicates run in SQL; cosine
/// similarity is computed over the matching rows.
pub struct SqliteVectorStore {
    db: Arc<Database>,
}

const VECTOR_COLUMNS: &str = "owner_id, video_id, content_type, text, text_hash, embedding, model, \
     retention_pct, saves_per_1k, follows_per_1k, for_you_pct, views, duration_seconds, \
     published_at, theme, cta_type, editing_style, indexed_at";

impl SqliteVectorStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn scan_similar(
        &self,
        embedding: &[f32],
        filter: &VectorFilter,
        k: usize,
    ) -> std::result::Result<Vec<ScoredVector>, ScanError> {
        let conn = self.db.get_conn().map_err(ScanError::Store)?;
        let (clause, values) = filter.to_sql();
        let sql = format!("SELECT {} FROM content_vectors WHERE {}", VECTOR_COLUMNS, clause);

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values.iter()))?;

        let mut scored = Vec::new();
        while let Some(row) = rows.next()? {
            let vector = row_to_vector(row)?;
            if vector.embedding.len() != embedding.len() {
                return Err(ScanError::Unavailable(format!(
                    "stored embedding for {} has dimension {}, query has {}",
                    vector.vector_id(),
                    vector.embedding.len(),
                    embedding.len()
                )));
            }
            let similarity = cosine_similarity(embedding, &vector.embedding);
            scored.push(ScoredVector { vector, similarity });
        }

        // Ties broken by recency then id so results are reproducible
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    b.vector
                        .metrics
                        .published_date
                        .cmp(&a.vector.metrics.published_date)
                })
                .then_with(|| a.vector.vector_id().cmp(&b.vector.vector_id()))
        });
        scored.truncate(k);
        Ok(scored)
    }

    fn recent(&self, filter: &VectorFilter, k: usize) -> Result<Vec<ScoredVector>> {
        let conn = self.db.get_conn()?;
        let (clause, mut values) = filter.to_sql();
        let sql = format!(
            "SELECT {} FROM content_vectors WHERE {} ORDER BY published_at DESC, id ASC LIMIT ?",
            VECTOR_COLUMNS, clause
        );
        values.push(Box::new(k as i64));

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values.iter()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            // Undecodable embeddings are irrelevant here
            let vector = row_to_vector_lenient(row)?;
            out.push(ScoredVector {
                vector,
                similarity: DEGRADED_SCORE,
            });
        }
        Ok(out)
    }
}

fn bump_version(tx: &Transaction<'_>, owner_id: &str) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO corpus_versions (owner_id, version) VALUES (?1, 1)
         ON CONFLICT(owner_id) DO UPDATE SET version = version + 1",
        params![owner_id],
    )?;
    Ok(())
}

fn insert_vector(tx: &Transaction<'_>, vector: &ContentVector) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO content_vectors (owner_id, video_id, content_type, text, text_hash, embedding,
             model, retention_pct, saves_per_1k, follows_per_1k, for_you_pct, views,
             duration_seconds, published_at, theme, cta_type, editing_style, indexed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
         ON CONFLICT(owner_id, video_id, content_type) DO UPDATE SET
             text = excluded.text,
             text_hash = excluded.text_hash,
             embedding = excluded.embedding,
             model = excluded.model,
             retention_pct = excluded.retention_pct,
             saves_per_1k = excluded.saves_per_1k,
             follows_per_1k = excluded.follows_per_1k,
             for_you_pct = excluded.for_you_pct,
             views = excluded.views,
             duration_seconds = excluded.duration_seconds,
             published_at = excluded.published_at,
             theme = excluded.theme,
             cta_type = excluded.cta_type,
             editing_style = excluded.editing_style,
             indexed_at = excluded.indexed_at",
        params![
            vector.owner_id,
            vector.video_id,
            vector.content_type.as_str(),
            vector.text,
            vector.text_hash,
            encode_embedding(&vector.embedding),
            vector.model,
            vector.metrics.retention_pct,
            vector.metrics.saves_per_1k,
            vector.metrics.follows_per_1k,
            vector.metrics.for_you_pct,
            vector.metrics.views as i64,
            vector.metrics.duration_seconds,
            vector.metrics.published_date.timestamp(),
            vector.tags.theme,
            vector.tags.cta_type,
            vector.tags.editing_style,
            vector.indexed_at.timestamp(),
        ],
    )?;
    Ok(())
}

impl VectorStore for SqliteVectorStore {
    fn upsert(&self, vector: &ContentVector) -> Result<()> {
        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;
        insert_vector(&tx, vector)?;
        bump_version(&tx, &vector.owner_id)?;
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, filter: &VectorFilter) -> Result<usize> {
        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;
        let (clause, values) = filter.to_sql();
        let removed = tx.execute(
            &format!("DELETE FROM content_vectors WHERE {}", clause),
            params_from_iter(values.iter()),
        )?;
        if removed > 0 {
            bump_version(&tx, &filter.owner_id)?;
        }
        tx.commit()?;
        Ok(removed)
    }

    fn replace_video(
        &self,
        owner_id: &str,
        video_id: &str,
        vectors: &[ContentVector],
    ) -> Result<()> {
        if let Some(foreign) = vectors
            .iter()
            .find(|v| v.owner_id != owner_id || v.video_id != video_id)
        {
            return Err(BrainError::validation(
                "vectors",
                format!(
                    "Vector {} does not belong to video {} of {}",
                    foreign.vector_id(),
                    video_id,
                    owner_id
                ),
            ));
        }

        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM content_vectors WHERE owner_id = ?1 AND video_id = ?2",
            params![owner_id, video_id],
        )?;
        for vector in vectors {
            insert_vector(&tx, vector)?;
        }
        bump_version(&tx, owner_id)?;
        tx.commit()?;
        Ok(())
    }

    fn similarity_query(
        &self,
        embedding: &[f32],
        filter: &VectorFilter,
        k: usize,
    ) -> Result<SimilarityResponse> {
        if k == 0 {
            return Ok(SimilarityResponse::default());
        }

        match self.scan_similar(embedding, filter, k) {
            Ok(matches) => Ok(SimilarityResponse {
                matches,
                degraded: false,
            }),
            Err(ScanError::Unavailable(reason)) => {
                tracing::warn!(
                    "Similarity search unavailable for {}, falling back to recency: {}",
                    filter.owner_id,
                    reason
                );
                Ok(SimilarityResponse {
                    matches: self.recent(filter, k)?,
                    degraded: true,
                })
            }
            Err(ScanError::Store(e)) => Err(e),
        }
    }

    fn vectors(&self, filter: &VectorFilter) -> Result<Vec<ContentVector>> {
        let conn = self.db.get_conn()?;
        let (clause, values) = filter.to_sql();
        let sql = format!(
            "SELECT {} FROM content_vectors WHERE {} ORDER BY published_at ASC, id ASC",
            VECTOR_COLUMNS, clause
        );

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values.iter()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let vector = row_to_vector(row).map_err(|e| match e {
                ScanError::Unavailable(reason) => BrainError::upstream("vector-store", reason, false),
                ScanError::Store(e) => e,
            })?;
            out.push(vector);
        }
        Ok(out)
    }

    fn population(&self, filter: &VectorFilter) -> Result<Vec<ContentVector>> {
        let conn = self.db.get_conn()?;
        let (clause, values) = filter.to_sql();
        let sql = format!(
            "SELECT {} FROM content_vectors WHERE {} ORDER BY published_at ASC, id ASC",
            VECTOR_COLUMNS, clause
        );

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values.iter()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(build_vector(row, Vec::new())?);
        }
        Ok(out)
    }

    fn corpus_version(&self, owner_id: &str) -> Result<u64> {
        let conn = self.db.get_conn()?;
        let version: i64 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM corpus_versions WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get(0),
        )?;
        Ok(version as u64)
    }

    fn indexed_video_count(&self, owner_id: &str) -> Result<usize> {
        let conn = self.db.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT video_id) FROM content_vectors WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

/// Little-endian f32 encoding used for the embedding column
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

pub fn decode_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

fn row_to_vector(row: &Row<'_>) -> std::result::Result<ContentVector, ScanError> {
    let blob: Vec<u8> = row.get(5)?;
    let video_id: String = row.get(1)?;
    let embedding = decode_embedding(&blob).ok_or_else(|| {
        ScanError::Unavailable(format!("embedding for video {} is corrupt", video_id))
    })?;
    Ok(build_vector(row, embedding)?)
}

fn row_to_vector_lenient(row: &Row<'_>) -> Result<ContentVector> {
    let blob: Vec<u8> = row.get(5)?;
    let embedding = decode_embedding(&blob).unwrap_or_default();
    Ok(build_vector(row, embedding)?)
}

fn build_vector(row: &Row<'_>, embedding: Vec<f32>) -> rusqlite::Result<ContentVector> {
    let content_type: String = row.get(2)?;
    let content_type = content_type.parse::<ContentType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let views: i64 = row.get(11)?;

    Ok(ContentVector {
        owner_id: row.get(0)?,
        video_id: row.get(1)?,
        content_type,
        text: row.get(3)?,
        text_hash: row.get(4)?,
        embedding,
        model: row.get(6)?,
        metrics: MetricsSnapshot {
            retention_pct: row.get(7)?,
            saves_per_1k: row.get(8)?,
            follows_per_1k: row.get(9)?,
            for_you_pct: row.get(10)?,
            views: views.max(0) as u64,
            duration_seconds: row.get(12)?,
            published_date: timestamp(row.get(13)?),
        },
        tags: ContentTags {
            theme: row.get(14)?,
            cta_type: row.get(15)?,
            editing_style: row.get(16)?,
        },
        indexed_at: timestamp(row.get(17)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::video;
    use crate::content::Fragment;
    use tempfile::TempDir;

    fn store() -> (SqliteVectorStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let db = Database::new(&temp.path().join("test.db"), 4).unwrap();
        (SqliteVectorStore::new(Arc::new(db)), temp)
    }

    fn vector(id: &str, days_ago: i64, content_type: ContentType, emb: Vec<f32>) -> ContentVector {
        let mut record = video(id, "alice", days_ago);
        record.theme = Some("productivity".to_string());
        record.views = 1000 + days_ago as u64;
        ContentVector::new(
            &record,
            Fragment {
                content_type,
                text: format!("{} text", id),
            },
            emb,
            "test-model",
        )
    }

    #[test]
    fn test_embedding_codec() {
        let original = vec![0.25f32, -1.5, 3.0];
        assert_eq!(decode_embedding(&encode_embedding(&original)).unwrap(), original);
        assert!(decode_embedding(&[1, 2, 3]).is_none());
    }

    #[test]
    fn test_upsert_replaces_same_type() {
        let (store, _temp) = store();
        store
            .upsert(&vector("v1", 1, ContentType::Hook, vec![1.0, 0.0]))
            .unwrap();
        store
            .upsert(&vector("v1", 1, ContentType::Hook, vec![0.0, 1.0]))
            .unwrap();

        let all = store.vectors(&VectorFilter::owner("alice")).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].embedding, vec![0.0, 1.0]);
        assert_eq!(store.corpus_version("alice").unwrap(), 2);
    }

    #[test]
    fn test_similarity_ranking_and_filters() {
        let (store, _temp) = store();
        store
            .upsert(&vector("v1", 1, ContentType::Hook, vec![1.0, 0.0]))
            .unwrap();
        store
            .upsert(&vector("v2", 2, ContentType::Hook, vec![0.7, 0.7]))
            .unwrap();
        store
            .upsert(&vector("v3", 3, ContentType::Script, vec![0.0, 1.0]))
            .unwrap();

        let response = store
            .similarity_query(&[1.0, 0.0], &VectorFilter::owner("alice"), 10)
            .unwrap();
        assert!(!response.degraded);
        let ids: Vec<&str> = response
            .matches
            .iter()
            .map(|m| m.vector.video_id.as_str())
            .collect();
        assert_eq!(ids, vec!["v1", "v2", "v3"]);

        let mut filter = VectorFilter::owner("alice");
        filter.content_types = vec![ContentType::Script];
        let response = store.similarity_query(&[1.0, 0.0], &filter, 10).unwrap();
        assert_eq!(response.matches.len(), 1);

        let mut filter = VectorFilter::owner("alice");
        filter.min_views = Some(1002);
        filter.theme = Some("PRODUCTIVITY".to_string());
        let response = store.similarity_query(&[1.0, 0.0], &filter, 10).unwrap();
        assert_eq!(response.matches.len(), 2);

        let other = store
            .similarity_query(&[1.0, 0.0], &VectorFilter::owner("bob"), 10)
            .unwrap();
        assert!(other.matches.is_empty());
    }

    #[test]
    fn test_dimension_mismatch_degrades_to_recency() {
        let (store, _temp) = store();
        store
            .upsert(&vector("old", 10, ContentType::Hook, vec![1.0, 0.0]))
            .unwrap();
        store
            .upsert(&vector("new", 1, ContentType::Hook, vec![0.0, 1.0]))
            .unwrap();

        let response = store
            .similarity_query(&[1.0, 0.0, 0.0], &VectorFilter::owner("alice"), 1)
            .unwrap();

        assert!(response.degraded);
        assert_eq!(response.matches.len(), 1);
        assert_eq!(response.matches[0].vector.video_id, "new");
        assert_eq!(response.matches[0].similarity, DEGRADED_SCORE);
    }

    #[test]
    fn test_replace_video_is_atomic_swap() {
        let (store, _temp) = store();
        store
            .upsert(&vector("v1", 1, ContentType::Hook, vec![1.0, 0.0]))
            .unwrap();
        store
            .upsert(&vector("v1", 1, ContentType::Cta, vec![1.0, 0.0]))
            .unwrap();

        let replacement = vec![vector("v1", 1, ContentType::Script, vec![0.0, 1.0])];
        store.replace_video("alice", "v1", &replacement).unwrap();

        let all = store.vectors(&VectorFilter::video("alice", "v1")).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content_type, ContentType::Script);

        let foreign = vec![vector("v2", 1, ContentType::Hook, vec![1.0, 0.0])];
        assert!(store.replace_video("alice", "v1", &foreign).is_err());
        assert_eq!(store.indexed_video_count("alice").unwrap(), 1);
    }

    #[test]
    fn test_same_video_id_is_isolated_per_owner() {
        let (store, _temp) = store();
        store
            .upsert(&vector("v1", 1, ContentType::Hook, vec![1.0, 0.0]))
            .unwrap();
        let alice_version = store.corpus_version("alice").unwrap();

        let mut theirs = vector("v1", 1, ContentType::Hook, vec![0.0, 1.0]);
        theirs.owner_id = "bob".to_string();
        store.replace_video("bob", "v1", &[theirs.clone()]).unwrap();
        store.upsert(&theirs).unwrap();

        let alice = store.vectors(&VectorFilter::video("alice", "v1")).unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].embedding, vec![1.0, 0.0]);
        assert_eq!(store.corpus_version("alice").unwrap(), alice_version);
        assert_eq!(store.indexed_video_count("bob").unwrap(), 1);

        store.replace_video("bob", "v1", &[]).unwrap();
        assert_eq!(store.indexed_video_count("alice").unwrap(), 1);
        assert_eq!(store.indexed_video_count("bob").unwrap(), 0);
    }

    #[test]
    fn test_delete_bumps_version_only_when_rows_removed() {
        let (store, _temp) = store();
        store
            .upsert(&vector("v1", 1, ContentType::Hook, vec![1.0, 0.0]))
            .unwrap();
        let before = store.corpus_version("alice").unwrap();

        assert_eq!(store.delete(&VectorFilter::video("alice", "nope")).unwrap(), 0);
        assert_eq!(store.corpus_version("alice").unwrap(), before);

        assert_eq!(store.delete(&VectorFilter::video("alice", "v1")).unwrap(), 1);
        assert_eq!(store.corpus_version("alice").unwrap(), before + 1);
    }

    #[test]
    fn test_population_reads_past_corrupt_embeddings() {
        let (store, _temp) = store();
        for i in 0..6 {
            store
                .upsert(&vector(&format!("v{}", i), i, ContentType::Hook, vec![1.0, 0.0]))
                .unwrap();
        }
        {
            let conn = store.db.get_conn().unwrap();
            conn.execute(
                "UPDATE content_vectors SET embedding = ?1 WHERE video_id = 'v2'",
                params![vec![1u8, 2, 3]],
            )
            .unwrap();
        }

        assert!(store.vectors(&VectorFilter::owner("alice")).is_err());

        let mut filter = VectorFilter::owner("alice");
        filter.min_views = Some(1002);
        let population = store.population(&filter).unwrap();
        assert_eq!(population.len(), 4);
        assert!(population.iter().all(|v| v.embedding.is_empty()));
        assert_eq!(population[0].video_id, "v5");
    }

    #[test]
    fn test_zero_k_returns_empty() {
        let (store, _temp) = store();
        let response = store
            .similarity_query(&[1.0], &VectorFilter::owner("alice"), 0)
            .unwrap();
        assert!(response.matches.is_empty());
    }
}
