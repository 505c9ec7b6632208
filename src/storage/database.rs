//! SQLite database management with migrations
//!
//! Provides structured storage for videos, content vectors, account contexts,
//! idea outcomes and insights

use crate::error::{BrainError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database manager with migration support
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Create a new database connection
    pub fn new(db_path: &Path, pool_size: u32) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BrainError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        // Pragmas run on every pooled connection
        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder().max_size(pool_size).build(manager)?;

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);

                conn.execute_batch(migration)?;

                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Get database statistics for one owner
    pub fn stats(&self, owner_id: &str) -> Result<DbStats> {
        let conn = self.get_conn()?;

        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, params![owner_id], |row| row.get(0))?;
            Ok(n as usize)
        };

        let corpus_version: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM corpus_versions WHERE owner_id = ?1",
                params![owner_id],
                |row| row.get(0),
            )
            .unwrap_or(0);

        Ok(DbStats {
            video_count: count("SELECT COUNT(*) FROM videos WHERE owner_id = ?1")?,
            indexed_video_count: count(
                "SELECT COUNT(DISTINCT video_id) FROM content_vectors WHERE owner_id = ?1",
            )?,
            vector_count: count("SELECT COUNT(*) FROM content_vectors WHERE owner_id = ?1")?,
            outcome_count: count("SELECT COUNT(*) FROM idea_outcomes WHERE owner_id = ?1")?,
            insight_count: count(
                "SELECT COUNT(*) FROM insights WHERE owner_id = ?1 AND dismissed = 0",
            )?,
            corpus_version: corpus_version as u64,
        })
    }
}

/// Database statistics for one owner
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub video_count: usize,
    pub indexed_video_count: usize,
    pub vector_count: usize,
    pub outcome_count: usize,
    pub insight_count: usize,
    pub corpus_version: u64,
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    -- Raw video catalog
    CREATE TABLE videos (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        published_at INTEGER NOT NULL,
        record TEXT NOT NULL,  -- JSON VideoRecord
        updated_at INTEGER NOT NULL
    );

    CREATE INDEX idx_videos_owner ON videos(owner_id, published_at);

    -- Embedded fragments with their metrics snapshot
    CREATE TABLE content_vectors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id TEXT NOT NULL,
        video_id TEXT NOT NULL,
        content_type TEXT NOT NULL,
        text TEXT NOT NULL,
        text_hash TEXT NOT NULL,
        embedding BLOB NOT NULL,
        model TEXT NOT NULL,
        retention_pct REAL,
        saves_per_1k REAL,
        follows_per_1k REAL,
        for_you_pct REAL,
        views INTEGER NOT NULL,
        duration_seconds REAL NOT NULL,
        published_at INTEGER NOT NULL,
        theme TEXT,
        cta_type TEXT,
        editing_style TEXT,
        indexed_at INTEGER NOT NULL,
        UNIQUE (owner_id, video_id, content_type)
    );

    CREATE INDEX idx_vectors_owner ON content_vectors(owner_id, published_at);
    CREATE INDEX idx_vectors_theme ON content_vectors(owner_id, theme);

    -- Monotonic per-owner counter bumped on every index mutation
    CREATE TABLE corpus_versions (
        owner_id TEXT PRIMARY KEY,
        version INTEGER NOT NULL
    );

    -- Account context (scoring weights and strategy metadata)
    CREATE TABLE account_contexts (
        owner_id TEXT PRIMARY KEY,
        context TEXT NOT NULL,  -- JSON AccountContext
        updated_at INTEGER NOT NULL
    );

    -- Recorded content idea outcomes
    CREATE TABLE idea_outcomes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id TEXT NOT NULL,
        idea_title TEXT NOT NULL,
        status TEXT NOT NULL,
        metrics TEXT,  -- JSON OutcomeMetrics
        recorded_at INTEGER NOT NULL
    );

    CREATE INDEX idx_outcomes_owner ON idea_outcomes(owner_id, recorded_at);

    -- Surfaced insights
    CREATE TABLE insights (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        subject TEXT NOT NULL,
        priority TEXT NOT NULL,
        confidence REAL NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        dismissed INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX idx_insights_owner ON insights(owner_id, kind, subject);
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_database_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");

        let _db = Database::new(&db_path, 4).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_migrations() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Database::new(&db_path, 4).unwrap();

        let conn = db.get_conn().unwrap();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM _migrations", [], |row| row.get(0))
            .unwrap();

        assert_eq!(version, MIGRATIONS.len() as i32);
    }

    #[test]
    fn test_reopen_does_not_reapply() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        drop(Database::new(&db_path, 2).unwrap());
        let db = Database::new(&db_path, 2).unwrap();

        let conn = db.get_conn().unwrap();
        let applied: i32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, MIGRATIONS.len() as i32);
    }

    #[test]
    fn test_schema_exists() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Database::new(&db_path, 4).unwrap();
        let conn = db.get_conn().unwrap();

        let tables = vec![
            "videos",
            "content_vectors",
            "corpus_versions",
            "account_contexts",
            "idea_outcomes",
            "insights",
        ];

        for table in tables {
            let count: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    params![table],
                    |row| row.get(0),
                )
                .unwrap();

            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_empty_stats() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db"), 2).unwrap();

        let stats = db.stats("alice").unwrap();
        assert_eq!(stats.video_count, 0);
        assert_eq!(stats.corpus_version, 0);
    }
}
