//! Storage layer for clipbrain
//!
//! One SQLite database behind an r2d2 pool holds the video catalog, the
//! content vectors, account contexts, the outcome log and surfaced insights.

pub mod accounts;
pub mod database;
pub mod insights;
pub mod vectors;
pub mod videos;

use crate::config::Config;
use crate::error::{BrainError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use accounts::SqliteAccountStore;
pub use database::{Database, DbPool, DbStats};
pub use insights::SqliteInsightStore;
pub use vectors::{
    ScoredVector, SimilarityResponse, SqliteVectorStore, VectorFilter, VectorStore, DEGRADED_SCORE,
};
pub use videos::SqliteVideoCatalog;

/// Owns the database and hands out the SQLite-backed stores
pub struct StorageManager {
    pub database: Arc<Database>,
    db_path: PathBuf,
}

impl StorageManager {
    /// Open (or create) the database at `db_path`
    pub fn new(db_path: PathBuf, pool_size: u32) -> Result<Self> {
        let database = Database::new(&db_path, pool_size)?;
        Ok(Self {
            database: Arc::new(database),
            db_path,
        })
    }

    /// Open the database configured in `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.database_path()?, config.storage.pool_size)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn vector_store(&self) -> Arc<SqliteVectorStore> {
        Arc::new(SqliteVectorStore::new(Arc::clone(&self.database)))
    }

    pub fn video_catalog(&self) -> Arc<SqliteVideoCatalog> {
        Arc::new(SqliteVideoCatalog::new(Arc::clone(&self.database)))
    }

    pub fn account_store(&self) -> Arc<SqliteAccountStore> {
        Arc::new(SqliteAccountStore::new(Arc::clone(&self.database)))
    }

    pub fn insight_store(&self) -> Arc<SqliteInsightStore> {
        Arc::new(SqliteInsightStore::new(Arc::clone(&self.database)))
    }

    /// Row counts for one owner plus the on-disk size of the database
    pub fn stats(&self, owner_id: &str) -> Result<StorageStats> {
        Ok(StorageStats {
            db: self.database.stats(owner_id)?,
            database_size: Self::file_size(&self.db_path)?,
        })
    }

    /// Size of the database file and its WAL sidecar
    fn file_size(path: &Path) -> Result<u64> {
        let mut size = 0u64;
        let wal = PathBuf::from(format!("{}-wal", path.display()));

        for file in [path, wal.as_path()] {
            if file.exists() {
                size += std::fs::metadata(file)
                    .map_err(|e| BrainError::Io {
                        source: e,
                        context: format!("Failed to get file metadata: {}", file.display()),
                    })?
                    .len();
            }
        }

        Ok(size)
    }
}

/// Combined storage statistics
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    #[serde(flatten)]
    pub db: DbStats,
    pub database_size: u64,
}

impl StorageStats {
    /// Format size as human-readable string
    pub fn format_size(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
