//! SQLite-backed video catalog

use super::Database;
use crate::catalog::{VideoCatalog, VideoRecord};
use crate::error::{BrainError, Result};
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

pub struct SqliteVideoCatalog {
    db: Arc<Database>,
}

impl SqliteVideoCatalog {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

fn decode(video_id: &str, json: &str) -> Result<VideoRecord> {
    serde_json::from_str(json).map_err(|e| BrainError::Json {
        source: e,
        context: format!("Failed to decode stored video {}", video_id),
    })
}

impl VideoCatalog for SqliteVideoCatalog {
    fn get_video(&self, video_id: &str) -> Result<Option<VideoRecord>> {
        let conn = self.db.get_conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT record FROM videos WHERE id = ?1",
                params![video_id],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|j| decode(video_id, &j)).transpose()
    }

    fn list_videos(&self, owner_id: &str) -> Result<Vec<VideoRecord>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, record FROM videos WHERE owner_id = ?1 ORDER BY published_at ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![owner_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut videos = Vec::new();
        for row in rows {
            let (id, json) = row?;
            videos.push(decode(&id, &json)?);
        }
        Ok(videos)
    }

    fn upsert_video(&self, video: &VideoRecord) -> Result<()> {
        video.validate()?;

        let json = serde_json::to_string(video).map_err(|e| BrainError::Json {
            source: e,
            context: format!("Failed to encode video {}", video.id),
        })?;

        let conn = self.db.get_conn()?;
        // A video never changes owner: the conflict update only fires for the same owner
        let written = conn.execute(
            "INSERT INTO videos (id, owner_id, published_at, record, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 published_at = excluded.published_at,
                 record = excluded.record,
                 updated_at = excluded.updated_at
             WHERE videos.owner_id = excluded.owner_id",
            params![
                video.id,
                video.owner_id,
                video.published_date.timestamp(),
                json,
                chrono::Utc::now().timestamp(),
            ],
        )?;

        if written == 0 {
            return Err(BrainError::validation(
                "owner_id",
                format!("Video {} belongs to another owner", video.id),
            ));
        }
        Ok(())
    }
}
