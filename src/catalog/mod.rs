//! Raw video catalog
//!
//! Typed schema for the creator's video records. Records are validated once at
//! the ingestion boundary; everything downstream trusts them.

mod import;

pub use import::{import_file, parse_records, ImportReport, RejectedRecord};

use crate::error::{BrainError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-source traffic counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficSources {
    #[serde(default)]
    pub for_you: u64,
    #[serde(default)]
    pub following: u64,
    #[serde(default)]
    pub profile: u64,
    #[serde(default)]
    pub search: u64,
    #[serde(default)]
    pub other: u64,
}

impl TrafficSources {
    pub fn total(&self) -> u64 {
        self.for_you + self.following + self.profile + self.search + self.other
    }
}

/// A single published video with its engagement counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: String,
    pub owner_id: String,
    #[serde(default)]
    pub hook: Option<String>,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub cta: Option<String>,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub shares: u64,
    #[serde(default)]
    pub saves: u64,
    #[serde(default)]
    pub new_followers: u64,
    /// Average watch time in seconds
    #[serde(default)]
    pub avg_time_watched: f64,
    #[serde(default)]
    pub duration_seconds: f64,
    #[serde(default)]
    pub traffic: TrafficSources,
    pub published_date: DateTime<Utc>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub cta_type: Option<String>,
    #[serde(default)]
    pub editing_style: Option<String>,
}

impl VideoRecord {
    /// Check the record before it enters the catalog
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(BrainError::validation("id", "Video id cannot be empty"));
        }
        if self.owner_id.trim().is_empty() {
            return Err(BrainError::validation(
                "owner_id",
                format!("Owner id cannot be empty (video {})", self.id),
            ));
        }
        if !self.duration_seconds.is_finite() || self.duration_seconds < 0.0 {
            return Err(BrainError::validation(
                "duration_seconds",
                format!(
                    "Duration must be a non-negative number, got {}",
                    self.duration_seconds
                ),
            ));
        }
        if !self.avg_time_watched.is_finite() || self.avg_time_watched < 0.0 {
            return Err(BrainError::validation(
                "avg_time_watched",
                format!(
                    "Average watch time must be a non-negative number, got {}",
                    self.avg_time_watched
                ),
            ));
        }
        Ok(())
    }
}

/// Read access to the external video catalog
pub trait VideoCatalog: Send + Sync {
    /// Fetch one video by id
    fn get_video(&self, video_id: &str) -> Result<Option<VideoRecord>>;

    /// All videos of an owner, oldest first
    fn list_videos(&self, owner_id: &str) -> Result<Vec<VideoRecord>>;

    /// Insert or replace a validated record
    fn upsert_video(&self, video: &VideoRecord) -> Result<()>;
}
