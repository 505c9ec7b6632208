//! Performance metrics snapshot taken at index time

use crate::catalog::VideoRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Derived engagement metrics.
///
/// Ratios are `None` when their denominator is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub retention_pct: Option<f64>,
    pub saves_per_1k: Option<f64>,
    pub follows_per_1k: Option<f64>,
    pub for_you_pct: Option<f64>,
    pub views: u64,
    pub duration_seconds: f64,
    pub published_date: DateTime<Utc>,
}

impl MetricsSnapshot {
    pub fn from_record(video: &VideoRecord) -> Self {
        let retention_pct = if video.duration_seconds > 0.0 {
            Some((video.avg_time_watched / video.duration_seconds * 100.0).clamp(0.0, 100.0))
        } else {
            None
        };

        let per_1k = |count: u64| {
            if video.views > 0 {
                Some(count as f64 / video.views as f64 * 1000.0)
            } else {
                None
            }
        };

        let total_traffic = video.traffic.total();
        let for_you_pct = if total_traffic > 0 {
            Some(video.traffic.for_you as f64 / total_traffic as f64 * 100.0)
        } else {
            None
        };

        Self {
            retention_pct,
            saves_per_1k: per_1k(video.saves),
            follows_per_1k: per_1k(video.new_followers),
            for_you_pct,
            views: video.views,
            duration_seconds: video.duration_seconds,
            published_date: video.published_date,
        }
    }

    /// Age in fractional days at `now`, never negative
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        let seconds = (now - self.published_date).num_seconds().max(0) as f64;
        seconds / 86_400.0
    }
}

/// Coarse video length classes used by facets and predictions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DurationBucket {
    #[serde(rename = "<20s")]
    Short,
    #[serde(rename = "20-40s")]
    Medium,
    #[serde(rename = ">40s")]
    Long,
}

impl DurationBucket {
    pub const ALL: [DurationBucket; 3] = [
        DurationBucket::Short,
        DurationBucket::Medium,
        DurationBucket::Long,
    ];

    pub fn of(duration_seconds: f64) -> Self {
        if duration_seconds < 20.0 {
            DurationBucket::Short
        } else if duration_seconds <= 40.0 {
            DurationBucket::Medium
        } else {
            DurationBucket::Long
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DurationBucket::Short => "<20s",
            DurationBucket::Medium => "20-40s",
            DurationBucket::Long => ">40s",
        }
    }

    /// Key factor label naming this length class
    pub fn factor(&self) -> &'static str {
        match self {
            DurationBucket::Short => "short_duration",
            DurationBucket::Medium => "medium_duration",
            DurationBucket::Long => "long_duration",
        }
    }
}
