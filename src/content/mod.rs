//! Content fragments and the vectors built from them

mod extractor;
mod metrics;

pub use extractor::{ContentExtractor, DEFAULT_CTA_KEYWORDS, HOOK_TOKEN_LIMIT};
pub use metrics::{DurationBucket, MetricsSnapshot};

use crate::catalog::VideoRecord;
use crate::error::BrainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of text fragment extracted from a video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Hook,
    Script,
    Cta,
}

impl ContentType {
    pub const ALL: [ContentType; 3] = [ContentType::Hook, ContentType::Script, ContentType::Cta];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Hook => "hook",
            ContentType::Script => "script",
            ContentType::Cta => "cta",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = BrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hook" => Ok(ContentType::Hook),
            "script" => Ok(ContentType::Script),
            "cta" => Ok(ContentType::Cta),
            other => Err(BrainError::validation(
                "content_type",
                format!("Unknown content type '{}', expected hook, script or cta", other),
            )),
        }
    }
}

/// A piece of text pulled out of a video, ready to embed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub content_type: ContentType,
    pub text: String,
}

/// Categorical tags copied from the video at index time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentTags {
    pub theme: Option<String>,
    pub cta_type: Option<String>,
    pub editing_style: Option<String>,
}

impl ContentTags {
    pub fn from_record(video: &VideoRecord) -> Self {
        Self {
            theme: non_empty(video.theme.as_deref()),
            cta_type: non_empty(video.cta_type.as_deref()),
            editing_style: non_empty(video.editing_style.as_deref()),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// One embedded fragment of a video plus its performance snapshot.
///
/// At most one live vector exists per (video_id, content_type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentVector {
    pub owner_id: String,
    pub video_id: String,
    pub content_type: ContentType,
    pub text: String,
    /// BLAKE3 hex digest of `text`
    pub text_hash: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub model: String,
    pub metrics: MetricsSnapshot,
    pub tags: ContentTags,
    pub indexed_at: DateTime<Utc>,
}

impl ContentVector {
    pub fn new(
        video: &VideoRecord,
        fragment: Fragment,
        embedding: Vec<f32>,
        model: impl Into<String>,
    ) -> Self {
        let text_hash = hash_text(&fragment.text);
        Self {
            owner_id: video.owner_id.clone(),
            video_id: video.id.clone(),
            content_type: fragment.content_type,
            text: fragment.text,
            text_hash,
            embedding,
            model: model.into(),
            metrics: MetricsSnapshot::from_record(video),
            tags: ContentTags::from_record(video),
            indexed_at: Utc::now(),
        }
    }

    /// Stable identifier, unique because of the one-vector-per-type invariant
    pub fn vector_id(&self) -> String {
        format!("{}:{}", self.video_id, self.content_type)
    }
}

/// BLAKE3 digest used to detect unchanged fragment text
pub fn hash_text(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::video;

    #[test]
    fn test_content_type_parse() {
        assert_eq!("Hook".parse::<ContentType>().unwrap(), ContentType::Hook);
        assert_eq!(" cta ".parse::<ContentType>().unwrap(), ContentType::Cta);
        assert!("thumbnail".parse::<ContentType>().is_err());
    }

    #[test]
    fn test_vector_id_and_hash() {
        let mut record = video("v7", "alice", 3);
        record.theme = Some("  ".to_string());
        record.editing_style = Some("jump cuts".to_string());

        let vector = ContentVector::new(
            &record,
            Fragment {
                content_type: ContentType::Script,
                text: "hello".to_string(),
            },
            vec![0.1, 0.2],
            "test-model",
        );

        assert_eq!(vector.vector_id(), "v7:script");
        assert_eq!(vector.text_hash, hash_text("hello"));
        assert_eq!(vector.tags.theme, None);
        assert_eq!(vector.tags.editing_style.as_deref(), Some("jump cuts"));
    }
}
