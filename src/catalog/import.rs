//! JSON import into the video catalog

use super::{VideoCatalog, VideoRecord};
use crate::error::{BrainError, Result};
use serde::Serialize;
use std::path::Path;

/// A record that failed validation during import
#[derive(Debug, Clone, Serialize)]
pub struct RejectedRecord {
    /// Position in the input array
    pub index: usize,
    pub video_id: Option<String>,
    pub reason: String,
}

/// Result of importing a batch of records
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub rejected: Vec<RejectedRecord>,
}

/// Parse a JSON array of video records.
///
/// Each element is deserialized on its own so one malformed entry does not
/// poison the whole file. Returns the valid records with their positions and
/// the rejections.
pub fn parse_records(json: &str) -> Result<(Vec<(usize, VideoRecord)>, Vec<RejectedRecord>)> {
    let raw: Vec<serde_json::Value> = serde_json::from_str(json).map_err(|e| BrainError::Json {
        source: e,
        context: "Import file must contain a JSON array of video records".to_string(),
    })?;

    let mut records = Vec::with_capacity(raw.len());
    let mut rejected = Vec::new();

    for (index, value) in raw.into_iter().enumerate() {
        let video_id = value
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let record: VideoRecord = match serde_json::from_value(value) {
            Ok(record) => record,
            Err(e) => {
                rejected.push(RejectedRecord {
                    index,
                    video_id,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        match record.validate() {
            Ok(()) => records.push((index, record)),
            Err(e) => rejected.push(RejectedRecord {
                index,
                video_id,
                reason: e.to_string(),
            }),
        }
    }

    Ok((records, rejected))
}

/// Import a JSON file into the catalog
pub fn import_file(catalog: &dyn VideoCatalog, path: &Path) -> Result<ImportReport> {
    let content = std::fs::read_to_string(path).map_err(|e| BrainError::Io {
        source: e,
        context: format!("Failed to read import file: {:?}", path),
    })?;

    let (records, mut rejected) = parse_records(&content)?;

    let mut imported = 0;
    for (index, record) in &records {
        match catalog.upsert_video(record) {
            Ok(()) => imported += 1,
            Err(e @ BrainError::Validation { .. }) => rejected.push(RejectedRecord {
                index: *index,
                video_id: Some(record.id.clone()),
                reason: e.to_string(),
            }),
            Err(e) => return Err(e),
        }
    }
    rejected.sort_by_key(|r| r.index);

    for rejection in &rejected {
        tracing::warn!(
            "Rejected record #{} ({}): {}",
            rejection.index,
            rejection.video_id.as_deref().unwrap_or("no id"),
            rejection.reason
        );
    }

    tracing::info!("Imported {} videos ({} rejected)", imported, rejected.len());

    Ok(ImportReport { imported, rejected })
}
