//! SQLite-backed account contexts and outcome log

use super::Database;
use crate::account::{AccountContext, AccountStore, IdeaOutcome, OutcomeMetrics};
use crate::error::{BrainError, Result};
use chrono::{TimeZone, Utc};
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

pub struct SqliteAccountStore {
    db: Arc<Database>,
}

impl SqliteAccountStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl AccountStore for SqliteAccountStore {
    fn get(&self, owner_id: &str) -> Result<Option<AccountContext>> {
        let conn = self.db.get_conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT context FROM account_contexts WHERE owner_id = ?1",
                params![owner_id],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|j| {
            serde_json::from_str(&j).map_err(|e| BrainError::Json {
                source: e,
                context: format!("Failed to decode account context for {}", owner_id),
            })
        })
        .transpose()
    }

    fn save(&self, context: &AccountContext) -> Result<()> {
        context.validate()?;

        let json = serde_json::to_string(context).map_err(|e| BrainError::Json {
            source: e,
            context: format!("Failed to encode account context for {}", context.owner_id),
        })?;

        let conn = self.db.get_conn()?;
        conn.execute(
            "INSERT INTO account_contexts (owner_id, context, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(owner_id) DO UPDATE SET
                 context = excluded.context,
                 updated_at = excluded.updated_at",
            params![
                context.owner_id,
                json,
                context.updated_at.timestamp()
            ],
        )?;
        Ok(())
    }

    fn record_outcome(&self, outcome: &IdeaOutcome) -> Result<()> {
        let metrics = outcome
            .metrics
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| BrainError::Json {
                source: e,
                context: "Failed to encode outcome metrics".to_string(),
            })?;

        let conn = self.db.get_conn()?;
        conn.execute(
            "INSERT INTO idea_outcomes (owner_id, idea_title, status, metrics, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                outcome.owner_id,
                outcome.idea_title,
                outcome.status.as_str(),
                metrics,
                outcome.recorded_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    fn outcomes(&self, owner_id: &str) -> Result<Vec<IdeaOutcome>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT idea_title, status, metrics, recorded_at FROM idea_outcomes
             WHERE owner_id = ?1 ORDER BY recorded_at DESC, id DESC",
        )?;

        let rows = stmt.query_map(params![owner_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut outcomes = Vec::new();
        for row in rows {
            let (idea_title, status, metrics, recorded_at) = row?;
            let metrics: Option<OutcomeMetrics> = metrics
                .map(|m| serde_json::from_str(&m))
                .transpose()
                .map_err(|e| BrainError::Json {
                    source: e,
                    context: format!("Failed to decode metrics for outcome '{}'", idea_title),
                })?;

            outcomes.push(IdeaOutcome {
                owner_id: owner_id.to_string(),
                idea_title,
                status: status.parse()?,
                metrics,
                recorded_at: Utc
                    .timestamp_opt(recorded_at, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
            });
        }
        Ok(outcomes)
    }
}
