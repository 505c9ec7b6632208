//! SQLite-backed insight persistence

use super::Database;
use crate::analytics::{Insight, InsightKind, InsightStore};
use crate::error::{BrainError, Result};
use chrono::{TimeZone, Utc};
use rusqlite::params;
use std::collections::HashSet;
use std::sync::Arc;

pub struct SqliteInsightStore {
    db: Arc<Database>,
}

impl SqliteInsightStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl InsightStore for SqliteInsightStore {
    fn save(&self, insights: &[Insight]) -> Result<()> {
        if insights.is_empty() {
            return Ok(());
        }

        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;
        for insight in insights {
            tx.execute(
                "INSERT INTO insights (id, owner_id, kind, subject, priority, confidence, title,
                     description, created_at, dismissed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)
                 ON CONFLICT(id) DO UPDATE SET
                     priority = excluded.priority,
                     confidence = excluded.confidence,
                     title = excluded.title,
                     description = excluded.description",
                params![
                    insight.id,
                    insight.owner_id,
                    insight.kind.as_str(),
                    insight.subject,
                    insight.priority.as_str(),
                    insight.confidence,
                    insight.title,
                    insight.description,
                    insight.created_at.timestamp(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn list(&self, owner_id: &str, include_dismissed: bool) -> Result<Vec<Insight>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, subject, priority, confidence, title, description, created_at, dismissed
             FROM insights
             WHERE owner_id = ?1 AND (?2 OR dismissed = 0)
             ORDER BY CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END,
                      confidence DESC, id ASC",
        )?;

        let rows = stmt.query_map(params![owner_id, include_dismissed], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, bool>(8)?,
            ))
        })?;

        let mut insights = Vec::new();
        for row in rows {
            let (id, kind, subject, priority, confidence, title, description, created_at, dismissed) =
                row?;
            insights.push(Insight {
                id,
                owner_id: owner_id.to_string(),
                kind: kind.parse()?,
                subject,
                priority: priority.parse()?,
                confidence,
                title,
                description,
                created_at: Utc
                    .timestamp_opt(created_at, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
                dismissed,
            });
        }
        Ok(insights)
    }

    fn dismiss(&self, owner_id: &str, insight_id: &str) -> Result<()> {
        let conn = self.db.get_conn()?;
        let updated = conn.execute(
            "UPDATE insights SET dismissed = 1 WHERE owner_id = ?1 AND id = ?2",
            params![owner_id, insight_id],
        )?;

        if updated == 0 {
            return Err(BrainError::not_found("Insight", insight_id));
        }
        Ok(())
    }

    fn flagged_subjects(&self, owner_id: &str, kind: InsightKind) -> Result<HashSet<String>> {
        let conn = self.db.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT subject FROM insights WHERE owner_id = ?1 AND kind = ?2")?;
        let subjects = stmt
            .query_map(params![owner_id, kind.as_str()], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(subjects)
    }
}
