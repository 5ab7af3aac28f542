//! Prediction repository.
//!
//! Provides CRUD and filtered queries over the prediction history.

use bindscope_common::time::now_millis;
use bindscope_common::{HistoryFilters, HistoryStats, NewPrediction, PredictionRecord, PredictionUpdate};
use chrono::{DateTime, TimeZone};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::schema::{self, record_from_row, SELECT_COLUMNS};
use crate::stats::compute_stats;

/// Repository for prediction history operations.
#[derive(Clone, Debug)]
pub struct PredictionRepository {
    db: Arc<Database>,
}

impl PredictionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Get underlying database reference.
    pub fn db(&self) -> Arc<Database> {
        self.db.clone()
    }

    // ── Writes ───────────────────────────────────────────────────────────────

    /// Insert a new record with a fresh id and the current time.
    pub async fn add(&self, prediction: NewPrediction) -> Result<String> {
        self.add_with_timestamp(prediction, now_millis()).await
    }

    /// Insert a record with a caller-chosen timestamp (import paths).
    pub async fn add_with_timestamp(&self, prediction: NewPrediction, timestamp: i64) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let record = prediction.into_record(id.clone(), timestamp);
        self.db
            .with_conn(move |conn| schema::insert_record(conn, &record))
            .await?;
        debug!(id = %id, "Inserted prediction record");
        Ok(id)
    }

    /// Merge `update` into the stored record. Missing ids are ignored.
    pub async fn update(&self, id: &str, update: PredictionUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }
        let id = id.to_string();
        self.db
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let sql = format!("SELECT {SELECT_COLUMNS} FROM predictions WHERE id = ?1");
                let existing = tx.query_row(&sql, [&id], record_from_row).optional()?;
                if let Some(mut record) = existing {
                    update.apply_to(&mut record);
                    schema::write_mutable_fields(&tx, &record)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
    }

    /// Remove a record. Deleting an unknown id is not an error.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .with_conn(move |conn| {
                conn.execute("DELETE FROM predictions WHERE id = ?1", [&id])?;
                Ok(())
            })
            .await
    }

    /// Flip the favorite flag. Returns the new value, or `None` for an unknown id.
    pub async fn toggle_favorite(&self, id: &str) -> Result<Option<bool>> {
        let id = id.to_string();
        self.db
            .with_conn(move |conn| {
                let changed = conn.execute(
                    "UPDATE predictions SET is_favorite = NOT is_favorite WHERE id = ?1",
                    [&id],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                let value: bool = conn.query_row(
                    "SELECT is_favorite FROM predictions WHERE id = ?1",
                    [&id],
                    |row| row.get(0),
                )?;
                Ok(Some(value))
            })
            .await
    }

    /// Overwrite the notes of a record.
    pub async fn set_notes(&self, id: &str, notes: &str) -> Result<()> {
        let id = id.to_string();
        let notes = notes.to_string();
        self.db
            .with_conn(move |conn| {
                conn.execute("UPDATE predictions SET notes = ?2 WHERE id = ?1", params![id, notes])?;
                Ok(())
            })
            .await
    }

    /// Delete every record. Returns how many were removed.
    pub async fn clear_all(&self) -> Result<usize> {
        let removed = self
            .db
            .with_conn(|conn| Ok(conn.execute("DELETE FROM predictions", [])?))
            .await?;
        debug!(removed, "Cleared prediction history");
        Ok(removed)
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub async fn get(&self, id: &str) -> Result<Option<PredictionRecord>> {
        let id = id.to_string();
        self.db
            .with_conn(move |conn| {
                let sql = format!("SELECT {SELECT_COLUMNS} FROM predictions WHERE id = ?1");
                Ok(conn.query_row(&sql, [&id], record_from_row).optional()?)
            })
            .await
    }

    pub async fn count(&self) -> Result<usize> {
        self.db
            .with_conn(|conn| {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM predictions", [], |row| row.get(0))?;
                Ok(n as usize)
            })
            .await
    }

    /// Records matching every populated filter, newest first.
    ///
    /// Structural predicates run in SQL against the indexed columns; text
    /// search runs afterwards so matching is Unicode case-insensitive.
    pub async fn query(&self, filters: &HistoryFilters) -> Result<Vec<PredictionRecord>> {
        let filters = filters.clone();
        self.db
            .with_conn(move |conn| {
                let mut sql = format!("SELECT {SELECT_COLUMNS} FROM predictions WHERE 1 = 1");
                let mut values: Vec<Value> = Vec::new();

                if let Some(source) = filters.source {
                    sql.push_str(" AND source = ?");
                    values.push(Value::Text(source.as_str().to_string()));
                }
                if filters.favorites_only {
                    sql.push_str(" AND is_favorite = 1");
                }
                if let Some(range) = filters.date_range {
                    sql.push_str(" AND timestamp >= ? AND timestamp <= ?");
                    values.push(Value::Integer(range.start));
                    values.push(Value::Integer(range.end));
                }
                if let Some(range) = filters.pk_range {
                    sql.push_str(" AND predicted_pk >= ? AND predicted_pk <= ?");
                    values.push(Value::Real(range.min));
                    values.push(Value::Real(range.max));
                }
                if let Some(range) = filters.confidence_range {
                    sql.push_str(" AND confidence_score >= ? AND confidence_score <= ?");
                    values.push(Value::Real(range.min));
                    values.push(Value::Real(range.max));
                }
                sql.push_str(" ORDER BY timestamp DESC, rowid DESC");

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(values.iter()), record_from_row)?;

                let mut matched = Vec::new();
                for row in rows {
                    let record = row?;
                    if filters.matches_search(&record) {
                        matched.push(record);
                    }
                }

                let offset = filters.offset.unwrap_or(0);
                let limit = filters.limit.unwrap_or(usize::MAX);
                Ok(matched.into_iter().skip(offset).take(limit).collect())
            })
            .await
    }

    /// Unfiltered snapshot of the whole history, newest first.
    pub async fn export_all(&self) -> Result<Vec<PredictionRecord>> {
        self.query(&HistoryFilters::default()).await
    }

    /// Statistics over the full history, bucketed by local calendar day.
    pub async fn stats(&self) -> Result<HistoryStats> {
        self.stats_at(&chrono::Local::now()).await
    }

    /// Statistics relative to an explicit "now".
    pub async fn stats_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<HistoryStats> {
        let records = self.export_all().await?;
        Ok(compute_stats(&records, now))
    }
}
