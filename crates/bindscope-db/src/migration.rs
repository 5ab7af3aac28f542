//! One-time import of the legacy flat-list history.
//!
//! The previous storage format was a single JSON array of loosely shaped
//! entries. Import runs at most once per store: a marker in `store_meta` is
//! written with the imported rows, or as soon as the store is found to hold
//! data of its own. Once the marker exists the legacy file is never read again,
//! even if the history is later cleared. The legacy file is left untouched.

use bindscope_common::time::now_millis;
use bindscope_common::{PredictionRecord, PredictionSource};
use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{DbError, Result};
use crate::schema;

// ── Report ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No legacy source configured, or the file does not exist.
    NoLegacySource,
    /// An earlier run already imported or skipped the legacy history.
    AlreadyMigrated,
    /// The store already held records; nothing was read.
    SkippedExistingData { records: usize },
    Migrated { inserted: usize, skipped: usize },
    /// Migration was abandoned; the store continues as it was.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub outcome: MigrationOutcome,
}

impl MigrationReport {
    pub(crate) fn no_legacy_source() -> Self {
        Self { outcome: MigrationOutcome::NoLegacySource }
    }

    pub(crate) fn failed(reason: String) -> Self {
        Self { outcome: MigrationOutcome::Failed { reason } }
    }

    pub fn inserted(&self) -> usize {
        match self.outcome {
            MigrationOutcome::Migrated { inserted, .. } => inserted,
            _ => 0,
        }
    }
}

// ── Legacy entry shape ────────────────────────────────────────────────────────

/// Entry as written by the old flat-list store. Every field is optional;
/// both camelCase and snake_case keys are accepted.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LegacyEntry {
    id: Option<Value>,
    timestamp: Option<Value>,
    source: Option<String>,
    #[serde(alias = "drug_name")]
    drug_name: Option<String>,
    smiles: Option<String>,
    #[serde(alias = "protein_name")]
    protein_name: Option<String>,
    #[serde(alias = "protein_sequence")]
    fasta: Option<String>,
    #[serde(alias = "predicted_pk", alias = "binding_affinity_pk")]
    predicted_pk: Option<f64>,
    #[serde(alias = "confidence_score", alias = "confidence")]
    confidence_score: Option<f64>,
    #[serde(alias = "is_favorite")]
    is_favorite: Option<bool>,
    notes: Option<String>,
    tags: Option<Vec<String>>,
}

impl LegacyEntry {
    fn into_record(self, migrated_at: i64) -> PredictionRecord {
        let id = match self.id {
            Some(Value::String(s)) if !s.trim().is_empty() => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        PredictionRecord {
            id,
            timestamp: legacy_timestamp(self.timestamp.as_ref()).unwrap_or(migrated_at),
            source: self
                .source
                .and_then(|s| s.parse().ok())
                .unwrap_or(PredictionSource::Single),
            drug_name: self.drug_name.unwrap_or_default(),
            smiles: self.smiles.unwrap_or_default(),
            protein_name: self.protein_name.unwrap_or_default(),
            fasta: self.fasta.unwrap_or_default(),
            predicted_pk: self.predicted_pk.filter(|v| v.is_finite()).unwrap_or(0.0),
            confidence_score: self.confidence_score.filter(|v| v.is_finite()).unwrap_or(0.0),
            is_favorite: self.is_favorite.unwrap_or(false),
            notes: self.notes.unwrap_or_default(),
            tags: self.tags.unwrap_or_default(),
        }
    }
}

/// Legacy timestamps were either epoch millis or RFC 3339 strings.
fn legacy_timestamp(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp_millis())
            .ok()
            .or_else(|| s.parse::<i64>().ok()),
        _ => None,
    }
}

/// Convert raw legacy JSON into records. Entries that are not objects, or
/// whose fields have the wrong type, are dropped and counted.
fn parse_legacy(content: &str) -> Result<(Vec<PredictionRecord>, usize)> {
    let root: Value = serde_json::from_str(content)?;
    let Value::Array(entries) = root else {
        return Err(DbError::Migration("legacy history is not a JSON array".to_string()));
    };

    let migrated_at = now_millis();
    let mut records = Vec::with_capacity(entries.len());
    let mut skipped = 0;
    for (index, entry) in entries.into_iter().enumerate() {
        if !entry.is_object() {
            skipped += 1;
            continue;
        }
        match serde_json::from_value::<LegacyEntry>(entry) {
            Ok(legacy) => records.push(legacy.into_record(migrated_at)),
            Err(e) => {
                warn!(index, error = %e, "Skipping malformed legacy history entry");
                skipped += 1;
            }
        }
    }
    Ok((records, skipped))
}

// ── Migration ─────────────────────────────────────────────────────────────────

const MARK_MIGRATED: &str = "migrated";
const MARK_EXISTING_DATA: &str = "skipped_existing_data";

/// Marker check, then emptiness check. A populated store is marked so that
/// clearing it later does not bring the legacy entries back.
///
/// Returns `None` when the import should go ahead.
fn settled_outcome(conn: &rusqlite::Connection) -> Result<Option<MigrationOutcome>> {
    if schema::read_meta(conn, schema::LEGACY_MIGRATION_KEY)?.is_some() {
        return Ok(Some(MigrationOutcome::AlreadyMigrated));
    }
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM predictions", [], |row| row.get(0))?;
    if n > 0 {
        schema::write_meta(conn, schema::LEGACY_MIGRATION_KEY, MARK_EXISTING_DATA)?;
        return Ok(Some(MigrationOutcome::SkippedExistingData { records: n as usize }));
    }
    Ok(None)
}

/// Import `path` into `db` once, and only into an empty store.
pub(crate) async fn migrate_legacy(db: &Database, path: &Path) -> Result<MigrationReport> {
    if let Some(outcome) = db.with_conn(|conn| settled_outcome(conn)).await? {
        debug!(outcome = ?outcome, "Skipping legacy migration");
        return Ok(MigrationReport { outcome });
    }

    if !tokio::fs::try_exists(path).await? {
        debug!(legacy = %path.display(), "No legacy history found");
        return Ok(MigrationReport::no_legacy_source());
    }

    let content = tokio::fs::read_to_string(path).await?;
    let (records, skipped) = parse_legacy(&content)?;

    // Re-check inside the write transaction so a record added concurrently
    // since the first check is never mixed with imported data.
    let outcome = db
        .with_conn(move |conn| {
            let tx = conn.transaction()?;
            if let Some(outcome) = settled_outcome(&tx)? {
                tx.commit()?;
                return Ok(outcome);
            }
            let mut inserted = 0;
            let mut duplicates = 0;
            for record in &records {
                match schema::insert_record_if_absent(&tx, record)? {
                    0 => duplicates += 1,
                    _ => inserted += 1,
                }
            }
            schema::write_meta(&tx, schema::LEGACY_MIGRATION_KEY, MARK_MIGRATED)?;
            tx.commit()?;
            Ok(MigrationOutcome::Migrated { inserted, skipped: skipped + duplicates })
        })
        .await?;

    if let MigrationOutcome::Migrated { inserted, skipped } = &outcome {
        info!(inserted, skipped, legacy = %path.display(), "Migrated legacy prediction history");
    }
    Ok(MigrationReport { outcome })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fills_missing_fields() {
        let (records, skipped) = parse_legacy(
            r#"[{"drugName": "Aspirin", "smiles": "CC(=O)O", "predictedPk": 5.2}]"#,
        )
        .unwrap();
        assert_eq!(skipped, 0);
        let rec = &records[0];
        assert!(!rec.id.is_empty());
        assert!(rec.timestamp > 0);
        assert_eq!(rec.source, PredictionSource::Single);
        assert_eq!(rec.drug_name, "Aspirin");
        assert_eq!(rec.protein_name, "");
        assert_eq!(rec.confidence_score, 0.0);
        assert!(rec.tags.is_empty());
    }

    #[test]
    fn test_parse_accepts_snake_case_and_iso_timestamps() {
        let (records, _) = parse_legacy(
            r#"[{"id": 17, "timestamp": "2024-03-01T12:00:00Z", "source": "batch",
                 "drug_name": "Erlotinib", "protein_name": "EGFR", "confidence_score": 81.5}]"#,
        )
        .unwrap();
        let rec = &records[0];
        assert_eq!(rec.id, "17");
        assert_eq!(rec.timestamp, 1_709_294_400_000);
        assert_eq!(rec.source, PredictionSource::Batch);
        assert_eq!(rec.protein_name, "EGFR");
        assert_eq!(rec.confidence_score, 81.5);
    }

    #[test]
    fn test_parse_skips_malformed_entries() {
        let (records, skipped) =
            parse_legacy(r#"[42, {"predictedPk": "high"}, {"drugName": "ok"}]"#).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(skipped, 2);
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(matches!(parse_legacy(r#"{"history": []}"#), Err(DbError::Migration(_))));
    }
}
