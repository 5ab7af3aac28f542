//! Table definitions and row mapping for the prediction history.

use bindscope_common::{PredictionRecord, PredictionSource};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;

pub const TABLE_PREDICTIONS: &str = "predictions";

/// `store_meta` key recording that the legacy history has been dealt with.
pub(crate) const LEGACY_MIGRATION_KEY: &str = "legacy_migration";

/// Column list shared by every SELECT so [`record_from_row`] can map by index.
pub(crate) const SELECT_COLUMNS: &str = "id, timestamp, source, drug_name, smiles, protein_name, \
     fasta, predicted_pk, confidence_score, is_favorite, notes, tags";

const INSERT_SQL: &str = "INSERT INTO predictions (id, timestamp, source, drug_name, smiles, \
     protein_name, fasta, predicted_pk, confidence_score, is_favorite, notes, tags) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

const INSERT_OR_IGNORE_SQL: &str = "INSERT OR IGNORE INTO predictions (id, timestamp, source, \
     drug_name, smiles, protein_name, fasta, predicted_pk, confidence_score, is_favorite, notes, tags) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

/// Create the predictions table, its secondary indices and the key/value
/// `store_meta` table. Safe to run on every open.
pub(crate) fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS predictions (\
           id TEXT PRIMARY KEY NOT NULL,\
           timestamp INTEGER NOT NULL,\
           source TEXT NOT NULL,\
           drug_name TEXT NOT NULL,\
           smiles TEXT NOT NULL,\
           protein_name TEXT NOT NULL,\
           fasta TEXT NOT NULL,\
           predicted_pk REAL NOT NULL,\
           confidence_score REAL NOT NULL,\
           is_favorite INTEGER NOT NULL DEFAULT 0,\
           notes TEXT NOT NULL DEFAULT '',\
           tags TEXT NOT NULL DEFAULT '[]'\
         );\
         CREATE INDEX IF NOT EXISTS idx_predictions_timestamp ON predictions(timestamp);\
         CREATE INDEX IF NOT EXISTS idx_predictions_source ON predictions(source);\
         CREATE INDEX IF NOT EXISTS idx_predictions_drug_name ON predictions(drug_name);\
         CREATE INDEX IF NOT EXISTS idx_predictions_protein_name ON predictions(protein_name);\
         CREATE INDEX IF NOT EXISTS idx_predictions_is_favorite ON predictions(is_favorite);\
         CREATE INDEX IF NOT EXISTS idx_predictions_predicted_pk ON predictions(predicted_pk);\
         CREATE INDEX IF NOT EXISTS idx_predictions_confidence ON predictions(confidence_score);\
         CREATE TABLE IF NOT EXISTS store_meta (\
           key TEXT PRIMARY KEY NOT NULL,\
           value TEXT NOT NULL\
         );",
    )?;
    Ok(())
}

/// Insert one record. Fails on a duplicate id.
pub(crate) fn insert_record(conn: &Connection, record: &PredictionRecord) -> Result<usize> {
    insert_with(conn, INSERT_SQL, record)
}

/// Insert one record, silently skipping an id that already exists.
/// Returns the number of rows written (0 or 1).
pub(crate) fn insert_record_if_absent(conn: &Connection, record: &PredictionRecord) -> Result<usize> {
    insert_with(conn, INSERT_OR_IGNORE_SQL, record)
}

fn insert_with(conn: &Connection, sql: &str, record: &PredictionRecord) -> Result<usize> {
    let tags = serde_json::to_string(&record.tags)?;
    let written = conn.execute(
        sql,
        params![
            record.id,
            record.timestamp,
            record.source.as_str(),
            record.drug_name,
            record.smiles,
            record.protein_name,
            record.fasta,
            record.predicted_pk,
            record.confidence_score,
            record.is_favorite,
            record.notes,
            tags,
        ],
    )?;
    Ok(written)
}

pub(crate) fn read_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM store_meta WHERE key = ?1", [key], |row| row.get(0))
        .optional()?)
}

pub(crate) fn write_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO store_meta (key, value) VALUES (?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Overwrite every mutable column of an existing record.
pub(crate) fn write_mutable_fields(conn: &Connection, record: &PredictionRecord) -> Result<usize> {
    let tags = serde_json::to_string(&record.tags)?;
    let written = conn.execute(
        "UPDATE predictions SET source = ?2, drug_name = ?3, smiles = ?4, protein_name = ?5, \
         fasta = ?6, predicted_pk = ?7, confidence_score = ?8, is_favorite = ?9, notes = ?10, \
         tags = ?11 WHERE id = ?1",
        params![
            record.id,
            record.source.as_str(),
            record.drug_name,
            record.smiles,
            record.protein_name,
            record.fasta,
            record.predicted_pk,
            record.confidence_score,
            record.is_favorite,
            record.notes,
            tags,
        ],
    )?;
    Ok(written)
}

pub(crate) fn record_from_row(row: &Row<'_>) -> rusqlite::Result<PredictionRecord> {
    let source: String = row.get(2)?;
    let tags: String = row.get(11)?;
    Ok(PredictionRecord {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        source: source.parse().unwrap_or(PredictionSource::Single),
        drug_name: row.get(3)?,
        smiles: row.get(4)?,
        protein_name: row.get(5)?,
        fasta: row.get(6)?,
        predicted_pk: row.get(7)?,
        confidence_score: row.get(8)?,
        is_favorite: row.get(9)?,
        notes: row.get(10)?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindscope_common::NewPrediction;

    #[test]
    fn test_create_tables_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
    }

    #[test]
    fn test_meta_upsert() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        assert_eq!(read_meta(&conn, LEGACY_MIGRATION_KEY).unwrap(), None);
        write_meta(&conn, LEGACY_MIGRATION_KEY, "skipped").unwrap();
        write_meta(&conn, LEGACY_MIGRATION_KEY, "migrated").unwrap();
        assert_eq!(read_meta(&conn, LEGACY_MIGRATION_KEY).unwrap().as_deref(), Some("migrated"));
    }

    #[test]
    fn test_insert_if_absent_skips_duplicates() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        let rec = NewPrediction::new(PredictionSource::Single, "Gefitinib", "COc1cc2", "EGFR", "MRPS", 7.4, 88.0)
            .with_tags(vec!["kinase".into()])
            .into_record("dup".into(), 10);

        assert_eq!(insert_record_if_absent(&conn, &rec).unwrap(), 1);
        assert_eq!(insert_record_if_absent(&conn, &rec).unwrap(), 0);
        assert!(insert_record(&conn, &rec).is_err());

        let sql = format!("SELECT {SELECT_COLUMNS} FROM predictions WHERE id = ?1");
        let back = conn.query_row(&sql, ["dup"], record_from_row).unwrap();
        assert_eq!(back, rec);
    }
}
