//! Batch input parsing and shape checks.
//!
//! Accepts a JSON array of row objects or a CSV file with a header row.
//! Rows that fail the checks are reported and left out; everything else
//! becomes a [`BatchRow`] with a fresh id.

use std::collections::HashMap;
use std::io::Read;

use bindscope_common::BatchRow;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::error::{BatchError, Result};

pub const MIN_FASTA_LEN: usize = 30;
pub const MAX_FASTA_LEN: usize = 10_000;
const FASTA_ALPHABET: &str = "ACDEFGHIKLMNPQRSTVWYBXZUO*-";

// ── Types ─────────────────────────────────────────────────────────────────────

/// A row as it appears in the input file, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawBatchRow {
    #[serde(default, alias = "drugName")]
    pub drug_name: String,
    #[serde(default)]
    pub smiles: String,
    #[serde(default, alias = "proteinName")]
    pub protein_name: String,
    #[serde(default)]
    pub fasta: String,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub priority: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowRejection {
    /// 1-based record number for JSON, file line number for CSV.
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedBatch {
    pub rows: Vec<BatchRow>,
    pub rejected: Vec<RowRejection>,
}

impl ParsedBatch {
    fn push(&mut self, line: usize, raw: RawBatchRow) {
        match validate_row(raw) {
            Ok(row) => self.rows.push(row),
            Err(reason) => {
                warn!(line, %reason, "Rejecting batch row");
                self.rejected.push(RowRejection { line, reason });
            }
        }
    }
}

// ── Priority flag ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagValue {
    Bool(bool),
    Num(i64),
    Text(String),
}

fn parse_flag(text: &str) -> bool {
    matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "y" | "1" | "high"
    )
}

fn flexible_bool<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    Ok(match Option::<FlagValue>::deserialize(deserializer)? {
        Some(FlagValue::Bool(b)) => b,
        Some(FlagValue::Num(n)) => n != 0,
        Some(FlagValue::Text(t)) => parse_flag(&t),
        None => false,
    })
}

// ── Parsers ───────────────────────────────────────────────────────────────────

/// Parse a JSON array of row objects.
///
/// Entries that are not objects are rejected individually; a document that is
/// not an array fails as a whole.
pub fn parse_json(text: &str) -> Result<ParsedBatch> {
    let values: Vec<serde_json::Value> = match serde_json::from_str(text)? {
        serde_json::Value::Array(values) => values,
        _ => return Err(BatchError::Input("expected a JSON array of rows".to_string())),
    };

    let mut parsed = ParsedBatch::default();
    for (i, value) in values.into_iter().enumerate() {
        let line = i + 1;
        match serde_json::from_value::<RawBatchRow>(value) {
            Ok(raw) => parsed.push(line, raw),
            Err(e) => parsed.rejected.push(RowRejection {
                line,
                reason: format!("malformed row: {e}"),
            }),
        }
    }
    debug!(accepted = parsed.rows.len(), rejected = parsed.rejected.len(), "Parsed JSON batch");
    Ok(parsed)
}

/// Normalise a header cell: `Drug Name`, `drug_name` and `drugName` all match.
fn header_key(cell: &str) -> String {
    cell.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Parse CSV with a header row. Column order is free; unknown columns are
/// ignored.
pub fn parse_csv<R: Read>(reader: R) -> Result<ParsedBatch> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let columns: HashMap<String, usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| (header_key(h), i))
        .collect();

    for required in ["drugname", "smiles", "proteinname", "fasta"] {
        if !columns.contains_key(required) {
            return Err(BatchError::Input(format!("missing CSV column: {required}")));
        }
    }

    let mut parsed = ParsedBatch::default();
    for (i, record) in reader.records().enumerate() {
        // Header is line 1
        let line = i + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                parsed.rejected.push(RowRejection { line, reason: e.to_string() });
                continue;
            }
        };
        let cell = |name: &str| {
            columns
                .get(name)
                .and_then(|&idx| record.get(idx))
                .unwrap_or_default()
                .to_string()
        };
        let raw = RawBatchRow {
            drug_name: cell("drugname"),
            smiles: cell("smiles"),
            protein_name: cell("proteinname"),
            fasta: cell("fasta"),
            priority: parse_flag(&cell("priority")),
        };
        parsed.push(line, raw);
    }
    debug!(accepted = parsed.rows.len(), rejected = parsed.rejected.len(), "Parsed CSV batch");
    Ok(parsed)
}

// ── Validation ────────────────────────────────────────────────────────────────

/// Strip FASTA header lines and whitespace, then uppercase.
pub fn normalize_fasta(fasta: &str) -> String {
    fasta
        .lines()
        .filter(|l| !l.trim_start().starts_with('>'))
        .flat_map(str::chars)
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

pub fn validate_row(raw: RawBatchRow) -> std::result::Result<BatchRow, String> {
    let drug_name = raw.drug_name.trim();
    let smiles = raw.smiles.trim();
    let protein_name = raw.protein_name.trim();

    for (field, value) in [
        ("drug_name", drug_name),
        ("smiles", smiles),
        ("protein_name", protein_name),
    ] {
        if value.is_empty() {
            return Err(format!("{field} is empty"));
        }
    }

    let fasta = normalize_fasta(&raw.fasta);
    let len = fasta.chars().count();
    if len < MIN_FASTA_LEN {
        return Err(format!("fasta too short ({len} < {MIN_FASTA_LEN})"));
    }
    if len > MAX_FASTA_LEN {
        return Err(format!("fasta too long ({len} > {MAX_FASTA_LEN})"));
    }
    if let Some(bad) = fasta.chars().find(|c| !FASTA_ALPHABET.contains(*c)) {
        return Err(format!("fasta contains invalid residue '{bad}'"));
    }

    Ok(BatchRow::new(drug_name, smiles, protein_name, fasta, raw.priority))
}
