//! Durable prediction history types.
//! Serialized field names follow the dashboard's JSON export format (camelCase).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PredictionSource {
    #[default]
    Single,
    Batch,
}

impl PredictionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Batch => "batch",
        }
    }
}

impl fmt::Display for PredictionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredictionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "batch" => Ok(Self::Batch),
            other => Err(format!("unknown prediction source: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Stored record
// ---------------------------------------------------------------------------

/// One history entry. `id` and `timestamp` are fixed at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    pub id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub source: PredictionSource,
    pub drug_name: String,
    pub smiles: String,
    pub protein_name: String,
    pub fasta: String,
    pub predicted_pk: f64,
    /// 0–100 scale.
    pub confidence_score: f64,
    pub is_favorite: bool,
    pub notes: String,
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Write payloads
// ---------------------------------------------------------------------------

/// A record before the store assigns `id` and `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPrediction {
    pub source: PredictionSource,
    pub drug_name: String,
    pub smiles: String,
    pub protein_name: String,
    pub fasta: String,
    pub predicted_pk: f64,
    pub confidence_score: f64,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewPrediction {
    pub fn new(
        source: PredictionSource,
        drug_name: impl Into<String>,
        smiles: impl Into<String>,
        protein_name: impl Into<String>,
        fasta: impl Into<String>,
        predicted_pk: f64,
        confidence_score: f64,
    ) -> Self {
        Self {
            source,
            drug_name: drug_name.into(),
            smiles: smiles.into(),
            protein_name: protein_name.into(),
            fasta: fasta.into(),
            predicted_pk,
            confidence_score,
            is_favorite: false,
            notes: String::new(),
            tags: Vec::new(),
        }
    }

    pub fn favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = is_favorite;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Attach the store-generated identity.
    pub fn into_record(self, id: String, timestamp: i64) -> PredictionRecord {
        PredictionRecord {
            id,
            timestamp,
            source: self.source,
            drug_name: self.drug_name,
            smiles: self.smiles,
            protein_name: self.protein_name,
            fasta: self.fasta,
            predicted_pk: self.predicted_pk,
            confidence_score: self.confidence_score,
            is_favorite: self.is_favorite,
            notes: self.notes,
            tags: self.tags,
        }
    }
}

/// Partial update. Fields left as `None` keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionUpdate {
    pub source: Option<PredictionSource>,
    pub drug_name: Option<String>,
    pub smiles: Option<String>,
    pub protein_name: Option<String>,
    pub fasta: Option<String>,
    pub predicted_pk: Option<f64>,
    pub confidence_score: Option<f64>,
    pub is_favorite: Option<bool>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl PredictionUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(self, record: &mut PredictionRecord) {
        if let Some(v) = self.source { record.source = v; }
        if let Some(v) = self.drug_name { record.drug_name = v; }
        if let Some(v) = self.smiles { record.smiles = v; }
        if let Some(v) = self.protein_name { record.protein_name = v; }
        if let Some(v) = self.fasta { record.fasta = v; }
        if let Some(v) = self.predicted_pk { record.predicted_pk = v; }
        if let Some(v) = self.confidence_score { record.confidence_score = v; }
        if let Some(v) = self.is_favorite { record.is_favorite = v; }
        if let Some(v) = self.notes { record.notes = v; }
        if let Some(v) = self.tags { record.tags = v; }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PredictionRecord {
        NewPrediction::new(PredictionSource::Batch, "Imatinib", "CC1=CC", "ABL1", "MKV", 8.1, 92.0)
            .into_record("id-1".into(), 42)
    }

    #[test]
    fn test_new_prediction_defaults() {
        let rec = sample();
        assert!(!rec.is_favorite);
        assert!(rec.notes.is_empty());
        assert!(rec.tags.is_empty());
    }

    #[test]
    fn test_update_merges_only_given_fields() {
        let mut rec = sample();
        PredictionUpdate {
            notes: Some("re-run with fresh structure".into()),
            is_favorite: Some(true),
            ..Default::default()
        }
        .apply_to(&mut rec);
        assert_eq!(rec.notes, "re-run with fresh structure");
        assert!(rec.is_favorite);
        assert_eq!(rec.drug_name, "Imatinib");
        assert_eq!(rec.id, "id-1");
        assert_eq!(rec.timestamp, 42);
    }

    #[test]
    fn test_source_parse_and_serde() {
        assert_eq!("Batch".parse::<PredictionSource>().unwrap(), PredictionSource::Batch);
        assert!("bulk".parse::<PredictionSource>().is_err());
        let json = serde_json::to_string(&PredictionSource::Single).unwrap();
        assert_eq!(json, "\"single\"");
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["drugName"], "Imatinib");
        assert_eq!(json["predictedPk"], 8.1);
        assert_eq!(json["isFavorite"], false);
    }
}
