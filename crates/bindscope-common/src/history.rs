//! History query and statistics types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::prediction::{PredictionRecord, PredictionSource};

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Inclusive epoch-millisecond window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: i64,
    pub end: i64,
}

impl DateRange {
    pub fn contains(&self, millis: i64) -> bool {
        millis >= self.start && millis <= self.end
    }
}

/// Inclusive numeric window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// History query. Every populated field narrows the result (AND semantics);
/// `None` / `false` means no constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryFilters {
    pub source: Option<PredictionSource>,
    pub favorites_only: bool,
    pub date_range: Option<DateRange>,
    /// Case-insensitive substring over drug name, protein name, SMILES and notes.
    pub search_query: Option<String>,
    pub pk_range: Option<ValueRange>,
    pub confidence_range: Option<ValueRange>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl HistoryFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: PredictionSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn favorites_only(mut self) -> Self {
        self.favorites_only = true;
        self
    }

    pub fn with_date_range(mut self, start: i64, end: i64) -> Self {
        self.date_range = Some(DateRange { start, end });
        self
    }

    pub fn with_search(mut self, query: impl Into<String>) -> Self {
        self.search_query = Some(query.into());
        self
    }

    pub fn with_pk_range(mut self, min: f64, max: f64) -> Self {
        self.pk_range = Some(ValueRange::new(min, max));
        self
    }

    pub fn with_confidence_range(mut self, min: f64, max: f64) -> Self {
        self.confidence_range = Some(ValueRange::new(min, max));
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Normalized search needle, `None` when the query is absent or blank.
    pub fn search_needle(&self) -> Option<String> {
        self.search_query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase)
    }

    /// Text-search predicate. The other filters are applied by the store query.
    pub fn matches_search(&self, record: &PredictionRecord) -> bool {
        match self.search_needle() {
            None => true,
            Some(needle) => [
                &record.drug_name,
                &record.protein_name,
                &record.smiles,
                &record.notes,
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle)),
        }
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBreakdown {
    pub single: usize,
    pub batch: usize,
}

/// Summary derived from the full record set on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total_predictions: usize,
    pub average_pk: f64,
    pub average_confidence: f64,
    pub most_tested_protein: String,
    /// Exactly 30 entries, oldest first, ending today.
    pub predictions_by_day: Vec<DailyCount>,
    pub predictions_by_source: SourceBreakdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::NewPrediction;

    fn record(drug: &str, notes: &str, pk: f64) -> PredictionRecord {
        NewPrediction::new(PredictionSource::Batch, drug, "CN1C=NC2", "Adenosine A2A", "MPIM", pk, 75.0)
            .with_notes(notes)
            .into_record(format!("id-{drug}"), 1_000)
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(HistoryFilters::new().matches_search(&record("Caffeine", "", 5.0)));
    }

    #[test]
    fn test_search_is_case_insensitive_over_notes() {
        let f = HistoryFilters::new().with_search("  PROMISING ");
        assert!(f.matches_search(&record("Caffeine", "a promising hit", 5.0)));
        assert!(!f.matches_search(&record("Caffeine", "", 5.0)));
    }

    #[test]
    fn test_blank_search_is_no_constraint() {
        let f = HistoryFilters::new().with_search("   ");
        assert_eq!(f.search_needle(), None);
        assert!(f.matches_search(&record("Caffeine", "", 5.0)));
    }

    #[test]
    fn test_date_range_bounds_are_inclusive() {
        let range = DateRange { start: 1_000, end: 2_000 };
        assert!(range.contains(1_000));
        assert!(range.contains(2_000));
        assert!(!range.contains(2_001));
    }
}
