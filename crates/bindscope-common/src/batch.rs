//! Batch run types: requested rows, per-row outcomes and progress snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Input row
// ---------------------------------------------------------------------------

/// One drug–protein pair requested for prediction.
///
/// Rows are created once by the input parser and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRow {
    pub id: String,
    pub drug_name: String,
    pub smiles: String,
    pub protein_name: String,
    pub fasta: String,
    #[serde(default)]
    pub priority: bool,
}

impl BatchRow {
    /// Build a row with a freshly generated id.
    pub fn new(
        drug_name: impl Into<String>,
        smiles: impl Into<String>,
        protein_name: impl Into<String>,
        fasta: impl Into<String>,
        priority: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            drug_name: drug_name.into(),
            smiles: smiles.into(),
            protein_name: protein_name.into(),
            fasta: fasta.into(),
            priority,
        }
    }

    /// Human-readable label used as `current_item` in progress events.
    pub fn label(&self) -> String {
        format!("{} × {}", self.drug_name, self.protein_name)
    }
}

// ---------------------------------------------------------------------------
// Per-row outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// A [`BatchRow`] plus its outcome.
///
/// Status moves `Pending → Processing → Success | Failed` exactly once. The
/// `mark_*` methods refuse any other transition and report it by returning
/// `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    #[serde(flatten)]
    pub row: BatchRow,
    pub predicted_pk: Option<f64>,
    /// Confidence on the 0–100 scale.
    pub confidence: Option<f64>,
    pub status: BatchStatus,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Whether the history write landed. `None` until a success is persisted
    /// or the write fails.
    pub persisted: Option<bool>,
    pub record_id: Option<String>,
}

impl BatchResult {
    pub fn pending(row: BatchRow) -> Self {
        Self {
            row,
            predicted_pk: None,
            confidence: None,
            status: BatchStatus::Pending,
            error: None,
            timestamp: Utc::now(),
            persisted: None,
            record_id: None,
        }
    }

    pub fn mark_processing(&mut self) -> bool {
        if self.status != BatchStatus::Pending {
            return false;
        }
        self.status = BatchStatus::Processing;
        self.timestamp = Utc::now();
        true
    }

    pub fn mark_success(&mut self, predicted_pk: f64, confidence: f64) -> bool {
        if self.status != BatchStatus::Processing {
            return false;
        }
        self.predicted_pk = Some(predicted_pk);
        self.confidence = Some(confidence);
        self.status = BatchStatus::Success;
        self.timestamp = Utc::now();
        true
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> bool {
        if self.status != BatchStatus::Processing {
            return false;
        }
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "unknown error".to_string();
        }
        self.error = Some(error);
        self.status = BatchStatus::Failed;
        self.timestamp = Utc::now();
        true
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Aggregate snapshot of a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub total: usize,
    pub completed: usize,
    pub successful: usize,
    pub failed: usize,
    /// `round(completed / total * 100)`, always within `0..=100`.
    pub percentage: u32,
    /// Estimated seconds remaining, linear extrapolation of current throughput.
    pub eta: u64,
    pub current_item: Option<String>,
}

impl BatchProgress {
    /// Recompute the aggregate from scratch over every result.
    pub fn from_results(
        results: &[BatchResult],
        elapsed: Duration,
        current_item: Option<String>,
    ) -> Self {
        let total = results.len();
        let successful = results
            .iter()
            .filter(|r| r.status == BatchStatus::Success)
            .count();
        let failed = results
            .iter()
            .filter(|r| r.status == BatchStatus::Failed)
            .count();
        let completed = successful + failed;

        let percentage = if total == 0 {
            0
        } else {
            ((completed as f64 / total as f64) * 100.0).round() as u32
        };

        let elapsed_secs = elapsed.as_secs_f64();
        let rate = if elapsed_secs > 0.0 {
            completed as f64 / elapsed_secs
        } else {
            0.0
        };
        let eta = if rate > 0.0 {
            ((total - completed) as f64 / rate).round() as u64
        } else {
            0
        };

        Self {
            total,
            completed,
            successful,
            failed,
            percentage,
            eta,
            current_item,
        }
    }

    pub fn is_done(&self) -> bool {
        self.completed == self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(name: &str) -> BatchRow {
        BatchRow::new(name, "CCO", "EGFR", "M".repeat(40), false)
    }

    #[test]
    fn test_status_transitions_are_one_way() {
        let mut r = BatchResult::pending(row("aspirin"));
        assert!(!r.mark_success(7.0, 90.0), "cannot succeed before processing");
        assert!(r.mark_processing());
        assert!(!r.mark_processing());
        assert!(r.mark_success(7.0, 90.0));
        assert!(!r.mark_failed("late failure"));
        assert_eq!(r.status, BatchStatus::Success);
        assert_eq!(r.error, None);
    }

    #[test]
    fn test_failed_row_always_has_message() {
        let mut r = BatchResult::pending(row("ibuprofen"));
        r.mark_processing();
        r.mark_failed("   ");
        assert_eq!(r.status, BatchStatus::Failed);
        assert_eq!(r.error.as_deref(), Some("unknown error"));
    }

    #[test]
    fn test_progress_counts_and_percentage() {
        let mut results: Vec<BatchResult> = (0..3).map(|i| BatchResult::pending(row(&i.to_string()))).collect();
        results[0].mark_processing();
        results[0].mark_success(6.5, 80.0);
        results[1].mark_processing();
        results[1].mark_failed("boom");

        let p = BatchProgress::from_results(&results, Duration::from_secs(2), None);
        assert_eq!(p.total, 3);
        assert_eq!(p.completed, 2);
        assert_eq!(p.successful, 1);
        assert_eq!(p.failed, 1);
        assert_eq!(p.percentage, 67);
        // 2 done in 2s -> 1 row/s -> 1 remaining
        assert_eq!(p.eta, 1);
        assert!(!p.is_done());
    }

    #[test]
    fn test_progress_without_elapsed_time_has_zero_eta() {
        let results = vec![BatchResult::pending(row("a"))];
        let p = BatchProgress::from_results(&results, Duration::ZERO, Some("a".into()));
        assert_eq!(p.eta, 0);
        assert_eq!(p.percentage, 0);
    }

    #[test]
    fn test_empty_progress() {
        let p = BatchProgress::from_results(&[], Duration::from_secs(1), None);
        assert_eq!(p.percentage, 0);
        assert!(p.is_done());
    }
}
