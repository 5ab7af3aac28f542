//! bindscope-common: Shared data model used across all Bindscope crates.
//!
//! Batch types describe one scheduler run, prediction types describe the
//! durable history entries, and history types describe queries over them.

pub mod batch;
pub mod history;
pub mod prediction;
pub mod time;

// Re-export commonly used types
pub use batch::{BatchProgress, BatchResult, BatchRow, BatchStatus};
pub use history::{DailyCount, DateRange, HistoryFilters, HistoryStats, SourceBreakdown, ValueRange};
pub use prediction::{NewPrediction, PredictionRecord, PredictionSource, PredictionUpdate};
