//! Bindscope Batch: turns a list of drug–protein pairs into predictions.
//!
//! Rows are dispatched in priority order, a fixed-size chunk at a time, with
//! every row of a chunk in flight concurrently. Successful predictions are
//! written to the history store; progress snapshots and the final result list
//! are published as [`BatchEvent`]s.

pub mod error;
pub mod input;
pub mod scheduler;
pub mod sink;

pub use error::{BatchError, Result};
pub use input::{parse_csv, parse_json, ParsedBatch, RawBatchRow, RowRejection};
pub use scheduler::{
    BatchEvent, BatchScheduler, BatchSummary, CancelHandle, SchedulerConfig, SchedulerState,
    DEFAULT_CHUNK_SIZE,
};
pub use sink::PredictionSink;
