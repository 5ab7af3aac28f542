//! Batch error types.

use thiserror::Error;

use crate::scheduler::SchedulerState;

pub type Result<T> = std::result::Result<T, BatchError>;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Batch already started (state: {0:?})")]
    AlreadyStarted(SchedulerState),

    #[error("Invalid batch input: {0}")]
    Input(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
