//! Batch scheduler.
//!
//! Flow for one run:
//!   1. Stable-sort rows so priority rows dispatch first
//!   2. Split the dispatch queue into chunks of `chunk_size`
//!   3. Before each chunk, stop if cancellation was requested
//!   4. Run every row of the chunk concurrently and wait for all of them
//!   5. Per row: Processing → inference → Success | Failed, persist successes
//!   6. Emit a progress snapshot on every row transition
//!   7. Emit the full result list, in original input order, at the end
//!
//! A row's failure (inference or history write) stays with that row.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bindscope_common::{BatchProgress, BatchResult, BatchRow, BatchStatus, NewPrediction, PredictionSource};
use bindscope_inference::{InferenceClient, InferenceRequest};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::error::{BatchError, Result};
use crate::sink::PredictionSink;

/// Rows in flight at once.
pub const DEFAULT_CHUNK_SIZE: usize = 5;

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub chunk_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE }
    }
}

impl SchedulerConfig {
    /// A zero chunk size is raised to one.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }
}

// ── State & events ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
    Completed,
    /// Finished early: cancellation kept at least one chunk from dispatching.
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    Progress(BatchProgress),
    Completed {
        state: SchedulerState,
        results: Vec<BatchResult>,
    },
}

/// End-of-run tally for the "N succeeded, M failed" report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub not_started: usize,
    /// Successful predictions whose history write did not land.
    pub persist_failures: usize,
    pub cancelled: bool,
    pub duration: Duration,
}

impl BatchSummary {
    /// Tally `results`. `duration` starts at zero; see [`BatchSummary::with_duration`].
    pub fn from_results(results: &[BatchResult], state: SchedulerState) -> Self {
        let count = |status: BatchStatus| results.iter().filter(|r| r.status == status).count();
        Self {
            total: results.len(),
            succeeded: count(BatchStatus::Success),
            failed: count(BatchStatus::Failed),
            not_started: count(BatchStatus::Pending),
            persist_failures: results.iter().filter(|r| r.persisted == Some(false)).count(),
            cancelled: state == SchedulerState::Cancelled,
            duration: Duration::ZERO,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} succeeded, {} failed", self.succeeded, self.failed)?;
        if self.not_started > 0 {
            write!(f, ", {} not started", self.not_started)?;
        }
        if self.persist_failures > 0 {
            write!(f, " ({} not saved to history)", self.persist_failures)?;
        }
        Ok(())
    }
}

// ── Cancellation ──────────────────────────────────────────────────────────────

/// Cloneable handle for cancelling a run from another task.
#[derive(Clone)]
pub struct CancelHandle {
    requested: Arc<AtomicBool>,
    state: Arc<Mutex<SchedulerState>>,
}

impl CancelHandle {
    /// Stop dispatching new chunks. Rows already in flight still finish.
    ///
    /// Returns `false` (and does nothing) unless the run is in progress.
    pub fn cancel(&self) -> bool {
        let state = *lock(&self.state);
        if state != SchedulerState::Running {
            warn!(?state, "Ignoring cancel: batch is not running");
            return false;
        }
        self.requested.store(true, Ordering::SeqCst);
        info!("Batch cancellation requested");
        true
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

pub struct BatchScheduler {
    /// Indices into `results`, in dispatch order.
    queue: Vec<usize>,
    /// One entry per input row, at the row's original index.
    results: Mutex<Vec<BatchResult>>,
    client: Arc<dyn InferenceClient>,
    sink: Arc<dyn PredictionSink>,
    config: SchedulerConfig,
    state: Arc<Mutex<SchedulerState>>,
    cancel_requested: Arc<AtomicBool>,
    started_at: Mutex<Option<Instant>>,
    run_time: Mutex<Option<Duration>>,
    events: Option<mpsc::UnboundedSender<BatchEvent>>,
}

impl BatchScheduler {
    pub fn new(
        rows: Vec<BatchRow>,
        client: Arc<dyn InferenceClient>,
        sink: Arc<dyn PredictionSink>,
        config: SchedulerConfig,
    ) -> Self {
        let mut queue: Vec<usize> = (0..rows.len()).collect();
        // Stable: equal priorities keep their input order
        queue.sort_by_key(|&i| !rows[i].priority);

        let results = rows.into_iter().map(BatchResult::pending).collect();
        let config = SchedulerConfig {
            chunk_size: config.chunk_size.max(1),
        };

        Self {
            queue,
            results: Mutex::new(results),
            client,
            sink,
            config,
            state: Arc::new(Mutex::new(SchedulerState::Idle)),
            cancel_requested: Arc::new(AtomicBool::new(false)),
            started_at: Mutex::new(None),
            run_time: Mutex::new(None),
            events: None,
        }
    }

    /// Publish progress and completion events on `tx`.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<BatchEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn state(&self) -> SchedulerState {
        *lock(&self.state)
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            requested: self.cancel_requested.clone(),
            state: self.state.clone(),
        }
    }

    /// See [`CancelHandle::cancel`].
    pub fn cancel(&self) -> bool {
        self.cancel_handle().cancel()
    }

    /// Current results, in original input order.
    pub fn results(&self) -> Vec<BatchResult> {
        lock(&self.results).clone()
    }

    /// Fresh aggregate snapshot.
    pub fn progress(&self) -> BatchProgress {
        let results = lock(&self.results);
        BatchProgress::from_results(&results, self.elapsed(), None)
    }

    /// Tally of the current results. Duration is frozen once the run ends.
    pub fn summary(&self) -> BatchSummary {
        let results = lock(&self.results);
        BatchSummary::from_results(&results, self.state()).with_duration(self.elapsed())
    }

    fn elapsed(&self) -> Duration {
        if let Some(run_time) = *lock(&self.run_time) {
            return run_time;
        }
        lock(&self.started_at)
            .map(|t| t.elapsed())
            .unwrap_or_default()
    }

    /// Run the batch to completion (or until cancelled).
    ///
    /// Only valid once, from `Idle`; any other call is rejected with
    /// [`BatchError::AlreadyStarted`].
    #[instrument(skip(self), fields(total = self.queue.len(), chunk_size = self.config.chunk_size))]
    pub async fn start(&self) -> Result<Vec<BatchResult>> {
        {
            let mut state = lock(&self.state);
            if *state != SchedulerState::Idle {
                warn!(state = ?*state, "Rejecting start: batch already started");
                return Err(BatchError::AlreadyStarted(*state));
            }
            *state = SchedulerState::Running;
        }
        *lock(&self.started_at) = Some(Instant::now());

        let chunks: Vec<&[usize]> = self.queue.chunks(self.config.chunk_size).collect();
        info!(
            rows = self.queue.len(),
            chunks = chunks.len(),
            client = self.client.name(),
            "Starting batch run"
        );

        let mut halted = false;
        for (chunk_index, chunk) in chunks.iter().enumerate() {
            if self.cancel_requested.load(Ordering::SeqCst) {
                info!(chunk_index, remaining_chunks = chunks.len() - chunk_index, "Batch cancelled before chunk dispatch");
                halted = true;
                break;
            }
            debug!(chunk_index, size = chunk.len(), "Dispatching chunk");
            join_all(chunk.iter().map(|&index| self.process_row(index))).await;
        }

        let final_state = if halted {
            SchedulerState::Cancelled
        } else {
            SchedulerState::Completed
        };
        let run_time = self.elapsed();
        *lock(&self.run_time) = Some(run_time);
        *lock(&self.state) = final_state;

        let results = self.results();
        let summary = BatchSummary::from_results(&results, final_state).with_duration(run_time);
        info!(
            state = ?final_state,
            succeeded = summary.succeeded,
            failed = summary.failed,
            not_started = summary.not_started,
            persist_failures = summary.persist_failures,
            elapsed_ms = summary.duration.as_millis() as u64,
            "Batch run finished"
        );
        self.send(BatchEvent::Completed {
            state: final_state,
            results: results.clone(),
        });

        Ok(results)
    }

    async fn process_row(&self, index: usize) {
        let row = {
            let mut results = lock(&self.results);
            if !results[index].mark_processing() {
                warn!(index, status = ?results[index].status, "Row is not pending; skipping");
                return;
            }
            let row = results[index].row.clone();
            self.emit_progress(&results, Some(row.label()));
            row
        };
        debug!(row_id = %row.id, drug = %row.drug_name, protein = %row.protein_name, "Row processing");

        let request = InferenceRequest::new(row.smiles.clone(), row.fasta.clone())
            .with_names(row.drug_name.clone(), row.protein_name.clone());

        match self.client.predict(&request).await {
            Ok(response) => {
                let pk = response.binding_affinity_pk;
                let confidence = response.confidence_percent();
                lock(&self.results)[index].mark_success(pk, confidence);

                let prediction = NewPrediction::new(
                    PredictionSource::Batch,
                    row.drug_name.clone(),
                    row.smiles.clone(),
                    row.protein_name.clone(),
                    row.fasta.clone(),
                    pk,
                    confidence,
                );
                match self.sink.record(prediction).await {
                    Ok(record_id) => {
                        let mut results = lock(&self.results);
                        results[index].persisted = Some(true);
                        results[index].record_id = Some(record_id);
                    }
                    Err(e) => {
                        // The prediction stands; only the durable copy is missing
                        warn!(row_id = %row.id, error = %e, "Failed to save batch prediction to history");
                        lock(&self.results)[index].persisted = Some(false);
                    }
                }
                debug!(row_id = %row.id, pk, confidence, "Row succeeded");
            }
            Err(e) => {
                warn!(row_id = %row.id, drug = %row.drug_name, error = %e, "Row failed");
                lock(&self.results)[index].mark_failed(e.to_string());
            }
        }

        let results = lock(&self.results);
        self.emit_progress(&results, Some(row.label()));
    }

    /// Snapshot and send while the results lock is held, so emitted snapshots
    /// are ordered the same way as the state changes they describe.
    fn emit_progress(&self, results: &[BatchResult], current_item: Option<String>) {
        if self.events.is_none() {
            return;
        }
        let progress = BatchProgress::from_results(results, self.elapsed(), current_item);
        self.send(BatchEvent::Progress(progress));
    }

    fn send(&self, event: BatchEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is watching
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, priority: bool) -> BatchRow {
        BatchRow::new(name, "C", "P", "M".repeat(30), priority)
    }

    #[test]
    fn test_summary_display() {
        let mut results: Vec<BatchResult> = ["a", "b", "c"].iter().map(|n| BatchResult::pending(row(n, false))).collect();
        results[0].mark_processing();
        results[0].mark_success(7.0, 90.0);
        results[0].persisted = Some(false);
        results[1].mark_processing();
        results[1].mark_failed("boom");

        let summary = BatchSummary::from_results(&results, SchedulerState::Cancelled);
        assert!(summary.cancelled);
        assert_eq!(summary.to_string(), "1 succeeded, 1 failed, 1 not started (1 not saved to history)");
    }

    #[test]
    fn test_chunk_size_never_zero() {
        assert_eq!(SchedulerConfig::default().with_chunk_size(0).chunk_size, 1);
        assert_eq!(SchedulerConfig::default().chunk_size, DEFAULT_CHUNK_SIZE);
    }
}
