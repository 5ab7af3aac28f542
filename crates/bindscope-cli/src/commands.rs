//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use bindscope_batch::{parse_csv, parse_json, BatchEvent, BatchScheduler, ParsedBatch, SchedulerConfig};
use bindscope_common::time::millis_to_utc;
use bindscope_common::{HistoryFilters, PredictionRecord, PredictionSource};
use bindscope_config::Config;
use bindscope_db::{MigrationOutcome, MigrationReport, PredictionRepository};
use bindscope_inference::{HttpInferenceClient, InferenceClient, TimeoutClient};
use chrono::{Local, NaiveDate, TimeZone};
use tokio::sync::mpsc;
use tracing::{info, warn};

// ── Batch ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Json,
    Csv,
}

impl InputFormat {
    /// Explicit flags win; otherwise `.csv` means CSV and anything else JSON.
    pub fn resolve(file: &Path, json: bool, csv: bool) -> Self {
        if json {
            return Self::Json;
        }
        if csv {
            return Self::Csv;
        }
        match file.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::Csv,
            _ => Self::Json,
        }
    }
}

fn load_batch(file: &Path, format: InputFormat) -> anyhow::Result<ParsedBatch> {
    let parsed = match format {
        InputFormat::Json => {
            let text = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
            parse_json(&text)?
        }
        InputFormat::Csv => {
            let reader = std::fs::File::open(file).with_context(|| format!("opening {}", file.display()))?;
            parse_csv(reader)?
        }
    };
    for rejection in &parsed.rejected {
        warn!(line = rejection.line, reason = %rejection.reason, "Skipped input row");
    }
    Ok(parsed)
}

fn build_client(config: &Config) -> anyhow::Result<Arc<dyn InferenceClient>> {
    let http = HttpInferenceClient::new(&config.inference.base_url)?;
    Ok(match config.inference.timeout() {
        Some(timeout) => Arc::new(TimeoutClient::new(http, timeout)),
        None => Arc::new(http),
    })
}

pub async fn run_batch(
    config: &Config,
    repo: Arc<PredictionRepository>,
    file: &Path,
    format: InputFormat,
    chunk_size: Option<usize>,
    out: Option<&Path>,
) -> anyhow::Result<()> {
    let parsed = load_batch(file, format)?;
    if parsed.rows.is_empty() {
        bail!("no valid rows in {} ({} rejected)", file.display(), parsed.rejected.len());
    }
    info!(rows = parsed.rows.len(), rejected = parsed.rejected.len(), "Batch input loaded");

    let scheduler_config =
        SchedulerConfig::default().with_chunk_size(chunk_size.unwrap_or(config.batch.chunk_size));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let scheduler = BatchScheduler::new(parsed.rows, build_client(config)?, repo, scheduler_config).with_events(tx);

    let reporter = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                BatchEvent::Progress(p) => info!(
                    completed = p.completed,
                    total = p.total,
                    failed = p.failed,
                    eta_secs = p.eta,
                    item = p.current_item.as_deref().unwrap_or(""),
                    "{}%",
                    p.percentage
                ),
                BatchEvent::Completed { state, results } => {
                    info!(state = ?state, results = results.len(), "Batch completed")
                }
            }
        }
    });

    let cancel = scheduler.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; letting the current chunk finish");
            cancel.cancel();
        }
    });

    let run = scheduler.start().await;
    interrupt.abort();
    let summary = scheduler.summary();
    drop(scheduler);
    let _ = reporter.await;
    let results = run?;

    for r in results.iter().filter(|r| r.error.is_some()) {
        println!("FAILED  {}  {}", r.row.label(), r.error.as_deref().unwrap_or_default());
    }
    if let Some(out) = out {
        std::fs::write(out, serde_json::to_string_pretty(&results)?)
            .with_context(|| format!("writing {}", out.display()))?;
        info!(path = %out.display(), "Results written");
    }
    println!("{summary}");
    Ok(())
}

// ── History ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct HistoryArgs {
    pub source: Option<PredictionSource>,
    pub favorites: bool,
    pub search: Option<String>,
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    pub min_pk: Option<f64>,
    pub max_pk: Option<f64>,
    pub min_confidence: Option<f64>,
    pub max_confidence: Option<f64>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Local midnight of `day`, as epoch milliseconds.
fn local_day_start(day: NaiveDate) -> anyhow::Result<i64> {
    let midnight = day.and_hms_opt(0, 0, 0).context("invalid date")?;
    let local = Local
        .from_local_datetime(&midnight)
        .earliest()
        .with_context(|| format!("{day} has no local midnight"))?;
    Ok(local.timestamp_millis())
}

impl HistoryArgs {
    /// Inverted bounds are rejected rather than silently matching nothing.
    pub fn into_filters(self) -> anyhow::Result<HistoryFilters> {
        check_order("--since", self.since, "--until", self.until)?;
        check_order("--min-pk", self.min_pk, "--max-pk", self.max_pk)?;
        check_order("--min-confidence", self.min_confidence, "--max-confidence", self.max_confidence)?;

        let mut filters = HistoryFilters::new();
        if let Some(source) = self.source {
            filters = filters.with_source(source);
        }
        if self.favorites {
            filters = filters.favorites_only();
        }
        if let Some(search) = self.search {
            filters = filters.with_search(search);
        }
        if self.since.is_some() || self.until.is_some() {
            let start = self.since.map(local_day_start).transpose()?.unwrap_or(i64::MIN);
            let end = match self.until.and_then(|d| d.succ_opt()) {
                Some(next) => local_day_start(next)? - 1,
                None => i64::MAX,
            };
            filters = filters.with_date_range(start, end);
        }
        if self.min_pk.is_some() || self.max_pk.is_some() {
            filters = filters.with_pk_range(self.min_pk.unwrap_or(f64::MIN), self.max_pk.unwrap_or(f64::MAX));
        }
        if self.min_confidence.is_some() || self.max_confidence.is_some() {
            filters = filters.with_confidence_range(
                self.min_confidence.unwrap_or(f64::MIN),
                self.max_confidence.unwrap_or(f64::MAX),
            );
        }
        if let Some(limit) = self.limit {
            filters = filters.with_limit(limit);
        }
        filters.offset = self.offset;
        Ok(filters)
    }
}

fn check_order<T: PartialOrd + std::fmt::Display>(
    low_flag: &str,
    low: Option<T>,
    high_flag: &str,
    high: Option<T>,
) -> anyhow::Result<()> {
    if let (Some(low), Some(high)) = (low, high) {
        if low > high {
            bail!("{low_flag} {low} exceeds {high_flag} {high}");
        }
    }
    Ok(())
}

fn render_record(rec: &PredictionRecord) -> String {
    let when = millis_to_utc(rec.timestamp).with_timezone(&Local).format("%Y-%m-%d %H:%M");
    let star = if rec.is_favorite { " *" } else { "" };
    format!(
        "{}  {}  {:<6}  {} × {}  pK {:.2}  conf {:.0}%{}",
        rec.id, when, rec.source.as_str(), rec.drug_name, rec.protein_name, rec.predicted_pk, rec.confidence_score, star
    )
}

pub async fn history(repo: &PredictionRepository, filters: &HistoryFilters, json: bool) -> anyhow::Result<()> {
    let records = repo.query(filters).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    for rec in &records {
        println!("{}", render_record(rec));
    }
    info!(count = records.len(), "History listed");
    Ok(())
}

pub async fn stats(repo: &PredictionRepository, json: bool) -> anyhow::Result<()> {
    let stats = repo.stats().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("Total predictions:   {}", stats.total_predictions);
    println!("Average pK:          {:.2}", stats.average_pk);
    println!("Average confidence:  {:.1}%", stats.average_confidence);
    println!("Most tested protein: {}", stats.most_tested_protein);
    println!(
        "By source:           {} single, {} batch",
        stats.predictions_by_source.single, stats.predictions_by_source.batch
    );
    let active_days = stats.predictions_by_day.iter().filter(|d| d.count > 0).count();
    let recent: usize = stats.predictions_by_day.iter().map(|d| d.count).sum();
    println!("Last 30 days:        {recent} predictions on {active_days} days");
    Ok(())
}

// ── Record edits ──────────────────────────────────────────────────────────────

pub async fn favorite(repo: &PredictionRepository, id: &str) -> anyhow::Result<()> {
    match repo.toggle_favorite(id).await? {
        Some(true) => println!("{id} marked as favorite"),
        Some(false) => println!("{id} removed from favorites"),
        None => bail!("no prediction with id {id}"),
    }
    Ok(())
}

pub async fn notes(repo: &PredictionRepository, id: &str, text: &str) -> anyhow::Result<()> {
    if repo.get(id).await?.is_none() {
        bail!("no prediction with id {id}");
    }
    repo.set_notes(id, text).await?;
    println!("Notes updated for {id}");
    Ok(())
}

pub async fn delete(repo: &PredictionRepository, id: &str) -> anyhow::Result<()> {
    repo.delete(id).await?;
    println!("Deleted {id}");
    Ok(())
}

pub async fn clear(repo: &PredictionRepository, yes: bool) -> anyhow::Result<()> {
    if !yes {
        bail!("refusing to delete the whole history without --yes");
    }
    let removed = repo.clear_all().await?;
    println!("Removed {removed} predictions");
    Ok(())
}

pub async fn export(repo: &PredictionRepository, out: Option<&Path>) -> anyhow::Result<()> {
    let records = repo.export_all().await?;
    let body = serde_json::to_string_pretty(&records)?;
    match out {
        Some(path) => {
            std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
            info!(count = records.len(), path = %path.display(), "History exported");
        }
        None => println!("{body}"),
    }
    Ok(())
}

// ── Migration ─────────────────────────────────────────────────────────────────

/// Migration already ran while opening the store; describe what it did.
pub fn report_migration(report: &MigrationReport) -> anyhow::Result<()> {
    match &report.outcome {
        MigrationOutcome::NoLegacySource => println!("No legacy history found"),
        MigrationOutcome::AlreadyMigrated => println!("Legacy history was already handled by an earlier run"),
        MigrationOutcome::SkippedExistingData { records } => {
            println!("Store already holds {records} predictions; legacy history not imported")
        }
        MigrationOutcome::Migrated { inserted, skipped } => {
            println!("Imported {inserted} predictions ({skipped} legacy entries skipped)")
        }
        MigrationOutcome::Failed { reason } => bail!("legacy migration failed: {reason}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_format_resolution() {
        assert_eq!(InputFormat::resolve(Path::new("rows.CSV"), false, false), InputFormat::Csv);
        assert_eq!(InputFormat::resolve(Path::new("rows.json"), false, false), InputFormat::Json);
        assert_eq!(InputFormat::resolve(Path::new("rows.txt"), false, true), InputFormat::Csv);
        assert_eq!(InputFormat::resolve(Path::new("rows.csv"), true, false), InputFormat::Json);
    }

    #[test]
    fn test_history_args_build_ranges() {
        let filters = HistoryArgs {
            source: Some(PredictionSource::Batch),
            min_pk: Some(8.0),
            max_confidence: Some(90.0),
            limit: Some(10),
            offset: Some(5),
            ..HistoryArgs::default()
        }
        .into_filters()
        .unwrap();

        assert_eq!(filters.source, Some(PredictionSource::Batch));
        let pk = filters.pk_range.unwrap();
        assert_eq!(pk.min, 8.0);
        assert_eq!(pk.max, f64::MAX);
        let conf = filters.confidence_range.unwrap();
        assert_eq!(conf.max, 90.0);
        assert_eq!(filters.limit, Some(10));
        assert_eq!(filters.offset, Some(5));
        assert!(filters.date_range.is_none());
    }

    #[test]
    fn test_day_bounds_cover_whole_local_day() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let filters = HistoryArgs { since: Some(day), until: Some(day), ..HistoryArgs::default() }
            .into_filters()
            .unwrap();
        let range = filters.date_range.unwrap();
        let noon = Local
            .from_local_datetime(&day.and_hms_opt(12, 0, 0).unwrap())
            .earliest()
            .unwrap()
            .timestamp_millis();
        assert!(range.contains(noon));
        assert!(range.end - range.start < 26 * 3_600_000);
    }

    #[test]
    fn test_inverted_bounds_are_rejected() {
        let err = HistoryArgs { min_pk: Some(9.0), max_pk: Some(1.0), ..HistoryArgs::default() }
            .into_filters()
            .unwrap_err();
        assert!(err.to_string().contains("--min-pk"));

        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let args = HistoryArgs { since: day.succ_opt(), until: Some(day), ..HistoryArgs::default() };
        assert!(args.into_filters().is_err());

        let equal = HistoryArgs { min_confidence: Some(50.0), max_confidence: Some(50.0), ..HistoryArgs::default() };
        assert!(equal.into_filters().is_ok());
    }

    #[tokio::test]
    async fn test_clear_requires_confirmation() {
        let db = bindscope_db::Database::open_in_memory().unwrap();
        db.initialize().await.unwrap();
        let repo = PredictionRepository::new(Arc::new(db));
        assert!(clear(&repo, false).await.is_err());
        assert!(clear(&repo, true).await.is_ok());
    }
}
