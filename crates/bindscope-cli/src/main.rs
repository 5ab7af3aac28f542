//! Bindscope command-line interface
//!
//! Run with: cargo run -p bindscope-cli -- <command>

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use bindscope_common::PredictionSource;
use bindscope_config::Config;
use bindscope_db::{Database, MigrationReport, PredictionRepository};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "bindscope", version, about = "Batch binding-affinity predictions and prediction history")]
struct Cli {
    /// Path to bindscope.toml
    #[arg(long, global = true, env = "BINDSCOPE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run predictions for every row of a JSON or CSV file
    Batch {
        file: PathBuf,
        /// Treat the file as JSON regardless of extension
        #[arg(long, conflicts_with = "csv")]
        json: bool,
        /// Treat the file as CSV regardless of extension
        #[arg(long)]
        csv: bool,
        /// Rows in flight at once (overrides [batch] chunk_size)
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Write the full result list as JSON
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// List stored predictions, newest first
    History {
        #[arg(long)]
        source: Option<PredictionSource>,
        #[arg(long)]
        favorites: bool,
        /// Case-insensitive match on drug, protein, SMILES or notes
        #[arg(long)]
        search: Option<String>,
        /// First day to include (YYYY-MM-DD, local time)
        #[arg(long)]
        since: Option<chrono::NaiveDate>,
        /// Last day to include (YYYY-MM-DD, local time)
        #[arg(long)]
        until: Option<chrono::NaiveDate>,
        #[arg(long)]
        min_pk: Option<f64>,
        #[arg(long)]
        max_pk: Option<f64>,
        #[arg(long)]
        min_confidence: Option<f64>,
        #[arg(long)]
        max_confidence: Option<f64>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        offset: Option<usize>,
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summary statistics over the whole history
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Toggle the favorite flag of a record
    Favorite { id: String },

    /// Replace the notes of a record
    Notes { id: String, text: String },

    /// Delete one record
    Delete { id: String },

    /// Delete every record
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Export the full history as JSON
    Export {
        /// Output file (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Import the legacy flat-list history into an empty store
    Migrate,
}

/// Open the store and run startup migration.
async fn open_store(config: &Config) -> anyhow::Result<(Arc<PredictionRepository>, MigrationReport)> {
    let mut db = Database::open(&config.store.path).await?;
    if let Some(legacy) = &config.store.legacy_history {
        db = db.with_legacy_source(legacy);
    }
    let report = db.initialize().await?;
    Ok((Arc::new(PredictionRepository::new(Arc::new(db))), report))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    info!(
        store = %config.store.path.display(),
        inference = %config.inference.base_url,
        chunk_size = config.batch.chunk_size,
        "Configuration loaded"
    );

    let (repo, report) = open_store(&config).await?;
    run_and_close(cli.command, &config, repo, &report).await
}

/// Run one subcommand, then close the store whatever the outcome.
async fn run_and_close(
    command: Command,
    config: &Config,
    repo: Arc<PredictionRepository>,
    report: &MigrationReport,
) -> anyhow::Result<()> {
    let result = dispatch(command, config, &repo, report).await;
    repo.db().close().await?;
    result
}

async fn dispatch(
    command: Command,
    config: &Config,
    repo: &Arc<PredictionRepository>,
    report: &MigrationReport,
) -> anyhow::Result<()> {
    match command {
        Command::Batch { file, json, csv, chunk_size, out } => {
            let format = commands::InputFormat::resolve(&file, json, csv);
            commands::run_batch(config, repo.clone(), &file, format, chunk_size, out.as_deref()).await
        }
        Command::History {
            source,
            favorites,
            search,
            since,
            until,
            min_pk,
            max_pk,
            min_confidence,
            max_confidence,
            limit,
            offset,
            json,
        } => {
            let filters = commands::HistoryArgs {
                source,
                favorites,
                search,
                since,
                until,
                min_pk,
                max_pk,
                min_confidence,
                max_confidence,
                limit,
                offset,
            }
            .into_filters()?;
            commands::history(repo, &filters, json).await
        }
        Command::Stats { json } => commands::stats(repo, json).await,
        Command::Favorite { id } => commands::favorite(repo, &id).await,
        Command::Notes { id, text } => commands::notes(repo, &id, &text).await,
        Command::Delete { id } => commands::delete(repo, &id).await,
        Command::Clear { yes } => commands::clear(repo, yes).await,
        Command::Export { out } => commands::export(repo, out.as_deref()).await,
        Command::Migrate => commands::report_migration(report),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> (Arc<PredictionRepository>, MigrationReport) {
        let db = Database::open_in_memory().unwrap();
        let report = db.initialize().await.unwrap();
        (Arc::new(PredictionRepository::new(Arc::new(db))), report)
    }

    #[test]
    fn test_cli_parses_history_flags() {
        let cli = Cli::try_parse_from(["bindscope", "history", "--min-pk", "9", "--max-pk", "1"]).unwrap();
        assert!(matches!(cli.command, Command::History { min_pk: Some(_), max_pk: Some(_), .. }));
    }

    #[tokio::test]
    async fn test_store_closed_after_rejected_history_filters() {
        let (repo, report) = memory_store().await;
        let cli = Cli::try_parse_from(["bindscope", "history", "--min-pk", "9", "--max-pk", "1"]).unwrap();

        let result = run_and_close(cli.command, &Config::default(), repo.clone(), &report).await;
        assert!(result.is_err());
        assert!(repo.db().is_closed());
    }

    #[tokio::test]
    async fn test_store_closed_after_successful_command() {
        let (repo, report) = memory_store().await;
        let cli = Cli::try_parse_from(["bindscope", "stats"]).unwrap();

        run_and_close(cli.command, &Config::default(), repo.clone(), &report).await.unwrap();
        assert!(repo.db().is_closed());
    }
}
