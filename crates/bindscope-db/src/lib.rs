//! Bindscope Database Layer
//!
//! Durable prediction history on an embedded SQLite file: indexed storage,
//! filtered queries, statistics and a one-time migration from the legacy
//! flat-list format.
//!
//! # Example
//!
//! ```rust,no_run
//! use bindscope_db::{Database, PredictionRepository};
//! use bindscope_common::HistoryFilters;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::open("./data/bindscope.sqlite")
//!         .await?
//!         .with_legacy_source("./data/prediction_history.json");
//!     db.initialize().await?;
//!
//!     let history = PredictionRepository::new(std::sync::Arc::new(db));
//!     let favorites = history.query(&HistoryFilters::new().favorites_only()).await?;
//!     println!("{} favorites", favorites.len());
//!
//!     Ok(())
//! }
//! ```

pub mod database;
pub mod error;
pub mod migration;
pub mod predictions;
pub mod schema;
pub mod stats;

pub use database::Database;
pub use error::{DbError, Result};
pub use migration::{MigrationOutcome, MigrationReport};
pub use predictions::PredictionRepository;
pub use schema::TABLE_PREDICTIONS;
pub use stats::{compute_stats, ACTIVITY_WINDOW_DAYS};
