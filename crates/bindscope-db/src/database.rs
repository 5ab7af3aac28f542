//! Database connection and lifecycle management.
//!
//! Wraps one SQLite connection behind a mutex and runs every statement on the
//! blocking thread pool, so async callers never stall the runtime.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::error::{DbError, Result};
use crate::migration::{self, MigrationReport};
use crate::schema;

/// Main database handle.
///
/// Cloning is cheap; clones share the same connection. After [`Database::close`]
/// every operation fails with [`DbError::Closed`].
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Option<Connection>>>,
    path: String,
    legacy_source: Option<PathBuf>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("legacy_source", &self.legacy_source)
            .finish()
    }
}

impl Database {
    /// Open or create a database file at the specified path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let path_str = path.to_string_lossy().to_string();

        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            // Create the parent directory if it doesn't exist
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let conn = Connection::open(&path)?;
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;\
                 PRAGMA synchronous=NORMAL;\
                 PRAGMA busy_timeout=5000;",
            )?;
            Ok(conn)
        })
        .await??;

        debug!(path = %path_str, "Opened prediction database");
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            path: path_str,
            legacy_source: None,
        })
    }

    /// Open a private in-memory database. Data is lost on close.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            path: ":memory:".to_string(),
            legacy_source: None,
        })
    }

    /// Point the one-time migration at a legacy flat-list JSON file.
    pub fn with_legacy_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.legacy_source = Some(path.into());
        self
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn legacy_source(&self) -> Option<&Path> {
        self.legacy_source.as_deref()
    }

    /// Create the schema and run the legacy migration.
    ///
    /// Only schema failures are returned as errors. Migration problems are
    /// logged and reported through [`MigrationReport`], leaving the store
    /// usable.
    #[instrument(skip(self), fields(path = %self.path))]
    pub async fn initialize(&self) -> Result<MigrationReport> {
        self.with_conn(|conn| schema::create_tables(conn)).await?;

        let report = match &self.legacy_source {
            None => MigrationReport::no_legacy_source(),
            Some(path) => match migration::migrate_legacy(self, path).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(error = %e, legacy = %path.display(), "Legacy history migration failed; continuing with current store");
                    MigrationReport::failed(e.to_string())
                }
            },
        };

        info!(outcome = ?report.outcome, "Prediction store initialized");
        Ok(report)
    }

    /// Release the connection.
    pub async fn close(&self) -> Result<()> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(conn) = guard.take() {
                conn.close().map_err(|(_, e)| DbError::from(e))?;
            }
            Ok(())
        })
        .await??;
        debug!(path = %self.path, "Closed prediction database");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.conn
            .lock()
            .map(|guard| guard.is_none())
            .unwrap_or(true)
    }

    /// Run `f` against the connection on the blocking pool.
    ///
    /// The mutex is held for the whole closure, so each call is atomic with
    /// respect to every other store operation.
    pub(crate) async fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            // A panic in another closure leaves the connection itself usable
            let mut guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let conn = guard.as_mut().ok_or(DbError::Closed)?;
            f(conn)
        })
        .await?
    }
}
