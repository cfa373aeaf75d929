mod graph;

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

use crate::error::Result;

pub use graph::SqliteGraphStore;

/// Open (or create) a `SQLite` database shared by the graph, file index and
/// task stores.
///
/// `":memory:"` opens a private in-memory database held by a single pooled
/// connection that is never recycled, so its contents live as long as the pool.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
pub async fn connect(path: &str) -> Result<SqlitePool> {
    if path == ":memory:" {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;
        return Ok(pool);
    }

    if let Some(parent) = std::path::Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| crate::error::StoreError::Other(format!("create {}: {e}", parent.display())))?;
    }

    let opts = SqliteConnectOptions::from_str(&format!("sqlite:{path}?mode=rwc"))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await?;
    tracing::debug!(%path, "opened sqlite database");
    Ok(pool)
}
