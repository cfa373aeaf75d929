use std::collections::HashMap;

use sqlx::SqlitePool;

use crate::error::{IndexError, Result};

pub const HASH_ALGORITHM: &str = "blake3";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashStatus {
    Computed,
    /// The file could not be read while hashing.
    Failed,
    /// Not hashed (empty or blank, or over the size limit).
    Skipped,
}

impl HashStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Computed => "computed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "computed" => Some(Self::Computed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// What the workspace last looked like for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIndexEntry {
    /// Workspace-relative, `/`-separated.
    pub path: String,
    /// `false` when the file exists but is not indexed (size limit, blank).
    pub available: bool,
    pub deleted: bool,
    pub size: u64,
    /// Unix millis.
    pub modified_ms: i64,
    pub hash_algorithm: String,
    pub hash: String,
    pub hash_status: HashStatus,
    pub language: Option<String>,
    pub last_indexed_at: Option<String>,
    /// Hash that was current when the file was last indexed.
    pub last_indexed_hash: Option<String>,
    /// Hash whose processing failed for good. Not retried until the content
    /// changes or failures are cleared.
    pub last_failed_hash: Option<String>,
}

impl FileIndexEntry {
    /// Whether the current content still needs indexing.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        let current = Some(self.hash.as_str());
        self.available
            && (self.last_indexed_at.is_none() || self.last_indexed_hash.as_deref() != current)
            && self.last_failed_hash.as_deref() != current
    }

    #[must_use]
    pub fn was_indexed(&self) -> bool {
        self.last_indexed_at.is_some()
    }

    /// Whether the graph holds exactly the current content.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.available
            && self.was_indexed()
            && self.last_indexed_hash.as_deref() == Some(self.hash.as_str())
    }

    /// Whether processing the current content failed for good.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.available && self.last_failed_hash.as_deref() == Some(self.hash.as_str())
    }
}

#[derive(sqlx::FromRow)]
struct FileIndexRow {
    path: String,
    available: bool,
    deleted: bool,
    size: i64,
    modified_ms: i64,
    hash_algorithm: String,
    hash: String,
    hash_status: String,
    language: Option<String>,
    last_indexed_at: Option<String>,
    last_indexed_hash: Option<String>,
    last_failed_hash: Option<String>,
}

impl TryFrom<FileIndexRow> for FileIndexEntry {
    type Error = IndexError;

    fn try_from(row: FileIndexRow) -> Result<Self> {
        let hash_status = HashStatus::parse(&row.hash_status).ok_or_else(|| {
            IndexError::CorruptRow(format!("{}: bad hash_status", row.path))
        })?;
        Ok(Self {
            size: u64::try_from(row.size)?,
            path: row.path,
            available: row.available,
            deleted: row.deleted,
            modified_ms: row.modified_ms,
            hash_algorithm: row.hash_algorithm,
            hash: row.hash,
            hash_status,
            language: row.language,
            last_indexed_at: row.last_indexed_at,
            last_indexed_hash: row.last_indexed_hash,
            last_failed_hash: row.last_failed_hash,
        })
    }
}

const COLUMNS: &str = "path, available, deleted, size, modified_ms, hash_algorithm, hash, \
                       hash_status, language, last_indexed_at, last_indexed_hash, last_failed_hash";

/// Persisted per-file discovery state in the `file_index` table.
#[derive(Debug, Clone)]
pub struct FileIndexStore {
    pool: SqlitePool,
}

impl FileIndexStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns an error if the SQL statement fails.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS file_index (
                path TEXT PRIMARY KEY,
                available INTEGER NOT NULL DEFAULT 1,
                deleted INTEGER NOT NULL DEFAULT 0,
                size INTEGER NOT NULL DEFAULT 0,
                modified_ms INTEGER NOT NULL DEFAULT 0,
                hash_algorithm TEXT NOT NULL,
                hash TEXT NOT NULL,
                hash_status TEXT NOT NULL,
                language TEXT,
                last_indexed_at TEXT,
                last_indexed_hash TEXT,
                last_failed_hash TEXT
            )",
        )
        .execute(&self.pool)
        .await?;
        self.ensure_column("last_failed_hash", "TEXT").await
    }

    /// Add a column that databases created by older builds lack.
    async fn ensure_column(&self, column: &str, ty: &str) -> Result<()> {
        let present: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('file_index') WHERE name = ?",
        )
        .bind(column)
        .fetch_one(&self.pool)
        .await?;
        if present == 0 {
            sqlx::query(&format!("ALTER TABLE file_index ADD COLUMN {column} {ty}"))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Record a discovery result. Last-indexed fields are never overwritten here.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn upsert(&self, entry: &FileIndexEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO file_index
                (path, available, deleted, size, modified_ms, hash_algorithm, hash, hash_status, language)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(path) DO UPDATE SET
                available = excluded.available,
                deleted = excluded.deleted,
                size = excluded.size,
                modified_ms = excluded.modified_ms,
                hash_algorithm = excluded.hash_algorithm,
                hash = excluded.hash,
                hash_status = excluded.hash_status,
                language = excluded.language",
        )
        .bind(&entry.path)
        .bind(entry.available)
        .bind(entry.deleted)
        .bind(i64::try_from(entry.size)?)
        .bind(entry.modified_ms)
        .bind(&entry.hash_algorithm)
        .bind(&entry.hash)
        .bind(entry.hash_status.as_str())
        .bind(entry.language.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(&self, path: &str) -> Result<Option<FileIndexEntry>> {
        let row: Option<FileIndexRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM file_index WHERE path = ?"))
                .bind(path)
                .fetch_optional(&self.pool)
                .await?;
        row.map(FileIndexEntry::try_from).transpose()
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list(&self) -> Result<Vec<FileIndexEntry>> {
        let rows: Vec<FileIndexRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM file_index ORDER BY path"))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(FileIndexEntry::try_from).collect()
    }

    /// All entries keyed by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn snapshot(&self) -> Result<HashMap<String, FileIndexEntry>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .map(|e| (e.path.clone(), e))
            .collect())
    }

    /// Stamp `path` as indexed at `hash`.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_indexed(&self, path: &str, hash: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE file_index SET last_indexed_at = ?, last_indexed_hash = ?, \
             last_failed_hash = NULL WHERE path = ?",
        )
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(hash)
        .bind(path)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record that processing `path` at `hash` failed permanently. The path
    /// stays clean until its content changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_failed(&self, path: &str, hash: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE file_index SET last_failed_hash = ? WHERE path = ?")
            .bind(hash)
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Make every permanently failed file eligible again. Returns the number
    /// of rows touched.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn clear_failed(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE file_index SET last_failed_hash = NULL WHERE last_failed_hash IS NOT NULL",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Forget that `path` was ever indexed, so the next scan treats it as dirty.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn clear_indexed(&self, path: &str) -> Result<()> {
        sqlx::query(
            "UPDATE file_index SET last_indexed_at = NULL, last_indexed_hash = NULL, \
             last_failed_hash = NULL WHERE path = ?",
        )
        .bind(path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark every tracked file dirty. Returns the number of rows touched.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn clear_all_indexed(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE file_index SET last_indexed_at = NULL, last_indexed_hash = NULL, \
             last_failed_hash = NULL \
             WHERE last_indexed_at IS NOT NULL OR last_failed_hash IS NOT NULL",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_deleted(&self, path: &str) -> Result<()> {
        sqlx::query("UPDATE file_index SET deleted = 1, available = 0 WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove the entry once cleanup confirmed the file is gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn remove(&self, path: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM file_index WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
