use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{QueueError, Result};
use crate::task::{NewTask, QueueTask, TaskOutput, TaskStatus};

const TASK_COLUMNS: &str = "id, path, name, size, hash, content, status, progress, retry_count, \
     max_retries, current_step, created_at, updated_at, started_at, completed_at, available_at, \
     error_message, chunks_created, relationships_created";

/// Counts of tasks by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
}

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back to pending; `attempt` is the new retry count.
    Retrying { attempt: u32 },
    /// Retry budget exhausted, or a terminal failure.
    Failed,
    /// The content changed while the failed attempt ran; the task is pending
    /// again with a fresh retry budget.
    Requeued,
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    path: String,
    name: String,
    size: i64,
    hash: String,
    content: Option<String>,
    status: String,
    progress: i64,
    retry_count: i64,
    max_retries: i64,
    current_step: Option<String>,
    created_at: String,
    updated_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    available_at: i64,
    error_message: Option<String>,
    chunks_created: i64,
    relationships_created: i64,
}

impl TryFrom<TaskRow> for QueueTask {
    type Error = QueueError;

    fn try_from(row: TaskRow) -> Result<Self> {
        let corrupt = |field: &str| QueueError::Corrupt(format!("task {}: bad {field}", row.id));
        let status = TaskStatus::parse(&row.status).ok_or_else(|| corrupt("status"))?;
        let size = u64::try_from(row.size).map_err(|_| corrupt("size"))?;
        let progress = u8::try_from(row.progress).map_err(|_| corrupt("progress"))?;
        let retry_count = u32::try_from(row.retry_count).map_err(|_| corrupt("retry_count"))?;
        let max_retries = u32::try_from(row.max_retries).map_err(|_| corrupt("max_retries"))?;
        let output = TaskOutput {
            chunks: u64::try_from(row.chunks_created).map_err(|_| corrupt("chunks"))?,
            relationships: u64::try_from(row.relationships_created)
                .map_err(|_| corrupt("relationships"))?,
        };
        Ok(Self {
            id: row.id,
            path: row.path,
            name: row.name,
            size,
            hash: row.hash,
            content: row.content,
            status,
            progress,
            retry_count,
            max_retries,
            current_step: row.current_step,
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            available_at: row.available_at,
            error_message: row.error_message,
            output,
        })
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

/// Durable task metadata in the `processing_tasks` table.
///
/// Every status transition is a single-row `UPDATE` guarded by the expected
/// current status, so concurrent claimers never take the same task twice.
#[derive(Debug, Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the `processing_tasks` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL statement fails.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS processing_tasks (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                size INTEGER NOT NULL DEFAULT 0,
                hash TEXT NOT NULL,
                content TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                progress INTEGER NOT NULL DEFAULT 0,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL,
                current_step TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                available_at INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                chunks_created INTEGER NOT NULL DEFAULT 0,
                relationships_created INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_processing_tasks_status ON processing_tasks(status)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the insert fails (including a duplicate path).
    pub async fn insert(&self, task: &NewTask, max_retries: u32) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_rfc3339();
        sqlx::query(
            "INSERT INTO processing_tasks
                (id, path, name, size, hash, content, status, max_retries, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?)",
        )
        .bind(&id)
        .bind(&task.path)
        .bind(task.display_name())
        .bind(to_i64(task.size))
        .bind(&task.hash)
        .bind(task.content.as_deref())
        .bind(i64::from(max_retries))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails or the row is corrupt.
    pub async fn get(&self, id: &str) -> Result<Option<QueueTask>> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM processing_tasks WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(QueueTask::try_from).transpose()
    }

    /// # Errors
    ///
    /// Returns an error if the query fails or the row is corrupt.
    pub async fn get_by_path(&self, path: &str) -> Result<Option<QueueTask>> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM processing_tasks WHERE path = ?"
        ))
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        row.map(QueueTask::try_from).transpose()
    }

    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<QueueTask>> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM processing_tasks WHERE status = ? ORDER BY created_at, id"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(QueueTask::try_from).collect()
    }

    /// Put a task back to pending with fresh content and a fresh retry budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn reset(&self, id: &str, task: &NewTask) -> Result<()> {
        sqlx::query(
            "UPDATE processing_tasks SET
                status = 'pending', hash = ?, size = ?, content = ?, progress = 0,
                retry_count = 0, current_step = NULL, error_message = NULL,
                available_at = 0, started_at = NULL, completed_at = NULL, updated_at = ?
             WHERE id = ?",
        )
        .bind(&task.hash)
        .bind(to_i64(task.size))
        .bind(task.content.as_deref())
        .bind(now_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record new content for a task a worker currently holds. Completion
    /// then notices the hash mismatch and requeues it.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn update_content(&self, id: &str, task: &NewTask) -> Result<()> {
        sqlx::query(
            "UPDATE processing_tasks SET hash = ?, size = ?, content = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&task.hash)
        .bind(to_i64(task.size))
        .bind(task.content.as_deref())
        .bind(now_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically move up to `limit` due pending tasks to processing.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn claim_pending(&self, limit: usize, now_ms: i64) -> Result<Vec<QueueTask>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM processing_tasks
             WHERE status = 'pending' AND available_at <= ?
             ORDER BY created_at, id LIMIT ?",
        )
        .bind(now_ms)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let now = now_rfc3339();
        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            let taken = sqlx::query(
                "UPDATE processing_tasks SET
                    status = 'processing', progress = 0, current_step = NULL,
                    started_at = ?, updated_at = ?
                 WHERE id = ? AND status = 'pending'",
            )
            .bind(&now)
            .bind(&now)
            .bind(&id)
            .execute(&self.pool)
            .await?
            .rows_affected();
            if taken == 1
                && let Some(task) = self.get(&id).await?
            {
                claimed.push(task);
            }
        }
        Ok(claimed)
    }

    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_progress(&self, id: &str, step: &str, percent: u8) -> Result<()> {
        sqlx::query(
            "UPDATE processing_tasks SET current_step = ?, progress = ?, updated_at = ?
             WHERE id = ? AND status = 'processing'",
        )
        .bind(step)
        .bind(i64::from(percent))
        .bind(now_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a task completed, unless its hash changed while it was being
    /// processed, in which case it goes back to pending. Returns the new status.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails or the task vanished.
    pub async fn complete(
        &self,
        id: &str,
        processed_hash: &str,
        output: TaskOutput,
    ) -> Result<TaskStatus> {
        let status: Option<String> = sqlx::query_scalar(
            "UPDATE processing_tasks SET
                status = CASE WHEN hash = ? THEN 'completed' ELSE 'pending' END,
                progress = CASE WHEN hash = ? THEN 100 ELSE 0 END,
                completed_at = CASE WHEN hash = ? THEN ? ELSE NULL END,
                chunks_created = ?, relationships_created = ?,
                current_step = NULL, error_message = NULL, updated_at = ?
             WHERE id = ?
             RETURNING status",
        )
        .bind(processed_hash)
        .bind(processed_hash)
        .bind(processed_hash)
        .bind(now_rfc3339())
        .bind(to_i64(output.chunks))
        .bind(to_i64(output.relationships))
        .bind(now_rfc3339())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let status = status.ok_or_else(|| QueueError::NotFound(id.to_owned()))?;
        TaskStatus::parse(&status).ok_or_else(|| QueueError::Corrupt(status))
    }

    /// Count one failed attempt of the content hashed `processed_hash`: back
    /// to pending after `retry_at_ms` while the budget lasts, otherwise
    /// permanently failed. A task whose hash moved on meanwhile is requeued.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails or the task vanished.
    pub async fn record_failure(
        &self,
        id: &str,
        processed_hash: &str,
        error: &str,
        retry_at_ms: i64,
    ) -> Result<FailureOutcome> {
        let row: Option<(String, i64, bool)> = sqlx::query_as(
            "UPDATE processing_tasks SET
                status = CASE WHEN hash <> ? OR retry_count < max_retries
                    THEN 'pending' ELSE 'failed' END,
                retry_count = CASE WHEN hash <> ? THEN 0
                    WHEN retry_count < max_retries THEN retry_count + 1
                    ELSE retry_count END,
                available_at = CASE WHEN hash <> ? THEN 0 ELSE ? END,
                error_message = CASE WHEN hash <> ? THEN NULL ELSE ? END,
                current_step = NULL, updated_at = ?
             WHERE id = ?
             RETURNING status, retry_count, hash = ?",
        )
        .bind(processed_hash)
        .bind(processed_hash)
        .bind(processed_hash)
        .bind(retry_at_ms)
        .bind(processed_hash)
        .bind(error)
        .bind(now_rfc3339())
        .bind(id)
        .bind(processed_hash)
        .fetch_optional(&self.pool)
        .await?;
        let (status, retry_count, same_content) =
            row.ok_or_else(|| QueueError::NotFound(id.to_owned()))?;
        if !same_content {
            Ok(FailureOutcome::Requeued)
        } else if status == TaskStatus::Pending.as_str() {
            let attempt = u32::try_from(retry_count)
                .map_err(|_| QueueError::Corrupt(format!("task {id}: bad retry_count")))?;
            Ok(FailureOutcome::Retrying { attempt })
        } else {
            Ok(FailureOutcome::Failed)
        }
    }

    /// Fail a task outright, leaving its retry count untouched. As with
    /// [`TaskStore::complete`], a task whose hash no longer matches
    /// `processed_hash` goes back to pending instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails or the task vanished.
    pub async fn fail_terminal(
        &self,
        id: &str,
        processed_hash: &str,
        error: &str,
    ) -> Result<FailureOutcome> {
        let same_content: Option<bool> = sqlx::query_scalar(
            "UPDATE processing_tasks SET
                status = CASE WHEN hash = ? THEN 'failed' ELSE 'pending' END,
                retry_count = CASE WHEN hash = ? THEN retry_count ELSE 0 END,
                available_at = CASE WHEN hash = ? THEN available_at ELSE 0 END,
                error_message = CASE WHEN hash = ? THEN ? ELSE NULL END,
                current_step = NULL, updated_at = ?
             WHERE id = ?
             RETURNING hash = ?",
        )
        .bind(processed_hash)
        .bind(processed_hash)
        .bind(processed_hash)
        .bind(processed_hash)
        .bind(error)
        .bind(now_rfc3339())
        .bind(id)
        .bind(processed_hash)
        .fetch_optional(&self.pool)
        .await?;
        match same_content {
            Some(true) => Ok(FailureOutcome::Failed),
            Some(false) => Ok(FailureOutcome::Requeued),
            None => Err(QueueError::NotFound(id.to_owned())),
        }
    }

    /// Reset every failed task to pending with a fresh retry budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn retry_failed(&self) -> Result<u64> {
        let n = sqlx::query(
            "UPDATE processing_tasks SET
                status = 'pending', retry_count = 0, error_message = NULL,
                available_at = 0, progress = 0, updated_at = ?
             WHERE status = 'failed'",
        )
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(n)
    }

    /// Return tasks a previous process left in `processing` to `pending`.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn recover_interrupted(&self) -> Result<u64> {
        let n = sqlx::query(
            "UPDATE processing_tasks SET
                status = 'pending', progress = 0, current_step = NULL, updated_at = ?
             WHERE status = 'processing'",
        )
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(n)
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_by_status(&self, status: TaskStatus) -> Result<u64> {
        let n = sqlx::query("DELETE FROM processing_tasks WHERE status = ?")
            .bind(status.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(n)
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_all(&self) -> Result<u64> {
        let n = sqlx::query("DELETE FROM processing_tasks")
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(n)
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn remove_path(&self, path: &str) -> Result<bool> {
        let n = sqlx::query("DELETE FROM processing_tasks WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(n > 0)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn stats(&self) -> Result<QueueStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM processing_tasks GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        let mut stats = QueueStats::default();
        for (status, count) in rows {
            let count = u64::try_from(count).unwrap_or_default();
            match TaskStatus::parse(&status) {
                Some(TaskStatus::Pending) => stats.pending = count,
                Some(TaskStatus::Processing) => stats.processing = count,
                Some(TaskStatus::Completed) => stats.completed = count,
                Some(TaskStatus::Failed) => stats.failed = count,
                None => tracing::warn!(%status, "unknown task status in store"),
            }
            stats.total += count;
        }
        Ok(stats)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    pub(crate) async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    async fn store() -> TaskStore {
        let store = TaskStore::new(memory_pool().await);
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn insert_and_get() {
        let s = store().await;
        let id = s
            .insert(&NewTask::file("src/a.ts", "h1", 42), 3)
            .await
            .unwrap();
        let task = s.get(&id).await.unwrap().unwrap();
        assert_eq!(task.path, "src/a.ts");
        assert_eq!(task.name, "a.ts");
        assert_eq!(task.size, 42);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.max_retries, 3);
        assert_eq!(s.get_by_path("src/a.ts").await.unwrap().unwrap().id, id);
        assert!(s.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_path_rejected() {
        let s = store().await;
        s.insert(&NewTask::file("a.ts", "h1", 1), 3).await.unwrap();
        assert!(s.insert(&NewTask::file("a.ts", "h2", 1), 3).await.is_err());
    }

    #[tokio::test]
    async fn claim_respects_limit_and_is_exclusive() {
        let s = store().await;
        for i in 0..5 {
            s.insert(&NewTask::file(format!("f{i}.ts"), "h", 1), 3)
                .await
                .unwrap();
        }
        let first = s.claim_pending(2, now_millis()).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|t| t.status == TaskStatus::Processing));
        let second = s.claim_pending(10, now_millis()).await.unwrap();
        assert_eq!(second.len(), 3);
        assert!(s.claim_pending(10, now_millis()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn claim_skips_tasks_not_yet_due() {
        let s = store().await;
        let id = s.insert(&NewTask::file("a.ts", "h", 1), 3).await.unwrap();
        s.claim_pending(1, now_millis()).await.unwrap();
        s.record_failure(&id, "h", "boom", now_millis() + 60_000)
            .await
            .unwrap();
        assert!(s.claim_pending(1, now_millis()).await.unwrap().is_empty());
        assert_eq!(
            s.claim_pending(1, now_millis() + 120_000)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn record_failure_never_exceeds_budget() {
        let s = store().await;
        let id = s.insert(&NewTask::file("a.ts", "h", 1), 2).await.unwrap();
        assert_eq!(
            s.record_failure(&id, "h", "e", 0).await.unwrap(),
            FailureOutcome::Retrying { attempt: 1 }
        );
        assert_eq!(
            s.record_failure(&id, "h", "e", 0).await.unwrap(),
            FailureOutcome::Retrying { attempt: 2 }
        );
        assert_eq!(
            s.record_failure(&id, "h", "e", 0).await.unwrap(),
            FailureOutcome::Failed
        );
        assert_eq!(
            s.record_failure(&id, "h", "e", 0).await.unwrap(),
            FailureOutcome::Failed
        );
        let task = s.get(&id).await.unwrap().unwrap();
        assert_eq!(task.retry_count, 2);
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some("e"));
    }

    #[tokio::test]
    async fn fail_terminal_requeues_changed_content() {
        let s = store().await;
        let id = s.insert(&NewTask::file("a.ts", "h1", 1), 3).await.unwrap();
        s.claim_pending(1, now_millis()).await.unwrap();
        s.update_content(&id, &NewTask::file("a.ts", "h2", 2))
            .await
            .unwrap();
        assert_eq!(
            s.fail_terminal(&id, "h1", "empty").await.unwrap(),
            FailureOutcome::Requeued
        );
        let task = s.get(&id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.hash, "h2");
        assert!(task.error_message.is_none());

        let claimed = s.claim_pending(1, now_millis()).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(
            s.fail_terminal(&id, "h2", "empty").await.unwrap(),
            FailureOutcome::Failed
        );
        let task = s.get(&id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some("empty"));

        assert!(matches!(
            s.fail_terminal("missing", "h", "e").await,
            Err(QueueError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn record_failure_requeues_changed_content() {
        let s = store().await;
        let id = s.insert(&NewTask::file("a.ts", "h1", 1), 1).await.unwrap();
        s.record_failure(&id, "h1", "e", 0).await.unwrap();
        s.claim_pending(1, now_millis()).await.unwrap();
        s.update_content(&id, &NewTask::file("a.ts", "h2", 2))
            .await
            .unwrap();
        assert_eq!(
            s.record_failure(&id, "h1", "e", i64::MAX).await.unwrap(),
            FailureOutcome::Requeued
        );
        let task = s.get(&id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
        assert_eq!(s.claim_pending(1, now_millis()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn complete_detects_hash_change() {
        let s = store().await;
        let id = s.insert(&NewTask::file("a.ts", "h1", 1), 3).await.unwrap();
        s.claim_pending(1, now_millis()).await.unwrap();
        s.update_content(&id, &NewTask::file("a.ts", "h2", 2))
            .await
            .unwrap();
        let output = TaskOutput {
            chunks: 2,
            relationships: 3,
        };
        assert_eq!(
            s.complete(&id, "h1", output).await.unwrap(),
            TaskStatus::Pending
        );
        s.claim_pending(1, now_millis()).await.unwrap();
        assert_eq!(
            s.complete(&id, "h2", output).await.unwrap(),
            TaskStatus::Completed
        );
        let task = s.get(&id).await.unwrap().unwrap();
        assert_eq!(task.progress, 100);
        assert_eq!(task.output, output);
        assert!(task.completed_at.is_some());
    }

    #[tokio::test]
    async fn stats_and_bulk_operations() {
        let s = store().await;
        let a = s.insert(&NewTask::file("a.ts", "h", 1), 0).await.unwrap();
        let b = s.insert(&NewTask::file("b.ts", "h", 1), 0).await.unwrap();
        s.claim_pending(2, now_millis()).await.unwrap();
        s.insert(&NewTask::file("c.ts", "h", 1), 0).await.unwrap();
        s.complete(&a, "h", TaskOutput::default()).await.unwrap();
        s.record_failure(&b, "h", "e", 0).await.unwrap();

        let stats = s.stats().await.unwrap();
        assert_eq!(
            stats,
            QueueStats {
                pending: 1,
                processing: 0,
                completed: 1,
                failed: 1,
                total: 3,
            }
        );

        assert_eq!(s.retry_failed().await.unwrap(), 1);
        assert_eq!(s.delete_by_status(TaskStatus::Completed).await.unwrap(), 1);
        assert_eq!(s.stats().await.unwrap().pending, 2);
        assert!(s.remove_path("c.ts").await.unwrap());
        assert!(!s.remove_path("c.ts").await.unwrap());
        assert_eq!(s.delete_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn recover_interrupted_resets_processing() {
        let s = store().await;
        s.insert(&NewTask::file("a.ts", "h", 1), 3).await.unwrap();
        s.claim_pending(1, now_millis()).await.unwrap();
        assert_eq!(s.recover_interrupted().await.unwrap(), 1);
        assert_eq!(s.stats().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn virtual_task_keeps_content() {
        let s = store().await;
        let id = s
            .insert(&NewTask::content("scratch.ts", "export const x = 1;"), 3)
            .await
            .unwrap();
        let task = s.get(&id).await.unwrap().unwrap();
        assert!(task.is_virtual());
        assert_eq!(task.content.as_deref(), Some("export const x = 1;"));
    }
}
