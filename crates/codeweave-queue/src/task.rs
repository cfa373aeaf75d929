use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::events::ProgressReporter;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted record of one file (or virtual file) awaiting processing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueTask {
    pub id: String,
    pub path: String,
    pub name: String,
    pub size: u64,
    pub hash: String,
    /// Embedded bytes for virtual files; `None` means read `path` from disk.
    pub content: Option<String>,
    pub status: TaskStatus,
    pub progress: u8,
    pub retry_count: u32,
    pub max_retries: u32,
    pub current_step: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    /// Earliest time (unix millis) a pending task may be claimed.
    pub available_at: i64,
    pub error_message: Option<String>,
    pub output: TaskOutput,
}

impl QueueTask {
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.content.is_some()
    }
}

/// Result of [`crate::ProcessingQueue::enqueue_task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enqueued {
    pub id: String,
    /// False when an existing completed or failed task was left as it was.
    pub scheduled: bool,
}

/// Input to [`crate::ProcessingQueue::enqueue_task`].
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub path: String,
    pub size: u64,
    pub hash: String,
    pub content: Option<String>,
}

impl NewTask {
    #[must_use]
    pub fn file(path: impl Into<String>, hash: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            hash: hash.into(),
            content: None,
        }
    }

    /// A virtual file whose bytes travel inside the task record.
    #[must_use]
    pub fn content(name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            path: name.into(),
            size: content.len() as u64,
            hash: blake3::hash(content.as_bytes()).to_hex().to_string(),
            content: Some(content),
        }
    }

    pub(crate) fn display_name(&self) -> String {
        self.path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.path)
            .to_owned()
    }
}

/// Units produced by a successful worker run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskOutput {
    pub chunks: u64,
    pub relationships: u64,
}

impl TaskOutput {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks == 0
    }
}

/// What the queue does when a worker succeeds but produces no chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyOutputPolicy {
    /// Mark the task failed without consuming a retry.
    #[default]
    Fail,
    /// Treat it as an ordinary error and retry.
    Retry,
    /// Accept it as completed.
    Succeed,
}

/// Per-file pipeline run by the queue's workers.
pub trait TaskWorker: Send + Sync {
    fn process<'a>(
        &'a self,
        task: &'a QueueTask,
        progress: ProgressReporter,
    ) -> BoxFuture<'a, Result<TaskOutput, QueueError>>;
}
