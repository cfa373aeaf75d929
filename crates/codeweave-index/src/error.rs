use std::num::TryFromIntError;

/// Failures of the indexing pipeline.
///
/// `Discovery`, `Parse` and `Resolution` are per-file: callers record them
/// and move on to the next file.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("discovery failed: {0}")]
    Discovery(String),

    #[error("parse failed: {0}")]
    Parse(String),

    /// A lockfile or package manifest is unreadable.
    #[error("resolution failed: {0}")]
    Resolution(String),

    #[error("processing failed: {0}")]
    Processing(String),

    /// The path has no grammar in this build.
    #[error("no grammar for {0}")]
    UnsupportedLanguage(String),

    #[error("file index row is corrupt: {0}")]
    CorruptRow(String),

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error(transparent)]
    Store(#[from] codeweave_store::StoreError),

    #[error(transparent)]
    Queue(#[from] codeweave_queue::QueueError),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("watcher: {0}")]
    Watcher(#[from] notify::Error),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("background task: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("value out of range: {0}")]
    IntConversion(#[from] TryFromIntError),
}

pub type Result<T> = std::result::Result<T, IndexError>;
