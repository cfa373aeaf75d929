use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("task execution failed: {0}")]
    TaskFailed(String),
    #[error("corrupt task record: {0}")]
    Corrupt(String),
    #[error("queue stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, QueueError>;
