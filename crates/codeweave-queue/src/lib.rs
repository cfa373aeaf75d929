//! Bounded-concurrency, retryable processing queue with `SQLite`-backed task
//! metadata that survives restarts.

mod error;
mod events;
mod queue;
mod store;
mod task;

pub use error::{QueueError, Result};
pub use events::{ProgressReporter, QueueEvent};
pub use queue::{ProcessingQueue, QueueConfig};
pub use store::{FailureOutcome, QueueStats, TaskStore};
pub use task::{
    BoxFuture, EmptyOutputPolicy, Enqueued, NewTask, QueueTask, TaskOutput, TaskStatus, TaskWorker,
};
