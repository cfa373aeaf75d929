use tokio::sync::broadcast;

use crate::store::TaskStore;
use crate::task::TaskOutput;

/// Lifecycle notifications published by the queue.
///
/// Delivered over a broadcast channel: a receiver that falls behind loses
/// the oldest events instead of stalling the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    Started {
        task_id: String,
        path: String,
    },
    Progress {
        task_id: String,
        step: String,
        percent: u8,
    },
    Completed {
        task_id: String,
        path: String,
        output: TaskOutput,
    },
    Retrying {
        task_id: String,
        path: String,
        attempt: u32,
        error: String,
    },
    Failed {
        task_id: String,
        path: String,
        error: String,
    },
    QueueEmpty,
    Paused,
    Resumed,
}

/// Handed to a worker so it can publish step/percent updates for its task.
#[derive(Clone)]
pub struct ProgressReporter {
    store: TaskStore,
    events: broadcast::Sender<QueueEvent>,
    task_id: String,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("task_id", &self.task_id)
            .finish_non_exhaustive()
    }
}

impl ProgressReporter {
    #[must_use]
    pub fn new(
        store: TaskStore,
        events: broadcast::Sender<QueueEvent>,
        task_id: String,
    ) -> Self {
        Self {
            store,
            events,
            task_id,
        }
    }

    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Persist and publish progress. Failures are logged, never returned.
    pub async fn report(&self, step: &str, percent: u8) {
        let percent = percent.min(100);
        if let Err(e) = self.store.set_progress(&self.task_id, step, percent).await {
            tracing::warn!(task_id = %self.task_id, "failed to persist progress: {e}");
        }
        let _ = self.events.send(QueueEvent::Progress {
            task_id: self.task_id.clone(),
            step: step.to_owned(),
            percent,
        });
    }
}
