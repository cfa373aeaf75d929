use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, broadcast, watch};

use crate::error::Result;
use crate::events::{ProgressReporter, QueueEvent};
use crate::store::{FailureOutcome, QueueStats, TaskStore, now_millis};
use crate::task::{EmptyOutputPolicy, Enqueued, NewTask, QueueTask, TaskStatus, TaskWorker};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub tick: Duration,
    pub empty_output: EmptyOutputPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            tick: Duration::from_secs(1),
            empty_output: EmptyOutputPolicy::Fail,
        }
    }
}

struct Inner {
    store: TaskStore,
    worker: Arc<dyn TaskWorker>,
    config: QueueConfig,
    active: AtomicUsize,
    paused: AtomicBool,
    busy: AtomicBool,
    wake: Notify,
    idle: Notify,
    events: broadcast::Sender<QueueEvent>,
    shutdown: watch::Sender<bool>,
}

/// Bounded-concurrency task queue over a [`TaskStore`].
///
/// Cloning yields another handle to the same queue. [`ProcessingQueue::run`]
/// drives scheduling; every other method may be called from any task.
#[derive(Clone)]
pub struct ProcessingQueue {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ProcessingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingQueue")
            .field("config", &self.inner.config)
            .field("active", &self.inner.active.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ProcessingQueue {
    #[must_use]
    pub fn new(store: TaskStore, worker: Arc<dyn TaskWorker>, mut config: QueueConfig) -> Self {
        config.concurrency = config.concurrency.max(1);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                store,
                worker,
                config,
                active: AtomicUsize::new(0),
                paused: AtomicBool::new(false),
                busy: AtomicBool::new(false),
                wake: Notify::new(),
                idle: Notify::new(),
                events,
                shutdown,
            }),
        }
    }

    /// Create the task table and requeue tasks a crashed run left in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be initialized.
    pub async fn init(&self) -> Result<()> {
        self.inner.store.init().await?;
        self.recover_interrupted().await?;
        Ok(())
    }

    #[must_use]
    pub fn store(&self) -> &TaskStore {
        &self.inner.store
    }

    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Tasks currently held by a worker.
    #[must_use]
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Enqueue a file by path and content hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn enqueue(&self, path: &str, hash: &str) -> Result<String> {
        Ok(self.enqueue_task(NewTask::file(path, hash, 0)).await?.id)
    }

    /// Enqueue a virtual file whose content travels with the task.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn enqueue_content(&self, name: &str, content: &str) -> Result<String> {
        Ok(self.enqueue_task(NewTask::content(name, content)).await?.id)
    }

    /// Idempotent enqueue keyed by path.
    ///
    /// - no task for the path: insert a pending task;
    /// - different hash: reset to pending with a fresh retry budget (or, if
    ///   a worker holds it, record the new content so completion requeues it);
    /// - same hash, failed under its retry budget: reset to pending;
    /// - otherwise the existing task is left alone.
    ///
    /// `scheduled` tells whether the task will run (again).
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn enqueue_task(&self, task: NewTask) -> Result<Enqueued> {
        let store = &self.inner.store;
        let Some(existing) = store.get_by_path(&task.path).await? else {
            let id = store.insert(&task, self.inner.config.max_retries).await?;
            tracing::debug!(path = %task.path, task_id = %id, "enqueued");
            self.inner.wake.notify_one();
            return Ok(Enqueued { id, scheduled: true });
        };

        if existing.hash != task.hash {
            if existing.status == TaskStatus::Processing {
                store.update_content(&existing.id, &task).await?;
            } else {
                store.reset(&existing.id, &task).await?;
                self.inner.wake.notify_one();
            }
            tracing::debug!(path = %task.path, task_id = %existing.id, "re-enqueued changed file");
            return Ok(Enqueued {
                id: existing.id,
                scheduled: true,
            });
        }

        let scheduled = match existing.status {
            TaskStatus::Pending | TaskStatus::Processing => true,
            TaskStatus::Failed if existing.retry_count < existing.max_retries => {
                store.reset(&existing.id, &task).await?;
                self.inner.wake.notify_one();
                tracing::debug!(path = %task.path, task_id = %existing.id, "reset failed task");
                true
            }
            TaskStatus::Failed | TaskStatus::Completed => false,
        };
        Ok(Enqueued {
            id: existing.id,
            scheduled,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn get(&self, id: &str) -> Result<Option<QueueTask>> {
        self.inner.store.get(id).await
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn get_by_path(&self, path: &str) -> Result<Option<QueueTask>> {
        self.inner.store.get_by_path(path).await
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn remove_path(&self, path: &str) -> Result<bool> {
        self.inner.store.remove_path(path).await
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn stats(&self) -> Result<QueueStats> {
        self.inner.store.stats().await
    }

    /// Stop pulling new tasks. In-flight tasks run to completion.
    pub fn pause(&self) {
        if !self.inner.paused.swap(true, Ordering::SeqCst) {
            tracing::info!("queue paused");
            let _ = self.inner.events.send(QueueEvent::Paused);
        }
    }

    pub fn resume(&self) {
        if self.inner.paused.swap(false, Ordering::SeqCst) {
            tracing::info!("queue resumed");
            let _ = self.inner.events.send(QueueEvent::Resumed);
            self.inner.wake.notify_one();
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Halt the scheduling loop. In-flight tasks still finish.
    pub fn stop(&self) {
        self.inner.shutdown.send_replace(true);
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn retry_failed(&self) -> Result<u64> {
        let n = self.inner.store.retry_failed().await?;
        if n > 0 {
            tracing::info!(count = n, "reset failed tasks");
            self.inner.wake.notify_one();
        }
        Ok(n)
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn clear_completed(&self) -> Result<u64> {
        self.inner.store.delete_by_status(TaskStatus::Completed).await
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn clear_all(&self) -> Result<u64> {
        self.inner.store.delete_all().await
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn recover_interrupted(&self) -> Result<u64> {
        let n = self.inner.store.recover_interrupted().await?;
        if n > 0 {
            tracing::info!(count = n, "recovered interrupted tasks");
            self.inner.wake.notify_one();
        }
        Ok(n)
    }

    /// Resolve once no task is pending or processing.
    ///
    /// Never resolves while the queue is paused or stopped with work left.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn wait_idle(&self) -> Result<()> {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle().await? {
                return Ok(());
            }
            tokio::select! {
                () = notified => {}
                () = tokio::time::sleep(self.inner.config.tick) => {}
            }
        }
    }

    async fn is_idle(&self) -> Result<bool> {
        if self.active() > 0 {
            return Ok(false);
        }
        let stats = self.inner.store.stats().await?;
        Ok(stats.pending == 0 && stats.processing == 0)
    }

    /// Spawn [`ProcessingQueue::run`] on the current runtime.
    #[must_use]
    pub fn spawn(&self) -> tokio::task::JoinHandle<()> {
        let queue = self.clone();
        tokio::spawn(async move { queue.run().await })
    }

    /// Scheduling loop: pull on every tick and whenever woken, until stopped.
    pub async fn run(&self) {
        let mut shutdown_rx = self.inner.shutdown.subscribe();
        let mut interval = tokio::time::interval(self.inner.config.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(
            concurrency = self.inner.config.concurrency,
            max_retries = self.inner.config.max_retries,
            "queue started"
        );
        loop {
            if *shutdown_rx.borrow_and_update() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {}
                () = self.inner.wake.notified() => {}
                res = shutdown_rx.changed() => {
                    if res.is_err() {
                        break;
                    }
                    continue;
                }
            }
            if let Err(e) = self.pull().await {
                tracing::warn!("queue pull failed: {e}");
            }
        }
        tracing::info!("queue shutting down");
    }

    async fn pull(&self) -> Result<()> {
        if self.is_paused() {
            return Ok(());
        }
        let free = self
            .inner
            .config
            .concurrency
            .saturating_sub(self.active());
        if free == 0 {
            return Ok(());
        }

        let tasks = self.inner.store.claim_pending(free, now_millis()).await?;
        if tasks.is_empty() {
            if self.is_idle().await? {
                if self.inner.busy.swap(false, Ordering::SeqCst) {
                    tracing::info!("queue drained");
                    let _ = self.inner.events.send(QueueEvent::QueueEmpty);
                }
                self.inner.idle.notify_waiters();
            }
            return Ok(());
        }

        self.inner.busy.store(true, Ordering::SeqCst);
        for task in tasks {
            self.inner.active.fetch_add(1, Ordering::SeqCst);
            let queue = self.clone();
            tokio::spawn(async move {
                queue.execute(task).await;
                queue.inner.active.fetch_sub(1, Ordering::SeqCst);
                queue.inner.wake.notify_one();
            });
        }
        Ok(())
    }

    async fn execute(&self, task: QueueTask) {
        let inner = &self.inner;
        let attempt = task.retry_count + 1;
        tracing::debug!(task_id = %task.id, path = %task.path, attempt, "processing");
        let _ = inner.events.send(QueueEvent::Started {
            task_id: task.id.clone(),
            path: task.path.clone(),
        });

        let reporter = ProgressReporter::new(inner.store.clone(), inner.events.clone(), task.id.clone());
        let result = inner.worker.process(&task, reporter).await;

        let outcome = match result {
            Ok(output) if output.is_empty() => match inner.config.empty_output {
                EmptyOutputPolicy::Succeed => self.finish(&task, output).await,
                EmptyOutputPolicy::Retry => self.record_error(&task, "worker produced no output").await,
                EmptyOutputPolicy::Fail => self.fail(&task, "worker produced no output").await,
            },
            Ok(output) => self.finish(&task, output).await,
            Err(e) => self.record_error(&task, &e.to_string()).await,
        };

        if let Err(e) = outcome {
            tracing::warn!(task_id = %task.id, path = %task.path, "failed to record task outcome: {e}");
        }
    }

    async fn finish(&self, task: &QueueTask, output: crate::task::TaskOutput) -> Result<()> {
        let status = self.inner.store.complete(&task.id, &task.hash, output).await?;
        if status == TaskStatus::Pending {
            tracing::debug!(task_id = %task.id, path = %task.path, "content changed while processing, requeued");
            return Ok(());
        }
        tracing::debug!(
            task_id = %task.id,
            path = %task.path,
            chunks = output.chunks,
            relationships = output.relationships,
            "completed"
        );
        let _ = self.inner.events.send(QueueEvent::Completed {
            task_id: task.id.clone(),
            path: task.path.clone(),
            output,
        });
        Ok(())
    }

    async fn fail(&self, task: &QueueTask, error: &str) -> Result<()> {
        let outcome = self.inner.store.fail_terminal(&task.id, &task.hash, error).await?;
        self.report_failure(task, outcome, error);
        Ok(())
    }

    async fn record_error(&self, task: &QueueTask, error: &str) -> Result<()> {
        let delay_ms = i64::try_from(self.inner.config.retry_delay.as_millis()).unwrap_or(i64::MAX);
        let outcome = self
            .inner
            .store
            .record_failure(&task.id, &task.hash, error, now_millis().saturating_add(delay_ms))
            .await?;
        self.report_failure(task, outcome, error);
        Ok(())
    }

    fn report_failure(&self, task: &QueueTask, outcome: FailureOutcome, error: &str) {
        match outcome {
            FailureOutcome::Retrying { attempt } => {
                tracing::warn!(task_id = %task.id, path = %task.path, attempt, "task failed, retrying: {error}");
                let _ = self.inner.events.send(QueueEvent::Retrying {
                    task_id: task.id.clone(),
                    path: task.path.clone(),
                    attempt,
                    error: error.to_owned(),
                });
                let queue = self.clone();
                let delay = self.inner.config.retry_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    queue.inner.wake.notify_one();
                });
            }
            FailureOutcome::Failed => {
                tracing::warn!(task_id = %task.id, path = %task.path, "task failed permanently: {error}");
                let _ = self.inner.events.send(QueueEvent::Failed {
                    task_id: task.id.clone(),
                    path: task.path.clone(),
                    error: error.to_owned(),
                });
            }
            FailureOutcome::Requeued => {
                tracing::debug!(task_id = %task.id, path = %task.path, "content changed while processing, requeued");
                self.inner.wake.notify_one();
            }
        }
    }
}
