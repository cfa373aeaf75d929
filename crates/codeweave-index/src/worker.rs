//! Per-file pipeline run by the processing queue.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use codeweave_queue::{BoxFuture, ProgressReporter, QueueError, QueueTask, TaskOutput, TaskWorker};
use codeweave_store::DocumentChunk;

use crate::chunker::ChunkParser;
use crate::coordinator::IndexCoordinator;
use crate::discovery::hash_bytes;
use crate::error::{IndexError, Result};
use crate::file_index::FileIndexStore;

/// Reads, validates, hashes and chunks a file, then hands it to the coordinator.
pub struct FileProcessor {
    root: PathBuf,
    parser: Arc<dyn ChunkParser>,
    coordinator: Arc<IndexCoordinator>,
    file_index: FileIndexStore,
    max_file_size: u64,
}

impl FileProcessor {
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        parser: Arc<dyn ChunkParser>,
        coordinator: Arc<IndexCoordinator>,
        file_index: FileIndexStore,
        max_file_size: u64,
    ) -> Self {
        Self {
            root: root.into(),
            parser,
            coordinator,
            file_index,
            max_file_size,
        }
    }

    async fn run(&self, task: &QueueTask, progress: &ProgressReporter) -> Result<TaskOutput> {
        progress.report("reading", 5).await;
        let bytes = match &task.content {
            Some(content) => content.clone().into_bytes(),
            None => tokio::fs::read(self.root.join(&task.path)).await?,
        };

        progress.report("validating", 15).await;
        if bytes.is_empty() {
            return Err(IndexError::Processing(format!("{}: empty file", task.path)));
        }
        if u64::try_from(bytes.len())? > self.max_file_size {
            return Err(IndexError::Processing(format!(
                "{}: {} bytes exceeds the {} byte limit",
                task.path,
                bytes.len(),
                self.max_file_size
            )));
        }
        if !self.parser.is_supported(&task.path) {
            return Err(IndexError::UnsupportedLanguage(task.path.clone()));
        }

        progress.report("hashing", 25).await;
        let hash = hash_bytes(&bytes);
        if !task.hash.is_empty() && task.hash != hash {
            tracing::debug!(path = %task.path, "content changed since enqueue");
        }
        let content = String::from_utf8(bytes)
            .map_err(|_| IndexError::Processing(format!("{}: not valid UTF-8", task.path)))?;

        progress.report("parsing", 40).await;
        let chunks = {
            let parser = Arc::clone(&self.parser);
            let (path, source) = (task.path.clone(), content.clone());
            tokio::task::spawn_blocking(move || parser.parse_file(&path, &source)).await??
        };

        progress.report("summarizing", 55).await;
        tracing::debug!(path = %task.path, chunks = chunks.len(), kinds = ?summarize(&chunks), "parsed file");

        progress.report("indexing", 70).await;
        let outcome = self
            .coordinator
            .index_file(&task.path, &content, &hash, chunks)
            .await?;

        if outcome.chunks > 0 && !task.is_virtual() {
            self.file_index.mark_indexed(&task.path, &hash).await?;
        }
        progress.report("done", 100).await;

        Ok(TaskOutput {
            chunks: u64::try_from(outcome.chunks)?,
            relationships: u64::try_from(outcome.relationships)?,
        })
    }
}

/// Chunk counts per type.
fn summarize(chunks: &[DocumentChunk]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for chunk in chunks {
        *counts.entry(chunk.metadata.chunk_type.as_str()).or_default() += 1;
    }
    counts
}

impl TaskWorker for FileProcessor {
    fn process<'a>(
        &'a self,
        task: &'a QueueTask,
        progress: ProgressReporter,
    ) -> BoxFuture<'a, std::result::Result<TaskOutput, QueueError>> {
        Box::pin(async move {
            self.run(task, &progress)
                .await
                .map_err(|e| QueueError::TaskFailed(e.to_string()))
        })
    }
}
