//! Full-workspace passes: discover, diff, clean up, enqueue, then link.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use codeweave_queue::{NewTask, ProcessingQueue, TaskStatus};

use crate::coordinator::IndexCoordinator;
use crate::discovery::{Discovery, diff};
use crate::error::Result;
use crate::file_index::{FileIndexEntry, FileIndexStore};

/// Summary of a scan or a batch of watcher changes.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub files_scanned: usize,
    pub new: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub enqueued: usize,
    pub processed: usize,
    pub failed: Vec<String>,
    /// Edges written by the cross-file pass.
    pub links: usize,
    /// Per-file problems that did not stop the scan.
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// Drives indexing of a workspace through the processing queue.
///
/// The queue's scheduling loop must be running (see
/// [`ProcessingQueue::spawn`]); scans wait for it to drain before linking.
pub struct WorkspaceScanner {
    discovery: Discovery,
    file_index: FileIndexStore,
    queue: ProcessingQueue,
    coordinator: Arc<IndexCoordinator>,
    /// Serializes scans so delete and re-enqueue of a path never interleave.
    running: tokio::sync::Mutex<()>,
}

impl WorkspaceScanner {
    #[must_use]
    pub fn new(
        discovery: Discovery,
        file_index: FileIndexStore,
        queue: ProcessingQueue,
        coordinator: Arc<IndexCoordinator>,
    ) -> Self {
        Self {
            discovery,
            file_index,
            queue,
            coordinator,
            running: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    #[must_use]
    pub fn queue(&self) -> &ProcessingQueue {
        &self.queue
    }

    #[must_use]
    pub fn file_index(&self) -> &FileIndexStore {
        &self.file_index
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<IndexCoordinator> {
        &self.coordinator
    }

    /// Index everything that changed since the last scan.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace root is unusable or the file index
    /// or queue store fails. Per-file failures land in the report.
    pub async fn scan(&self) -> Result<ScanReport> {
        let _guard = self.running.lock().await;
        let start = Instant::now();
        let mut report = ScanReport::default();

        let discovery = self.discovery.clone();
        let discovered = tokio::task::spawn_blocking(move || discovery.discover()).await??;
        report.files_scanned = discovered.entries.len();
        report.errors = discovered.errors;
        tracing::info!(
            root = %self.discovery.root().display(),
            files = report.files_scanned,
            "scan started"
        );

        let known = self.file_index.snapshot().await?;
        let changes = diff(&discovered.entries, &known);
        report.new = changes.new.len();
        report.modified = changes.modified.len();
        report.unchanged = changes.unchanged.len();
        report.deleted = changes.deleted.len();

        for path in &changes.deleted {
            self.remove(path, &mut report).await?;
        }
        for path in &changes.withdrawn {
            self.withdraw(path, &mut report).await?;
        }
        for entry in &discovered.entries {
            self.file_index.upsert(entry).await?;
        }

        let dirty: Vec<&FileIndexEntry> = changes.dirty().collect();
        for entry in &dirty {
            if self.enqueue(entry).await? {
                report.enqueued += 1;
            }
        }

        self.settle(
            dirty.iter().map(|e| e.path.as_str()),
            changes.has_changes(),
            &mut report,
        )
        .await?;

        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tracing::info!(
            new = report.new,
            modified = report.modified,
            deleted = report.deleted,
            processed = report.processed,
            failed = report.failed.len(),
            links = report.links,
            duration_ms = report.duration_ms,
            "scan finished"
        );
        Ok(report)
    }

    /// Apply filesystem changes reported by the watcher.
    ///
    /// Existing files are re-inspected and enqueued when their content
    /// changed; vanished paths (and everything indexed under a vanished
    /// directory) are cleaned up. Manifest and lockfile changes drop the
    /// resolver's cached copies.
    ///
    /// # Errors
    ///
    /// Returns an error if the file index or queue store fails.
    pub async fn apply_changes(&self, paths: &[PathBuf]) -> Result<ScanReport> {
        let _guard = self.running.lock().await;
        let start = Instant::now();
        let mut report = ScanReport::default();
        let mut enqueued_paths = Vec::new();
        let mut changed = false;

        for abs in paths {
            if self.coordinator.extractor().resolver().invalidate(abs) {
                tracing::info!(path = %abs.display(), "package metadata changed");
            }
            let Some(rel) = self.discovery.relative_path(abs) else {
                continue;
            };
            if self.discovery.is_ignored(&rel) {
                continue;
            }

            if !abs.exists() {
                for entry in self.file_index.list().await? {
                    if entry.path == rel || entry.path.starts_with(&format!("{rel}/")) {
                        self.remove(&entry.path, &mut report).await?;
                        report.deleted += 1;
                        changed = true;
                    }
                }
                continue;
            }

            let entry = match self.discovery.inspect(abs) {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(path = %rel, "{e}");
                    report.errors.push(e.to_string());
                    continue;
                }
            };
            report.files_scanned += 1;

            let previous = self.file_index.get(&rel).await?;
            self.file_index.upsert(&entry).await?;
            let Some(current) = self.file_index.get(&rel).await? else {
                continue;
            };

            if !current.available {
                if current.was_indexed() {
                    self.withdraw(&rel, &mut report).await?;
                    changed = true;
                }
                continue;
            }
            if current.is_dirty() {
                if previous.is_some_and(|p| p.was_indexed()) {
                    report.modified += 1;
                } else {
                    report.new += 1;
                }
                if self.enqueue(&current).await? {
                    report.enqueued += 1;
                }
                enqueued_paths.push(rel);
                changed = true;
            } else {
                report.unchanged += 1;
            }
        }

        self.settle(enqueued_paths.iter().map(String::as_str), changed, &mut report)
            .await?;
        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        Ok(report)
    }

    /// Returns whether the file will be processed.
    async fn enqueue(&self, entry: &FileIndexEntry) -> Result<bool> {
        // A completed task at the same hash would be left alone; the file
        // index says it is not indexed, so start over.
        if let Some(task) = self.queue.get_by_path(&entry.path).await?
            && task.status == TaskStatus::Completed
            && task.hash == entry.hash
        {
            self.queue.remove_path(&entry.path).await?;
        }
        let enqueued = self
            .queue
            .enqueue_task(NewTask::file(&entry.path, &entry.hash, entry.size))
            .await?;
        Ok(enqueued.scheduled)
    }

    /// Graph, vector, queue and file-index cleanup for a path gone from disk.
    async fn remove(&self, path: &str, report: &mut ScanReport) -> Result<()> {
        if let Err(e) = self.coordinator.delete_file(path).await {
            tracing::warn!(path, "cleanup failed: {e}");
            report.errors.push(format!("cleanup {path}: {e}"));
            self.file_index.mark_deleted(path).await?;
            return Ok(());
        }
        self.queue.remove_path(path).await?;
        self.file_index.remove(path).await?;
        tracing::debug!(path, "removed deleted file");
        Ok(())
    }

    /// Drop the indexed state of a file that is still on disk but no longer indexable.
    async fn withdraw(&self, path: &str, report: &mut ScanReport) -> Result<()> {
        if let Err(e) = self.coordinator.delete_file(path).await {
            tracing::warn!(path, "cleanup failed: {e}");
            report.errors.push(format!("cleanup {path}: {e}"));
            return Ok(());
        }
        self.queue.remove_path(path).await?;
        self.file_index.clear_indexed(path).await?;
        Ok(())
    }

    /// Wait for the queue, collect per-file outcomes and run the cross-file pass.
    async fn settle<'p>(
        &self,
        dirty: impl Iterator<Item = &'p str>,
        changed: bool,
        report: &mut ScanReport,
    ) -> Result<()> {
        let dirty: Vec<&str> = dirty.collect();
        if !dirty.is_empty() {
            self.queue.wait_idle().await?;
        }
        for path in dirty {
            let Some(task) = self.queue.get_by_path(path).await? else {
                continue;
            };
            match task.status {
                TaskStatus::Completed => {
                    // Files without chunks are never stamped by the worker.
                    if task.output.chunks == 0 {
                        self.file_index.mark_indexed(path, &task.hash).await?;
                    }
                    report.processed += 1;
                }
                TaskStatus::Failed => {
                    self.file_index.mark_failed(path, &task.hash).await?;
                    let error = task.error_message.unwrap_or_default();
                    report.failed.push(format!("{path}: {error}"));
                }
                TaskStatus::Pending | TaskStatus::Processing => {}
            }
        }

        if changed {
            let indexed = self.indexed_files().await?;
            match self.coordinator.link_files(&indexed).await {
                Ok(links) => report.links = links,
                Err(e) => {
                    tracing::warn!("cross-file pass failed: {e}");
                    report.errors.push(format!("cross-file pass: {e}"));
                }
            }
        }
        Ok(())
    }

    /// Path → hash for every file whose current content is indexed.
    async fn indexed_files(&self) -> Result<BTreeMap<String, String>> {
        Ok(self
            .file_index
            .list()
            .await?
            .into_iter()
            .filter(FileIndexEntry::is_current)
            .map(|e| (e.path, e.hash))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use codeweave_queue::{QueueConfig, TaskStore};
    use codeweave_store::{GraphStore, RelationshipType, SqliteGraphStore};

    use super::*;
    use crate::chunker::TreeSitterChunker;
    use crate::discovery::DiscoveryConfig;
    use crate::extractor::RelationshipExtractor;
    use crate::resolver::PackageResolver;
    use crate::worker::FileProcessor;

    async fn scanner(root: &Path) -> WorkspaceScanner {
        let pool = codeweave_store::connect(":memory:").await.unwrap();
        let graph: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::new(pool.clone()));
        let extractor = Arc::new(RelationshipExtractor::new(Arc::new(PackageResolver::new(
            root,
        ))));
        let coordinator = Arc::new(IndexCoordinator::new(graph, extractor));
        coordinator.initialize().await.unwrap();
        let file_index = FileIndexStore::new(pool.clone());
        file_index.init().await.unwrap();
        let worker = Arc::new(FileProcessor::new(
            root,
            Arc::new(TreeSitterChunker::default()),
            Arc::clone(&coordinator),
            file_index.clone(),
            1024 * 1024,
        ));
        let queue = ProcessingQueue::new(
            TaskStore::new(pool),
            worker,
            QueueConfig {
                tick: Duration::from_millis(20),
                retry_delay: Duration::from_millis(10),
                ..QueueConfig::default()
            },
        );
        queue.init().await.unwrap();
        let _ = queue.spawn();
        let discovery = Discovery::new(DiscoveryConfig::new(root)).unwrap();
        WorkspaceScanner::new(discovery, file_index, queue, coordinator)
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn rescan_of_unchanged_workspace_enqueues_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/a.ts", "export const a = () => 1;\n");
        let s = scanner(dir.path()).await;

        let first = s.scan().await.unwrap();
        assert_eq!(first.enqueued, 1);
        assert_eq!(first.processed, 1);

        let second = s.scan().await.unwrap();
        assert_eq!(second.enqueued, 0);
        assert_eq!(second.unchanged, 1);
    }

    #[tokio::test]
    async fn whitespace_only_file_is_never_enqueued() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/a.ts", "export const a = () => 1;\n");
        write(dir.path(), "src/blank.ts", "\n\n   \n");
        let s = scanner(dir.path()).await;

        let first = s.scan().await.unwrap();
        assert_eq!(first.enqueued, 1);
        assert!(first.failed.is_empty(), "{:?}", first.failed);
        for _ in 0..2 {
            let again = s.scan().await.unwrap();
            assert_eq!(again.enqueued, 0);
            assert_eq!(again.new, 0);
            assert!(again.failed.is_empty(), "{:?}", again.failed);
        }
        assert!(s.queue().get_by_path("src/blank.ts").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_file_waits_for_an_edit() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/a.ts", "export const a = () => 1;\n");
        std::fs::write(dir.path().join("src/bad.ts"), [0xff, 0xfe, b'x', b'\n']).unwrap();
        let s = scanner(dir.path()).await;

        let first = s.scan().await.unwrap();
        assert_eq!(first.failed.len(), 1, "{:?}", first.failed);
        assert!(first.failed[0].starts_with("src/bad.ts"));
        assert!(s.file_index().get("src/bad.ts").await.unwrap().unwrap().has_failed());

        let again = s.scan().await.unwrap();
        assert_eq!(again.enqueued, 0);
        assert_eq!(again.unchanged, 2);
        assert!(again.failed.is_empty());
        assert_eq!(again.links, 0);

        write(dir.path(), "src/bad.ts", "export const bad = () => 2;\n");
        let fixed = s.scan().await.unwrap();
        assert_eq!(fixed.enqueued, 1);
        assert_eq!(fixed.processed, 1);
        let entry = s.file_index().get("src/bad.ts").await.unwrap().unwrap();
        assert!(entry.is_current());
        assert!(!entry.has_failed());
    }

    #[tokio::test]
    async fn cleared_index_marks_force_reprocessing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/a.ts", "export const a = () => 1;\n");
        let s = scanner(dir.path()).await;
        s.scan().await.unwrap();

        assert_eq!(s.file_index().clear_all_indexed().await.unwrap(), 1);
        let again = s.scan().await.unwrap();
        assert_eq!(again.enqueued, 1);
        assert_eq!(again.processed, 1);
        assert!(!s.file_index().get("src/a.ts").await.unwrap().unwrap().is_dirty());
    }

    #[tokio::test]
    async fn missing_root_aborts_scan() {
        let dir = tempfile::tempdir().unwrap();
        let s = scanner(dir.path()).await;
        drop(dir);
        assert!(s.scan().await.is_err());
    }

    #[tokio::test]
    async fn apply_changes_reindexes_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/util.ts", "export function one() {\n  return 1;\n}\n");
        let s = scanner(root).await;
        s.scan().await.unwrap();

        write(root, "src/a.ts", "import { one } from './util';\nexport const two = one() + 1;\n");
        let report = s.apply_changes(&[root.join("src/a.ts")]).await.unwrap();
        assert_eq!(report.new, 1);
        assert_eq!(report.processed, 1);
        let edges = s.coordinator().graph().relationships_for("src/a.ts").await.unwrap();
        assert!(edges.iter().any(|e| e.kind == RelationshipType::Imports));

        std::fs::remove_file(root.join("src/a.ts")).unwrap();
        let report = s.apply_changes(&[root.join("src/a.ts")]).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert!(
            s.coordinator()
                .graph()
                .relationships_for("src/a.ts")
                .await
                .unwrap()
                .is_empty()
        );
        assert!(s.queue().get_by_path("src/a.ts").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ignored_watcher_paths_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let s = scanner(root).await;
        write(root, "node_modules/x/index.js", "module.exports = 1;\n");
        let report = s
            .apply_changes(&[root.join("node_modules/x/index.js")])
            .await
            .unwrap();
        assert_eq!(report.files_scanned, 0);
        assert_eq!(report.enqueued, 0);
    }
}
