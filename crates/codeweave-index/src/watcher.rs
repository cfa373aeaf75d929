use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify_debouncer_mini::{DebouncedEvent, DebouncedEventKind, new_debouncer};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::languages::is_indexable;
use crate::resolver::is_package_metadata;
use crate::scanner::WorkspaceScanner;

const DEBOUNCE: Duration = Duration::from_secs(1);

/// Re-indexes changed files in the background while alive.
pub struct WorkspaceWatcher {
    _handle: tokio::task::JoinHandle<()>,
}

impl WorkspaceWatcher {
    /// # Errors
    ///
    /// Returns an error if the filesystem watcher cannot be initialized.
    pub fn start(root: &Path, scanner: Arc<WorkspaceScanner>) -> Result<Self> {
        let (notify_tx, mut notify_rx) = mpsc::channel::<Vec<PathBuf>>(64);

        let mut debouncer = new_debouncer(
            DEBOUNCE,
            move |events: std::result::Result<Vec<DebouncedEvent>, notify::Error>| {
                let events = match events {
                    Ok(events) => events,
                    Err(e) => {
                        tracing::warn!("workspace watcher error: {e}");
                        return;
                    }
                };

                let paths: HashSet<PathBuf> = events
                    .into_iter()
                    .filter(|e| e.kind == DebouncedEventKind::Any && is_relevant(&e.path))
                    .map(|e| e.path)
                    .collect();

                if !paths.is_empty() {
                    let _ = notify_tx.blocking_send(paths.into_iter().collect());
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(root, notify::RecursiveMode::Recursive)?;
        tracing::info!(root = %root.display(), "watching workspace");

        let handle = tokio::spawn(async move {
            let _debouncer = debouncer;
            while let Some(paths) = notify_rx.recv().await {
                match scanner.apply_changes(&paths).await {
                    Ok(report) => tracing::info!(
                        changed = paths.len(),
                        processed = report.processed,
                        deleted = report.deleted,
                        failed = report.failed.len(),
                        "applied workspace changes"
                    ),
                    Err(e) => tracing::warn!("applying workspace changes failed: {e}"),
                }
            }
        });

        Ok(Self { _handle: handle })
    }
}

/// Source files, plus manifests and lockfiles. Removed directories have no
/// extension and are passed through so their files get cleaned up.
fn is_relevant(path: &Path) -> bool {
    is_indexable(path)
        || is_package_metadata(path)
        || (path.extension().is_none() && !path.exists())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use codeweave_queue::{ProcessingQueue, QueueConfig, TaskStore};
    use codeweave_store::{GraphStore, SqliteGraphStore};

    use super::*;
    use crate::chunker::TreeSitterChunker;
    use crate::coordinator::IndexCoordinator;
    use crate::discovery::{Discovery, DiscoveryConfig};
    use crate::extractor::RelationshipExtractor;
    use crate::file_index::FileIndexStore;
    use crate::resolver::PackageResolver;
    use crate::worker::FileProcessor;

    async fn scanner(root: &Path) -> Arc<WorkspaceScanner> {
        let pool = codeweave_store::connect(":memory:").await.unwrap();
        let graph: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::new(pool.clone()));
        let extractor = Arc::new(RelationshipExtractor::new(Arc::new(PackageResolver::new(
            root,
        ))));
        let coordinator = Arc::new(IndexCoordinator::new(graph, extractor));
        let file_index = FileIndexStore::new(pool.clone());
        file_index.init().await.unwrap();
        let worker = Arc::new(FileProcessor::new(
            root,
            Arc::new(TreeSitterChunker::default()),
            Arc::clone(&coordinator),
            file_index.clone(),
            1024,
        ));
        let queue = ProcessingQueue::new(
            TaskStore::new(pool),
            worker,
            QueueConfig {
                tick: Duration::from_millis(20),
                ..QueueConfig::default()
            },
        );
        let discovery = Discovery::new(DiscoveryConfig::new(root)).unwrap();
        Arc::new(WorkspaceScanner::new(discovery, file_index, queue, coordinator))
    }

    #[tokio::test]
    async fn start_with_valid_directory() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = WorkspaceWatcher::start(dir.path(), scanner(dir.path()).await);
        assert!(watcher.is_ok());
    }

    #[tokio::test]
    async fn start_with_nonexistent_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = WorkspaceWatcher::start(
            Path::new("/nonexistent/path/xyz"),
            scanner(dir.path()).await,
        );
        assert!(result.is_err());
    }

    #[test]
    fn relevant_paths() {
        assert!(is_relevant(Path::new("/repo/src/a.ts")));
        assert!(is_relevant(Path::new("/repo/yarn.lock")));
        assert!(is_relevant(Path::new("/repo/removed-dir")));
        assert!(!is_relevant(Path::new("/repo/README.md")));
    }
}
