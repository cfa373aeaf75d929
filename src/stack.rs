use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use codeweave_index::{
    Discovery, FileIndexStore, FileProcessor, IndexCoordinator, PackageResolver,
    RelationshipExtractor, TreeSitterChunker, WorkspaceScanner,
};
use codeweave_queue::{ProcessingQueue, TaskStore};
use codeweave_store::{
    ChunkVectorStore, EmbeddingProvider, GraphStore, HashEmbedder, InMemoryVectorStore,
    OllamaEmbedder, QdrantVectorStore, SqliteGraphStore, VectorStore,
};
use tokio::task::JoinHandle;

use crate::config::{Config, EmbeddingProviderKind, VectorBackend};

/// Everything the subcommands need, wired from one [`Config`].
pub struct Stack {
    pub root: PathBuf,
    pub scanner: Arc<WorkspaceScanner>,
    queue_loop: Option<JoinHandle<()>>,
}

impl Stack {
    /// Open the stores and assemble the pipeline. The queue loop is not
    /// started; see [`Stack::start_queue`].
    ///
    /// With `with_vectors` unset the embedder and vector store are skipped,
    /// which is all the read-only subcommands need.
    ///
    /// # Errors
    ///
    /// Returns an error if a store cannot be opened or initialized.
    pub async fn open(config: &Config, root: &Path, with_vectors: bool) -> anyhow::Result<Self> {
        let sqlite_path = config.sqlite_path(root);
        let pool = codeweave_store::connect(&sqlite_path)
            .await
            .with_context(|| format!("failed to open database {sqlite_path}"))?;

        let graph: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::new(pool.clone()));
        let extractor = Arc::new(RelationshipExtractor::new(Arc::new(PackageResolver::new(
            root,
        ))));
        let vectors = with_vectors && config.storage.vector_enabled;
        let mut coordinator =
            IndexCoordinator::new(graph, extractor).with_batch_size(config.embedding.batch_size);
        if vectors {
            coordinator = coordinator.with_vectors(
                ChunkVectorStore::new(create_vector_store(config)?),
                create_embedder(config)?,
            );
        }
        coordinator
            .initialize()
            .await
            .context("failed to initialize index stores")?;
        let coordinator = Arc::new(coordinator);

        let file_index = FileIndexStore::new(pool.clone());
        file_index.init().await?;
        if vectors && config.storage.vector_backend == VectorBackend::Memory {
            let n = file_index.clear_all_indexed().await?;
            if n > 0 {
                tracing::info!(files = n, "in-memory vector store: re-embedding workspace");
            }
        }

        let worker = Arc::new(FileProcessor::new(
            root,
            Arc::new(TreeSitterChunker::default()),
            Arc::clone(&coordinator),
            file_index.clone(),
            config.workspace.max_file_size,
        ));
        let queue = ProcessingQueue::new(TaskStore::new(pool), worker, config.queue_config());
        queue.init().await?;

        let discovery = Discovery::new(config.discovery_config(root))?;
        Ok(Self {
            root: root.to_path_buf(),
            scanner: Arc::new(WorkspaceScanner::new(
                discovery,
                file_index,
                queue,
                coordinator,
            )),
            queue_loop: None,
        })
    }

    #[must_use]
    pub fn queue(&self) -> &ProcessingQueue {
        self.scanner.queue()
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<IndexCoordinator> {
        self.scanner.coordinator()
    }

    pub fn start_queue(&mut self) {
        if self.queue_loop.is_none() {
            self.queue_loop = Some(self.queue().spawn());
        }
    }

    /// Stop the queue loop and release the vector store.
    pub async fn shutdown(mut self) {
        self.queue().stop();
        if let Some(handle) = self.queue_loop.take()
            && let Err(e) = handle.await
        {
            tracing::warn!("queue loop ended abnormally: {e}");
        }
        self.coordinator().close();
    }
}

fn create_vector_store(config: &Config) -> anyhow::Result<Arc<dyn VectorStore>> {
    match config.storage.vector_backend {
        VectorBackend::Memory => Ok(Arc::new(InMemoryVectorStore::new())),
        VectorBackend::Qdrant => {
            let url = config
                .storage
                .qdrant_url
                .as_deref()
                .context("storage.qdrant_url is not set")?;
            let store = QdrantVectorStore::new(url)
                .with_context(|| format!("failed to connect to qdrant at {url}"))?;
            Ok(Arc::new(store))
        }
    }
}

fn create_embedder(config: &Config) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    Ok(match config.embedding.provider {
        EmbeddingProviderKind::Ollama => Arc::new(
            OllamaEmbedder::new(&config.embedding.base_url, config.embedding.model.clone())
                .context("embedding.base_url")?,
        ),
        EmbeddingProviderKind::Hash => Arc::new(HashEmbedder::new(config.embedding.dimensions)),
    })
}
