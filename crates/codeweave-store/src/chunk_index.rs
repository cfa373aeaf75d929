//! Chunk-level view over a generic [`VectorStore`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::types::{ChunkMetadata, ChunkType, DocumentChunk};
use crate::vector_store::{PayloadMatch, VectorPoint, VectorStore};

pub const DEFAULT_COLLECTION: &str = "codeweave_chunks";

/// A chunk returned by similarity search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Stores chunk embeddings and their metadata payload in one collection.
pub struct ChunkVectorStore {
    store: Arc<dyn VectorStore>,
    collection: String,
}

impl std::fmt::Debug for ChunkVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkVectorStore")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl ChunkVectorStore {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self::with_collection(store, DEFAULT_COLLECTION)
    }

    #[must_use]
    pub fn with_collection(store: Arc<dyn VectorStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the collection for vectors of `dimensions` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the collection.
    pub async fn initialize(&self, dimensions: usize) -> Result<()> {
        let size = u64::try_from(dimensions)?;
        self.store.ensure_collection(&self.collection, size).await?;
        tracing::debug!(collection = %self.collection, dimensions, "chunk vector store ready");
        Ok(())
    }

    /// Upsert chunks that carry an embedding. Chunks without one are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn upsert_chunks(&self, chunks: &[DocumentChunk]) -> Result<usize> {
        let points: Vec<VectorPoint> = chunks
            .iter()
            .filter_map(|chunk| {
                let vector = chunk.embedding.clone()?;
                Some(VectorPoint {
                    id: chunk.id.clone(),
                    vector,
                    payload: chunk_payload(chunk),
                })
            })
            .collect();
        let count = points.len();
        if count > 0 {
            self.store.upsert(&self.collection, points).await?;
        }
        Ok(count)
    }

    /// Return the `k` chunks nearest to `query_vector`, best first.
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails or a payload cannot be decoded.
    pub async fn search(&self, query_vector: Vec<f32>, k: usize) -> Result<Vec<ScoredChunk>> {
        let limit = u64::try_from(k)?;
        let hits = self
            .store
            .search(&self.collection, query_vector, limit)
            .await?;
        hits.into_iter()
            .map(|hit| {
                Ok(ScoredChunk {
                    chunk: chunk_from_payload(hit.id, &hit.payload)?,
                    score: hit.score,
                })
            })
            .collect()
    }

    /// # Errors
    ///
    /// Returns an error if the lookup fails or a payload cannot be decoded.
    pub async fn get_chunks_by_ids(&self, ids: &[String]) -> Result<Vec<DocumentChunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let found = self.store.payloads(&self.collection, ids.to_vec()).await?;
        found
            .into_iter()
            .map(|(id, payload)| chunk_from_payload(id, &payload))
            .collect()
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_chunks_by_file(&self, path: &str) -> Result<()> {
        self.store
            .delete_matching(&self.collection, PayloadMatch::new("file_path", path))
            .await?;
        Ok(())
    }

    /// Release the store. Adapters hold no exclusive resources, so this only logs.
    pub fn close(&self) {
        tracing::debug!(collection = %self.collection, "chunk vector store closed");
    }
}

fn chunk_payload(chunk: &DocumentChunk) -> HashMap<String, serde_json::Value> {
    let m = &chunk.metadata;
    HashMap::from([
        ("file_path".to_owned(), serde_json::json!(m.file_path)),
        ("line_start".to_owned(), serde_json::json!(m.line_start)),
        ("line_end".to_owned(), serde_json::json!(m.line_end)),
        ("chunk_type".to_owned(), serde_json::json!(m.chunk_type.as_str())),
        ("symbol_name".to_owned(), serde_json::json!(m.symbol_name)),
        ("symbol_kind".to_owned(), serde_json::json!(m.symbol_kind)),
        ("content".to_owned(), serde_json::json!(chunk.content)),
    ])
}

fn chunk_from_payload(
    id: String,
    payload: &HashMap<String, serde_json::Value>,
) -> Result<DocumentChunk> {
    let text = |key: &str| payload.get(key).and_then(|v| v.as_str()).map(str::to_owned);
    let line = |key: &str| -> Result<usize> {
        let raw = payload
            .get(key)
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| StoreError::Other(format!("chunk {id} payload missing {key}")))?;
        Ok(usize::try_from(raw)?)
    };

    let file_path = text("file_path")
        .ok_or_else(|| StoreError::Other(format!("chunk {id} payload missing file_path")))?;
    let metadata = ChunkMetadata {
        file_path,
        line_start: line("line_start")?,
        line_end: line("line_end")?,
        chunk_type: ChunkType::from_str_kind(&text("chunk_type").unwrap_or_default()),
        symbol_name: text("symbol_name"),
        symbol_kind: text("symbol_kind"),
    };
    Ok(DocumentChunk {
        id,
        content: text("content").unwrap_or_default(),
        embedding: None,
        metadata,
    })
}
