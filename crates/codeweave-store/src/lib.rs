//! Storage ports for the codeweave index: chunk/relationship graph, chunk
//! vectors, and embeddings, with `SQLite`, Qdrant and in-memory adapters.

pub mod chunk_index;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod in_memory_store;
pub mod qdrant_store;
pub mod sqlite;
pub mod types;
pub mod vector_store;

pub use chunk_index::{ChunkVectorStore, ScoredChunk};
pub use embedding::{EmbeddingProvider, HashEmbedder, OllamaEmbedder};
pub use error::{Result, StoreError};
pub use graph::{FileGraph, FileNode, GraphStats, GraphStore};
pub use in_memory_store::InMemoryVectorStore;
pub use qdrant_store::QdrantVectorStore;
pub use sqlite::{SqliteGraphStore, connect};
pub use types::{
    ChunkMetadata, ChunkType, DocumentChunk, GraphRelationship, RelationshipType, chunk_id,
    is_package_node, package_node_id,
};
pub use vector_store::{
    BoxFuture, Payload, PayloadMatch, VectorHit, VectorPoint, VectorStore, VectorStoreError,
};
