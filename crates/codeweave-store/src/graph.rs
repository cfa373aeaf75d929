use std::collections::BTreeMap;

use crate::error::Result;
use crate::types::{DocumentChunk, GraphRelationship, RelationshipType};
use crate::vector_store::BoxFuture;

/// Node and edge counts reported by a graph store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub files: usize,
    pub chunks: usize,
    pub relationships: usize,
    pub relationships_by_type: BTreeMap<String, usize>,
}

/// A file node as persisted by the graph store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNode {
    pub path: String,
    pub language: String,
    pub lines_of_code: usize,
}

/// Complete graph state produced by indexing one file.
#[derive(Debug, Clone, Default)]
pub struct FileGraph {
    pub path: String,
    pub language: String,
    pub lines_of_code: usize,
    pub chunks: Vec<DocumentChunk>,
    pub relationships: Vec<GraphRelationship>,
}

/// Persistent file/chunk/relationship graph.
///
/// Node ids are chunk ids, file paths, or package pseudo-ids. Relationships
/// may point at nodes that do not exist as rows (packages, files not yet
/// indexed); traversal skips endpoints it cannot resolve to a chunk.
pub trait GraphStore: Send + Sync {
    fn initialize(&self) -> BoxFuture<'_, Result<()>>;

    fn create_file_node<'a>(
        &'a self,
        path: &'a str,
        language: &'a str,
        lines_of_code: usize,
    ) -> BoxFuture<'a, Result<()>>;

    fn create_chunk_nodes<'a>(&'a self, chunks: &'a [DocumentChunk]) -> BoxFuture<'a, Result<()>>;

    fn create_relationships<'a>(
        &'a self,
        relationships: &'a [GraphRelationship],
    ) -> BoxFuture<'a, Result<()>>;

    /// Atomically swap a file's stored state for `file`.
    ///
    /// Drops the previous chunk nodes, every edge leaving the file or its old
    /// chunks, and edges into chunks that no longer exist. Incoming edges to
    /// the file path and to surviving chunk ids are kept.
    fn replace_file<'a>(&'a self, file: &'a FileGraph) -> BoxFuture<'a, Result<()>>;

    /// Chunks of one file, ordered by start line.
    fn get_file_chunks<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<DocumentChunk>>>;

    fn list_all_files(&self) -> BoxFuture<'_, Result<Vec<FileNode>>>;

    /// Remove the file node, its chunks, and every relationship touching
    /// either. No-op when nothing is stored for `path`.
    fn delete_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Chunks reachable from `ids` within `depth` hops in either direction,
    /// excluding the seeds themselves.
    fn get_related_chunks<'a>(
        &'a self,
        ids: &'a [String],
        depth: usize,
    ) -> BoxFuture<'a, Result<Vec<DocumentChunk>>>;

    fn get_stats(&self) -> BoxFuture<'_, Result<GraphStats>>;

    fn get_chunks<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Result<Vec<DocumentChunk>>>;

    /// Every relationship where `node_id` is either endpoint.
    fn relationships_for<'a>(
        &'a self,
        node_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<GraphRelationship>>>;

    /// Delete edges leaving `from_ids` whose type is in `kinds`. An empty
    /// `kinds` slice deletes edges of every type.
    fn delete_relationships_from<'a>(
        &'a self,
        from_ids: &'a [String],
        kinds: &'a [RelationshipType],
    ) -> BoxFuture<'a, Result<()>>;
}
