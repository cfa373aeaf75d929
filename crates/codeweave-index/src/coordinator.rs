//! Persists parsed files as graph nodes, edges and vectors, and serves hybrid
//! vector + graph lookups.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use codeweave_store::{
    ChunkType, ChunkVectorStore, DocumentChunk, EmbeddingProvider, FileGraph, GraphRelationship,
    GraphStats, GraphStore, RelationshipType, ScoredChunk,
};

use crate::context::contextualize_for_embedding;
use crate::error::{IndexError, Result};
use crate::extractor::{
    FileFacts, RelationshipExtractor, dedup_relationships, import_targets, symbol_edges,
};
use crate::languages::detect_language;

const DEFAULT_BATCH_SIZE: usize = 32;

/// Units written for one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOutcome {
    pub chunks: usize,
    pub relationships: usize,
}

/// Direct vector hits plus the chunks reachable from them in the graph.
#[derive(Debug, Default)]
pub struct SearchResults {
    pub direct: Vec<ScoredChunk>,
    pub related: Vec<DocumentChunk>,
}

struct VectorIndex {
    store: ChunkVectorStore,
    embedder: Arc<dyn EmbeddingProvider>,
}

type FactsCache = HashMap<String, (String, Arc<FileFacts>)>;

pub struct IndexCoordinator {
    graph: Arc<dyn GraphStore>,
    vectors: Option<VectorIndex>,
    extractor: Arc<RelationshipExtractor>,
    batch_size: usize,
    /// First-pass facts keyed by path, tagged with the content hash they came from.
    facts: Mutex<FactsCache>,
}

impl std::fmt::Debug for IndexCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexCoordinator")
            .field("vectors", &self.vectors.is_some())
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl IndexCoordinator {
    /// A coordinator without a vector store: search returns nothing.
    #[must_use]
    pub fn new(graph: Arc<dyn GraphStore>, extractor: Arc<RelationshipExtractor>) -> Self {
        Self {
            graph,
            vectors: None,
            extractor,
            batch_size: DEFAULT_BATCH_SIZE,
            facts: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_vectors(
        mut self,
        store: ChunkVectorStore,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        self.vectors = Some(VectorIndex { store, embedder });
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn graph(&self) -> &Arc<dyn GraphStore> {
        &self.graph
    }

    #[must_use]
    pub fn extractor(&self) -> &RelationshipExtractor {
        &self.extractor
    }

    #[must_use]
    pub fn vectors_enabled(&self) -> bool {
        self.vectors.is_some()
    }

    /// # Errors
    ///
    /// Returns an error if the graph schema, embedder probe or vector
    /// collection cannot be set up.
    pub async fn initialize(&self) -> Result<()> {
        self.graph.initialize().await?;
        if let Some(vectors) = &self.vectors {
            let dims = vectors.embedder.initialize().await?;
            vectors.store.initialize(dims).await?;
            tracing::info!(
                embedder = vectors.embedder.name(),
                dims,
                "vector index ready"
            );
        }
        Ok(())
    }

    /// Replace everything stored for `path` with `chunks` and the edges
    /// derived from them.
    ///
    /// Embeddings are computed before anything is written, so a failing
    /// embedder leaves the previous state intact.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or either store fails.
    pub async fn index_file(
        &self,
        path: &str,
        content: &str,
        hash: &str,
        mut chunks: Vec<DocumentChunk>,
    ) -> Result<IndexOutcome> {
        let lang = detect_language(Path::new(path));

        let extraction = {
            let extractor = Arc::clone(&self.extractor);
            let (path, content, chunks) = (path.to_owned(), content.to_owned(), chunks.clone());
            tokio::task::spawn_blocking(move || extractor.extract(&path, &content, &chunks))
                .await?
        };

        let mut relationships = contains_edges(path, &chunks);
        relationships.extend(documents_edges(&chunks));
        relationships.extend(extraction.relationships);
        dedup_relationships(&mut relationships);

        if let Some(vectors) = &self.vectors {
            let texts: Vec<String> = chunks
                .iter()
                .map(|c| contextualize_for_embedding(c, lang))
                .collect();
            let embeddings = vectors.embedder.embed_batch(&texts, self.batch_size).await?;
            if embeddings.len() != chunks.len() {
                return Err(IndexError::Processing(format!(
                    "{path}: {} embeddings for {} chunks",
                    embeddings.len(),
                    chunks.len()
                )));
            }
            for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
                chunk.embedding = Some(embedding);
            }
        }

        let file = FileGraph {
            path: path.to_owned(),
            language: lang.map_or("unknown", |l| l.id()).to_owned(),
            lines_of_code: content.lines().count(),
            chunks,
            relationships,
        };
        self.graph.replace_file(&file).await?;

        if let Some(vectors) = &self.vectors {
            vectors.store.delete_chunks_by_file(path).await?;
            vectors.store.upsert_chunks(&file.chunks).await?;
        }

        self.facts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_owned(), (hash.to_owned(), Arc::new(extraction.facts)));

        let outcome = IndexOutcome {
            chunks: file.chunks.len(),
            relationships: file.relationships.len(),
        };
        tracing::debug!(
            path,
            chunks = outcome.chunks,
            relationships = outcome.relationships,
            "indexed file"
        );
        Ok(outcome)
    }

    /// Remove the file node, its chunks, every edge touching them and their
    /// vectors. Safe when nothing is stored for `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if either store fails.
    pub async fn delete_file(&self, path: &str) -> Result<()> {
        self.graph.delete_file(path).await?;
        if let Some(vectors) = &self.vectors {
            vectors.store.delete_chunks_by_file(path).await?;
        }
        self.facts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        tracing::debug!(path, "deleted file from index");
        Ok(())
    }

    /// Cross-file pass: replace the `IMPORTS` and `IMPORTS_SYMBOL` edges of
    /// every file in `files` (path → content hash), resolving relative
    /// imports against the same set.
    ///
    /// A file that cannot be read or parsed is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph store fails.
    pub async fn link_files(&self, files: &BTreeMap<String, String>) -> Result<usize> {
        let known: HashSet<String> = files.keys().cloned().collect();
        let mut chunk_cache: HashMap<String, Vec<DocumentChunk>> = HashMap::new();
        let mut total = 0;

        for (path, hash) in files {
            let facts = match self.facts_for(path, hash).await {
                Ok(facts) => facts,
                Err(e) => {
                    tracing::warn!(path = %path, "cross-file pass skipped file: {e}");
                    continue;
                }
            };

            let own_chunks = self.graph.get_file_chunks(path).await?;
            let mut edges = Vec::new();
            for (import, target) in import_targets(path, &facts, &known) {
                edges.push(
                    GraphRelationship::new(path.as_str(), target.as_str(), RelationshipType::Imports)
                        .with_property("specifier", import.source.as_str())
                        .with_property("specifiers", import.specifiers.clone())
                        .with_property("kind", import.kind.as_str()),
                );
                if !chunk_cache.contains_key(&target) {
                    let chunks = self.graph.get_file_chunks(&target).await?;
                    chunk_cache.insert(target.clone(), chunks);
                }
                let target_facts = match files.get(&target) {
                    Some(target_hash) => match self.facts_for(&target, target_hash).await {
                        Ok(facts) => Some(facts),
                        Err(e) => {
                            tracing::debug!(path = %target, "export list unavailable: {e}");
                            None
                        }
                    },
                    None => None,
                };
                edges.extend(symbol_edges(
                    path,
                    import,
                    &own_chunks,
                    chunk_cache.get(&target).map_or(&[][..], Vec::as_slice),
                    target_facts.as_deref(),
                ));
            }
            dedup_relationships(&mut edges);

            let mut from_ids: Vec<String> = own_chunks.iter().map(|c| c.id.clone()).collect();
            from_ids.push(path.clone());
            self.graph
                .delete_relationships_from(
                    &from_ids,
                    &[RelationshipType::Imports, RelationshipType::ImportsSymbol],
                )
                .await?;
            self.graph.create_relationships(&edges).await?;
            total += edges.len();
        }

        tracing::debug!(files = files.len(), edges = total, "cross-file pass finished");
        Ok(total)
    }

    /// Cached facts when the hash still matches, else a fresh parse from disk.
    async fn facts_for(&self, path: &str, hash: &str) -> Result<Arc<FileFacts>> {
        {
            let cache = self.facts.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((cached_hash, facts)) = cache.get(path)
                && cached_hash == hash
            {
                return Ok(Arc::clone(facts));
            }
        }

        let content = tokio::fs::read_to_string(self.extractor.resolver().root().join(path)).await?;
        let extractor = Arc::clone(&self.extractor);
        let owned_path = path.to_owned();
        let facts =
            tokio::task::spawn_blocking(move || extractor.collect_facts(&owned_path, &content))
                .await??;
        let facts = Arc::new(facts);
        self.facts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_owned(), (hash.to_owned(), Arc::clone(&facts)));
        Ok(facts)
    }

    /// Vector hits for `query` and their graph neighbourhood within `depth`
    /// hops. Without a vector store both lists are empty.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding, search or traversal fails.
    pub async fn hybrid_search(&self, query: &str, k: usize, depth: usize) -> Result<SearchResults> {
        let Some(vectors) = &self.vectors else {
            return Ok(SearchResults::default());
        };
        let query_vector = vectors
            .embedder
            .embed_batch(&[query.to_owned()], 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| IndexError::Processing("embedder returned no query vector".into()))?;

        let direct = vectors.store.search(query_vector, k).await?;
        if direct.is_empty() {
            return Ok(SearchResults::default());
        }
        let ids: Vec<String> = direct.iter().map(|hit| hit.chunk.id.clone()).collect();
        let related = if depth == 0 {
            Vec::new()
        } else {
            self.graph.get_related_chunks(&ids, depth).await?
        };
        Ok(SearchResults { direct, related })
    }

    /// # Errors
    ///
    /// Returns an error if the graph store fails.
    pub async fn stats(&self) -> Result<GraphStats> {
        Ok(self.graph.get_stats().await?)
    }

    pub fn close(&self) {
        if let Some(vectors) = &self.vectors {
            vectors.store.close();
        }
    }
}

/// File → chunk edges in chunk order.
fn contains_edges(path: &str, chunks: &[DocumentChunk]) -> Vec<GraphRelationship> {
    chunks
        .iter()
        .enumerate()
        .map(|(order, chunk)| {
            GraphRelationship::new(path, chunk.id.as_str(), RelationshipType::Contains)
                .with_property("order", order)
        })
        .collect()
}

/// Doc chunk → the code chunk it documents, matched by symbol name. When a
/// name occurs more than once the nearest following chunk wins.
fn documents_edges(chunks: &[DocumentChunk]) -> Vec<GraphRelationship> {
    let mut edges = Vec::new();
    for doc in chunks.iter().filter(|c| c.metadata.chunk_type == ChunkType::Doc) {
        let Some(name) = doc.symbol_name() else {
            continue;
        };
        let target = chunks
            .iter()
            .filter(|c| c.metadata.chunk_type.is_symbol() && c.symbol_name() == Some(name))
            .min_by_key(|c| {
                (
                    c.metadata.line_start < doc.metadata.line_start,
                    c.metadata.line_start.abs_diff(doc.metadata.line_end),
                )
            });
        if let Some(target) = target {
            edges.push(GraphRelationship::new(
                doc.id.as_str(),
                target.id.as_str(),
                RelationshipType::Documents,
            ));
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use codeweave_store::{HashEmbedder, InMemoryVectorStore, SqliteGraphStore};

    use super::*;
    use crate::chunker::{ChunkParser, TreeSitterChunker};
    use crate::resolver::PackageResolver;

    async fn coordinator(root: &Path, with_vectors: bool) -> IndexCoordinator {
        let pool = codeweave_store::connect(":memory:").await.unwrap();
        let graph: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::new(pool));
        let extractor = Arc::new(RelationshipExtractor::new(Arc::new(PackageResolver::new(
            root,
        ))));
        let mut coordinator = IndexCoordinator::new(graph, extractor).with_batch_size(4);
        if with_vectors {
            coordinator = coordinator.with_vectors(
                ChunkVectorStore::new(Arc::new(InMemoryVectorStore::new())),
                Arc::new(HashEmbedder::new(64)),
            );
        }
        coordinator.initialize().await.unwrap();
        coordinator
    }

    async fn index(c: &IndexCoordinator, root: &Path, path: &str, source: &str) -> IndexOutcome {
        std::fs::create_dir_all(root.join(path).parent().unwrap()).unwrap();
        std::fs::write(root.join(path), source).unwrap();
        let chunks = TreeSitterChunker::default().parse_file(path, source).unwrap();
        let hash = crate::discovery::hash_bytes(source.as_bytes());
        c.index_file(path, source, &hash, chunks).await.unwrap()
    }

    const ADD: &str = "/** Adds two numbers. */\nexport function add(a: number, b: number): number {\n  return a + b;\n}\n";

    #[tokio::test]
    async fn index_writes_file_chunks_and_contains() {
        let dir = tempfile::tempdir().unwrap();
        let c = coordinator(dir.path(), true).await;
        let outcome = index(&c, dir.path(), "add.ts", ADD).await;
        assert!(outcome.chunks >= 1);

        let stats = c.stats().await.unwrap();
        assert_eq!(stats.files, 1);
        assert!(stats.relationships_by_type["CONTAINS"] >= 1);
        assert_eq!(stats.relationships_by_type["DOCUMENTS"], 1);

        let files = c.graph().list_all_files().await.unwrap();
        assert_eq!(files[0].path, "add.ts");
        assert_eq!(files[0].language, "typescript");
    }

    #[tokio::test]
    async fn reindex_does_not_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let c = coordinator(dir.path(), true).await;
        index(&c, dir.path(), "add.ts", ADD).await;
        let first = c.stats().await.unwrap();
        index(&c, dir.path(), "add.ts", ADD).await;
        assert_eq!(c.stats().await.unwrap(), first);
    }

    #[tokio::test]
    async fn hybrid_search_finds_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let c = coordinator(dir.path(), true).await;
        index(&c, dir.path(), "add.ts", ADD).await;
        let results = c.hybrid_search("add", 5, 1).await.unwrap();
        assert!(
            results
                .direct
                .iter()
                .any(|hit| hit.chunk.symbol_name() == Some("add")
                    && hit.chunk.metadata.chunk_type == ChunkType::Function)
        );
    }

    #[tokio::test]
    async fn search_without_vectors_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let c = coordinator(dir.path(), false).await;
        index(&c, dir.path(), "add.ts", ADD).await;
        let results = c.hybrid_search("add", 5, 2).await.unwrap();
        assert!(results.direct.is_empty());
        assert!(results.related.is_empty());
        assert_eq!(c.stats().await.unwrap().files, 1);
    }

    #[tokio::test]
    async fn delete_file_removes_everything_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let c = coordinator(dir.path(), true).await;
        index(&c, dir.path(), "add.ts", ADD).await;
        c.delete_file("add.ts").await.unwrap();
        c.delete_file("add.ts").await.unwrap();

        let stats = c.stats().await.unwrap();
        assert_eq!((stats.files, stats.chunks, stats.relationships), (0, 0, 0));
        assert!(c.hybrid_search("add", 5, 1).await.unwrap().direct.is_empty());
    }

    #[tokio::test]
    async fn link_files_emits_imports_and_symbol_edges() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let c = coordinator(root, false).await;
        let util = "export function double(x: number): number {\n  return x * 2;\n}\n";
        let main = "import { double } from \"./util\";\n\nexport function run(n: number): number {\n  return double(n) + 1;\n}\n";
        index(&c, root, "src/util.ts", util).await;
        index(&c, root, "src/a.ts", main).await;

        let files: BTreeMap<String, String> = [("src/a.ts", main), ("src/util.ts", util)]
            .into_iter()
            .map(|(p, s)| (p.to_owned(), crate::discovery::hash_bytes(s.as_bytes())))
            .collect();
        let created = c.link_files(&files).await.unwrap();
        assert!(created >= 2);

        let edges = c.graph().relationships_for("src/a.ts").await.unwrap();
        assert!(edges.iter().any(|e| e.kind == RelationshipType::Imports
            && e.from == "src/a.ts"
            && e.to == "src/util.ts"));

        let util_chunks = c.graph().get_file_chunks("src/util.ts").await.unwrap();
        let double = util_chunks
            .iter()
            .find(|ch| ch.symbol_name() == Some("double"))
            .unwrap();
        let incoming = c.graph().relationships_for(&double.id).await.unwrap();
        assert!(incoming.iter().any(|e| e.kind == RelationshipType::ImportsSymbol));

        // A second pass replaces rather than accumulates.
        c.link_files(&files).await.unwrap();
        let again = c.graph().relationships_for("src/a.ts").await.unwrap();
        assert_eq!(
            again.iter().filter(|e| e.kind == RelationshipType::Imports).count(),
            1
        );
    }

    #[tokio::test]
    async fn link_files_reparses_on_cache_miss() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/util.ts"), "export const one = 1;\n").unwrap();
        std::fs::write(root.join("src/a.ts"), "import { one } from './util';\n").unwrap();
        let c = coordinator(root, false).await;

        let files: BTreeMap<String, String> = [
            ("src/a.ts".to_owned(), "stale".to_owned()),
            ("src/util.ts".to_owned(), "stale".to_owned()),
        ]
        .into();
        c.link_files(&files).await.unwrap();
        let edges = c.graph().relationships_for("src/util.ts").await.unwrap();
        assert!(edges.iter().any(|e| e.kind == RelationshipType::Imports));
    }

    #[tokio::test]
    async fn cold_cache_still_filters_unexported_names() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let warm = coordinator(root, false).await;
        let util = "export function add(a: number, b: number): number {\n  return a + b;\n}\n\nfunction secret(): number {\n  return 7;\n}\n";
        let main = "import { add, secret } from './util';\n\nexport function run(): number {\n  return add(1, secret());\n}\n";
        index(&warm, root, "src/util.ts", util).await;
        index(&warm, root, "src/a.ts", main).await;

        // Same graph, empty facts cache, as after a restart.
        let extractor = Arc::new(RelationshipExtractor::new(Arc::new(PackageResolver::new(
            root,
        ))));
        let cold = IndexCoordinator::new(Arc::clone(warm.graph()), extractor);
        let files: BTreeMap<String, String> = [("src/a.ts", main), ("src/util.ts", util)]
            .into_iter()
            .map(|(p, s)| (p.to_owned(), crate::discovery::hash_bytes(s.as_bytes())))
            .collect();
        cold.link_files(&files).await.unwrap();

        let util_chunks = cold.graph().get_file_chunks("src/util.ts").await.unwrap();
        let mut incoming = BTreeMap::new();
        for name in ["add", "secret"] {
            let chunk = util_chunks
                .iter()
                .find(|ch| ch.symbol_name() == Some(name))
                .unwrap();
            let count = cold
                .graph()
                .relationships_for(&chunk.id)
                .await
                .unwrap()
                .iter()
                .filter(|e| e.kind == RelationshipType::ImportsSymbol && e.to == chunk.id)
                .count();
            incoming.insert(name, count);
        }
        assert!(incoming["add"] >= 1, "{incoming:?}");
        assert_eq!(incoming["secret"], 0, "{incoming:?}");
    }

    #[test]
    fn documents_edge_prefers_following_chunk() {
        let chunks = TreeSitterChunker::default().parse_file("add.ts", ADD).unwrap();
        let edges = documents_edges(&chunks);
        assert_eq!(edges.len(), 1);
        let target = chunks.iter().find(|c| c.id == edges[0].to).unwrap();
        assert_eq!(target.metadata.chunk_type, ChunkType::Function);
    }
}
