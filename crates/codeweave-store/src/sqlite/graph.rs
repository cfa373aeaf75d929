use std::collections::{HashMap, HashSet};

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::error::{Result, StoreError};
use crate::graph::{FileGraph, FileNode, GraphStats, GraphStore};
use crate::types::{
    ChunkMetadata, ChunkType, DocumentChunk, GraphRelationship, RelationshipType, is_package_node,
};
use crate::vector_store::BoxFuture;

/// Upper bound on ids bound into a single `IN (...)` list.
const MAX_BIND: usize = 400;

const CHUNK_COLUMNS: &str =
    "id, file_path, content, line_start, line_end, chunk_type, symbol_name, symbol_kind";

type ChunkRow = (
    String,
    String,
    String,
    i64,
    i64,
    String,
    Option<String>,
    Option<String>,
);

/// Graph store over three `SQLite` tables: files, chunks and edges.
#[derive(Debug, Clone)]
pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS graph_files (
                path TEXT PRIMARY KEY,
                language TEXT NOT NULL,
                lines_of_code INTEGER NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS graph_chunks (
                id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                content TEXT NOT NULL,
                line_start INTEGER NOT NULL,
                line_end INTEGER NOT NULL,
                chunk_type TEXT NOT NULL,
                symbol_name TEXT,
                symbol_kind TEXT
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_graph_chunks_file ON graph_chunks(file_path)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS graph_edges (
                from_id TEXT NOT NULL,
                to_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                properties TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (from_id, to_id, kind)
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_graph_edges_to ON graph_edges(to_id)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fetch_chunks(&self, ids: &[String]) -> Result<Vec<DocumentChunk>> {
        let mut by_id = HashMap::with_capacity(ids.len());
        for batch in ids.chunks(MAX_BIND) {
            let mut qb =
                QueryBuilder::new(format!("SELECT {CHUNK_COLUMNS} FROM graph_chunks WHERE id IN ("));
            push_ids(&mut qb, batch);
            qb.push(")");
            let rows: Vec<ChunkRow> = qb.build_query_as().fetch_all(&self.pool).await?;
            for row in rows {
                let chunk = row_to_chunk(row)?;
                by_id.insert(chunk.id.clone(), chunk);
            }
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn neighbours(&self, frontier: &[String]) -> Result<Vec<(String, String)>> {
        let mut edges = Vec::new();
        for batch in frontier.chunks(MAX_BIND / 2) {
            let mut qb = QueryBuilder::new("SELECT from_id, to_id FROM graph_edges WHERE from_id IN (");
            push_ids(&mut qb, batch);
            qb.push(") OR to_id IN (");
            push_ids(&mut qb, batch);
            qb.push(")");
            let rows: Vec<(String, String)> = qb.build_query_as().fetch_all(&self.pool).await?;
            edges.extend(rows);
        }
        Ok(edges)
    }
}

fn push_ids<'args>(qb: &mut QueryBuilder<'args, Sqlite>, ids: &'args [String]) {
    let mut sep = qb.separated(", ");
    for id in ids {
        sep.push_bind(id.as_str());
    }
}

fn row_to_chunk(row: ChunkRow) -> Result<DocumentChunk> {
    let (id, file_path, content, line_start, line_end, chunk_type, symbol_name, symbol_kind) = row;
    Ok(DocumentChunk {
        id,
        content,
        embedding: None,
        metadata: ChunkMetadata {
            file_path,
            line_start: usize::try_from(line_start)?,
            line_end: usize::try_from(line_end)?,
            chunk_type: ChunkType::from_str_kind(&chunk_type),
            symbol_name,
            symbol_kind,
        },
    })
}

fn row_to_relationship(
    (from, to, kind, properties): (String, String, String, String),
) -> Result<GraphRelationship> {
    let kind = RelationshipType::parse(&kind)
        .ok_or_else(|| StoreError::Other(format!("unknown relationship type {kind}")))?;
    Ok(GraphRelationship {
        from,
        to,
        kind,
        properties: serde_json::from_str(&properties)?,
    })
}

async fn upsert_file(
    conn: &mut SqliteConnection,
    path: &str,
    language: &str,
    lines_of_code: usize,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO graph_files (path, language, lines_of_code) VALUES (?, ?, ?)
         ON CONFLICT(path) DO UPDATE SET
            language = excluded.language,
            lines_of_code = excluded.lines_of_code,
            updated_at = datetime('now')",
    )
    .bind(path)
    .bind(language)
    .bind(i64::try_from(lines_of_code)?)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_chunks(conn: &mut SqliteConnection, chunks: &[DocumentChunk]) -> Result<()> {
    for chunk in chunks {
        let m = &chunk.metadata;
        sqlx::query(
            "INSERT INTO graph_chunks
                (id, file_path, content, line_start, line_end, chunk_type, symbol_name, symbol_kind)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                file_path = excluded.file_path,
                content = excluded.content,
                line_start = excluded.line_start,
                line_end = excluded.line_end,
                chunk_type = excluded.chunk_type,
                symbol_name = excluded.symbol_name,
                symbol_kind = excluded.symbol_kind",
        )
        .bind(&chunk.id)
        .bind(&m.file_path)
        .bind(&chunk.content)
        .bind(i64::try_from(m.line_start)?)
        .bind(i64::try_from(m.line_end)?)
        .bind(m.chunk_type.as_str())
        .bind(m.symbol_name.as_deref())
        .bind(m.symbol_kind.as_deref())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_relationships(
    conn: &mut SqliteConnection,
    relationships: &[GraphRelationship],
) -> Result<()> {
    for rel in relationships {
        sqlx::query(
            "INSERT INTO graph_edges (from_id, to_id, kind, properties) VALUES (?, ?, ?, ?)
             ON CONFLICT(from_id, to_id, kind) DO UPDATE SET properties = excluded.properties",
        )
        .bind(&rel.from)
        .bind(&rel.to)
        .bind(rel.kind.as_str())
        .bind(serde_json::to_string(&rel.properties)?)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn delete_edges_into(conn: &mut SqliteConnection, ids: &[String]) -> Result<()> {
    for batch in ids.chunks(MAX_BIND) {
        let mut qb = QueryBuilder::new("DELETE FROM graph_edges WHERE to_id IN (");
        push_ids(&mut qb, batch);
        qb.push(")");
        qb.build().execute(&mut *conn).await?;
    }
    Ok(())
}

impl GraphStore for SqliteGraphStore {
    fn initialize(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.init_tables())
    }

    fn create_file_node<'a>(
        &'a self,
        path: &'a str,
        language: &'a str,
        lines_of_code: usize,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await?;
            upsert_file(&mut conn, path, language, lines_of_code).await
        })
    }

    fn create_chunk_nodes<'a>(&'a self, chunks: &'a [DocumentChunk]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            insert_chunks(&mut tx, chunks).await?;
            tx.commit().await?;
            Ok(())
        })
    }

    fn create_relationships<'a>(
        &'a self,
        relationships: &'a [GraphRelationship],
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            insert_relationships(&mut tx, relationships).await?;
            tx.commit().await?;
            Ok(())
        })
    }

    fn replace_file<'a>(&'a self, file: &'a FileGraph) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;

            let old_ids: Vec<String> =
                sqlx::query_scalar("SELECT id FROM graph_chunks WHERE file_path = ?")
                    .bind(&file.path)
                    .fetch_all(&mut *tx)
                    .await?;
            let new_ids: HashSet<&str> = file.chunks.iter().map(|c| c.id.as_str()).collect();
            let removed: Vec<String> = old_ids
                .into_iter()
                .filter(|id| !new_ids.contains(id.as_str()))
                .collect();

            sqlx::query("DELETE FROM graph_edges WHERE from_id = ?")
                .bind(&file.path)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "DELETE FROM graph_edges WHERE from_id IN
                    (SELECT id FROM graph_chunks WHERE file_path = ?)",
            )
            .bind(&file.path)
            .execute(&mut *tx)
            .await?;
            delete_edges_into(&mut tx, &removed).await?;
            sqlx::query("DELETE FROM graph_chunks WHERE file_path = ?")
                .bind(&file.path)
                .execute(&mut *tx)
                .await?;

            upsert_file(&mut tx, &file.path, &file.language, file.lines_of_code).await?;
            insert_chunks(&mut tx, &file.chunks).await?;
            insert_relationships(&mut tx, &file.relationships).await?;
            tx.commit().await?;

            tracing::debug!(
                path = %file.path,
                chunks = file.chunks.len(),
                relationships = file.relationships.len(),
                removed_chunks = removed.len(),
                "replaced file graph"
            );
            Ok(())
        })
    }

    fn get_file_chunks<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<DocumentChunk>>> {
        Box::pin(async move {
            let rows: Vec<ChunkRow> = sqlx::query_as(&format!(
                "SELECT {CHUNK_COLUMNS} FROM graph_chunks WHERE file_path = ?
                 ORDER BY line_start, line_end, id"
            ))
            .bind(path)
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter().map(row_to_chunk).collect()
        })
    }

    fn list_all_files(&self) -> BoxFuture<'_, Result<Vec<FileNode>>> {
        Box::pin(async move {
            let rows: Vec<(String, String, i64)> = sqlx::query_as(
                "SELECT path, language, lines_of_code FROM graph_files ORDER BY path",
            )
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter()
                .map(|(path, language, loc)| {
                    Ok(FileNode {
                        path,
                        language,
                        lines_of_code: usize::try_from(loc)?,
                    })
                })
                .collect()
        })
    }

    fn delete_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM graph_edges WHERE from_id = ? OR to_id = ?")
                .bind(path)
                .bind(path)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "DELETE FROM graph_edges
                 WHERE from_id IN (SELECT id FROM graph_chunks WHERE file_path = ?)
                    OR to_id IN (SELECT id FROM graph_chunks WHERE file_path = ?)",
            )
            .bind(path)
            .bind(path)
            .execute(&mut *tx)
            .await?;
            let chunks = sqlx::query("DELETE FROM graph_chunks WHERE file_path = ?")
                .bind(path)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            sqlx::query("DELETE FROM graph_files WHERE path = ?")
                .bind(path)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            tracing::debug!(%path, chunks, "deleted file from graph");
            Ok(())
        })
    }

    fn get_related_chunks<'a>(
        &'a self,
        ids: &'a [String],
        depth: usize,
    ) -> BoxFuture<'a, Result<Vec<DocumentChunk>>> {
        Box::pin(async move {
            let mut visited: HashSet<String> = ids.iter().cloned().collect();
            let mut frontier: Vec<String> = ids.to_vec();
            let mut reached = Vec::new();

            for _ in 0..depth {
                if frontier.is_empty() {
                    break;
                }
                let mut next = Vec::new();
                for (from, to) in self.neighbours(&frontier).await? {
                    for id in [from, to] {
                        if visited.insert(id.clone()) {
                            reached.push(id.clone());
                            // Package nodes fan out to every importer.
                            if !is_package_node(&id) {
                                next.push(id);
                            }
                        }
                    }
                }
                frontier = next;
            }

            self.fetch_chunks(&reached).await
        })
    }

    fn get_stats(&self) -> BoxFuture<'_, Result<GraphStats>> {
        Box::pin(async move {
            let files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM graph_files")
                .fetch_one(&self.pool)
                .await?;
            let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM graph_chunks")
                .fetch_one(&self.pool)
                .await?;
            let by_type: Vec<(String, i64)> =
                sqlx::query_as("SELECT kind, COUNT(*) FROM graph_edges GROUP BY kind")
                    .fetch_all(&self.pool)
                    .await?;

            let mut stats = GraphStats {
                files: usize::try_from(files)?,
                chunks: usize::try_from(chunks)?,
                ..GraphStats::default()
            };
            for (kind, count) in by_type {
                let count = usize::try_from(count)?;
                stats.relationships += count;
                stats.relationships_by_type.insert(kind, count);
            }
            Ok(stats)
        })
    }

    fn get_chunks<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Result<Vec<DocumentChunk>>> {
        Box::pin(self.fetch_chunks(ids))
    }

    fn relationships_for<'a>(
        &'a self,
        node_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<GraphRelationship>>> {
        Box::pin(async move {
            let rows: Vec<(String, String, String, String)> = sqlx::query_as(
                "SELECT from_id, to_id, kind, properties FROM graph_edges
                 WHERE from_id = ? OR to_id = ?
                 ORDER BY kind, from_id, to_id",
            )
            .bind(node_id)
            .bind(node_id)
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter().map(row_to_relationship).collect()
        })
    }

    fn delete_relationships_from<'a>(
        &'a self,
        from_ids: &'a [String],
        kinds: &'a [RelationshipType],
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            for batch in from_ids.chunks(MAX_BIND) {
                let mut qb = QueryBuilder::new("DELETE FROM graph_edges WHERE from_id IN (");
                push_ids(&mut qb, batch);
                qb.push(")");
                if !kinds.is_empty() {
                    qb.push(" AND kind IN (");
                    let mut sep = qb.separated(", ");
                    for kind in kinds {
                        sep.push_bind(kind.as_str());
                    }
                    qb.push(")");
                }
                qb.build().execute(&mut *tx).await?;
            }
            tx.commit().await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::connect;

    async fn store() -> SqliteGraphStore {
        let pool = connect(":memory:").await.unwrap();
        let store = SqliteGraphStore::new(pool);
        store.initialize().await.unwrap();
        store
    }

    fn chunk(file: &str, symbol: &str, start: usize) -> DocumentChunk {
        DocumentChunk::new(
            format!("function {symbol}() {{}}"),
            ChunkMetadata {
                file_path: file.into(),
                line_start: start,
                line_end: start + 1,
                chunk_type: ChunkType::Function,
                symbol_name: Some(symbol.into()),
                symbol_kind: Some("function".into()),
            },
        )
    }

    fn file_graph(path: &str, chunks: Vec<DocumentChunk>) -> FileGraph {
        let relationships = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| {
                GraphRelationship::new(path, c.id.clone(), RelationshipType::Contains)
                    .with_property("order", i)
            })
            .collect();
        FileGraph {
            path: path.into(),
            language: "typescript".into(),
            lines_of_code: 10,
            chunks,
            relationships,
        }
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let s = store().await;
        s.initialize().await.unwrap();
        assert_eq!(s.get_stats().await.unwrap(), GraphStats::default());
    }

    #[tokio::test]
    async fn create_nodes_and_read_back() {
        let s = store().await;
        let a = chunk("a.ts", "add", 1);
        let b = chunk("a.ts", "sub", 5);
        s.create_file_node("a.ts", "typescript", 10).await.unwrap();
        s.create_chunk_nodes(&[b.clone(), a.clone()]).await.unwrap();
        s.create_relationships(&[GraphRelationship::new(
            "a.ts",
            a.id.clone(),
            RelationshipType::Contains,
        )])
        .await
        .unwrap();

        let chunks = s.get_file_chunks("a.ts").await.unwrap();
        assert_eq!(chunks, vec![a.clone(), b]);

        let files = s.list_all_files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].lines_of_code, 10);

        let rels = s.relationships_for(&a.id).await.unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].kind, RelationshipType::Contains);
    }

    #[tokio::test]
    async fn replace_file_twice_does_not_duplicate() {
        let s = store().await;
        let graph = file_graph("a.ts", vec![chunk("a.ts", "add", 1)]);
        s.replace_file(&graph).await.unwrap();
        s.replace_file(&graph).await.unwrap();

        let stats = s.get_stats().await.unwrap();
        assert_eq!(stats.files, 1);
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.relationships, 1);
        assert_eq!(stats.relationships_by_type["CONTAINS"], 1);
    }

    #[tokio::test]
    async fn replace_file_drops_removed_symbols_and_their_incoming_edges() {
        let s = store().await;
        let add = chunk("a.ts", "add", 1);
        let sub = chunk("a.ts", "sub", 5);
        let caller = chunk("b.ts", "main", 1);
        s.replace_file(&file_graph("a.ts", vec![add.clone(), sub.clone()]))
            .await
            .unwrap();
        s.replace_file(&file_graph("b.ts", vec![caller.clone()]))
            .await
            .unwrap();
        s.create_relationships(&[
            GraphRelationship::new(caller.id.clone(), add.id.clone(), RelationshipType::ImportsSymbol),
            GraphRelationship::new(caller.id.clone(), sub.id.clone(), RelationshipType::ImportsSymbol),
            GraphRelationship::new("b.ts", "a.ts", RelationshipType::Imports),
        ])
        .await
        .unwrap();

        s.replace_file(&file_graph("a.ts", vec![add.clone()]))
            .await
            .unwrap();

        assert!(s.get_chunks(&[sub.id.clone()]).await.unwrap().is_empty());
        let into_add = s.relationships_for(&add.id).await.unwrap();
        assert!(into_add.iter().any(|r| r.from == caller.id));
        assert!(s.relationships_for(&sub.id).await.unwrap().is_empty());
        let into_file = s.relationships_for("a.ts").await.unwrap();
        assert!(into_file.iter().any(|r| r.kind == RelationshipType::Imports));
    }

    #[tokio::test]
    async fn delete_file_removes_everything_touching_it() {
        let s = store().await;
        let add = chunk("a.ts", "add", 1);
        let main = chunk("b.ts", "main", 1);
        s.replace_file(&file_graph("a.ts", vec![add.clone()]))
            .await
            .unwrap();
        s.replace_file(&file_graph("b.ts", vec![main.clone()]))
            .await
            .unwrap();
        s.create_relationships(&[
            GraphRelationship::new(main.id.clone(), add.id.clone(), RelationshipType::ImportsSymbol),
            GraphRelationship::new("b.ts", "a.ts", RelationshipType::Imports),
            GraphRelationship::new("a.ts", "pkg:react@18.3.1", RelationshipType::ImportsPkg),
        ])
        .await
        .unwrap();

        s.delete_file("a.ts").await.unwrap();

        assert!(s.get_file_chunks("a.ts").await.unwrap().is_empty());
        assert!(s.relationships_for("a.ts").await.unwrap().is_empty());
        assert!(s.relationships_for(&add.id).await.unwrap().is_empty());
        let stats = s.get_stats().await.unwrap();
        assert_eq!(stats.files, 1);
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.relationships, 1);
    }

    #[tokio::test]
    async fn delete_missing_file_is_noop() {
        let s = store().await;
        s.delete_file("nope.ts").await.unwrap();
    }

    #[tokio::test]
    async fn related_chunks_respect_depth() {
        let s = store().await;
        let a = chunk("a.ts", "a", 1);
        let b = chunk("a.ts", "b", 5);
        let c = chunk("c.ts", "c", 1);
        s.create_chunk_nodes(&[a.clone(), b.clone(), c.clone()])
            .await
            .unwrap();
        s.create_relationships(&[
            GraphRelationship::new(a.id.clone(), b.id.clone(), RelationshipType::References),
            GraphRelationship::new(c.id.clone(), b.id.clone(), RelationshipType::ImportsSymbol),
        ])
        .await
        .unwrap();

        let seeds = vec![a.id.clone()];
        let depth0 = s.get_related_chunks(&seeds, 0).await.unwrap();
        assert!(depth0.is_empty());
        let depth1 = s.get_related_chunks(&seeds, 1).await.unwrap();
        assert_eq!(depth1, vec![b.clone()]);
        let depth2 = s.get_related_chunks(&seeds, 2).await.unwrap();
        assert_eq!(depth2, vec![b, c]);
    }

    #[tokio::test]
    async fn traversal_does_not_expand_package_nodes() {
        let s = store().await;
        let a = chunk("a.ts", "a", 1);
        let b = chunk("b.ts", "b", 1);
        s.create_chunk_nodes(&[a.clone(), b.clone()]).await.unwrap();
        s.create_relationships(&[
            GraphRelationship::new(a.id.clone(), "pkg:react@18.3.1", RelationshipType::ImportsPkg),
            GraphRelationship::new(b.id.clone(), "pkg:react@18.3.1", RelationshipType::ImportsPkg),
        ])
        .await
        .unwrap();
        let related = s.get_related_chunks(&[a.id.clone()], 3).await.unwrap();
        assert!(related.is_empty());
    }

    #[tokio::test]
    async fn delete_relationships_from_filters_by_kind() {
        let s = store().await;
        s.create_relationships(&[
            GraphRelationship::new("a.ts", "b.ts", RelationshipType::Imports),
            GraphRelationship::new("a.ts", "x", RelationshipType::Contains),
        ])
        .await
        .unwrap();
        s.delete_relationships_from(&["a.ts".to_owned()], &[RelationshipType::Imports])
            .await
            .unwrap();
        let rels = s.relationships_for("a.ts").await.unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].kind, RelationshipType::Contains);

        s.delete_relationships_from(&["a.ts".to_owned()], &[])
            .await
            .unwrap();
        assert!(s.relationships_for("a.ts").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn relationship_properties_roundtrip() {
        let s = store().await;
        let rel = GraphRelationship::new("a.ts", "pkg:react@18.3.1", RelationshipType::ImportsPkg)
            .with_property("confidence", 1.0)
            .with_property("source", "lockfile");
        s.create_relationships(std::slice::from_ref(&rel))
            .await
            .unwrap();
        let back = s.relationships_for("a.ts").await.unwrap();
        assert_eq!(back, vec![rel]);
    }
}
