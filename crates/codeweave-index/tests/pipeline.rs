use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use codeweave_index::{
    Discovery, DiscoveryConfig, FileIndexStore, FileProcessor, IndexCoordinator, PackageResolver,
    RelationshipExtractor, ResolutionSource, TreeSitterChunker, WorkspaceScanner,
};
use codeweave_queue::{ProcessingQueue, QueueConfig, TaskStore};
use codeweave_store::{
    ChunkVectorStore, GraphStore, HashEmbedder, InMemoryVectorStore, RelationshipType,
    SqliteGraphStore,
};

async fn workspace(root: &Path) -> WorkspaceScanner {
    let pool = codeweave_store::connect(":memory:").await.unwrap();
    let graph: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::new(pool.clone()));
    let resolver = Arc::new(PackageResolver::new(root));
    let coordinator = Arc::new(
        IndexCoordinator::new(graph, Arc::new(RelationshipExtractor::new(resolver)))
            .with_vectors(
                ChunkVectorStore::new(Arc::new(InMemoryVectorStore::new())),
                Arc::new(HashEmbedder::new(128)),
            )
            .with_batch_size(8),
    );
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

const ADD: &str = "export function add(a: number, b: number): number {\n  return a + b;\n}\n";

#[tokio::test]
async fn indexes_file_and_finds_it_by_search() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "add.ts", ADD);
    let scanner = workspace(dir.path()).await;

    let report = scanner.scan().await.unwrap();
    assert_eq!(report.processed, 1);
    assert!(report.failed.is_empty());

    let coordinator = scanner.coordinator();
    let files = coordinator.graph().list_all_files().await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, "add.ts");

    let chunks = coordinator.graph().get_file_chunks("add.ts").await.unwrap();
    assert!(!chunks.is_empty());
    let stats = coordinator.stats().await.unwrap();
    assert!(stats.relationships_by_type["CONTAINS"] >= 1);

    let results = coordinator.hybrid_search("add", 5, 1).await.unwrap();
    assert!(
        results
            .direct
            .iter()
            .any(|hit| hit.chunk.symbol_name() == Some("add"))
    );
}

#[tokio::test]
async fn rescan_is_a_noop_and_does_not_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "add.ts", ADD);
    write(dir.path(), "src/math.py", "def square(x):\n    return x * x\n");
    let scanner = workspace(dir.path()).await;

    scanner.scan().await.unwrap();
    let before = scanner.coordinator().stats().await.unwrap();

    let again = scanner.scan().await.unwrap();
    assert_eq!(again.enqueued, 0);
    assert_eq!(again.unchanged, 2);
    assert_eq!(scanner.coordinator().stats().await.unwrap(), before);
}

#[tokio::test]
async fn relative_import_becomes_imports_edge() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(
        root,
        "src/util.ts",
        "export function clamp(v: number, lo: number, hi: number): number {\n  return Math.min(Math.max(v, lo), hi);\n}\n",
    );
    write(
        root,
        "src/a.ts",
        "import { clamp } from \"./util\";\n\nexport function percent(v: number): number {\n  return clamp(v, 0, 100);\n}\n",
    );
    let scanner = workspace(root).await;
    let report = scanner.scan().await.unwrap();
    assert!(report.links >= 1);

    let edges = scanner
        .coordinator()
        .graph()
        .relationships_for("src/a.ts")
        .await
        .unwrap();
    assert!(edges.iter().any(|e| e.kind == RelationshipType::Imports
        && e.from == "src/a.ts"
        && e.to == "src/util.ts"));

    let stats = scanner.coordinator().stats().await.unwrap();
    assert!(stats.relationships_by_type["IMPORTS_SYMBOL"] >= 1);
}

#[tokio::test]
async fn deleted_file_is_cleaned_up() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "src/util.ts", "export const one = (): number => 1;\n");
    write(
        root,
        "src/a.ts",
        "import { one } from './util';\nexport function two(): number {\n  return one() + one();\n}\n",
    );
    let scanner = workspace(root).await;
    scanner.scan().await.unwrap();

    let graph = scanner.coordinator().graph();
    let a_chunks = graph.get_file_chunks("src/a.ts").await.unwrap();
    assert!(!a_chunks.is_empty());

    std::fs::remove_file(root.join("src/a.ts")).unwrap();
    let report = scanner.scan().await.unwrap();
    assert_eq!(report.deleted, 1);

    let files = graph.list_all_files().await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, "src/util.ts");
    assert!(graph.get_file_chunks("src/a.ts").await.unwrap().is_empty());
    assert!(graph.relationships_for("src/a.ts").await.unwrap().is_empty());
    for chunk in &a_chunks {
        assert!(graph.relationships_for(&chunk.id).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn external_import_is_labelled_from_lockfile() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(
        root,
        "package.json",
        r#"{ "name": "app", "dependencies": { "react": "^18.2.0" } }"#,
    );
    write(
        root,
        "package-lock.json",
        r#"{
  "name": "app",
  "lockfileVersion": 3,
  "packages": {
    "": { "name": "app" },
    "node_modules/react": { "version": "18.3.1", "integrity": "sha512-abc" }
  }
}"#,
    );
    write(
        root,
        "node_modules/react/package.json",
        r#"{ "name": "react", "version": "18.2.0" }"#,
    );
    write(
        root,
        "src/app.ts",
        "import { useState } from \"react\";\n\nexport function counter() {\n  return useState(0);\n}\n",
    );
    let scanner = workspace(root).await;
    scanner.scan().await.unwrap();

    let edges = scanner
        .coordinator()
        .graph()
        .relationships_for("src/app.ts")
        .await
        .unwrap();
    let pkg = edges
        .iter()
        .find(|e| e.kind == RelationshipType::ImportsPkg)
        .unwrap();
    assert_eq!(pkg.to, "pkg:react@18.3.1");
    assert_eq!(pkg.properties["source"], "lockfile");
    assert_eq!(pkg.properties["confidence"], 1.0);

    let resolution = scanner
        .coordinator()
        .extractor()
        .resolver()
        .resolve("react", &root.join("src/app.ts"));
    assert_eq!(resolution.source, ResolutionSource::Lockfile);
}
