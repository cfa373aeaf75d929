//! Incremental code indexing pipeline.
//!
//! Discovery diffs the workspace against a persisted file index, dirty files
//! go through the processing queue to a [`worker::FileProcessor`], which
//! chunks them with tree-sitter and hands them to the
//! [`coordinator::IndexCoordinator`] for embedding, graph writes and
//! relationship extraction. Once the queue drains, a cross-file pass links
//! relative imports.

pub mod chunker;
pub mod context;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod extractor;
pub mod file_index;
pub mod languages;
pub mod resolver;
pub mod scanner;
pub mod syntax;
pub mod watcher;
pub mod worker;

pub use chunker::{ChunkParser, ChunkerConfig, TreeSitterChunker};
pub use coordinator::{IndexCoordinator, IndexOutcome, SearchResults};
pub use discovery::{ChangeSet, Discovery, DiscoveryConfig};
pub use error::{IndexError, Result};
pub use extractor::{FileFacts, ImportInfo, RelationshipExtractor};
pub use file_index::{FileIndexEntry, FileIndexStore, HashStatus};
pub use resolver::{PackageResolution, PackageResolver, ResolutionSource};
pub use scanner::{ScanReport, WorkspaceScanner};
pub use watcher::WorkspaceWatcher;
pub use worker::FileProcessor;
