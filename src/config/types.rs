use std::path::PathBuf;

use codeweave_queue::EmptyOutputPolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub queue: QueueSection,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_file_size() -> u64 {
    codeweave_index::discovery::DEFAULT_MAX_FILE_SIZE
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WorkspaceConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Extra gitignore-style globs, on top of the built-in ones.
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            ignore: Vec::new(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_concurrency() -> usize {
    2
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5000
}

fn default_tick_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Serialize)]
pub struct QueueSection {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default)]
    pub empty_output: EmptyOutputPolicy,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            tick_ms: default_tick_ms(),
            empty_output: EmptyOutputPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Process-local; the whole workspace is re-embedded on every start.
    #[default]
    Memory,
    Qdrant,
}

fn default_sqlite_path() -> String {
    ".codeweave/codeweave.db".into()
}

fn default_vector_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Relative paths resolve against the workspace root.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    #[serde(default = "default_vector_enabled")]
    pub vector_enabled: bool,
    #[serde(default)]
    pub vector_backend: VectorBackend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qdrant_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            vector_enabled: default_vector_enabled(),
            vector_backend: VectorBackend::default(),
            qdrant_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    #[default]
    Ollama,
    /// Deterministic token hashing, no model required.
    Hash,
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

fn default_batch_size() -> usize {
    32
}

fn default_dimensions() -> usize {
    384
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Only used by the hash provider.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            base_url: default_base_url(),
            model: default_embedding_model(),
            batch_size: default_batch_size(),
            dimensions: default_dimensions(),
        }
    }
}

fn default_search_limit() -> usize {
    10
}

fn default_search_depth() -> usize {
    1
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    #[serde(default = "default_search_depth")]
    pub depth: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_search_limit(),
            depth: default_search_depth(),
        }
    }
}
