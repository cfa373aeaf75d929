use std::io::Write;
use std::path::Path;
use std::time::Duration;

use codeweave_queue::EmptyOutputPolicy;
use serial_test::serial;

use super::*;

const ENV_KEYS: [&str; 19] = [
    "CODEWEAVE_ROOT",
    "CODEWEAVE_IGNORE",
    "CODEWEAVE_MAX_FILE_SIZE",
    "CODEWEAVE_QUEUE_CONCURRENCY",
    "CODEWEAVE_QUEUE_MAX_RETRIES",
    "CODEWEAVE_QUEUE_RETRY_DELAY_MS",
    "CODEWEAVE_QUEUE_EMPTY_OUTPUT",
    "CODEWEAVE_SQLITE_PATH",
    "CODEWEAVE_QDRANT_URL",
    "CODEWEAVE_VECTOR_ENABLED",
    "CODEWEAVE_VECTOR_BACKEND",
    "CODEWEAVE_EMBEDDING_PROVIDER",
    "CODEWEAVE_EMBEDDING_BASE_URL",
    "CODEWEAVE_EMBEDDING_MODEL",
    "CODEWEAVE_EMBEDDING_BATCH_SIZE",
    "CODEWEAVE_SEARCH_LIMIT",
    "CODEWEAVE_SEARCH_DEPTH",
    "CODEWEAVE_CONFIG",
    "RUST_LOG",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

#[test]
fn defaults_when_file_missing() {
    let config = Config::default();
    assert_eq!(config.workspace.root, Path::new("."));
    assert!(config.workspace.ignore.is_empty());
    assert_eq!(config.workspace.max_file_size, 1024 * 1024);
    assert_eq!(config.queue.concurrency, 2);
    assert_eq!(config.queue.max_retries, 3);
    assert_eq!(config.queue.retry_delay_ms, 5000);
    assert_eq!(config.queue.empty_output, EmptyOutputPolicy::Fail);
    assert_eq!(config.storage.sqlite_path, ".codeweave/codeweave.db");
    assert!(config.storage.vector_enabled);
    assert_eq!(config.storage.vector_backend, VectorBackend::Memory);
    assert!(config.storage.qdrant_url.is_none());
    assert_eq!(config.embedding.provider, EmbeddingProviderKind::Ollama);
    assert_eq!(config.embedding.batch_size, 32);
    assert_eq!(config.search.limit, 10);
    assert_eq!(config.search.depth, 1);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn load_missing_file_uses_defaults() {
    clear_env();
    let config = Config::load(Path::new("/nonexistent/codeweave.toml")).unwrap();
    assert_eq!(config.queue.concurrency, 2);
}

#[test]
#[serial]
fn parse_valid_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("codeweave.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(
        f,
        r#"
[workspace]
root = "/srv/repo"
ignore = ["generated/**", "*.min.js"]

[queue]
concurrency = 4
empty_output = "succeed"

[storage]
sqlite_path = "/tmp/cw.db"
vector_backend = "qdrant"
qdrant_url = "http://localhost:6334"

[embedding]
provider = "hash"
dimensions = 64
"#
    )
    .unwrap();

    clear_env();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.workspace.root, Path::new("/srv/repo"));
    assert_eq!(config.workspace.ignore, ["generated/**", "*.min.js"]);
    assert_eq!(config.queue.concurrency, 4);
    assert_eq!(config.queue.max_retries, 3);
    assert_eq!(config.queue.empty_output, EmptyOutputPolicy::Succeed);
    assert_eq!(config.storage.vector_backend, VectorBackend::Qdrant);
    assert_eq!(config.embedding.provider, EmbeddingProviderKind::Hash);
    assert_eq!(config.embedding.dimensions, 64);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn invalid_toml_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[queue]\nconcurrency = \"many\"\n").unwrap();
    clear_env();
    let err = Config::load(&path).unwrap_err();
    assert!(err.to_string().contains("failed to parse config file"));
}

#[test]
#[serial]
fn env_overrides_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("codeweave.toml");
    std::fs::write(&path, "[queue]\nconcurrency = 4\n").unwrap();

    clear_env();
    unsafe {
        std::env::set_var("CODEWEAVE_QUEUE_CONCURRENCY", "8");
        std::env::set_var("CODEWEAVE_IGNORE", "gen/**, ,fixtures");
        std::env::set_var("CODEWEAVE_EMBEDDING_PROVIDER", "hash");
        std::env::set_var("CODEWEAVE_VECTOR_ENABLED", "false");
        std::env::set_var("CODEWEAVE_SEARCH_DEPTH", "2");
    }

    let config = Config::load(&path).unwrap();
    clear_env();

    assert_eq!(config.queue.concurrency, 8);
    assert_eq!(config.workspace.ignore, ["gen/**", "fixtures"]);
    assert_eq!(config.embedding.provider, EmbeddingProviderKind::Hash);
    assert!(!config.storage.vector_enabled);
    assert_eq!(config.search.depth, 2);
}

#[test]
#[serial]
fn invalid_env_values_are_ignored() {
    clear_env();
    unsafe {
        std::env::set_var("CODEWEAVE_QUEUE_CONCURRENCY", "lots");
        std::env::set_var("CODEWEAVE_EMBEDDING_PROVIDER", "word2vec");
        std::env::set_var("CODEWEAVE_QUEUE_EMPTY_OUTPUT", "explode");
    }

    let config = Config::load(Path::new("/nonexistent/codeweave.toml")).unwrap();
    clear_env();

    assert_eq!(config.queue.concurrency, 2);
    assert_eq!(config.embedding.provider, EmbeddingProviderKind::Ollama);
    assert_eq!(config.queue.empty_output, EmptyOutputPolicy::Fail);
}

#[test]
fn validate_rejects_zero_concurrency() {
    let mut config = Config::default();
    config.queue.concurrency = 0;
    assert!(config.validate().unwrap_err().to_string().contains("concurrency"));
}

#[test]
fn validate_rejects_zero_batch_size() {
    let mut config = Config::default();
    config.embedding.batch_size = 0;
    assert!(config.validate().unwrap_err().to_string().contains("batch_size"));
}

#[test]
fn validate_requires_qdrant_url() {
    let mut config = Config::default();
    config.storage.vector_backend = VectorBackend::Qdrant;
    assert!(config.validate().is_err());

    config.storage.qdrant_url = Some("  ".into());
    assert!(config.validate().is_err());

    config.storage.qdrant_url = Some("http://localhost:6334".into());
    assert!(config.validate().is_ok());

    config.storage.qdrant_url = None;
    config.storage.vector_enabled = false;
    assert!(config.validate().is_ok());
}

#[test]
fn relative_paths_resolve_against_workspace() {
    let config = Config::default();
    let root = config.workspace_root(Path::new("/work"));
    assert_eq!(root, Path::new("/work/."));
    assert_eq!(
        config.sqlite_path(Path::new("/work")),
        "/work/.codeweave/codeweave.db"
    );

    let mut config = Config::default();
    config.storage.sqlite_path = ":memory:".into();
    config.workspace.root = "/abs/repo".into();
    assert_eq!(config.sqlite_path(Path::new("/work")), ":memory:");
    assert_eq!(config.workspace_root(Path::new("/work")), Path::new("/abs/repo"));
}

#[test]
fn queue_config_converts_millis() {
    let mut config = Config::default();
    config.queue.retry_delay_ms = 250;
    config.queue.tick_ms = 50;
    let queue = config.queue_config();
    assert_eq!(queue.retry_delay, Duration::from_millis(250));
    assert_eq!(queue.tick, Duration::from_millis(50));
    assert_eq!(queue.concurrency, 2);
}
