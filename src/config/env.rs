use std::path::PathBuf;

use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CODEWEAVE_ROOT") {
            self.workspace.root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CODEWEAVE_IGNORE") {
            self.workspace.ignore = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(v) = std::env::var("CODEWEAVE_MAX_FILE_SIZE")
            && let Ok(size) = v.parse::<u64>()
        {
            self.workspace.max_file_size = size;
        }

        if let Ok(v) = std::env::var("CODEWEAVE_QUEUE_CONCURRENCY")
            && let Ok(n) = v.parse::<usize>()
        {
            self.queue.concurrency = n;
        }
        if let Ok(v) = std::env::var("CODEWEAVE_QUEUE_MAX_RETRIES")
            && let Ok(n) = v.parse::<u32>()
        {
            self.queue.max_retries = n;
        }
        if let Ok(v) = std::env::var("CODEWEAVE_QUEUE_RETRY_DELAY_MS")
            && let Ok(ms) = v.parse::<u64>()
        {
            self.queue.retry_delay_ms = ms;
        }
        if let Ok(v) = std::env::var("CODEWEAVE_QUEUE_EMPTY_OUTPUT") {
            if let Ok(policy) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.queue.empty_output = policy;
            } else {
                tracing::warn!("ignoring invalid CODEWEAVE_QUEUE_EMPTY_OUTPUT value: {v}");
            }
        }

        if let Ok(v) = std::env::var("CODEWEAVE_SQLITE_PATH") {
            self.storage.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("CODEWEAVE_QDRANT_URL") {
            self.storage.qdrant_url = Some(v);
        }
        if let Ok(v) = std::env::var("CODEWEAVE_VECTOR_ENABLED")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.storage.vector_enabled = enabled;
        }
        if let Ok(v) = std::env::var("CODEWEAVE_VECTOR_BACKEND") {
            if let Ok(backend) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.storage.vector_backend = backend;
            } else {
                tracing::warn!("ignoring invalid CODEWEAVE_VECTOR_BACKEND value: {v}");
            }
        }

        if let Ok(v) = std::env::var("CODEWEAVE_EMBEDDING_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.embedding.provider = kind;
            } else {
                tracing::warn!("ignoring invalid CODEWEAVE_EMBEDDING_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("CODEWEAVE_EMBEDDING_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Ok(v) = std::env::var("CODEWEAVE_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Ok(v) = std::env::var("CODEWEAVE_EMBEDDING_BATCH_SIZE")
            && let Ok(n) = v.parse::<usize>()
        {
            self.embedding.batch_size = n;
        }

        if let Ok(v) = std::env::var("CODEWEAVE_SEARCH_LIMIT")
            && let Ok(n) = v.parse::<usize>()
        {
            self.search.limit = n;
        }
        if let Ok(v) = std::env::var("CODEWEAVE_SEARCH_DEPTH")
            && let Ok(n) = v.parse::<usize>()
        {
            self.search.depth = n;
        }
    }
}
