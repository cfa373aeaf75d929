mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use codeweave_index::DiscoveryConfig;
use codeweave_queue::QueueConfig;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.queue.concurrency == 0 {
            bail!("queue.concurrency must be at least 1");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be at least 1");
        }
        if self.embedding.provider == EmbeddingProviderKind::Hash && self.embedding.dimensions == 0
        {
            bail!("embedding.dimensions must be at least 1");
        }
        if self.storage.vector_enabled
            && self.storage.vector_backend == VectorBackend::Qdrant
            && self
                .storage
                .qdrant_url
                .as_deref()
                .is_none_or(|url| url.trim().is_empty())
        {
            bail!("storage.vector_backend = \"qdrant\" requires storage.qdrant_url");
        }
        Ok(())
    }

    /// Workspace root with `base` applied to a relative setting.
    #[must_use]
    pub fn workspace_root(&self, base: &Path) -> PathBuf {
        if self.workspace.root.is_absolute() {
            self.workspace.root.clone()
        } else {
            base.join(&self.workspace.root)
        }
    }

    /// `SQLite` location; relative paths live under the workspace root.
    #[must_use]
    pub fn sqlite_path(&self, root: &Path) -> String {
        let path = &self.storage.sqlite_path;
        if path == ":memory:" || Path::new(path).is_absolute() {
            path.clone()
        } else {
            root.join(path).to_string_lossy().into_owned()
        }
    }

    #[must_use]
    pub fn discovery_config(&self, root: &Path) -> DiscoveryConfig {
        DiscoveryConfig {
            root: root.to_path_buf(),
            ignore_patterns: self.workspace.ignore.clone(),
            max_file_size: self.workspace.max_file_size,
        }
    }

    #[must_use]
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            concurrency: self.queue.concurrency,
            max_retries: self.queue.max_retries,
            retry_delay: Duration::from_millis(self.queue.retry_delay_ms),
            tick: Duration::from_millis(self.queue.tick_ms),
            empty_output: self.queue.empty_output,
        }
    }
}
