//! Workspace enumeration and change detection against the persisted file index.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use ignore::WalkBuilder;
use ignore::gitignore::Gitignore;
use ignore::overrides::{Override, OverrideBuilder};

use crate::error::{IndexError, Result};
use crate::file_index::{FileIndexEntry, HASH_ALGORITHM, HashStatus};
use crate::languages::detect_language;

/// Directory names skipped in every workspace.
pub const DEFAULT_IGNORES: &[&str] = &["node_modules", "target", "dist", "build", "vendor"];

pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub root: PathBuf,
    /// Extra gitignore-style globs, on top of [`DEFAULT_IGNORES`].
    pub ignore_patterns: Vec<String>,
    /// Files larger than this are recorded but not indexed.
    pub max_file_size: u64,
}

impl DiscoveryConfig {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignore_patterns: Vec::new(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Result of one walk.
#[derive(Debug, Default)]
pub struct Discovered {
    pub entries: Vec<FileIndexEntry>,
    /// Per-file failures that were skipped.
    pub errors: Vec<String>,
}

/// Enumerates indexable files under a root.
#[derive(Debug, Clone)]
pub struct Discovery {
    config: DiscoveryConfig,
    overrides: Override,
    gitignore: Gitignore,
}

impl Discovery {
    /// # Errors
    ///
    /// Returns [`IndexError::Discovery`] if an ignore pattern is not a valid glob.
    pub fn new(config: DiscoveryConfig) -> Result<Self> {
        let mut builder = OverrideBuilder::new(&config.root);
        for pattern in DEFAULT_IGNORES
            .iter()
            .copied()
            .chain(config.ignore_patterns.iter().map(String::as_str))
        {
            builder
                .add(&format!("!{pattern}"))
                .map_err(|e| IndexError::Discovery(format!("ignore pattern {pattern}: {e}")))?;
        }
        let overrides = builder
            .build()
            .map_err(|e| IndexError::Discovery(format!("ignore patterns: {e}")))?;
        let (gitignore, err) = Gitignore::new(config.root.join(".gitignore"));
        if let Some(e) = err {
            tracing::debug!("partial .gitignore: {e}");
        }
        Ok(Self {
            config,
            overrides,
            gitignore,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    #[must_use]
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Workspace-relative `/`-separated form of `abs`, if it lies under the root.
    #[must_use]
    pub fn relative_path(&self, abs: &Path) -> Option<String> {
        let rel = abs.strip_prefix(&self.config.root).ok()?;
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        (!parts.is_empty()).then(|| parts.join("/"))
    }

    /// Whether a walk would skip `rel`: a dot-prefixed segment, an ignore
    /// pattern on it or any parent, or the root `.gitignore`.
    #[must_use]
    pub fn is_ignored(&self, rel: &str) -> bool {
        if rel.split('/').any(|seg| seg.starts_with('.') && seg.len() > 1) {
            return true;
        }
        let abs = self.config.root.join(rel);
        let mut prefix = PathBuf::new();
        let segments: Vec<&str> = rel.split('/').collect();
        for (i, segment) in segments.iter().enumerate() {
            prefix.push(segment);
            let is_dir = i + 1 < segments.len();
            if self
                .overrides
                .matched(self.config.root.join(&prefix), is_dir)
                .is_ignore()
            {
                return true;
            }
        }
        self.gitignore
            .matched_path_or_any_parents(&abs, false)
            .is_ignore()
    }

    /// Walk the workspace and inspect every indexable file.
    ///
    /// Blocking; run it on a blocking thread from async code.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Discovery`] if the root is missing or not a directory.
    pub fn discover(&self) -> Result<Discovered> {
        let root = &self.config.root;
        if !root.is_dir() {
            return Err(IndexError::Discovery(format!(
                "workspace root {} is not a directory",
                root.display()
            )));
        }

        let mut discovered = Discovered::default();
        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .require_git(false)
            .overrides(self.overrides.clone())
            .build();

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("discovery skipped an entry: {e}");
                    discovered.errors.push(e.to_string());
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            match self.inspect(entry.path()) {
                Ok(Some(file)) => discovered.entries.push(file),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), "discovery skipped file: {e}");
                    discovered
                        .errors
                        .push(format!("{}: {e}", entry.path().display()));
                }
            }
        }

        discovered.entries.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!(
            files = discovered.entries.len(),
            errors = discovered.errors.len(),
            "discovery finished"
        );
        Ok(discovered)
    }

    /// Stat and hash one file. `None` when the path is outside the root or
    /// has no supported language.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Discovery`] if the file cannot be stat'ed.
    pub fn inspect(&self, abs: &Path) -> Result<Option<FileIndexEntry>> {
        let Some(path) = self.relative_path(abs) else {
            return Ok(None);
        };
        let Some(lang) = detect_language(abs) else {
            return Ok(None);
        };
        let meta = std::fs::metadata(abs)
            .map_err(|e| IndexError::Discovery(format!("stat {path}: {e}")))?;
        let modified_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .and_then(|d| i64::try_from(d.as_millis()).ok())
            .unwrap_or(0);

        let mut entry = FileIndexEntry {
            path,
            available: false,
            deleted: false,
            size: meta.len(),
            modified_ms,
            hash_algorithm: HASH_ALGORITHM.to_owned(),
            hash: String::new(),
            hash_status: HashStatus::Skipped,
            language: Some(lang.id().to_owned()),
            last_indexed_at: None,
            last_indexed_hash: None,
            last_failed_hash: None,
        };

        if entry.size == 0 || entry.size > self.config.max_file_size {
            tracing::debug!(path = %entry.path, size = entry.size, "not indexing file");
            return Ok(Some(entry));
        }

        match std::fs::read(abs) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => {
                tracing::debug!(path = %entry.path, "not indexing blank file");
            }
            Ok(bytes) => {
                entry.hash = hash_bytes(&bytes);
                entry.hash_status = HashStatus::Computed;
                entry.available = true;
            }
            Err(e) => {
                tracing::warn!(path = %entry.path, "hashing failed: {e}");
                entry.hash_status = HashStatus::Failed;
            }
        }
        Ok(Some(entry))
    }
}

/// BLAKE3 hex digest.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Classification of discovered files against the persisted index.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub new: Vec<FileIndexEntry>,
    pub modified: Vec<FileIndexEntry>,
    pub unchanged: Vec<String>,
    /// Indexed before, absent from disk now.
    pub deleted: Vec<String>,
    /// Still on disk but no longer indexable (emptied, blanked or grown past
    /// the size limit) while the graph holds an older version.
    pub withdrawn: Vec<String>,
}

impl ChangeSet {
    /// Files that need (re)indexing.
    pub fn dirty(&self) -> impl Iterator<Item = &FileIndexEntry> {
        self.new.iter().chain(&self.modified)
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        !(self.new.is_empty()
            && self.modified.is_empty()
            && self.deleted.is_empty()
            && self.withdrawn.is_empty())
    }
}

/// Compare a fresh walk with what the index last recorded.
///
/// A file whose last index attempt never completed is dirty even when its
/// hash is unchanged, unless that attempt failed for good at the same hash.
#[must_use]
pub fn diff(current: &[FileIndexEntry], known: &HashMap<String, FileIndexEntry>) -> ChangeSet {
    let mut changes = ChangeSet::default();
    let mut seen = HashSet::with_capacity(current.len());

    for entry in current {
        seen.insert(entry.path.as_str());
        let previous = known.get(&entry.path);

        if !entry.available {
            if entry.hash_status == HashStatus::Skipped && previous.is_some_and(|p| p.was_indexed()) {
                changes.withdrawn.push(entry.path.clone());
            }
            continue;
        }

        let mut merged = entry.clone();
        if let Some(previous) = previous {
            merged.last_indexed_at.clone_from(&previous.last_indexed_at);
            merged.last_indexed_hash.clone_from(&previous.last_indexed_hash);
            merged.last_failed_hash.clone_from(&previous.last_failed_hash);
        }
        match previous {
            None => changes.new.push(merged),
            Some(_) if !merged.is_dirty() => changes.unchanged.push(merged.path),
            Some(_) if !merged.was_indexed() => changes.new.push(merged),
            Some(_) => changes.modified.push(merged),
        }
    }

    changes.deleted = known
        .keys()
        .filter(|path| !seen.contains(path.as_str()))
        .cloned()
        .collect();
    changes.deleted.sort();
    changes
}
