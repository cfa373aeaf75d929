//! External package version resolution.
//!
//! Resolution walks a ladder of progressively weaker sources and stops at
//! the first hit: the workspace lockfile, an installed
//! `node_modules/<name>/package.json`, the nearest declaring `package.json`.
//! URL and git specifiers bypass the ladder. Nothing here touches the network
//! and nothing here fails: unreadable inputs are logged and skipped.

mod cache;
pub mod lockfile;
pub mod manifest;
pub mod specifier;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

pub use cache::ResolverCache;
pub use specifier::{ParsedSpecifier, SpecifierKind, classify, is_external, parse_specifier};

use lockfile::Lockfile;
use manifest::{Manifest, find_manifest_dir, installed_version, is_workspace_range};

/// Whether `path` is a manifest or lockfile the resolver reads.
#[must_use]
pub fn is_package_metadata(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n == manifest::MANIFEST_NAME || lockfile::LOCKFILE_NAMES.contains(&n))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Lockfile,
    NodeModules,
    Manifest,
    Unknown,
    Url,
    Git,
    Builtin,
}

impl ResolutionSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lockfile => "lockfile",
            Self::NodeModules => "node_modules",
            Self::Manifest => "manifest",
            Self::Unknown => "unknown",
            Self::Url => "url",
            Self::Git => "git",
            Self::Builtin => "builtin",
        }
    }

    #[must_use]
    pub fn confidence(self) -> f32 {
        match self {
            Self::Lockfile | Self::Builtin => 1.0,
            Self::NodeModules => 0.95,
            Self::Git => 0.9,
            Self::Url => 0.8,
            Self::Manifest => 0.7,
            Self::Unknown => 0.5,
        }
    }
}

/// Best-effort answer to "which version of this package does the import use".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageResolution {
    pub name: String,
    pub subpath: Option<String>,
    /// Range declared in the nearest manifest.
    pub range: Option<String>,
    pub resolved: Option<String>,
    pub manager: Option<String>,
    pub lockfile: Option<String>,
    pub integrity: Option<String>,
    pub workspace: Option<String>,
    pub commit: Option<String>,
    pub url: Option<String>,
    pub source: ResolutionSource,
    pub confidence: f32,
}

impl PackageResolution {
    fn new(name: String, subpath: Option<String>, source: ResolutionSource) -> Self {
        Self {
            name,
            subpath,
            range: None,
            resolved: None,
            manager: None,
            lockfile: None,
            integrity: None,
            workspace: None,
            commit: None,
            url: None,
            source,
            confidence: source.confidence(),
        }
    }

    /// Version label for the package node id: resolved, else range.
    #[must_use]
    pub fn version_label(&self) -> Option<&str> {
        self.resolved.as_deref().or(self.range.as_deref())
    }

    /// Properties attached to an `IMPORTS_PKG` edge.
    #[must_use]
    pub fn to_properties(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut map)) => {
                map.retain(|_, v| !v.is_null());
                map
            }
            _ => serde_json::Map::new(),
        }
    }
}

/// Resolves external import specifiers for one workspace.
#[derive(Debug)]
pub struct PackageResolver {
    root: PathBuf,
    cache: ResolverCache,
}

impl PackageResolver {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: ResolverCache::default(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Drop cached data derived from `path` (absolute). Returns `true` when
    /// `path` is a lockfile or manifest.
    pub fn invalidate(&self, path: &Path) -> bool {
        self.cache.invalidate(path)
    }

    /// Resolve `specifier` as imported from `importing_file` (absolute path).
    #[must_use]
    pub fn resolve(&self, specifier: &str, importing_file: &Path) -> PackageResolution {
        match classify(specifier) {
            SpecifierKind::Url => {
                let mut res = PackageResolution::new(
                    specifier::url_package_name(specifier),
                    None,
                    ResolutionSource::Url,
                );
                res.resolved = specifier::url_version(specifier);
                res.url = Some(specifier.to_owned());
                res
            }
            SpecifierKind::Git => {
                let (name, commit) = specifier::git_parts(specifier);
                let mut res = PackageResolution::new(name, None, ResolutionSource::Git);
                res.commit = commit;
                res.url = Some(specifier.to_owned());
                res
            }
            SpecifierKind::Builtin => {
                let parsed = parse_specifier(specifier);
                let mut res =
                    PackageResolution::new(parsed.name, parsed.subpath, ResolutionSource::Builtin);
                res.manager = Some("builtin".to_owned());
                res
            }
            SpecifierKind::Package | SpecifierKind::Path => {
                self.resolve_package(parse_specifier(specifier), importing_file)
            }
        }
    }

    fn resolve_package(&self, parsed: ParsedSpecifier, importing_file: &Path) -> PackageResolution {
        let start = importing_file.parent().unwrap_or(&self.root);
        let manifest = self.nearest_manifest(start);
        let declared = manifest
            .as_ref()
            .and_then(|m| m.declared_range(&parsed.name))
            .map(|(_, range)| range.to_owned());

        if let Some(lock) = self.lockfile()
            && let Some(locked) = lock.get(&parsed.name)
        {
            let mut res =
                PackageResolution::new(parsed.name, parsed.subpath, ResolutionSource::Lockfile);
            res.resolved = Some(locked.version.clone());
            res.integrity.clone_from(&locked.integrity);
            res.manager = Some(lock.manager.clone());
            res.lockfile = Some(lock.file_name.clone());
            res.range = declared;
            return res;
        }

        if let Some((path, version)) = installed_version(start, &parsed.name) {
            tracing::debug!(package = %parsed.name, path = %path.display(), "resolved from node_modules");
            let mut res =
                PackageResolution::new(parsed.name, parsed.subpath, ResolutionSource::NodeModules);
            res.resolved = Some(version);
            res.range = declared;
            return res;
        }

        if manifest.is_some() {
            let mut res =
                PackageResolution::new(parsed.name, parsed.subpath, ResolutionSource::Manifest);
            match declared {
                Some(range) if is_workspace_range(&range) => res.workspace = Some(range),
                other => res.range = other,
            }
            return res;
        }

        PackageResolution::new(parsed.name, parsed.subpath, ResolutionSource::Unknown)
    }

    fn lockfile(&self) -> Option<Arc<Lockfile>> {
        self.cache
            .lockfile(&self.root, || match lockfile::load(&self.root) {
                Ok(lock) => lock,
                Err(e) => {
                    tracing::debug!(root = %self.root.display(), "lockfile unreadable: {e}");
                    None
                }
            })
    }

    fn nearest_manifest(&self, start: &Path) -> Option<Arc<Manifest>> {
        self.cache.manifest(start, || {
            let dir = find_manifest_dir(start, &self.root)?;
            match Manifest::read(&dir.join(manifest::MANIFEST_NAME)) {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    tracing::debug!(dir = %dir.display(), "manifest unreadable: {e}");
                    None
                }
            }
        })
    }
}
