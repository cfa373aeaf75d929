//! `package.json` reading.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;

pub const MANIFEST_NAME: &str = "package.json";

/// Dependency groups consulted for a declared range, in priority order.
const DEPENDENCY_GROUPS: [&str; 4] = [
    "dependencies",
    "devDependencies",
    "peerDependencies",
    "optionalDependencies",
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(skip)]
    pub path: PathBuf,
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub dependencies: HashMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: HashMap<String, String>,
    #[serde(default)]
    pub peer_dependencies: HashMap<String, String>,
    #[serde(default)]
    pub optional_dependencies: HashMap<String, String>,
}

impl Manifest {
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut manifest: Self = serde_json::from_str(&content)?;
        manifest.path = path.to_path_buf();
        Ok(manifest)
    }

    /// Declared range for `name` and the group it was found in.
    #[must_use]
    pub fn declared_range(&self, name: &str) -> Option<(&'static str, &str)> {
        DEPENDENCY_GROUPS.into_iter().find_map(|group| {
            let deps = match group {
                "dependencies" => &self.dependencies,
                "devDependencies" => &self.dev_dependencies,
                "peerDependencies" => &self.peer_dependencies,
                _ => &self.optional_dependencies,
            };
            deps.get(name).map(|range| (group, range.as_str()))
        })
    }
}

/// Ranges that point into the local workspace rather than a registry.
#[must_use]
pub fn is_workspace_range(range: &str) -> bool {
    range.starts_with("workspace:") || range.starts_with("link:") || range.starts_with("file:")
}

/// Nearest directory at or above `start` holding a `package.json`,
/// not climbing past `ceiling`.
#[must_use]
pub fn find_manifest_dir(start: &Path, ceiling: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        if current.join(MANIFEST_NAME).is_file() {
            return Some(current.to_path_buf());
        }
        if current == ceiling {
            break;
        }
        dir = current.parent();
    }
    None
}

/// Version declared by an installed package under `node_modules`, searching
/// from `start` up to the filesystem root.
#[must_use]
pub fn installed_version(start: &Path, name: &str) -> Option<(PathBuf, String)> {
    start.ancestors().find_map(|dir| {
        let path = dir.join("node_modules").join(name).join(MANIFEST_NAME);
        if !path.is_file() {
            return None;
        }
        match Manifest::read(&path) {
            Ok(manifest) => manifest.version.map(|v| (path, v)),
            Err(e) => {
                tracing::debug!(path = %path.display(), "unreadable installed manifest: {e}");
                None
            }
        }
    })
}
