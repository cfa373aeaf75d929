//! Lockfile readers: npm (nested map), yarn and pnpm (flat maps).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{IndexError, Result};

/// Lockfiles probed in the workspace root, in priority order.
pub const LOCKFILE_NAMES: [&str; 5] = [
    "package-lock.json",
    "npm-shrinkwrap.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lockb",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedPackage {
    pub version: String,
    pub integrity: Option<String>,
    pub resolved: Option<String>,
}

/// Pinned versions read from one lockfile.
#[derive(Debug, Clone, Default)]
pub struct Lockfile {
    pub file_name: String,
    pub manager: String,
    pub packages: HashMap<String, LockedPackage>,
}

impl Lockfile {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LockedPackage> {
        self.packages.get(name)
    }
}

/// Load the first supported lockfile in `root`.
///
/// Opaque formats are skipped in favor of the next candidate. Returns
/// `Ok(None)` when no readable lockfile exists.
///
/// # Errors
///
/// Returns an error if a lockfile exists but cannot be read or parsed.
pub fn load(root: &Path) -> Result<Option<Lockfile>> {
    for name in LOCKFILE_NAMES {
        let path = root.join(name);
        if !path.is_file() {
            continue;
        }
        let lockfile = match name {
            "package-lock.json" | "npm-shrinkwrap.json" => {
                parse_npm(&std::fs::read_to_string(&path)?)?
            }
            "yarn.lock" => parse_yarn(&std::fs::read_to_string(&path)?),
            "pnpm-lock.yaml" => parse_pnpm(&std::fs::read_to_string(&path)?)?,
            _ => {
                tracing::debug!(lockfile = name, "skipping binary lockfile");
                continue;
            }
        };
        return Ok(Some(Lockfile {
            file_name: name.to_owned(),
            ..lockfile
        }));
    }
    Ok(None)
}

#[derive(Deserialize)]
struct NpmLock {
    #[serde(default)]
    packages: HashMap<String, NpmEntry>,
    #[serde(default)]
    dependencies: HashMap<String, NpmEntry>,
}

#[derive(Deserialize)]
struct NpmEntry {
    version: Option<String>,
    integrity: Option<String>,
    resolved: Option<String>,
}

impl NpmEntry {
    fn locked(self) -> Option<LockedPackage> {
        Some(LockedPackage {
            version: self.version?,
            integrity: self.integrity,
            resolved: self.resolved,
        })
    }
}

/// `package-lock.json` v1 (`dependencies`) and v2/v3 (`packages`).
///
/// # Errors
///
/// Returns an error on malformed JSON.
pub fn parse_npm(content: &str) -> Result<Lockfile> {
    let lock: NpmLock = serde_json::from_str(content)?;
    let mut packages = HashMap::new();

    for (key, entry) in lock.packages {
        // Only hoisted installs: "node_modules/a", not "node_modules/a/node_modules/b".
        let Some(name) = key.strip_prefix("node_modules/") else {
            continue;
        };
        if name.contains("/node_modules/") {
            continue;
        }
        if let Some(locked) = entry.locked() {
            packages.insert(name.to_owned(), locked);
        }
    }
    for (name, entry) in lock.dependencies {
        if packages.contains_key(&name) {
            continue;
        }
        if let Some(locked) = entry.locked() {
            packages.insert(name, locked);
        }
    }

    Ok(Lockfile {
        manager: "npm".to_owned(),
        packages,
        ..Lockfile::default()
    })
}

/// Classic and berry `yarn.lock`.
#[must_use]
pub fn parse_yarn(content: &str) -> Lockfile {
    let mut packages = HashMap::new();
    let mut names: Vec<String> = Vec::new();
    let mut current: Option<LockedPackage> = None;

    let mut flush = |names: &mut Vec<String>, current: &mut Option<LockedPackage>| {
        if let Some(locked) = current.take() {
            for name in names.drain(..) {
                packages.entry(name).or_insert_with(|| locked.clone());
            }
        }
        names.clear();
    };

    for line in content.lines() {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        if !line.starts_with(' ') {
            flush(&mut names, &mut current);
            names = line
                .trim_end_matches(':')
                .split(',')
                .filter_map(|d| descriptor_name(d.trim().trim_matches('"')))
                .collect();
            continue;
        }

        let Some((key, value)) = yarn_field(line.trim()) else {
            continue;
        };
        match key {
            "version" => {
                current = Some(LockedPackage {
                    version: value,
                    integrity: None,
                    resolved: None,
                });
            }
            "integrity" | "checksum" => {
                if let Some(locked) = current.as_mut() {
                    locked.integrity = Some(value);
                }
            }
            "resolved" | "resolution" => {
                if let Some(locked) = current.as_mut() {
                    locked.resolved = Some(value);
                }
            }
            _ => {}
        }
    }
    flush(&mut names, &mut current);

    Lockfile {
        manager: "yarn".to_owned(),
        packages,
        ..Lockfile::default()
    }
}

/// `react@^18.2.0` / `@babel/core@npm:^7.0.0` → package name.
fn descriptor_name(descriptor: &str) -> Option<String> {
    let at = descriptor.get(1..)?.find('@')? + 1;
    Some(descriptor[..at].to_owned())
}

/// `version "1.2.3"` (classic) or `version: 1.2.3` (berry).
fn yarn_field(line: &str) -> Option<(&str, String)> {
    let (key, value) = line
        .split_once(": ")
        .or_else(|| line.split_once(' '))?;
    let value = value.trim().trim_matches('"');
    if value.is_empty() {
        return None;
    }
    Some((key.trim_end_matches(':'), value.to_owned()))
}

/// `pnpm-lock.yaml` v5 through v9.
///
/// # Errors
///
/// Returns an error on malformed YAML.
pub fn parse_pnpm(content: &str) -> Result<Lockfile> {
    let doc: serde_yaml::Value = serde_yaml::from_str(content)
        .map_err(|e| IndexError::Resolution(format!("invalid pnpm-lock.yaml: {e}")))?;
    let mut packages = HashMap::new();

    // Direct dependencies of the root importer win over transitive entries.
    if let Some(root) = doc.get("importers").and_then(|i| i.get(".")) {
        collect_importer(root, &mut packages);
    }
    collect_importer(&doc, &mut packages);

    if let Some(map) = doc.get("packages").and_then(serde_yaml::Value::as_mapping) {
        for (key, entry) in map {
            let Some((name, version)) = key.as_str().and_then(pnpm_key) else {
                continue;
            };
            let integrity = entry
                .get("resolution")
                .and_then(|r| r.get("integrity"))
                .and_then(serde_yaml::Value::as_str)
                .map(str::to_owned);
            let slot = packages.entry(name).or_insert_with(|| LockedPackage {
                version: version.clone(),
                integrity: None,
                resolved: None,
            });
            if slot.version == version && slot.integrity.is_none() {
                slot.integrity = integrity;
            }
        }
    }

    Ok(Lockfile {
        manager: "pnpm".to_owned(),
        packages,
        ..Lockfile::default()
    })
}

fn collect_importer(importer: &serde_yaml::Value, packages: &mut HashMap<String, LockedPackage>) {
    for group in [
        "dependencies",
        "devDependencies",
        "optionalDependencies",
    ] {
        let Some(deps) = importer.get(group).and_then(serde_yaml::Value::as_mapping) else {
            continue;
        };
        for (name, spec) in deps {
            let Some(name) = name.as_str() else {
                continue;
            };
            // v6+: {specifier, version}; v5: a bare version string.
            let version = spec
                .get("version")
                .and_then(serde_yaml::Value::as_str)
                .or_else(|| spec.as_str());
            let Some(version) = version else {
                continue;
            };
            packages
                .entry(name.to_owned())
                .or_insert_with(|| LockedPackage {
                    version: strip_peer_suffix(version).to_owned(),
                    integrity: None,
                    resolved: None,
                });
        }
    }
}

/// `/react/18.3.1` and `/react-dom/18.3.1_react@18.3.1` (v5), `/react@18.3.1`
/// (v6), `react@18.3.1(peer)` (v9).
fn pnpm_key(key: &str) -> Option<(String, String)> {
    let key = key.trim_start_matches('/');
    let key = key.split('(').next().unwrap_or(key);
    let name_start = if key.starts_with('@') { key.find('/')? + 1 } else { 0 };
    let sep = name_start + key[name_start..].find(['/', '@'])?;
    let (name, version) = (&key[..sep], strip_peer_suffix(&key[sep + 1..]));
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((name.to_owned(), version.to_owned()))
}

/// Drops `(peer@x)` (v6+) and `_peer@x` (v5) suffixes.
fn strip_peer_suffix(version: &str) -> &str {
    version.split(['(', '_']).next().unwrap_or(version)
}
