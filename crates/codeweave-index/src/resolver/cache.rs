use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::lockfile::{LOCKFILE_NAMES, Lockfile};
use super::manifest::{MANIFEST_NAME, Manifest};

type Slots<T> = Mutex<HashMap<PathBuf, Option<Arc<T>>>>;

/// Parsed lockfiles and manifests owned by one resolver.
///
/// Negative results are cached too; [`ResolverCache::invalidate`] drops the
/// entries a changed file could affect. Loads run without holding a lock, so
/// two callers may parse the same file once each; the first result wins.
#[derive(Debug, Default)]
pub struct ResolverCache {
    lockfiles: Slots<Lockfile>,
    /// Directory → nearest manifest at or above it.
    manifests: Slots<Manifest>,
    /// Bumped by every invalidation; a load that raced one is not stored.
    generation: AtomicU64,
}

impl ResolverCache {
    pub fn lockfile(
        &self,
        root: &Path,
        load: impl FnOnce() -> Option<Lockfile>,
    ) -> Option<Arc<Lockfile>> {
        self.get_or_load(&self.lockfiles, root, load)
    }

    pub fn manifest(
        &self,
        dir: &Path,
        load: impl FnOnce() -> Option<Manifest>,
    ) -> Option<Arc<Manifest>> {
        self.get_or_load(&self.manifests, dir, load)
    }

    fn get_or_load<T>(
        &self,
        slots: &Slots<T>,
        key: &Path,
        load: impl FnOnce() -> Option<T>,
    ) -> Option<Arc<T>> {
        if let Some(hit) = slots.lock().unwrap_or_else(PoisonError::into_inner).get(key) {
            return hit.clone();
        }
        let generation = self.generation.load(Ordering::Acquire);
        let loaded = load().map(Arc::new);

        let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::Acquire) != generation {
            return loaded;
        }
        slots.entry(key.to_path_buf()).or_insert(loaded).clone()
    }

    pub fn clear(&self) {
        self.lockfiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.manifests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Forget whatever `path` may have contributed. Returns `true` if the
    /// path is a lockfile or manifest.
    pub fn invalidate(&self, path: &Path) -> bool {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let dir = path.parent().unwrap_or(Path::new(""));

        if LOCKFILE_NAMES.contains(&file_name) {
            self.generation.fetch_add(1, Ordering::AcqRel);
            self.lockfiles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(dir);
            return true;
        }
        if file_name == MANIFEST_NAME {
            // A new or removed manifest can change the answer for any
            // directory below it.
            self.generation.fetch_add(1, Ordering::AcqRel);
            self.manifests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|key, _| !key.starts_with(dir));
            return true;
        }
        false
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> (usize, usize) {
        (
            self.lockfiles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            self.manifests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_once_until_invalidated() {
        let cache = ResolverCache::default();
        let root = Path::new("/repo");
        let mut loads = 0;
        for _ in 0..3 {
            cache.lockfile(root, || {
                loads += 1;
                None
            });
        }
        assert_eq!(loads, 1);

        assert!(cache.invalidate(&root.join("yarn.lock")));
        cache.lockfile(root, || {
            loads += 1;
            None
        });
        assert_eq!(loads, 2);
    }

    #[test]
    fn load_can_consult_the_cache() {
        let cache = ResolverCache::default();
        let outer = cache.lockfile(Path::new("/repo/app"), || {
            cache.manifest(Path::new("/repo/app"), || None);
            cache.lockfile(Path::new("/repo"), || None);
            None
        });
        assert!(outer.is_none());
        assert_eq!(cache.len(), (2, 1));
    }

    #[test]
    fn load_racing_an_invalidation_is_not_cached() {
        let cache = ResolverCache::default();
        let root = Path::new("/repo");
        let mut loads = 0;
        cache.lockfile(root, || {
            loads += 1;
            assert!(cache.invalidate(&root.join("pnpm-lock.yaml")));
            None
        });
        assert_eq!(cache.len().0, 0);

        cache.lockfile(root, || {
            loads += 1;
            None
        });
        cache.lockfile(root, || {
            loads += 1;
            None
        });
        assert_eq!(loads, 2);
    }

    #[test]
    fn manifest_invalidation_covers_subdirectories() {
        let cache = ResolverCache::default();
        cache.manifest(Path::new("/repo/packages/web/src"), || None);
        cache.manifest(Path::new("/repo/packages/api"), || None);
        cache.manifest(Path::new("/other"), || None);
        assert_eq!(cache.len().1, 3);

        assert!(cache.invalidate(Path::new("/repo/packages/package.json")));
        assert_eq!(cache.len().1, 1);
        assert!(!cache.invalidate(Path::new("/repo/src/index.ts")));

        cache.clear();
        assert_eq!(cache.len(), (0, 0));
    }
}
