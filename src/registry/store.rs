//! Cache-first library metadata lookups with forced-refresh tracking.

use super::RegistrarChain;
use crate::cache::{Cache, RefreshTracker};
use crate::error::{CacheErrorKind, DepTrailError, Result};
use crate::model::LibraryInfo;

/// Library lookups go to the cache first; the registrar chain is consulted
/// only on a miss or a forced refresh, and its result overwrites the cache.
pub struct LibraryStore {
    cache: Box<dyn Cache>,
    tracker: RefreshTracker,
}

impl LibraryStore {
    #[must_use]
    pub fn new(cache: Box<dyn Cache>) -> Self {
        Self {
            cache,
            tracker: RefreshTracker::new(),
        }
    }

    /// Cache key for a library: `{plugin}:{name}`.
    #[must_use]
    pub fn key(plugin: &str, name: &str) -> String {
        format!("{plugin}:{name}")
    }

    /// Look up metadata for one dependency name. With `refresh`, the first
    /// lookup of each distinct name during the run bypasses the cache and
    /// overwrites it; later lookups of the same name hit the cache again.
    pub fn lookup(
        &mut self,
        plugin: &str,
        name: &str,
        chain: &RegistrarChain,
        refresh: bool,
    ) -> Result<LibraryInfo> {
        let key = Self::key(plugin, name);
        let force = refresh && self.tracker.should_refresh(&key);

        if !force {
            if let Some(cached) = self.cache.get(&key)? {
                let info: LibraryInfo = serde_json::from_value(cached).map_err(|e| {
                    DepTrailError::cache(key.clone(), CacheErrorKind::Serialization(e.to_string()))
                })?;
                tracing::debug!(key, "library cache hit");
                return Ok(info);
            }
        }

        let info = chain.retrieve(name)?;
        let doc = serde_json::to_value(&info).map_err(|e| {
            DepTrailError::cache(key.clone(), CacheErrorKind::Serialization(e.to_string()))
        })?;
        self.cache.set(&key, doc)?;
        Ok(info)
    }

    /// Flush the underlying cache. Once per logical unit of work.
    pub fn write(&mut self) -> Result<()> {
        self.cache.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FileCache;
    use crate::registry::Registrar;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubRegistrar {
        calls: Arc<AtomicUsize>,
    }

    impl Registrar for StubRegistrar {
        fn source(&self) -> &'static str {
            "stub"
        }

        fn retrieve_from_registry(&self, name: &str) -> Result<LibraryInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LibraryInfo::new(name))
        }
    }

    fn store_and_chain() -> (tempfile::TempDir, LibraryStore, RegistrarChain, Arc<AtomicUsize>) {
        let dir = tempfile::tempdir().unwrap();
        let store = LibraryStore::new(Box::new(FileCache::new(dir.path().join("libs.json"))));
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = RegistrarChain::new(vec![Box::new(StubRegistrar {
            calls: calls.clone(),
        })]);
        (dir, store, chain, calls)
    }

    #[test]
    fn test_lookup_is_cache_first() {
        let (_dir, mut store, chain, calls) = store_and_chain();
        store.lookup("npm", "lodash", &chain, false).unwrap();
        store.lookup("npm", "lodash", &chain, false).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_refresh_bypasses_cache_once_per_name() {
        let (_dir, mut store, chain, calls) = store_and_chain();
        store.lookup("npm", "lodash", &chain, false).unwrap();
        // forced refresh: first lookup re-fetches, the second uses the cache
        store.lookup("npm", "lodash", &chain, true).unwrap();
        store.lookup("npm", "lodash", &chain, true).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
