//! File-backed cache: a lazily-populated in-memory map, wholesale-read from
//! and wholesale-written to one JSON document on disk.

use super::Cache;
use crate::error::{CacheErrorKind, DepTrailError, Result};
use indexmap::IndexMap;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

pub struct FileCache {
    path: PathBuf,
    map: Option<IndexMap<String, Value>>,
    dirty: bool,
}

impl FileCache {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            map: None,
            dirty: false,
        }
    }

    fn map_mut(&mut self) -> Result<&mut IndexMap<String, Value>> {
        self.load()?;
        // load populated the map
        self.map.as_mut().ok_or_else(|| {
            DepTrailError::cache(
                self.path.display().to_string(),
                CacheErrorKind::BackendUnavailable("cache not loaded".to_string()),
            )
        })
    }
}

impl Cache for FileCache {
    fn load(&mut self) -> Result<()> {
        if self.map.is_some() {
            return Ok(());
        }
        let map = if self.path.is_file() {
            let content =
                fs::read_to_string(&self.path).map_err(|e| DepTrailError::io(&self.path, e))?;
            serde_json::from_str(&content).map_err(|e| {
                DepTrailError::cache(
                    self.path.display().to_string(),
                    CacheErrorKind::Serialization(e.to_string()),
                )
            })?
        } else {
            IndexMap::new()
        };
        self.map = Some(map);
        Ok(())
    }

    fn get(&mut self, key: &str) -> Result<Option<Value>> {
        Ok(self.map_mut()?.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.map_mut()?.insert(key.to_string(), value);
        self.dirty = true;
        Ok(())
    }

    fn has(&mut self, key: &str) -> Result<bool> {
        Ok(self.map_mut()?.contains_key(key))
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        if self.map_mut()?.shift_remove(key).is_some() {
            self.dirty = true;
        }
        Ok(())
    }

    fn get_all(&mut self) -> Result<IndexMap<String, Value>> {
        Ok(self.map_mut()?.clone())
    }

    fn write(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let Some(map) = &self.map else {
            return Ok(());
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| DepTrailError::io(parent, e))?;
        }
        let content = serde_json::to_string_pretty(map).map_err(|e| {
            DepTrailError::cache(
                self.path.display().to_string(),
                CacheErrorKind::Serialization(e.to_string()),
            )
        })?;
        fs::write(&self.path, content).map_err(|e| {
            DepTrailError::cache(
                self.path.display().to_string(),
                CacheErrorKind::WriteFailed(e.to_string()),
            )
        })?;
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libraries.json");

        let mut cache = FileCache::new(path.clone());
        cache.load().unwrap();
        cache
            .set("npm:lodash", json!({"name": "lodash", "plugin": "npm"}))
            .unwrap();
        cache.write().unwrap();

        let mut reloaded = FileCache::new(path);
        assert_eq!(
            reloaded.get("npm:lodash").unwrap(),
            Some(json!({"name": "lodash", "plugin": "npm"}))
        );
        assert!(!reloaded.has("npm:react").unwrap());
    }

    #[test]
    fn test_write_without_changes_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        let mut cache = FileCache::new(path.clone());
        cache.load().unwrap();
        cache.write().unwrap();
        // nothing was set, so no document appears
        assert!(!path.exists());
    }

    #[test]
    fn test_delete_and_find_by_field() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = FileCache::new(dir.path().join("c.json"));
        cache.set("a", json!({"plugin": "npm", "name": "a"})).unwrap();
        cache.set("b", json!({"plugin": "maven", "name": "b"})).unwrap();
        cache.set("c", json!({"plugin": "npm", "name": "c"})).unwrap();

        cache.delete("a").unwrap();
        let hits = cache.find_by_field("plugin", &json!("npm")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["name"], "c");
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = FileCache::new(dir.path().join("nope.json"));
        cache.load().unwrap();
        assert!(cache.get_all().unwrap().is_empty());
    }
}
