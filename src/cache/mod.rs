//! Swappable persistence for enrichment results and analysis artifacts.
//!
//! Two backends share one contract: a file-backed map read and written
//! wholesale as JSON, and a CouchDB backend doing per-key upserts. `load` is
//! an idempotent connect/attach step safe to call before every operation;
//! `write` flushes once per logical unit of work, never per record.
//!
//! Backend selection probes CouchDB reachability exactly once per process
//! and falls back to the file backend, logging the decision.

mod couch;
mod file;

pub use couch::CouchCache;
pub use file::FileCache;

use crate::error::Result;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// Uniform cache contract implemented by both backends.
pub trait Cache: Send {
    /// Idempotent connect-or-attach
    fn load(&mut self) -> Result<()>;

    fn get(&mut self, key: &str) -> Result<Option<Value>>;

    fn set(&mut self, key: &str, value: Value) -> Result<()>;

    fn has(&mut self, key: &str) -> Result<bool>;

    fn delete(&mut self, key: &str) -> Result<()>;

    fn get_all(&mut self) -> Result<IndexMap<String, Value>>;

    /// Entries whose top-level `field` equals `value`
    fn find_by_field(&mut self, field: &str, value: &Value) -> Result<Vec<Value>> {
        Ok(self
            .get_all()?
            .into_values()
            .filter(|doc| doc.get(field) == Some(value))
            .collect())
    }

    /// Flush and possibly tear down the connection. Call once per logical
    /// unit of work.
    fn write(&mut self) -> Result<()>;
}

/// Cache backend configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory for file-backed cache documents
    pub dir: PathBuf,
    /// CouchDB base URL
    pub couch_url: String,
    /// CouchDB database name
    pub couch_database: String,
    pub timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("deptrail"),
            couch_url: "http://localhost:5984".to_string(),
            couch_database: "deptrail".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

static COUCH_REACHABLE: OnceLock<bool> = OnceLock::new();

/// One status check against the CouchDB runtime, memoized for the process
/// lifetime. Never re-probed per lookup.
fn couch_reachable(config: &CacheConfig) -> bool {
    *COUCH_REACHABLE.get_or_init(|| {
        let probe = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .ok()
            .and_then(|client| client.get(format!("{}/_up", config.couch_url)).send().ok())
            .is_some_and(|resp| resp.status().is_success());
        tracing::info!(url = %config.couch_url, reachable = probe, "document-store probe");
        probe
    })
}

/// Pick the backend for a named cache document: CouchDB when its runtime
/// answers the probe, the file backend otherwise.
#[must_use]
pub fn select_backend(name: &str, config: &CacheConfig) -> Box<dyn Cache> {
    if couch_reachable(config) {
        tracing::info!(cache = name, "using document-store cache backend");
        Box::new(CouchCache::new(name, config.clone()))
    } else {
        tracing::info!(cache = name, "using file cache backend");
        Box::new(FileCache::new(config.dir.join(format!("{name}.json"))))
    }
}

/// Tracks which dependency names have already been force-refreshed during
/// the current run. The first lookup of a name bypasses the cache, later
/// lookups of the same name use it normally.
#[derive(Debug, Default)]
pub struct RefreshTracker {
    refreshed: HashSet<String>,
}

impl RefreshTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True exactly once per distinct name.
    pub fn should_refresh(&mut self, name: &str) -> bool {
        self.refreshed.insert(name.to_string())
    }
}
