//! CouchDB cache backend: per-key upserts against a remote database.
//!
//! Keys are scoped by cache name (`{cache}:{key}` document ids). `load`
//! ensures the database exists; `write` only manages the connection
//! lifecycle, there is no bulk flush.

use super::{Cache, CacheConfig};
use crate::error::{CacheErrorKind, DepTrailError, Result};
use indexmap::IndexMap;
use serde_json::{Value, json};

pub struct CouchCache {
    name: String,
    config: CacheConfig,
    loaded: bool,
}

impl CouchCache {
    #[must_use]
    pub fn new(name: &str, config: CacheConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            loaded: false,
        }
    }

    fn client(&self) -> Result<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .timeout(self.config.timeout)
            .build()
            .map_err(|e| {
                DepTrailError::cache(
                    self.config.couch_url.clone(),
                    CacheErrorKind::BackendUnavailable(e.to_string()),
                )
            })
    }

    fn db_url(&self) -> String {
        format!("{}/{}", self.config.couch_url, self.config.couch_database)
    }

    fn doc_url(&self, key: &str) -> String {
        let id = format!("{}:{key}", self.name).replace('/', "%2F");
        format!("{}/{id}", self.db_url())
    }

    /// Current revision of a document, if it exists.
    fn revision(&self, key: &str) -> Result<Option<String>> {
        let response = self
            .client()?
            .get(self.doc_url(key))
            .send()
            .map_err(|e| self.unavailable(e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc: Value = response.json().map_err(|e| self.unavailable(e))?;
        Ok(doc.get("_rev").and_then(|r| r.as_str()).map(String::from))
    }

    fn unavailable(&self, err: reqwest::Error) -> DepTrailError {
        DepTrailError::cache(
            self.config.couch_url.clone(),
            CacheErrorKind::BackendUnavailable(err.to_string()),
        )
    }

    /// Strip CouchDB bookkeeping fields from a stored document.
    fn strip_meta(mut doc: Value) -> Value {
        if let Some(map) = doc.as_object_mut() {
            map.remove("_id");
            map.remove("_rev");
        }
        doc
    }
}

impl Cache for CouchCache {
    fn load(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        let client = self.client()?;
        let status = client
            .get(self.db_url())
            .send()
            .map_err(|e| self.unavailable(e))?
            .status();
        if status == reqwest::StatusCode::NOT_FOUND {
            let created = client
                .put(self.db_url())
                .send()
                .map_err(|e| self.unavailable(e))?;
            if !created.status().is_success() {
                return Err(DepTrailError::cache(
                    self.db_url(),
                    CacheErrorKind::BackendUnavailable(format!(
                        "database creation returned {}",
                        created.status()
                    )),
                ));
            }
        }
        self.loaded = true;
        Ok(())
    }

    fn get(&mut self, key: &str) -> Result<Option<Value>> {
        self.load()?;
        let response = self
            .client()?
            .get(self.doc_url(key))
            .send()
            .map_err(|e| self.unavailable(e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc: Value = response.json().map_err(|e| self.unavailable(e))?;
        Ok(Some(Self::strip_meta(doc)))
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.load()?;
        let mut doc = value;
        if let Some(rev) = self.revision(key)? {
            if let Some(map) = doc.as_object_mut() {
                map.insert("_rev".to_string(), json!(rev));
            }
        }
        let response = self
            .client()?
            .put(self.doc_url(key))
            .json(&doc)
            .send()
            .map_err(|e| self.unavailable(e))?;
        if !response.status().is_success() {
            return Err(DepTrailError::cache(
                key,
                CacheErrorKind::WriteFailed(format!("upsert returned {}", response.status())),
            ));
        }
        Ok(())
    }

    fn has(&mut self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.load()?;
        let Some(rev) = self.revision(key)? else {
            return Ok(());
        };
        let response = self
            .client()?
            .delete(format!("{}?rev={rev}", self.doc_url(key)))
            .send()
            .map_err(|e| self.unavailable(e))?;
        if !response.status().is_success() {
            return Err(DepTrailError::cache(
                key,
                CacheErrorKind::WriteFailed(format!("delete returned {}", response.status())),
            ));
        }
        Ok(())
    }

    fn get_all(&mut self) -> Result<IndexMap<String, Value>> {
        self.load()?;
        let url = format!("{}/_all_docs?include_docs=true", self.db_url());
        let response: Value = self
            .client()?
            .get(url)
            .send()
            .map_err(|e| self.unavailable(e))?
            .json()
            .map_err(|e| self.unavailable(e))?;

        let prefix = format!("{}:", self.name);
        let mut out = IndexMap::new();
        if let Some(rows) = response.get("rows").and_then(|r| r.as_array()) {
            for row in rows {
                let Some(id) = row.get("id").and_then(|i| i.as_str()) else {
                    continue;
                };
                let Some(key) = id.strip_prefix(&prefix) else {
                    continue;
                };
                if let Some(doc) = row.get("doc") {
                    out.insert(
                        key.replace("%2F", "/"),
                        Self::strip_meta(doc.clone()),
                    );
                }
            }
        }
        Ok(out)
    }

    fn write(&mut self) -> Result<()> {
        // every set is already an upsert; detach so the next unit of work
        // re-attaches
        self.loaded = false;
        Ok(())
    }
}
