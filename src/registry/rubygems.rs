//! RubyGems API client.
//!
//! Metadata needs two endpoints: `/gems/{name}.json` for the library record
//! and `/versions/{name}.json` for the release list. RubyGems rate-limits
//! aggressively, so a fixed delay separates the two calls.

use super::{Registrar, RegistryConfig, get_json};
use crate::error::Result;
use crate::model::{LibraryInfo, VersionInfo};
use chrono::{DateTime, Utc};

pub struct RubygemsRegistrar {
    config: RegistryConfig,
}

impl RubygemsRegistrar {
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self { config }
    }
}

impl Registrar for RubygemsRegistrar {
    fn source(&self) -> &'static str {
        "rubygems"
    }

    fn retrieve_from_registry(&self, name: &str) -> Result<LibraryInfo> {
        let gem_url = format!("{}/gems/{}.json", self.config.rubygems_url, name);
        let gem = get_json(&self.config, &gem_url)?;

        let mut info = LibraryInfo::new(name);
        info.description = gem
            .get("info")
            .and_then(|i| i.as_str())
            .map(String::from);
        info.homepage = gem
            .get("homepage_uri")
            .and_then(|h| h.as_str())
            .filter(|h| !h.is_empty())
            .map(String::from);
        info.repository = gem
            .get("source_code_uri")
            .and_then(|s| s.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from);
        info.licenses = gem
            .get("licenses")
            .and_then(|l| l.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|l| l.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        let latest = gem.get("version").and_then(|v| v.as_str()).map(String::from);

        std::thread::sleep(self.config.request_delay);

        let versions_url = format!("{}/versions/{}.json", self.config.rubygems_url, name);
        let versions = get_json(&self.config, &versions_url)?;
        if let Some(entries) = versions.as_array() {
            for entry in entries {
                let Some(version) = entry.get("number").and_then(|n| n.as_str()) else {
                    continue;
                };
                let mut record = VersionInfo::new(version);
                record.latest = latest.as_deref() == Some(version);
                record.timestamp = entry
                    .get("created_at")
                    .and_then(|c| c.as_str())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|d| d.with_timezone(&Utc));
                record.downloads = entry
                    .get("downloads_count")
                    .and_then(serde_json::Value::as_u64);
                if let Some(licenses) = entry.get("licenses").and_then(|l| l.as_array()) {
                    record.licenses = licenses
                        .iter()
                        .filter_map(|l| l.as_str().map(String::from))
                        .collect();
                }
                info.versions.push(record);
            }
        }
        Ok(info)
    }
}
