//! npm registry client (`registry.npmjs.org`).

use super::{Registrar, RegistryConfig, get_json};
use crate::error::Result;
use crate::model::{LibraryInfo, VersionInfo};
use chrono::{DateTime, Utc};

pub struct NpmRegistrar {
    config: RegistryConfig,
}

impl NpmRegistrar {
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self { config }
    }
}

impl Registrar for NpmRegistrar {
    fn source(&self) -> &'static str {
        "npm"
    }

    fn retrieve_from_registry(&self, name: &str) -> Result<LibraryInfo> {
        let url = format!("{}/{}", self.config.npm_url, name);
        let json = get_json(&self.config, &url)?;

        let mut info = LibraryInfo::new(name);
        info.description = json
            .get("description")
            .and_then(|d| d.as_str())
            .map(String::from);
        info.homepage = json
            .get("homepage")
            .and_then(|h| h.as_str())
            .map(String::from);
        info.repository = json
            .get("repository")
            .and_then(|r| r.get("url"))
            .and_then(|u| u.as_str())
            .map(String::from);
        info.keywords = json
            .get("keywords")
            .and_then(|k| k.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|k| k.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        if let Some(license) = json.get("license").and_then(|l| l.as_str()) {
            info.licenses.push(license.to_string());
        }

        let latest = json
            .get("dist-tags")
            .and_then(|d| d.get("latest"))
            .and_then(|l| l.as_str());
        let times = json.get("time").and_then(|t| t.as_object());

        if let Some(versions) = json.get("versions").and_then(|v| v.as_object()) {
            for (version, entry) in versions {
                let mut record = VersionInfo::new(version.clone());
                record.latest = latest == Some(version.as_str());
                record.timestamp = times
                    .and_then(|t| t.get(version))
                    .and_then(|v| v.as_str())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|d| d.with_timezone(&Utc));
                if let Some(license) = entry.get("license").and_then(|l| l.as_str()) {
                    record.licenses.push(license.to_string());
                }
                info.versions.push(record);
            }
        }
        Ok(info)
    }
}
