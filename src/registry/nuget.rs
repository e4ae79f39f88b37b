//! NuGet v3 registration-feed client.
//!
//! The feed exists in two schema versions: small packages inline their leaf
//! items under each page, large packages replace the `items` array with an
//! `@id` URL per page that must be fetched separately. Both shapes are
//! handled.

use super::{Registrar, RegistryConfig, get_json};
use crate::error::{DepTrailError, RegistryErrorKind, Result};
use crate::model::{LibraryInfo, VersionInfo};
use chrono::{DateTime, Utc};
use serde_json::Value;

pub struct NugetRegistrar {
    config: RegistryConfig,
}

impl NugetRegistrar {
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self { config }
    }

    fn leaf_versions(&self, page: &Value, out: &mut Vec<VersionInfo>) {
        let Some(items) = page.get("items").and_then(|i| i.as_array()) else {
            return;
        };
        for leaf in items {
            let Some(entry) = leaf.get("catalogEntry") else {
                continue;
            };
            let Some(version) = entry.get("version").and_then(|v| v.as_str()) else {
                continue;
            };
            let mut record = VersionInfo::new(version);
            record.timestamp = entry
                .get("published")
                .and_then(|p| p.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc));
            if let Some(license) = entry.get("licenseExpression").and_then(|l| l.as_str()) {
                if !license.is_empty() {
                    record.licenses.push(license.to_string());
                }
            }
            out.push(record);
        }
    }
}

impl Registrar for NugetRegistrar {
    fn source(&self) -> &'static str {
        "nuget"
    }

    fn retrieve_from_registry(&self, name: &str) -> Result<LibraryInfo> {
        let url = format!("{}/{}/index.json", self.config.nuget_url, name.to_lowercase());
        let index = get_json(&self.config, &url)?;

        let pages = index
            .get("items")
            .and_then(|i| i.as_array())
            .cloned()
            .ok_or_else(|| {
                DepTrailError::registry(
                    url,
                    RegistryErrorKind::InvalidResponse("registration index has no items".to_string()),
                )
            })?;

        let mut versions = Vec::new();
        let mut description = None;
        for page in &pages {
            if page.get("items").is_some() {
                self.leaf_versions(page, &mut versions);
            } else if let Some(page_url) = page.get("@id").and_then(|u| u.as_str()) {
                // paged schema: each page is its own document
                let fetched = get_json(&self.config, page_url)?;
                self.leaf_versions(&fetched, &mut versions);
            }
            if description.is_none() {
                description = page
                    .get("items")
                    .and_then(|i| i.as_array())
                    .and_then(|items| items.last())
                    .and_then(|leaf| leaf.get("catalogEntry"))
                    .and_then(|e| e.get("description"))
                    .and_then(|d| d.as_str())
                    .map(String::from);
            }
        }
        if versions.is_empty() {
            return Err(DepTrailError::registry(
                name,
                RegistryErrorKind::NotFound(name.to_string()),
            ));
        }
        if let Some(last) = versions.last_mut() {
            last.latest = true;
        }

        let mut info = LibraryInfo::new(name);
        info.description = description;
        info.versions = versions;
        Ok(info)
    }
}
