//! Packagist client (`repo.packagist.org` p2 metadata).

use super::{Registrar, RegistryConfig, get_json};
use crate::error::{DepTrailError, RegistryErrorKind, Result};
use crate::model::{LibraryInfo, VersionInfo};
use chrono::{DateTime, Utc};

pub struct PackagistRegistrar {
    config: RegistryConfig,
}

impl PackagistRegistrar {
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self { config }
    }
}

impl Registrar for PackagistRegistrar {
    fn source(&self) -> &'static str {
        "packagist"
    }

    fn retrieve_from_registry(&self, name: &str) -> Result<LibraryInfo> {
        let url = format!("{}/{}.json", self.config.packagist_url, name);
        let json = get_json(&self.config, &url)?;

        let releases = json
            .get("packages")
            .and_then(|p| p.get(name))
            .and_then(|r| r.as_array())
            .cloned()
            .ok_or_else(|| {
                DepTrailError::registry(
                    name,
                    RegistryErrorKind::NotFound(name.to_string()),
                )
            })?;

        let mut info = LibraryInfo::new(name);
        // p2 lists releases newest first; package-level fields come from the
        // newest release
        for (index, release) in releases.iter().enumerate() {
            let Some(version) = release.get("version").and_then(|v| v.as_str()) else {
                continue;
            };
            if index == 0 {
                info.description = release
                    .get("description")
                    .and_then(|d| d.as_str())
                    .map(String::from);
                info.homepage = release
                    .get("homepage")
                    .and_then(|h| h.as_str())
                    .filter(|h| !h.is_empty())
                    .map(String::from);
                info.repository = release
                    .get("source")
                    .and_then(|s| s.get("url"))
                    .and_then(|u| u.as_str())
                    .map(String::from);
                info.keywords = release
                    .get("keywords")
                    .and_then(|k| k.as_array())
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|k| k.as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default();
            }
            let mut record = VersionInfo::new(version);
            record.latest = index == 0;
            record.timestamp = release
                .get("time")
                .and_then(|t| t.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc));
            if let Some(licenses) = release.get("license").and_then(|l| l.as_array()) {
                record.licenses = licenses
                    .iter()
                    .filter_map(|l| l.as_str().map(String::from))
                    .collect();
            }
            info.versions.push(record);
        }
        if info.versions.is_empty() {
            return Err(DepTrailError::registry(
                name,
                RegistryErrorKind::NotFound(name.to_string()),
            ));
        }
        Ok(info)
    }
}
