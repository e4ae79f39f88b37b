//! Generic secondary-source registrar backed by the deps.dev aggregator.
//!
//! Last resort in the fallback chain for the ecosystems deps.dev covers. It
//! returns less metadata than the native registries (versions and publish
//! dates, no description or licenses) but keeps enrichment alive when the
//! primary source is down.

use super::{Registrar, RegistryConfig, get_json};
use crate::error::{DepTrailError, RegistryErrorKind, Result};
use crate::model::{LibraryInfo, VersionInfo};
use chrono::{DateTime, Utc};

pub struct AggregatorRegistrar {
    config: RegistryConfig,
    system: &'static str,
}

impl AggregatorRegistrar {
    /// `system` is the deps.dev system identifier (npm, maven, nuget, pypi).
    #[must_use]
    pub fn new(config: RegistryConfig, system: &'static str) -> Self {
        Self { config, system }
    }
}

impl Registrar for AggregatorRegistrar {
    fn source(&self) -> &'static str {
        "deps.dev"
    }

    fn retrieve_from_registry(&self, name: &str) -> Result<LibraryInfo> {
        let encoded = name.replace('/', "%2F").replace('@', "%40").replace(':', "%3A");
        let url = format!(
            "{}/systems/{}/packages/{encoded}",
            self.config.aggregator_url, self.system
        );
        let json = get_json(&self.config, &url)?;

        let versions = json
            .get("versions")
            .and_then(|v| v.as_array())
            .cloned()
            .ok_or_else(|| {
                DepTrailError::registry(
                    name,
                    RegistryErrorKind::InvalidResponse("aggregator returned no versions".to_string()),
                )
            })?;

        let mut info = LibraryInfo::new(name);
        for entry in &versions {
            let Some(version) = entry
                .get("versionKey")
                .and_then(|k| k.get("version"))
                .and_then(|v| v.as_str())
            else {
                continue;
            };
            let mut record = VersionInfo::new(version);
            record.latest = entry
                .get("isDefault")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            record.timestamp = entry
                .get("publishedAt")
                .and_then(|p| p.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc));
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
