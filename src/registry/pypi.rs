//! PyPI JSON API client.

use super::{Registrar, RegistryConfig, get_json};
use crate::error::Result;
use crate::model::{LibraryInfo, VersionInfo};
use chrono::{DateTime, Utc};

pub struct PypiRegistrar {
    config: RegistryConfig,
}

impl PypiRegistrar {
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self { config }
    }
}

impl Registrar for PypiRegistrar {
    fn source(&self) -> &'static str {
        "pypi"
    }

    fn retrieve_from_registry(&self, name: &str) -> Result<LibraryInfo> {
        let url = format!("{}/{}/json", self.config.pypi_url, name);
        let json = get_json(&self.config, &url)?;

        let mut info = LibraryInfo::new(name);
        let meta = json.get("info");
        info.description = meta
            .and_then(|i| i.get("summary"))
            .and_then(|s| s.as_str())
            .map(String::from);
        info.homepage = meta
            .and_then(|i| i.get("home_page"))
            .and_then(|h| h.as_str())
            .filter(|h| !h.is_empty())
            .map(String::from);
        info.repository = meta
            .and_then(|i| i.get("project_urls"))
            .and_then(|u| u.get("Repository").or_else(|| u.get("Source")))
            .and_then(|u| u.as_str())
            .map(String::from);
        if let Some(license) = meta
            .and_then(|i| i.get("license"))
            .and_then(|l| l.as_str())
            .filter(|l| !l.is_empty())
        {
            info.licenses.push(license.to_string());
        }
        info.keywords = meta
            .and_then(|i| i.get("keywords"))
            .and_then(|k| k.as_str())
            .map(|k| {
                k.split([',', ' '])
                    .filter(|w| !w.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let latest = meta
            .and_then(|i| i.get("version"))
            .and_then(|v| v.as_str());
        if let Some(releases) = json.get("releases").and_then(|r| r.as_object()) {
            for (version, files) in releases {
                let mut record = VersionInfo::new(version.clone());
                record.latest = latest == Some(version.as_str());
                // earliest upload of any file for the release
                record.timestamp = files
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|f| {
                        f.get("upload_time_iso_8601")
                            .and_then(|t| t.as_str())
                            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    })
                    .min()
                    .map(|d| d.with_timezone(&Utc));
                info.versions.push(record);
            }
        }
        Ok(info)
    }
}
