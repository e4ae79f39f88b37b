//! Maven Central client: the search API for versions, with a best-effort POM
//! fetch for description/license/issue-tracker fields.
//!
//! The search API pages results; pages are collected until the declared
//! `numFound` count is reached.

use super::{Registrar, RegistryConfig, get_json, get_text};
use crate::error::{DepTrailError, RegistryErrorKind, Result};
use crate::model::{LibraryInfo, VersionInfo};
use chrono::{DateTime, Utc};
use serde::Deserialize;

const PAGE_SIZE: usize = 50;

pub struct MavenRegistrar {
    config: RegistryConfig,
}

impl MavenRegistrar {
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self { config }
    }

    /// All published versions of a coordinate, newest first, across however
    /// many search pages the result count demands.
    fn collect_versions(&self, group: &str, artifact: &str) -> Result<Vec<VersionInfo>> {
        let mut versions = Vec::new();
        let mut start = 0;
        loop {
            let url = format!(
                "{}?q=g:%22{group}%22+AND+a:%22{artifact}%22&core=gav&rows={PAGE_SIZE}&start={start}",
                self.config.maven_search_url
            );
            let json = get_json(&self.config, &url)?;
            let response = json.get("response").ok_or_else(|| {
                DepTrailError::registry(
                    url.clone(),
                    RegistryErrorKind::InvalidResponse("missing response envelope".to_string()),
                )
            })?;
            let num_found = response
                .get("numFound")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0) as usize;
            let docs = response
                .get("docs")
                .and_then(|d| d.as_array())
                .cloned()
                .unwrap_or_default();
            if docs.is_empty() {
                break;
            }
            for doc in &docs {
                let Some(version) = doc.get("v").and_then(|v| v.as_str()) else {
                    continue;
                };
                let mut record = VersionInfo::new(version);
                record.timestamp = doc
                    .get("timestamp")
                    .and_then(serde_json::Value::as_i64)
                    .and_then(DateTime::<Utc>::from_timestamp_millis);
                versions.push(record);
            }
            start += docs.len();
            if start >= num_found {
                break;
            }
        }
        Ok(versions)
    }

    /// Fetch and parse the POM of one version. Failures are tolerated by the
    /// caller; version data stands on its own.
    fn fetch_pom(&self, group: &str, artifact: &str, version: &str) -> Result<PomMetadata> {
        let group_path = group.replace('.', "/");
        let url = format!(
            "{}/{group_path}/{artifact}/{version}/{artifact}-{version}.pom",
            self.config.maven_repo_url
        );
        let content = get_text(&self.config, &url)?;
        quick_xml::de::from_str(&content).map_err(|e| {
            DepTrailError::registry(url, RegistryErrorKind::InvalidResponse(e.to_string()))
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PomMetadata {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    licenses: Option<PomLicenses>,
    #[serde(default)]
    issue_management: Option<PomIssueManagement>,
}

#[derive(Debug, Default, Deserialize)]
struct PomLicenses {
    #[serde(default)]
    license: Vec<PomLicense>,
}

#[derive(Debug, Default, Deserialize)]
struct PomLicense {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PomIssueManagement {
    #[serde(default)]
    url: Option<String>,
}

impl Registrar for MavenRegistrar {
    fn source(&self) -> &'static str {
        "maven-central"
    }

    fn retrieve_from_registry(&self, name: &str) -> Result<LibraryInfo> {
        let (group, artifact) = name.split_once(':').ok_or_else(|| {
            DepTrailError::registry(
                name,
                RegistryErrorKind::InvalidResponse(format!(
                    "maven names are group:artifact, got '{name}'"
                )),
            )
        })?;

        let mut versions = self.collect_versions(group, artifact)?;
        if versions.is_empty() {
            return Err(DepTrailError::registry(
                name,
                RegistryErrorKind::NotFound(name.to_string()),
            ));
        }
        // search returns newest first
        versions[0].latest = true;

        let mut info = LibraryInfo::new(name);
        match self.fetch_pom(group, artifact, &versions[0].version) {
            Ok(pom) => {
                info.description = pom.description;
                info.homepage = pom.url;
                info.repository = pom.issue_management.and_then(|m| m.url);
                if let Some(licenses) = pom.licenses {
                    info.licenses = licenses
                        .license
                        .into_iter()
                        .filter_map(|l| l.name)
                        .collect();
                }
            }
            Err(err) => {
                tracing::debug!(name, error = %err, "POM unavailable, keeping version data");
            }
        }
        info.versions = versions;
        Ok(info)
    }
}
