//! Security-advisory lookups against the OSV database.
//!
//! Dependencies with a resolved version are queried by purl; library-level
//! lookups (no version) go by package name plus ecosystem tag and return
//! every advisory known for the package.

use super::{RegistryConfig, post_json};
use crate::error::Result;
use crate::model::{Severity, Vulnerability};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
struct Query<'a> {
    package: PackageField<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum PackageField<'a> {
    Purl { purl: &'a str },
    Named { name: &'a str, ecosystem: &'a str },
}

pub struct AdvisoryClient {
    config: RegistryConfig,
}

impl AdvisoryClient {
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self { config }
    }

    /// Advisories affecting one resolved package version.
    pub fn vulnerabilities_for_purl(&self, purl: &str) -> Result<Vec<Vulnerability>> {
        self.query(&Query {
            package: PackageField::Purl { purl },
        })
    }

    /// Every advisory known for a package name within an ecosystem.
    pub fn vulnerabilities_for_package(
        &self,
        ecosystem: &str,
        name: &str,
    ) -> Result<Vec<Vulnerability>> {
        self.query(&Query {
            package: PackageField::Named { name, ecosystem },
        })
    }

    fn query(&self, query: &Query<'_>) -> Result<Vec<Vulnerability>> {
        let url = format!("{}/v1/query", self.config.advisory_url);
        let json = post_json(&self.config, &url, query)?;
        Ok(json
            .get("vulns")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(map_vulnerability)
            .collect())
    }
}

/// Map one OSV vulnerability document onto the internal record.
fn map_vulnerability(entry: &Value) -> Vulnerability {
    let mut identifiers = Vec::new();
    if let Some(id) = entry.get("id").and_then(Value::as_str) {
        identifiers.push(id.to_string());
    }
    for alias in entry
        .get("aliases")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
    {
        identifiers.push(alias.to_string());
    }

    let score = extract_score(entry);
    let severity = entry
        .get("database_specific")
        .and_then(|d| d.get("severity"))
        .and_then(Value::as_str)
        .map(Severity::from_label)
        .filter(|s| *s != Severity::Unknown)
        .or(score.map(Severity::from_score))
        .unwrap_or(Severity::Unknown);

    let summary = entry
        .get("summary")
        .or_else(|| entry.get("details"))
        .and_then(Value::as_str)
        .map(String::from);
    let permalink = entry
        .get("references")
        .and_then(Value::as_array)
        .and_then(|refs| {
            refs.iter()
                .find(|r| r.get("type").and_then(Value::as_str) == Some("ADVISORY"))
                .or_else(|| refs.first())
        })
        .and_then(|r| r.get("url"))
        .and_then(Value::as_str)
        .map(String::from);

    let (vulnerable_range, first_patched_version) = extract_range(entry);

    Vulnerability {
        severity,
        score,
        summary,
        permalink,
        identifiers,
        vulnerable_range,
        first_patched_version,
    }
}

/// First usable CVSS base score. OSV reports either a bare number or a
/// vector string; vectors carry the score only when a `score:` field is
/// appended.
fn extract_score(entry: &Value) -> Option<f64> {
    entry
        .get("severity")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|s| s.get("score").and_then(Value::as_str))
        .find_map(|raw| {
            if let Ok(score) = raw.parse::<f64>() {
                return Some(score);
            }
            raw.split('/')
                .find_map(|part| part.strip_prefix("score:"))
                .and_then(|n| n.parse().ok())
        })
}

/// Collapse the first affected entry's range events into the comparator
/// syntax version matching understands, plus the first fixed version.
fn extract_range(entry: &Value) -> (String, Option<String>) {
    let mut parts = Vec::new();
    let mut fixed = None;
    let events = entry
        .get("affected")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .flat_map(|aff| aff.get("ranges").and_then(Value::as_array).into_iter().flatten())
        .flat_map(|range| range.get("events").and_then(Value::as_array).into_iter().flatten());
    for event in events {
        if let Some(introduced) = event.get("introduced").and_then(Value::as_str) {
            if introduced != "0" {
                parts.push(format!(">= {introduced}"));
            }
        }
        if let Some(version) = event.get("fixed").and_then(Value::as_str) {
            parts.push(format!("< {version}"));
            if fixed.is_none() {
                fixed = Some(version.to_string());
            }
        }
        if let Some(last) = event.get("last_affected").and_then(Value::as_str) {
            parts.push(format!("<= {last}"));
        }
    }
    (parts.join(", "), fixed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_serializes_purl_and_named_forms() {
        let by_purl = serde_json::to_string(&Query {
            package: PackageField::Purl {
                purl: "pkg:npm/lodash@4.17.20",
            },
        })
        .unwrap();
        assert_eq!(by_purl, r#"{"package":{"purl":"pkg:npm/lodash@4.17.20"}}"#);

        let by_name = serde_json::to_string(&Query {
            package: PackageField::Named {
                name: "lodash",
                ecosystem: "npm",
            },
        })
        .unwrap();
        assert_eq!(
            by_name,
            r#"{"package":{"name":"lodash","ecosystem":"npm"}}"#
        );
    }

    #[test]
    fn test_map_ghsa_entry() {
        let entry = serde_json::json!({
            "id": "GHSA-jf85-cpcp-j695",
            "summary": "Prototype pollution in lodash",
            "aliases": ["CVE-2019-10744"],
            "severity": [
                { "type": "CVSS_V3", "score": "9.1" }
            ],
            "database_specific": { "severity": "CRITICAL" },
            "affected": [{
                "package": { "name": "lodash", "ecosystem": "npm" },
                "ranges": [{
                    "type": "SEMVER",
                    "events": [
                        { "introduced": "0" },
                        { "fixed": "4.17.12" }
                    ]
                }]
            }],
            "references": [
                { "type": "ADVISORY", "url": "https://github.com/advisories/GHSA-jf85-cpcp-j695" }
            ]
        });

        let vuln = map_vulnerability(&entry);
        assert_eq!(vuln.severity, Severity::Critical);
        assert_eq!(vuln.score, Some(9.1));
        assert_eq!(
            vuln.identifiers,
            vec!["GHSA-jf85-cpcp-j695", "CVE-2019-10744"]
        );
        assert_eq!(vuln.vulnerable_range, "< 4.17.12");
        assert_eq!(vuln.first_patched_version.as_deref(), Some("4.17.12"));
        assert_eq!(
            vuln.permalink.as_deref(),
            Some("https://github.com/advisories/GHSA-jf85-cpcp-j695")
        );
        // the range drives fix detection
        assert_eq!(
            crate::utils::version::satisfies("4.17.11", &vuln.vulnerable_range),
            Some(true)
        );
        assert_eq!(
            crate::utils::version::satisfies("4.17.12", &vuln.vulnerable_range),
            Some(false)
        );
    }

    #[test]
    fn test_severity_falls_back_to_cvss_score() {
        let entry = serde_json::json!({
            "id": "OSV-2024-1",
            "severity": [{ "type": "CVSS_V3", "score": "7.5" }],
            "affected": []
        });
        let vuln = map_vulnerability(&entry);
        assert_eq!(vuln.severity, Severity::High);
        assert_eq!(vuln.vulnerable_range, "");
    }
}
