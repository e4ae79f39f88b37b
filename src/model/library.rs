//! Registry-level library metadata and vulnerability records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Vulnerability severity as reported by security advisories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

impl Severity {
    /// Parse from advisory strings, tolerant of case and the `MODERATE`
    /// alias some advisory databases use for medium.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_uppercase().as_str() {
            "CRITICAL" => Self::Critical,
            "HIGH" => Self::High,
            "MEDIUM" | "MODERATE" => Self::Medium,
            "LOW" => Self::Low,
            _ => Self::Unknown,
        }
    }

    /// Derive from a CVSS base score using the v3 rating bands.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 9.0 {
            Self::Critical
        } else if score >= 7.0 {
            Self::High
        } else if score >= 4.0 {
            Self::Medium
        } else if score > 0.0 {
            Self::Low
        } else {
            Self::Unknown
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{label}")
    }
}

/// A known vulnerability affecting some version range of a library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    pub severity: Severity,
    /// Numeric score (e.g. CVSS) when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    /// Advisory identifiers (CVE, GHSA, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<String>,
    /// Ecosystem-specific range syntax, e.g. `< 4.17.21` or `>= 2.0, < 2.3.1`
    pub vulnerable_range: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_patched_version: Option<String>,
}

/// One published release of a library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    /// Release timestamp when the registry reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloads: Option<u64>,
    /// Whether the registry marks this release as latest
    #[serde(default)]
    pub latest: bool,
}

impl VersionInfo {
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            timestamp: None,
            licenses: Vec::new(),
            downloads: None,
            latest: false,
        }
    }
}

/// Registry metadata for a library name, independent of any consuming
/// project. Created by a registrar call, persisted in the cache keyed
/// `{plugin}:{name}`, re-read on later lookups until a refresh is requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<VersionInfo>,
    /// Aggregate licenses across releases
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vulnerabilities: Vec<Vulnerability>,
}

impl LibraryInfo {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            versions: Vec::new(),
            licenses: Vec::new(),
            keywords: Vec::new(),
            homepage: None,
            repository: None,
            vulnerabilities: Vec::new(),
        }
    }

    /// The release flagged latest, if any
    #[must_use]
    pub fn latest_version(&self) -> Option<&VersionInfo> {
        self.versions.iter().find(|v| v.latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_labels() {
        assert_eq!(Severity::from_label("critical"), Severity::Critical);
        assert_eq!(Severity::from_label("MODERATE"), Severity::Medium);
        assert_eq!(Severity::from_label("whatever"), Severity::Unknown);
    }

    #[test]
    fn test_severity_from_score() {
        assert_eq!(Severity::from_score(9.8), Severity::Critical);
        assert_eq!(Severity::from_score(7.5), Severity::High);
        assert_eq!(Severity::from_score(5.0), Severity::Medium);
        assert_eq!(Severity::from_score(2.1), Severity::Low);
        assert_eq!(Severity::from_score(0.0), Severity::Unknown);
    }

    #[test]
    fn test_latest_version() {
        let mut info = LibraryInfo::new("lodash");
        info.versions.push(VersionInfo::new("4.17.20"));
        let mut latest = VersionInfo::new("4.17.21");
        latest.latest = true;
        info.versions.push(latest);
        assert_eq!(info.latest_version().map(|v| v.version.as_str()), Some("4.17.21"));
    }
}
