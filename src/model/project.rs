//! Project and Dependency graph structures.

use super::{LibraryInfo, Vulnerability};
use crate::utils::version;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use xxhash_rust::xxh3::xxh3_64;

/// Build the canonical `name@version` id used for dependencies and for a
/// project's synthetic root.
#[must_use]
pub fn dependency_id(name: &str, version: &str) -> String {
    format!("{name}@{version}")
}

/// Whether a dependency is requested by the project root itself or only by
/// another dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Direct,
    Transitive,
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Transitive => write!(f, "transitive"),
        }
    }
}

/// One node in a project's dependency graph.
///
/// `requested_by` is an ordered list of parent ids and allows multiple
/// parents: the graph is a DAG, not a tree, and a dependency reachable via
/// several paths keeps one entry per path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    /// Canonical `name@version` id
    pub id: String,
    /// Package name
    pub name: String,
    /// Resolved version string as it appears in the lockfile
    pub version: String,
    /// Best-effort parsed semantic version (strict, then coerced)
    pub semver: Option<semver::Version>,
    /// Ecosystem-specific type/scope (e.g. `compile`, `dev`, `runtime`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dep_type: Option<String>,
    /// Parent ids that requested this dependency
    pub requested_by: Vec<String>,
    /// Registry metadata, attached by enrichment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_info: Option<LibraryInfo>,
    /// Known vulnerabilities, attached by enrichment
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vulnerabilities: Vec<Vulnerability>,
}

impl Dependency {
    /// Create a new dependency node; the semantic version is parsed
    /// best-effort and left `None` when even coercion fails.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let name = name.into();
        let version = version.into();
        Self {
            id: dependency_id(&name, &version),
            semver: version::parse(&version),
            name,
            version,
            dep_type: None,
            requested_by: Vec::new(),
            library_info: None,
            vulnerabilities: Vec::new(),
        }
    }

    /// Set the ecosystem-specific type/scope
    #[must_use]
    pub fn with_type(mut self, dep_type: impl Into<String>) -> Self {
        self.dep_type = Some(dep_type.into());
        self
    }

    /// Record a parent id; duplicates are ignored, additional distinct
    /// parents accumulate (diamond dependencies).
    pub fn add_parent(&mut self, parent_id: &str) {
        if !self.requested_by.iter().any(|p| p == parent_id) {
            self.requested_by.push(parent_id.to_string());
        }
    }

    /// Convenience builder form of [`add_parent`](Self::add_parent)
    #[must_use]
    pub fn requested_by(mut self, parent_id: &str) -> Self {
        self.add_parent(parent_id);
        self
    }
}

/// Normalized dependency graph for one manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Project name from the manifest
    pub name: String,
    /// Project version from the manifest
    pub version: String,
    /// Manifest location
    pub path: PathBuf,
    /// Dependencies keyed by `name@version` id
    pub dependencies: IndexMap<String, Dependency>,
}

impl Project {
    /// Create an empty project graph
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            path,
            dependencies: IndexMap::new(),
        }
    }

    /// The synthetic root id, implicit ancestor of all direct dependencies.
    #[must_use]
    pub fn root_id(&self) -> String {
        dependency_id(&self.name, &self.version)
    }

    /// Insert a dependency. When the id is already present the existing
    /// node absorbs the new parents instead of being overwritten.
    pub fn add_dependency(&mut self, dep: Dependency) {
        match self.dependencies.get_mut(&dep.id) {
            Some(existing) => {
                for parent in &dep.requested_by {
                    existing.add_parent(parent);
                }
                if existing.dep_type.is_none() {
                    existing.dep_type = dep.dep_type;
                }
            }
            None => {
                self.dependencies.insert(dep.id.clone(), dep);
            }
        }
    }

    /// Connect every dependency with no incoming edge from another package
    /// to the synthetic root. Graph-based lockfile parsers call this after
    /// edge construction.
    pub fn attach_orphans_to_root(&mut self) {
        let root_id = self.root_id();
        for dep in self.dependencies.values_mut() {
            if dep.requested_by.is_empty() {
                dep.add_parent(&root_id);
            }
        }
    }

    /// Classify a dependency as direct or transitive.
    ///
    /// Direct iff some `requested_by` entry equals the project's synthetic
    /// root id exactly. Prefix matching would misclassify when one project
    /// name is a prefix of another.
    #[must_use]
    pub fn classify(&self, dep: &Dependency) -> DependencyKind {
        let root = self.root_id();
        if dep.requested_by.iter().any(|p| *p == root) {
            DependencyKind::Direct
        } else {
            DependencyKind::Transitive
        }
    }

    /// Direct dependencies in insertion order
    pub fn direct_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        let root = self.root_id();
        self.dependencies
            .values()
            .filter(move |d| d.requested_by.iter().any(|p| *p == root))
    }

    /// Content hash over names and versions, used to skip no-op snapshot
    /// diffs during history replay.
    #[must_use]
    pub fn content_hash(&self) -> u64 {
        let mut input = Vec::new();
        input.extend(self.name.as_bytes());
        input.extend(self.version.as_bytes());
        let mut ids: Vec<&String> = self.dependencies.keys().collect();
        ids.sort();
        for id in ids {
            input.extend(id.as_bytes());
        }
        xxh3_64(&input)
    }
}
