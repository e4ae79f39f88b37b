//! Typed change events produced by the history engine.
//!
//! Entries are immutable once created and are indexed two ways: by dependency
//! name ([`DependencyHistory`]) and by commit id
//! ([`CommitDependencyHistory`], where each event is additionally tagged with
//! the dependency name).

use super::DependencyKind;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// What happened to a dependency between two consecutive snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusAction {
    Added,
    Deleted,
    Modified,
}

/// One change event for a dependency at a commit.
///
/// `version` is set for ADDED/DELETED; `from_version`/`to_version` for
/// MODIFIED.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEntry {
    pub commit_id: String,
    pub date: DateTime<Utc>,
    pub action: StatusAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_version: Option<String>,
    /// Name of the project whose snapshot produced the event
    pub project: String,
    #[serde(rename = "type")]
    pub dep_type: DependencyKind,
}

impl StatusEntry {
    #[must_use]
    pub fn added(
        commit_id: &str,
        date: DateTime<Utc>,
        version: &str,
        project: &str,
        dep_type: DependencyKind,
    ) -> Self {
        Self {
            commit_id: commit_id.to_string(),
            date,
            action: StatusAction::Added,
            version: Some(version.to_string()),
            from_version: None,
            to_version: None,
            project: project.to_string(),
            dep_type,
        }
    }

    #[must_use]
    pub fn deleted(
        commit_id: &str,
        date: DateTime<Utc>,
        version: &str,
        project: &str,
        dep_type: DependencyKind,
    ) -> Self {
        Self {
            commit_id: commit_id.to_string(),
            date,
            action: StatusAction::Deleted,
            version: Some(version.to_string()),
            from_version: None,
            to_version: None,
            project: project.to_string(),
            dep_type,
        }
    }

    #[must_use]
    pub fn modified(
        commit_id: &str,
        date: DateTime<Utc>,
        from_version: &str,
        to_version: &str,
        project: &str,
        dep_type: DependencyKind,
    ) -> Self {
        Self {
            commit_id: commit_id.to_string(),
            date,
            action: StatusAction::Modified,
            version: None,
            from_version: Some(from_version.to_string()),
            to_version: Some(to_version.to_string()),
            project: project.to_string(),
            dep_type,
        }
    }

    /// The version this event leaves the dependency at, if any.
    /// DELETED events leave none.
    #[must_use]
    pub fn resulting_version(&self) -> Option<&str> {
        match self.action {
            StatusAction::Added => self.version.as_deref(),
            StatusAction::Modified => self.to_version.as_deref(),
            StatusAction::Deleted => None,
        }
    }
}

/// A status entry tagged with its dependency name, used by the
/// commit-indexed view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitStatusEntry {
    pub dependency_name: String,
    #[serde(flatten)]
    pub entry: StatusEntry,
}

/// Event log indexed by dependency name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyHistory(pub IndexMap<String, Vec<StatusEntry>>);

impl DependencyHistory {
    pub fn push(&mut self, dependency_name: &str, entry: StatusEntry) {
        self.0
            .entry(dependency_name.to_string())
            .or_default()
            .push(entry);
    }
}

/// Event log indexed by commit id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitDependencyHistory(pub IndexMap<String, Vec<CommitStatusEntry>>);

impl CommitDependencyHistory {
    pub fn push(&mut self, dependency_name: &str, entry: StatusEntry) {
        self.0
            .entry(entry.commit_id.clone())
            .or_default()
            .push(CommitStatusEntry {
                dependency_name: dependency_name.to_string(),
                entry,
            });
    }
}
