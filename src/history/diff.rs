//! Snapshot diffing into typed change events.

use super::commits::CommitInfo;
use crate::model::{DependencyKind, Project, StatusEntry};
use indexmap::IndexMap;

/// A project snapshot reduced to what the diff cares about:
/// name → (version, direct|transitive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub version: String,
    pub kind: DependencyKind,
}

pub type Snapshot = IndexMap<String, SnapshotEntry>;

/// Reduce a parsed project to its diffable snapshot map.
#[must_use]
pub fn snapshot_of(project: &Project) -> Snapshot {
    project
        .dependencies
        .values()
        .map(|dep| {
            (
                dep.name.clone(),
                SnapshotEntry {
                    version: dep.version.clone(),
                    kind: project.classify(dep),
                },
            )
        })
        .collect()
}

/// Diff two consecutive snapshots into change events.
///
/// MODIFIED and ADDED come out in the new snapshot's order, DELETED in the
/// old snapshot's order. Unchanged versions produce nothing.
#[must_use]
pub fn diff_snapshots(
    old: &Snapshot,
    new: &Snapshot,
    commit: &CommitInfo,
    project_name: &str,
) -> Vec<(String, StatusEntry)> {
    let mut events = Vec::new();
    for (name, entry) in new {
        match old.get(name) {
            None => events.push((
                name.clone(),
                StatusEntry::added(&commit.id, commit.date, &entry.version, project_name, entry.kind),
            )),
            Some(previous) if previous.version != entry.version => events.push((
                name.clone(),
                StatusEntry::modified(
                    &commit.id,
                    commit.date,
                    &previous.version,
                    &entry.version,
                    project_name,
                    entry.kind,
                ),
            )),
            Some(_) => {}
        }
    }
    for (name, entry) in old {
        if !new.contains_key(name) {
            events.push((
                name.clone(),
                StatusEntry::deleted(&commit.id, commit.date, &entry.version, project_name, entry.kind),
            ));
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StatusAction;
    use chrono::Utc;

    fn entry(version: &str, kind: DependencyKind) -> SnapshotEntry {
        SnapshotEntry {
            version: version.to_string(),
            kind,
        }
    }

    fn commit() -> CommitInfo {
        CommitInfo {
            id: "abc123".to_string(),
            parents: Vec::new(),
            date: Utc::now(),
        }
    }

    #[test]
    fn test_diff_both_directions() {
        let a: Snapshot = [("x".to_string(), entry("1.0", DependencyKind::Direct))]
            .into_iter()
            .collect();
        let b: Snapshot = [
            ("x".to_string(), entry("2.0", DependencyKind::Direct)),
            ("y".to_string(), entry("1.0", DependencyKind::Transitive)),
        ]
        .into_iter()
        .collect();

        let forward = diff_snapshots(&a, &b, &commit(), "app");
        assert_eq!(forward.len(), 2);
        assert_eq!(forward[0].0, "x");
        assert_eq!(forward[0].1.action, StatusAction::Modified);
        assert_eq!(forward[0].1.from_version.as_deref(), Some("1.0"));
        assert_eq!(forward[0].1.to_version.as_deref(), Some("2.0"));
        assert_eq!(forward[1].0, "y");
        assert_eq!(forward[1].1.action, StatusAction::Added);
        assert_eq!(forward[1].1.dep_type, DependencyKind::Transitive);

        let backward = diff_snapshots(&b, &a, &commit(), "app");
        assert_eq!(backward.len(), 2);
        assert_eq!(backward[0].1.action, StatusAction::Modified);
        assert_eq!(backward[0].1.to_version.as_deref(), Some("1.0"));
        assert_eq!(backward[1].0, "y");
        assert_eq!(backward[1].1.action, StatusAction::Deleted);
        assert_eq!(backward[1].1.version.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_same_version_emits_nothing() {
        let a: Snapshot = [("x".to_string(), entry("1.0", DependencyKind::Direct))]
            .into_iter()
            .collect();
        assert!(diff_snapshots(&a, &a.clone(), &commit(), "app").is_empty());
    }

    #[test]
    fn test_snapshot_reduction_classifies() {
        use crate::model::Dependency;
        use std::path::PathBuf;

        let mut project = Project::new("app", "1.0.0", PathBuf::from("lock"));
        let root = project.root_id();
        project.add_dependency(Dependency::new("a", "1.0").requested_by(&root));
        project.add_dependency(Dependency::new("b", "2.0").requested_by("a@1.0"));

        let snapshot = snapshot_of(&project);
        assert_eq!(snapshot["a"].kind, DependencyKind::Direct);
        assert_eq!(snapshot["b"].kind, DependencyKind::Transitive);
    }
}
