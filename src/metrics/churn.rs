//! Addition/removal churn per project and commit.

use crate::model::{CommitDependencyHistory, DependencyKind, StatusAction};
use indexmap::IndexMap;
use serde::Serialize;

/// Tallies for one (project, commit) pair.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ChurnEntry {
    pub added_direct: usize,
    pub added_transitive: usize,
    pub deleted_direct: usize,
    pub deleted_transitive: usize,
}

/// ADDED/DELETED counts keyed `{project}@{commit_id}`, split by
/// direct/transitive. MODIFIED events contribute nothing.
#[must_use]
pub fn dependency_churn(history: &CommitDependencyHistory) -> IndexMap<String, ChurnEntry> {
    let mut churn: IndexMap<String, ChurnEntry> = IndexMap::new();
    for (commit_id, events) in &history.0 {
        for event in events {
            let entry = &event.entry;
            let key = format!("{}@{commit_id}", entry.project);
            let tally = churn.entry(key).or_default();
            match (entry.action, entry.dep_type) {
                (StatusAction::Added, DependencyKind::Direct) => tally.added_direct += 1,
                (StatusAction::Added, DependencyKind::Transitive) => tally.added_transitive += 1,
                (StatusAction::Deleted, DependencyKind::Direct) => tally.deleted_direct += 1,
                (StatusAction::Deleted, DependencyKind::Transitive) => {
                    tally.deleted_transitive += 1;
                }
                (StatusAction::Modified, _) => {}
            }
        }
    }
    churn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StatusEntry;
    use chrono::Utc;

    #[test]
    fn test_churn_split_by_kind() {
        let date = Utc::now();
        let mut history = CommitDependencyHistory::default();
        history.push(
            "a",
            StatusEntry::added("c1", date, "1.0", "app", DependencyKind::Direct),
        );
        history.push(
            "b",
            StatusEntry::added("c1", date, "1.0", "app", DependencyKind::Transitive),
        );
        history.push(
            "c",
            StatusEntry::deleted("c1", date, "0.9", "app", DependencyKind::Direct),
        );
        history.push(
            "a",
            StatusEntry::modified("c2", date, "1.0", "1.1", "app", DependencyKind::Direct),
        );

        let churn = dependency_churn(&history);
        let c1 = &churn["app@c1"];
        assert_eq!(c1.added_direct, 1);
        assert_eq!(c1.added_transitive, 1);
        assert_eq!(c1.deleted_direct, 1);
        assert_eq!(c1.deleted_transitive, 0);
        // modifications are not churn
        assert!(!churn.contains_key("app@c2"));
    }
}
