//! Upgrade/downgrade classification per calendar day.

use crate::model::{CommitDependencyHistory, StatusAction};
use crate::utils::version;
use indexmap::IndexMap;
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Default, Clone, Serialize)]
pub struct VersionChangeEntry {
    pub upgrades: usize,
    pub downgrades: usize,
}

/// Classify every MODIFIED event as upgrade or downgrade by semantic-version
/// comparison, keyed by the event's calendar day (`YYYY-MM-DD`). Events
/// where either version fails validation are skipped.
#[must_use]
pub fn version_changes(history: &CommitDependencyHistory) -> IndexMap<String, VersionChangeEntry> {
    let mut days: IndexMap<String, VersionChangeEntry> = IndexMap::new();
    for events in history.0.values() {
        for event in events {
            let entry = &event.entry;
            if entry.action != StatusAction::Modified {
                continue;
            }
            let (Some(from), Some(to)) = (entry.from_version.as_deref(), entry.to_version.as_deref())
            else {
                continue;
            };
            let Some(ordering) = version::compare(from, to) else {
                tracing::debug!(
                    dependency = %event.dependency_name,
                    from,
                    to,
                    "unparseable version change skipped"
                );
                continue;
            };
            let day = entry.date.format("%Y-%m-%d").to_string();
            let tally = days.entry(day).or_default();
            match ordering {
                Ordering::Less => tally.upgrades += 1,
                Ordering::Greater => tally.downgrades += 1,
                Ordering::Equal => {}
            }
        }
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DependencyKind, StatusEntry};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_upgrade_downgrade_and_skip() {
        let date = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
        let mut history = CommitDependencyHistory::default();
        history.push(
            "a",
            StatusEntry::modified("c1", date, "1.2.0", "1.3.0", "app", DependencyKind::Direct),
        );
        history.push(
            "b",
            StatusEntry::modified("c1", date, "1.3.0", "1.2.0", "app", DependencyKind::Direct),
        );
        history.push(
            "c",
            StatusEntry::modified(
                "c1",
                date,
                "1.2.0",
                "not-a-version",
                "app",
                DependencyKind::Direct,
            ),
        );

        let days = version_changes(&history);
        assert_eq!(days.len(), 1);
        let day = &days["2024-03-05"];
        assert_eq!(day.upgrades, 1);
        assert_eq!(day.downgrades, 1);
    }
}
