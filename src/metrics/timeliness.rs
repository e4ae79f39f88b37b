//! Vulnerability-fix timeliness against severity-based business-day
//! thresholds.
//!
//! The traversal tracks, per `name@@range` pair, the earliest commit at
//! which a dependency was observed inside a vulnerable range. A MODIFIED
//! event whose `from` version satisfies the range and whose `to` version
//! does not marks the fix; elapsed business days between introduction and
//! fix decide in-time versus late.

use crate::model::{CommitDependencyHistory, LibraryInfo, Severity, StatusAction};
use crate::utils::version;
use chrono::{DateTime, Datelike, Utc, Weekday};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;

/// Business days a fix may take per severity.
#[must_use]
pub const fn fix_threshold(severity: Severity) -> i64 {
    match severity {
        Severity::Critical => 7,
        Severity::High => 15,
        Severity::Medium => 30,
        Severity::Low | Severity::Unknown => 60,
    }
}

/// Weekdays between two instants, weekends excluded. Counts days after
/// `from` up to and including `to`.
#[must_use]
pub fn business_days(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let mut day = from.date_naive();
    let end = to.date_naive();
    let mut count = 0;
    while day < end {
        day = day.succ_opt().unwrap_or(day);
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            count += 1;
        }
    }
    count
}

/// Timeliness tallies for one month bucket.
#[derive(Debug, Default, Clone, Serialize)]
pub struct TimelinessEntry {
    pub fixed_in_time: usize,
    pub fixed_late: usize,
}

fn intro_key(name: &str, range: &str) -> String {
    format!("{name}@@{range}")
}

/// Walk the commit-indexed event log and classify every vulnerability fix,
/// bucketed by the fix's month (`YYYY-MM`). `libraries` maps dependency
/// names to their registry metadata.
#[must_use]
pub fn fix_timeliness(
    history: &CommitDependencyHistory,
    libraries: &IndexMap<String, LibraryInfo>,
) -> IndexMap<String, TimelinessEntry> {
    let mut introductions: HashMap<String, DateTime<Utc>> = HashMap::new();
    let mut months: IndexMap<String, TimelinessEntry> = IndexMap::new();

    for events in history.0.values() {
        for event in events {
            let name = &event.dependency_name;
            let entry = &event.entry;
            let Some(info) = libraries.get(name) else {
                continue;
            };
            for vulnerability in &info.vulnerabilities {
                let range = &vulnerability.vulnerable_range;
                let key = intro_key(name, range);

                // entering the range: track the earliest observation
                if let Some(current) = entry.resulting_version() {
                    if version::satisfies(current, range) == Some(true) {
                        introductions.entry(key.clone()).or_insert(entry.date);
                    }
                }

                if entry.action != StatusAction::Modified {
                    continue;
                }
                let (Some(from), Some(to)) =
                    (entry.from_version.as_deref(), entry.to_version.as_deref())
                else {
                    continue;
                };
                let fixed = version::satisfies(from, range) == Some(true)
                    && version::satisfies(to, range) == Some(false);
                if !fixed {
                    continue;
                }

                let introduced = introductions.remove(&key).unwrap_or(entry.date);
                let elapsed = business_days(introduced, entry.date);
                let month = entry.date.format("%Y-%m").to_string();
                let tally = months.entry(month).or_default();
                if elapsed <= fix_threshold(vulnerability.severity) {
                    tally.fixed_in_time += 1;
                } else {
                    tally.fixed_late += 1;
                }
            }
        }
    }
    months
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DependencyKind, StatusEntry, Vulnerability};
    use chrono::{TimeZone, Utc};

    fn vulnerable_library(range: &str, severity: Severity) -> LibraryInfo {
        let mut info = LibraryInfo::new("lodash");
        info.vulnerabilities.push(Vulnerability {
            severity,
            score: None,
            summary: None,
            permalink: None,
            identifiers: vec!["CVE-2021-0000".to_string()],
            vulnerable_range: range.to_string(),
            first_patched_version: None,
        });
        info
    }

    fn history_with_fix(intro_day: u32, fix_day: u32) -> CommitDependencyHistory {
        let introduced = Utc.with_ymd_and_hms(2024, 4, intro_day, 9, 0, 0).unwrap();
        let fixed = Utc.with_ymd_and_hms(2024, 4, fix_day, 9, 0, 0).unwrap();
        let mut history = CommitDependencyHistory::default();
        history.push(
            "lodash",
            StatusEntry::added("c1", introduced, "4.17.20", "app", DependencyKind::Direct),
        );
        history.push(
            "lodash",
            StatusEntry::modified(
                "c2",
                fixed,
                "4.17.20",
                "4.17.21",
                "app",
                DependencyKind::Direct,
            ),
        );
        history
    }

    #[test]
    fn test_business_days_skip_weekends() {
        // Monday 2024-04-01 to Monday 2024-04-15: 10 business days
        let from = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 4, 15, 0, 0, 0).unwrap();
        assert_eq!(business_days(from, to), 10);
    }

    #[test]
    fn test_high_fix_within_threshold_is_in_time() {
        // introduced Mon 2024-04-01, fixed Mon 2024-04-15: 10 business days
        let libraries: IndexMap<String, LibraryInfo> = [(
            "lodash".to_string(),
            vulnerable_library("< 4.17.21", Severity::High),
        )]
        .into_iter()
        .collect();
        let months = fix_timeliness(&history_with_fix(1, 15), &libraries);
        let april = &months["2024-04"];
        assert_eq!(april.fixed_in_time, 1);
        assert_eq!(april.fixed_late, 0);
    }

    #[test]
    fn test_high_fix_past_threshold_is_late() {
        // introduced Mon 2024-04-01, fixed Mon 2024-04-29: 20 business days
        let libraries: IndexMap<String, LibraryInfo> = [(
            "lodash".to_string(),
            vulnerable_library("< 4.17.21", Severity::High),
        )]
        .into_iter()
        .collect();
        let months = fix_timeliness(&history_with_fix(1, 29), &libraries);
        let april = &months["2024-04"];
        assert_eq!(april.fixed_in_time, 0);
        assert_eq!(april.fixed_late, 1);
    }

    #[test]
    fn test_untracked_dependency_contributes_nothing() {
        let months = fix_timeliness(&history_with_fix(1, 15), &IndexMap::new());
        assert!(months.is_empty());
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(fix_threshold(Severity::Critical), 7);
        assert_eq!(fix_threshold(Severity::High), 15);
        assert_eq!(fix_threshold(Severity::Medium), 30);
        assert_eq!(fix_threshold(Severity::Low), 60);
    }
}
