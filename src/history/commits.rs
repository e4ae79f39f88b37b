//! Commit enumeration and topological ordering.

use crate::error::Result;
use chrono::{DateTime, Utc};
use git2::Repository;
use std::collections::{HashMap, VecDeque};

/// One commit's identity, parents and author date.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub id: String,
    pub parents: Vec<String>,
    pub date: DateTime<Utc>,
}

/// Enumerate the full commit log reachable from HEAD.
pub fn enumerate(repo: &Repository) -> Result<Vec<CommitInfo>> {
    let mut walk = repo.revwalk()?;
    walk.push_head()?;

    let mut commits = Vec::new();
    for oid in walk {
        let oid = oid?;
        let commit = repo.find_commit(oid)?;
        let date = DateTime::<Utc>::from_timestamp(commit.time().seconds(), 0)
            .unwrap_or_else(Utc::now);
        commits.push(CommitInfo {
            id: oid.to_string(),
            parents: commit.parent_ids().map(|p| p.to_string()).collect(),
            date,
        });
    }
    Ok(commits)
}

/// Order commits parent-before-child with Kahn's algorithm.
///
/// Parents outside the enumerated set (shallow clones, filtered walks) do
/// not count toward a commit's indegree. A merge commit is emitted exactly
/// once, after all of its known parents.
#[must_use]
pub fn topological_order(commits: &[CommitInfo]) -> Vec<CommitInfo> {
    let by_id: HashMap<&str, &CommitInfo> =
        commits.iter().map(|c| (c.id.as_str(), c)).collect();

    // parent -> children, plus remaining-parent counts
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut indegree: HashMap<&str, usize> = HashMap::new();
    for commit in commits {
        let known_parents: Vec<&str> = commit
            .parents
            .iter()
            .map(String::as_str)
            .filter(|p| by_id.contains_key(p))
            .collect();
        indegree.insert(&commit.id, known_parents.len());
        for parent in known_parents {
            children.entry(parent).or_default().push(&commit.id);
        }
    }

    let mut queue: VecDeque<&str> = commits
        .iter()
        .filter(|c| indegree[c.id.as_str()] == 0)
        .map(|c| c.id.as_str())
        .collect();

    let mut ordered = Vec::with_capacity(commits.len());
    while let Some(id) = queue.pop_front() {
        ordered.push(by_id[id].clone());
        for child in children.get(id).into_iter().flatten() {
            let remaining = indegree
                .get_mut(child)
                .map(|count| {
                    *count -= 1;
                    *count
                })
                .unwrap_or(0);
            if remaining == 0 {
                queue.push_back(child);
            }
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(id: &str, parents: &[&str]) -> CommitInfo {
        CommitInfo {
            id: id.to_string(),
            parents: parents.iter().map(ToString::to_string).collect(),
            date: Utc::now(),
        }
    }

    #[test]
    fn test_merge_commit_after_both_parents() {
        // enumeration order deliberately puts the merge first
        let commits = vec![
            commit("c", &["a", "b"]),
            commit("b", &[]),
            commit("a", &[]),
        ];
        let ordered = topological_order(&commits);
        let ids: Vec<&str> = ordered.iter().map(|c| c.id.as_str()).collect();
        let pos = |id: &str| ids.iter().position(|i| *i == id).unwrap();
        assert_eq!(ids.len(), 3);
        assert!(pos("c") > pos("a"));
        assert!(pos("c") > pos("b"));
    }

    #[test]
    fn test_merge_emitted_once() {
        let commits = vec![
            commit("root", &[]),
            commit("left", &["root"]),
            commit("right", &["root"]),
            commit("merge", &["left", "right"]),
        ];
        let ordered = topological_order(&commits);
        let merges = ordered.iter().filter(|c| c.id == "merge").count();
        assert_eq!(merges, 1);
        assert_eq!(ordered[0].id, "root");
        assert_eq!(ordered.last().unwrap().id, "merge");
    }

    #[test]
    fn test_unknown_parent_does_not_block() {
        // shallow history: parent missing from the enumerated set
        let commits = vec![commit("a", &["missing"]), commit("b", &["a"])];
        let ordered = topological_order(&commits);
        let ids: Vec<&str> = ordered.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
