//! Per-commit snapshot materialization.
//!
//! Most ecosystems keep their lockfiles in version control, so materializing
//! a snapshot means extracting the plugin-relevant blobs of a commit into a
//! scratch directory (the whole matching set, not only the changed files —
//! lockfile parsing needs the manifest even when only the lockfile changed).
//!
//! Maven is the exception: the dependency tree is not stored in git, so the
//! commit is checked out into the repository's working tree and the build
//! tool re-invoked to regenerate it. That path mutates shared state and is
//! serialized through `&mut` access.

use super::commits::CommitInfo;
use crate::error::{DepTrailError, Result};
use crate::plugins::Plugin;
use git2::{Oid, Repository, TreeWalkMode, TreeWalkResult, build::CheckoutBuilder};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use walkdir::WalkDir;

/// File paths changed by a commit relative to its first parent, via
/// per-path blob-id comparison across the two trees. Root commits diff
/// against the empty tree.
pub fn changed_paths(repo: &Repository, commit: &CommitInfo) -> Result<Vec<PathBuf>> {
    let oid = Oid::from_str(&commit.id)?;
    let current = repo.find_commit(oid)?;
    let new_tree = current.tree()?;
    let old_tree = match current.parent(0) {
        Ok(parent) => Some(parent.tree()?),
        Err(_) => None,
    };

    let diff = repo.diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), None)?;
    let mut paths = Vec::new();
    for delta in diff.deltas() {
        if let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) {
            paths.push(path.to_path_buf());
        }
    }
    Ok(paths)
}

/// Remembers where HEAD pointed before replay started checking commits out,
/// and puts the repository back there on drop. Restore failures are logged,
/// not propagated.
pub struct HeadGuard<'repo> {
    repo: &'repo Repository,
    original: OriginalHead,
}

enum OriginalHead {
    Branch(String),
    Detached(Oid),
}

impl<'repo> HeadGuard<'repo> {
    pub fn new(repo: &'repo Repository) -> Result<Self> {
        let head = repo.head()?;
        let original = if head.is_branch() {
            let name = head
                .name()
                .ok_or_else(|| DepTrailError::Git("HEAD reference has no name".to_string()))?;
            OriginalHead::Branch(name.to_string())
        } else {
            let oid = head
                .target()
                .ok_or_else(|| DepTrailError::Git("HEAD has no target".to_string()))?;
            OriginalHead::Detached(oid)
        };
        Ok(Self { repo, original })
    }
}

impl Drop for HeadGuard<'_> {
    fn drop(&mut self) {
        let restored = (|| -> Result<()> {
            match &self.original {
                OriginalHead::Branch(name) => self.repo.set_head(name)?,
                OriginalHead::Detached(oid) => self.repo.set_head_detached(*oid)?,
            }
            self.repo
                .checkout_head(Some(CheckoutBuilder::new().force()))?;
            Ok(())
        })();
        if let Err(err) = restored {
            tracing::warn!(error = %err, "failed to restore repository HEAD after replay");
        }
    }
}

/// A snapshot's parse contexts plus the scratch directory keeping their
/// files alive. Dropping this removes the extracted blobs.
pub struct MaterializedSnapshot {
    _scratch: Option<TempDir>,
    pub contexts: Vec<crate::plugins::ParseContext>,
}

/// Runs external build tools for tree regeneration. Holds no state beyond
/// the timeout; exclusivity comes from `&mut` at the call sites.
#[derive(Debug)]
pub struct BuildToolRunner {
    timeout: Duration,
}

impl Default for BuildToolRunner {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
        }
    }
}

impl BuildToolRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Regenerate `deptree.txt` files across a Maven checkout. Never run
    /// concurrently against the same working tree.
    pub fn regenerate_maven_tree(&mut self, workdir: &Path) -> Result<()> {
        let mut child = Command::new("mvn")
            .args([
                "-q",
                "-B",
                "dependency:tree",
                "-DoutputFile=deptree.txt",
            ])
            .current_dir(workdir)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| DepTrailError::BuildTool(format!("failed to start mvn: {e}")))?;

        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if status.success() {
                        return Ok(());
                    }
                    return Err(DepTrailError::BuildTool(format!(
                        "mvn dependency:tree exited with {status}"
                    )));
                }
                Ok(None) => {
                    if started.elapsed() > self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(DepTrailError::BuildTool(format!(
                            "mvn dependency:tree timed out after {:?}",
                            self.timeout
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(200));
                }
                Err(e) => {
                    return Err(DepTrailError::BuildTool(format!(
                        "failed to poll mvn: {e}"
                    )));
                }
            }
        }
    }
}

/// Extract every blob of a commit matching the plugin's patterns into a
/// scratch directory, then group the extracted paths into parse contexts.
pub fn extract_contexts(
    repo: &Repository,
    commit: &CommitInfo,
    plugin: &Plugin,
) -> Result<MaterializedSnapshot> {
    let oid = Oid::from_str(&commit.id)?;
    let tree = repo.find_commit(oid)?.tree()?;
    let scratch = TempDir::new().map_err(DepTrailError::from)?;

    let mut extracted = Vec::new();
    let mut walk_error = None;
    tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
        let Some(name) = entry.name() else {
            return TreeWalkResult::Ok;
        };
        if entry.kind() != Some(git2::ObjectType::Blob) {
            return TreeWalkResult::Ok;
        }
        let rel = PathBuf::from(dir).join(name);
        if !plugin.matches_path(&rel) {
            return TreeWalkResult::Ok;
        }
        let result = (|| -> Result<()> {
            let blob = repo.find_blob(entry.id())?;
            let dest = scratch.path().join(&rel);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| DepTrailError::io(parent, e))?;
            }
            std::fs::write(&dest, blob.content()).map_err(|e| DepTrailError::io(&dest, e))?;
            extracted.push(dest);
            Ok(())
        })();
        match result {
            Ok(()) => TreeWalkResult::Ok,
            Err(err) => {
                walk_error = Some(err);
                TreeWalkResult::Abort
            }
        }
    })?;
    if let Some(err) = walk_error {
        return Err(err);
    }

    let contexts = plugin.extractor().create_contexts(&extracted)?;
    Ok(MaterializedSnapshot {
        _scratch: Some(scratch),
        contexts,
    })
}

/// Materialize a Maven snapshot: check the commit out into the repository's
/// working tree, regenerate the dependency trees, and group the resulting
/// files into contexts. Serialized by `&mut BuildToolRunner`.
pub fn checkout_and_regenerate(
    repo: &Repository,
    commit: &CommitInfo,
    plugin: &Plugin,
    runner: &mut BuildToolRunner,
) -> Result<MaterializedSnapshot> {
    let workdir = repo
        .workdir()
        .ok_or_else(|| DepTrailError::Git("bare repository has no working tree".to_string()))?
        .to_path_buf();

    let oid = Oid::from_str(&commit.id)?;
    let object = repo.find_object(oid, None)?;
    repo.checkout_tree(&object, Some(CheckoutBuilder::new().force()))?;
    repo.set_head_detached(oid)?;

    runner.regenerate_maven_tree(&workdir)?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(&workdir)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(std::result::Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(&workdir) else {
            continue;
        };
        if plugin.matches_path(rel) {
            paths.push(entry.path().to_path_buf());
        }
    }

    let contexts = plugin.extractor().create_contexts(&paths)?;
    Ok(MaterializedSnapshot {
        _scratch: None,
        contexts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::commits;
    use crate::plugins::PluginSet;
    use std::process::Command;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "test")
            .env("GIT_AUTHOR_EMAIL", "test@test")
            .env("GIT_COMMITTER_NAME", "test")
            .env("GIT_COMMITTER_EMAIL", "test@test")
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?}");
    }

    fn commit_all(dir: &Path, message: &str) {
        git(dir, &["add", "-A"]);
        git(dir, &["commit", "-m", message]);
    }

    #[test]
    fn test_changed_paths_and_blob_extraction() {
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-q"]);

        std::fs::write(
            dir.path().join("package.json"),
            r#"{"name":"app","version":"1.0.0"}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("package-lock.json"),
            r#"{"name":"app","version":"1.0.0","lockfileVersion":3,"packages":{"":{"name":"app","version":"1.0.0"}}}"#,
        )
        .unwrap();
        commit_all(dir.path(), "initial");

        std::fs::write(
            dir.path().join("package-lock.json"),
            r#"{"name":"app","version":"1.0.0","lockfileVersion":3,"packages":{"":{"name":"app","version":"1.0.0","dependencies":{"left-pad":"^1.3.0"}},"node_modules/left-pad":{"version":"1.3.0"}}}"#,
        )
        .unwrap();
        commit_all(dir.path(), "add left-pad");

        let repo = Repository::open(dir.path()).unwrap();
        let ordered = commits::topological_order(&commits::enumerate(&repo).unwrap());
        assert_eq!(ordered.len(), 2);

        let first_changes = changed_paths(&repo, &ordered[0]).unwrap();
        assert_eq!(first_changes.len(), 2);
        let second_changes = changed_paths(&repo, &ordered[1]).unwrap();
        assert_eq!(second_changes, vec![PathBuf::from("package-lock.json")]);

        // blob extraction fetches manifest and lockfile both
        let plugins = PluginSet::all();
        let npm = plugins.iter().find(|p| p.name() == "npm").unwrap();
        let snapshot = extract_contexts(&repo, &ordered[1], npm).unwrap();
        assert_eq!(snapshot.contexts.len(), 1);
        let ctx = &snapshot.contexts[0];
        assert!(ctx.manifest.as_ref().unwrap().is_file());
        assert!(ctx.lockfile.as_ref().unwrap().is_file());
    }

    #[test]
    fn test_head_guard_restores_branch_and_working_tree() {
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-q"]);
        std::fs::write(dir.path().join("pom.xml"), "<project>v1</project>").unwrap();
        commit_all(dir.path(), "first");
        std::fs::write(dir.path().join("pom.xml"), "<project>v2</project>").unwrap();
        commit_all(dir.path(), "second");

        let repo = Repository::open(dir.path()).unwrap();
        let ordered = commits::topological_order(&commits::enumerate(&repo).unwrap());

        {
            let _guard = HeadGuard::new(&repo).unwrap();
            let oid = Oid::from_str(&ordered[0].id).unwrap();
            let object = repo.find_object(oid, None).unwrap();
            repo.checkout_tree(&object, Some(CheckoutBuilder::new().force()))
                .unwrap();
            repo.set_head_detached(oid).unwrap();
            assert!(repo.head_detached().unwrap());
            let content = std::fs::read_to_string(dir.path().join("pom.xml")).unwrap();
            assert_eq!(content, "<project>v1</project>");
        }

        // guard dropped: back on the branch with the latest working tree
        assert!(!repo.head_detached().unwrap());
        assert!(repo.head().unwrap().is_branch());
        let content = std::fs::read_to_string(dir.path().join("pom.xml")).unwrap();
        assert_eq!(content, "<project>v2</project>");
    }
}
