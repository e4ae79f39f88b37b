//! RubyGems plugin: `Gemfile.lock` parsing.
//!
//! The lock's `GEM`/`specs:` block lists resolved gems at 4-space indent and
//! each gem's requirements at 6-space indent. The `DEPENDENCIES` block names
//! the gems the Gemfile requests directly.

use super::{Checker, ContextKind, Extractor, ParseContext, Parser};
use crate::error::{DepTrailError, ParseErrorKind, Result};
use crate::model::{Dependency, Project, dependency_id};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

pub const LOCK_FILE: &str = "Gemfile.lock";
pub const MANIFEST_FILE: &str = "Gemfile";

pub struct GemExtractor;

impl Extractor for GemExtractor {
    fn file_patterns(&self) -> &'static [&'static str] {
        &["**/Gemfile", "**/Gemfile.lock"]
    }

    fn create_contexts(&self, paths: &[PathBuf]) -> Result<Vec<ParseContext>> {
        // same-directory pairing only, no ancestor search
        let mut dirs: BTreeMap<PathBuf, (Option<PathBuf>, Option<PathBuf>)> = BTreeMap::new();
        for path in paths {
            let dir = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
            let slot = dirs.entry(dir).or_default();
            match path.file_name().and_then(|f| f.to_str()) {
                Some(MANIFEST_FILE) => slot.0 = Some(path.clone()),
                Some(LOCK_FILE) => slot.1 = Some(path.clone()),
                _ => {}
            }
        }
        Ok(dirs
            .into_iter()
            .filter_map(|(dir, (manifest, lock))| {
                lock.map(|lock| ParseContext {
                    kind: ContextKind::GemLock,
                    root: dir,
                    manifest,
                    lockfile: Some(lock),
                })
            })
            .collect())
    }
}

/// A resolved spec line (`    name (version)`) and its requirement lines
/// (`      name (constraint)`).
struct Spec {
    name: String,
    version: String,
    requirements: Vec<String>,
}

/// `name (version)` → (name, Some(version)); bare `name` → (name, None)
fn split_name_version(line: &str) -> (String, Option<String>) {
    match line.split_once(" (") {
        Some((name, rest)) => (
            name.trim().to_string(),
            Some(rest.trim_end_matches(')').to_string()),
        ),
        None => (line.trim().to_string(), None),
    }
}

fn parse_lock(content: &str) -> (Vec<Spec>, Vec<String>) {
    let mut specs: Vec<Spec> = Vec::new();
    let mut direct: Vec<String> = Vec::new();
    let mut section = "";
    let mut in_specs = false;

    for line in content.lines() {
        if !line.starts_with(' ') && !line.trim().is_empty() {
            section = line.trim();
            in_specs = false;
            continue;
        }
        match section {
            "GEM" | "GIT" | "PATH" => {
                if line.trim() == "specs:" {
                    in_specs = true;
                } else if in_specs {
                    let indent = line.len() - line.trim_start().len();
                    if indent == 4 {
                        let (name, version) = split_name_version(line.trim());
                        if let Some(version) = version {
                            specs.push(Spec {
                                name,
                                version,
                                requirements: Vec::new(),
                            });
                        }
                    } else if indent == 6 {
                        let (name, _) = split_name_version(line.trim());
                        if let Some(spec) = specs.last_mut() {
                            spec.requirements.push(name);
                        }
                    }
                }
            }
            "DEPENDENCIES" => {
                if !line.trim().is_empty() {
                    let (name, _) = split_name_version(line.trim());
                    direct.push(name.trim_end_matches('!').to_string());
                }
            }
            _ => {}
        }
    }
    (specs, direct)
}

pub struct GemParser;

impl Parser for GemParser {
    fn parse_dependency_tree(&self, ctx: &ParseContext) -> Result<Project> {
        let lock_path = ctx.lockfile.as_ref().ok_or_else(|| {
            DepTrailError::parse(
                "gem",
                ParseErrorKind::EmptyInput("context has no lockfile".to_string()),
            )
        })?;
        let content =
            std::fs::read_to_string(lock_path).map_err(|e| DepTrailError::io(lock_path, e))?;
        let (specs, direct) = parse_lock(&content);
        if specs.is_empty() {
            return Err(DepTrailError::parse(
                "gem",
                ParseErrorKind::EmptyInput(lock_path.display().to_string()),
            ));
        }

        let name = ctx
            .root
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("ruby-project")
            .to_string();
        let mut project = Project::new(name, "0.0.0", lock_path.clone());
        let root_id = project.root_id();

        let mut resolved: HashMap<&str, &str> = HashMap::new();
        for spec in &specs {
            resolved.insert(&spec.name, &spec.version);
        }

        for spec in &specs {
            let mut dep = Dependency::new(spec.name.clone(), spec.version.clone());
            if direct.contains(&spec.name) {
                dep = dep.requested_by(&root_id);
            }
            project.add_dependency(dep);
        }
        for spec in &specs {
            let parent_id = dependency_id(&spec.name, &spec.version);
            for child_name in &spec.requirements {
                let Some(child_version) = resolved.get(child_name.as_str()) else {
                    continue;
                };
                let child_id = dependency_id(child_name, child_version);
                if let Some(child) = project.dependencies.get_mut(&child_id) {
                    child.add_parent(&parent_id);
                }
            }
        }
        project.attach_orphans_to_root();
        Ok(project)
    }
}

pub struct GemChecker;

impl Checker for GemChecker {
    fn advisory_ecosystem(&self) -> &'static str {
        "RubyGems"
    }

    fn purl(&self, name: &str, version: &str) -> Result<String> {
        super::build_purl("gem", None, name, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DependencyKind;
    use std::fs;

    const LOCK: &str = "\
GEM
  remote: https://rubygems.org/
  specs:
    actioncable (7.0.4)
      actionpack (= 7.0.4)
      nio4r (~> 2.0)
    actionpack (7.0.4)
      rack (~> 2.0, >= 2.2.0)
    nio4r (2.5.8)
    rack (2.2.4)
    rake (13.0.6)

PLATFORMS
  ruby

DEPENDENCIES
  actioncable (~> 7.0)
  rake

BUNDLED WITH
   2.3.26
";

    fn parse(lock: &str) -> Project {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(LOCK_FILE);
        fs::write(&lock_path, lock).unwrap();
        let ctx = ParseContext {
            kind: ContextKind::GemLock,
            root: dir.path().to_path_buf(),
            manifest: None,
            lockfile: Some(lock_path),
        };
        GemParser.parse_dependency_tree(&ctx).unwrap()
    }

    #[test]
    fn test_lock_graph() {
        let project = parse(LOCK);
        let cable = &project.dependencies["actioncable@7.0.4"];
        assert_eq!(project.classify(cable), DependencyKind::Direct);

        let pack = &project.dependencies["actionpack@7.0.4"];
        assert_eq!(pack.requested_by, vec!["actioncable@7.0.4"]);
        assert_eq!(project.classify(pack), DependencyKind::Transitive);

        // requirement constraints resolve to the spec's pinned version
        let rack = &project.dependencies["rack@2.2.4"];
        assert_eq!(rack.requested_by, vec!["actionpack@7.0.4"]);

        let rake = &project.dependencies["rake@13.0.6"];
        assert_eq!(project.classify(rake), DependencyKind::Direct);
    }

    #[test]
    fn test_empty_lock_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(LOCK_FILE);
        fs::write(&lock_path, "PLATFORMS\n  ruby\n").unwrap();
        let ctx = ParseContext {
            kind: ContextKind::GemLock,
            root: dir.path().to_path_buf(),
            manifest: None,
            lockfile: Some(lock_path),
        };
        assert!(GemParser.parse_dependency_tree(&ctx).is_err());
    }

    #[test]
    fn test_pinned_git_dependency_marker_stripped() {
        let (_, direct) = parse_lock("DEPENDENCIES\n  mygem!\n");
        assert_eq!(direct, vec!["mygem"]);
    }

    #[test]
    fn test_purl() {
        assert_eq!(
            GemChecker.purl("rack", "2.2.4").unwrap(),
            "pkg:gem/rack@2.2.4"
        );
    }
}
