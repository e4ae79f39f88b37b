//! PyPI plugin: `requirements.txt` paired with a `pipdeptree.json` graph
//! dump (`pipdeptree --json` output).
//!
//! The dump carries the full installed graph; requirements.txt marks which
//! packages the project requests directly.

use super::{Checker, ContextKind, Extractor, ParseContext, Parser};
use crate::error::{DepTrailError, ParseErrorKind, Result};
use crate::model::{Dependency, Project, dependency_id};
use crate::utils::paths;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

pub const GRAPH_FILE: &str = "pipdeptree.json";
pub const MANIFEST_FILE: &str = "requirements.txt";

pub struct PypiExtractor;

impl Extractor for PypiExtractor {
    fn file_patterns(&self) -> &'static [&'static str] {
        &["**/requirements.txt", "**/pipdeptree.json"]
    }

    fn filter(&self, path: &Path) -> bool {
        !["venv", ".venv", "site-packages"]
            .iter()
            .any(|dir| paths::has_component(path, dir))
    }

    fn create_contexts(&self, paths: &[PathBuf]) -> Result<Vec<ParseContext>> {
        // same-directory pairing only, no ancestor search
        let mut dirs: BTreeMap<PathBuf, (Option<PathBuf>, Option<PathBuf>)> = BTreeMap::new();
        for path in paths {
            let dir = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
            let slot = dirs.entry(dir).or_default();
            match path.file_name().and_then(|f| f.to_str()) {
                Some(MANIFEST_FILE) => slot.0 = Some(path.clone()),
                Some(GRAPH_FILE) => slot.1 = Some(path.clone()),
                _ => {}
            }
        }
        Ok(dirs
            .into_iter()
            .filter_map(|(dir, (manifest, graph))| {
                graph.map(|graph| ParseContext {
                    kind: ContextKind::PipGraph,
                    root: dir,
                    manifest,
                    lockfile: Some(graph),
                })
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct GraphEntry {
    package: GraphPackage,
    #[serde(default)]
    dependencies: Vec<GraphPackage>,
}

#[derive(Debug, Deserialize)]
struct GraphPackage {
    key: String,
    #[serde(default)]
    installed_version: Option<String>,
}

/// Requirement names from a requirements file: one per non-comment line,
/// cut at the first version-specifier or environment-marker character.
fn requirement_names(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('-'))
        .filter_map(|l| {
            let name = l
                .split(['=', '<', '>', '!', '~', ';', ' ', '['])
                .next()?
                .trim();
            (!name.is_empty()).then(|| name.to_ascii_lowercase())
        })
        .collect()
}

pub struct PypiParser;

impl Parser for PypiParser {
    fn parse_dependency_tree(&self, ctx: &ParseContext) -> Result<Project> {
        let graph_path = ctx.lockfile.as_ref().ok_or_else(|| {
            DepTrailError::parse(
                "pypi",
                ParseErrorKind::EmptyInput("context has no graph dump".to_string()),
            )
        })?;
        let content =
            std::fs::read_to_string(graph_path).map_err(|e| DepTrailError::io(graph_path, e))?;
        let entries: Vec<GraphEntry> = serde_json::from_str(&content)
            .map_err(|e| DepTrailError::parse("pypi", ParseErrorKind::InvalidJson(e.to_string())))?;

        let name = ctx
            .root
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("python-project")
            .to_string();
        let mut project = Project::new(name, "0.0.0", graph_path.clone());
        let root_id = project.root_id();

        let direct: Vec<String> = ctx
            .manifest
            .as_deref()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .map(|c| requirement_names(&c))
            .unwrap_or_default();

        let mut installed: HashMap<String, String> = HashMap::new();
        for entry in &entries {
            if let Some(version) = &entry.package.installed_version {
                installed.insert(entry.package.key.clone(), version.clone());
            }
        }

        for entry in &entries {
            let Some(version) = &entry.package.installed_version else {
                continue;
            };
            let mut dep = Dependency::new(entry.package.key.clone(), version.clone());
            if direct.contains(&entry.package.key) {
                dep = dep.requested_by(&root_id);
            }
            project.add_dependency(dep);
        }
        for entry in &entries {
            let Some(version) = &entry.package.installed_version else {
                continue;
            };
            let parent_id = dependency_id(&entry.package.key, version);
            for child in &entry.dependencies {
                let Some(child_version) = child
                    .installed_version
                    .as_deref()
                    .or_else(|| installed.get(&child.key).map(String::as_str))
                else {
                    continue;
                };
                let child_id = dependency_id(&child.key, child_version);
                if let Some(node) = project.dependencies.get_mut(&child_id) {
                    node.add_parent(&parent_id);
                }
            }
        }
        project.attach_orphans_to_root();
        Ok(project)
    }
}

pub struct PypiChecker;

impl Checker for PypiChecker {
    fn advisory_ecosystem(&self) -> &'static str {
        "PyPI"
    }

    fn purl(&self, name: &str, version: &str) -> Result<String> {
        // PyPI names are case-insensitive; the canonical purl form is lowercase
        super::build_purl("pypi", None, &name.to_ascii_lowercase(), version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DependencyKind;
    use std::fs;

    const GRAPH: &str = r#"[
      {
        "package": { "key": "flask", "package_name": "Flask", "installed_version": "2.2.2" },
        "dependencies": [
          { "key": "click", "package_name": "click", "installed_version": "8.1.3" },
          { "key": "jinja2", "package_name": "Jinja2", "installed_version": "3.1.2" }
        ]
      },
      {
        "package": { "key": "click", "package_name": "click", "installed_version": "8.1.3" },
        "dependencies": []
      },
      {
        "package": { "key": "jinja2", "package_name": "Jinja2", "installed_version": "3.1.2" },
        "dependencies": []
      }
    ]"#;

    fn parse(graph: &str, requirements: Option<&str>) -> Project {
        let dir = tempfile::tempdir().unwrap();
        let graph_path = dir.path().join(GRAPH_FILE);
        fs::write(&graph_path, graph).unwrap();
        let manifest = requirements.map(|r| {
            let path = dir.path().join(MANIFEST_FILE);
            fs::write(&path, r).unwrap();
            path
        });
        let ctx = ParseContext {
            kind: ContextKind::PipGraph,
            root: dir.path().to_path_buf(),
            manifest,
            lockfile: Some(graph_path),
        };
        PypiParser.parse_dependency_tree(&ctx).unwrap()
    }

    #[test]
    fn test_graph_with_requirements() {
        let project = parse(GRAPH, Some("# web\nFlask==2.2.2\n"));
        let flask = &project.dependencies["flask@2.2.2"];
        assert_eq!(project.classify(flask), DependencyKind::Direct);
        let click = &project.dependencies["click@8.1.3"];
        assert_eq!(click.requested_by, vec!["flask@2.2.2"]);
        assert_eq!(project.classify(click), DependencyKind::Transitive);
    }

    #[test]
    fn test_orphans_without_requirements_attach_to_root() {
        let project = parse(GRAPH, None);
        let flask = &project.dependencies["flask@2.2.2"];
        // no requirements file: flask has no incoming edge, so it is direct
        assert_eq!(project.classify(flask), DependencyKind::Direct);
    }

    #[test]
    fn test_requirement_names() {
        let names = requirement_names(
            "Flask==2.2.2\nrequests>=2.28 ; python_version > \"3.7\"\n\
             celery[redis]~=5.2\n# comment\n-r base.txt\n",
        );
        assert_eq!(names, vec!["flask", "requests", "celery"]);
    }

    #[test]
    fn test_purl_lowercases() {
        assert_eq!(
            PypiChecker.purl("Flask", "2.2.2").unwrap(),
            "pkg:pypi/flask@2.2.2"
        );
    }
}
