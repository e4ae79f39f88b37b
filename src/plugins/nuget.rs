//! NuGet plugin: `packages.lock.json` parsing with optional `.csproj`
//! metadata.
//!
//! The lock format nests packages under a target framework moniker; entries
//! typed `Direct` (or `Project`) hang off the synthetic root, everything else
//! gets its edges from the per-package `dependencies` maps.

use super::{Checker, ContextKind, Extractor, ParseContext, Parser};
use crate::error::{DepTrailError, ParseErrorKind, Result};
use crate::model::{Dependency, Project, dependency_id};
use crate::utils::paths;
use quick_xml::de::from_str as xml_from_str;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const LOCK_FILE: &str = "packages.lock.json";

pub struct NugetExtractor;

impl Extractor for NugetExtractor {
    fn file_patterns(&self) -> &'static [&'static str] {
        &["**/packages.lock.json", "**/*.csproj"]
    }

    fn filter(&self, path: &Path) -> bool {
        !paths::has_component(path, "bin") && !paths::has_component(path, "obj")
    }

    fn create_contexts(&self, paths: &[PathBuf]) -> Result<Vec<ParseContext>> {
        let mut dirs: BTreeMap<PathBuf, (Option<PathBuf>, Option<PathBuf>)> = BTreeMap::new();
        for path in paths {
            let dir = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
            let slot = dirs.entry(dir).or_default();
            if path.file_name().and_then(|f| f.to_str()) == Some(LOCK_FILE) {
                slot.1 = Some(path.clone());
            } else {
                slot.0 = Some(path.clone());
            }
        }
        Ok(dirs
            .into_iter()
            .filter_map(|(dir, (csproj, lock))| {
                lock.map(|lock| ParseContext {
                    kind: ContextKind::NugetLock,
                    root: dir,
                    manifest: csproj,
                    lockfile: Some(lock),
                })
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct LockFile {
    #[serde(default)]
    dependencies: BTreeMap<String, BTreeMap<String, LockEntry>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockEntry {
    #[serde(rename = "type")]
    entry_type: String,
    #[serde(default)]
    resolved: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
}

/// The subset of a `.csproj` needed for project identity.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CsProj {
    #[serde(default)]
    property_group: Vec<PropertyGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PropertyGroup {
    #[serde(default)]
    version: Option<String>,
}

/// Project version from the csproj's first `<Version>` property, best-effort.
fn csproj_version(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let parsed: CsProj = xml_from_str(&content).ok()?;
    parsed
        .property_group
        .into_iter()
        .find_map(|group| group.version)
}

pub struct NugetParser;

impl Parser for NugetParser {
    fn parse_dependency_tree(&self, ctx: &ParseContext) -> Result<Project> {
        let lock_path = ctx.lockfile.as_ref().ok_or_else(|| {
            DepTrailError::parse(
                "nuget",
                ParseErrorKind::EmptyInput("context has no lockfile".to_string()),
            )
        })?;
        let content =
            std::fs::read_to_string(lock_path).map_err(|e| DepTrailError::io(lock_path, e))?;
        let lock: LockFile = serde_json::from_str(&content)
            .map_err(|e| DepTrailError::parse("nuget", ParseErrorKind::InvalidJson(e.to_string())))?;

        let name = ctx
            .manifest
            .as_deref()
            .and_then(Path::file_stem)
            .or_else(|| ctx.root.file_name())
            .and_then(|s| s.to_str())
            .unwrap_or("nuget-project")
            .to_string();
        let version = ctx
            .manifest
            .as_deref()
            .and_then(csproj_version)
            .unwrap_or_else(|| "0.0.0".to_string());

        let mut project = Project::new(name, version, lock_path.clone());
        let root_id = project.root_id();

        for packages in lock.dependencies.values() {
            for (pkg_name, entry) in packages {
                let Some(resolved) = entry.resolved.as_deref() else {
                    continue;
                };
                let mut dep = Dependency::new(pkg_name.clone(), resolved.to_string());
                if matches!(entry.entry_type.as_str(), "Direct" | "Project") {
                    dep = dep.requested_by(&root_id);
                }
                project.add_dependency(dep);
            }
            // second pass: edges resolve against the same framework's entries
            for (pkg_name, entry) in packages {
                let Some(resolved) = entry.resolved.as_deref() else {
                    continue;
                };
                let parent_id = dependency_id(pkg_name, resolved);
                for child_name in entry.dependencies.keys() {
                    let Some(child_resolved) =
                        packages.get(child_name).and_then(|e| e.resolved.as_deref())
                    else {
                        continue;
                    };
                    let child_id = dependency_id(child_name, child_resolved);
                    if let Some(child) = project.dependencies.get_mut(&child_id) {
                        child.add_parent(&parent_id);
                    }
                }
            }
        }
        Ok(project)
    }
}

pub struct NugetChecker;

impl Checker for NugetChecker {
    fn advisory_ecosystem(&self) -> &'static str {
        "NuGet"
    }

    fn purl(&self, name: &str, version: &str) -> Result<String> {
        super::build_purl("nuget", None, name, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DependencyKind;
    use std::fs;

    const LOCK: &str = r#"{
      "version": 1,
      "dependencies": {
        "net6.0": {
          "Newtonsoft.Json": {
            "type": "Direct",
            "requested": "[13.0.1, )",
            "resolved": "13.0.1",
            "contentHash": "x"
          },
          "Serilog": {
            "type": "Direct",
            "requested": "[2.12.0, )",
            "resolved": "2.12.0",
            "contentHash": "x",
            "dependencies": { "Serilog.Core": "2.0.0" }
          },
          "Serilog.Core": {
            "type": "Transitive",
            "resolved": "2.0.1",
            "contentHash": "x"
          }
        }
      }
    }"#;

    fn write_context(lock: &str) -> (tempfile::TempDir, ParseContext) {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(LOCK_FILE);
        fs::write(&lock_path, lock).unwrap();
        let ctx = ParseContext {
            kind: ContextKind::NugetLock,
            root: dir.path().to_path_buf(),
            manifest: None,
            lockfile: Some(lock_path),
        };
        (dir, ctx)
    }

    #[test]
    fn test_lock_graph() {
        let (dir, ctx) = write_context(LOCK);
        let dir_name = dir.path().file_name().unwrap().to_str().unwrap().to_string();
        let project = NugetParser.parse_dependency_tree(&ctx).unwrap();
        assert_eq!(project.name, dir_name);
        assert_eq!(project.version, "0.0.0");

        let json = &project.dependencies["Newtonsoft.Json@13.0.1"];
        assert_eq!(project.classify(json), DependencyKind::Direct);
        // edge resolves to the framework's actual entry, not the declared range
        let core = &project.dependencies["Serilog.Core@2.0.1"];
        assert_eq!(core.requested_by, vec!["Serilog@2.12.0"]);
        assert_eq!(project.classify(core), DependencyKind::Transitive);
    }

    #[test]
    fn test_csproj_supplies_name_and_version() {
        let (dir, mut ctx) = write_context(LOCK);
        let csproj = dir.path().join("Acme.Api.csproj");
        fs::write(
            &csproj,
            "<Project Sdk=\"Microsoft.NET.Sdk\">\n  <PropertyGroup>\n    \
             <Version>3.1.4</Version>\n  </PropertyGroup>\n</Project>\n",
        )
        .unwrap();
        ctx.manifest = Some(csproj);
        let project = NugetParser.parse_dependency_tree(&ctx).unwrap();
        assert_eq!(project.name, "Acme.Api");
        assert_eq!(project.version, "3.1.4");
        assert_eq!(project.root_id(), "Acme.Api@3.1.4");
    }

    #[test]
    fn test_context_requires_lockfile() {
        let dir = tempfile::tempdir().unwrap();
        let csproj = dir.path().join("Acme.csproj");
        fs::write(&csproj, "<Project/>").unwrap();
        let contexts = NugetExtractor.create_contexts(&[csproj]).unwrap();
        assert!(contexts.is_empty());
    }

    #[test]
    fn test_filter_excludes_build_output() {
        assert!(!NugetExtractor.filter(Path::new("app/obj/project.csproj")));
        assert!(NugetExtractor.filter(Path::new("app/packages.lock.json")));
    }

    #[test]
    fn test_purl() {
        assert_eq!(
            NugetChecker.purl("Newtonsoft.Json", "13.0.1").unwrap(),
            "pkg:nuget/Newtonsoft.Json@13.0.1"
        );
    }
}
