//! Composer plugin: `composer.lock` parsing.
//!
//! The lock lists resolved packages flat; edges come from each package's
//! `require` map. Platform requirements (`php`, `ext-*`, `lib-*`,
//! `composer-plugin-api`) are not packages and contribute no edges.

use super::{Checker, ContextKind, Extractor, ParseContext, Parser};
use crate::error::{DepTrailError, ParseErrorKind, Result};
use crate::model::{Dependency, Project, dependency_id};
use crate::utils::paths;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

pub const LOCK_FILE: &str = "composer.lock";
pub const MANIFEST_FILE: &str = "composer.json";

pub struct ComposerExtractor;

impl Extractor for ComposerExtractor {
    fn file_patterns(&self) -> &'static [&'static str] {
        &["**/composer.json", "**/composer.lock"]
    }

    fn filter(&self, path: &Path) -> bool {
        !paths::has_component(path, "vendor")
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
                    kind: ContextKind::ComposerLock,
                    root: dir,
                    manifest,
                    lockfile: Some(lock),
                })
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct LockFile {
    #[serde(default)]
    packages: Vec<LockPackage>,
    #[serde(default, rename = "packages-dev")]
    packages_dev: Vec<LockPackage>,
}

#[derive(Debug, Deserialize)]
struct LockPackage {
    name: String,
    version: String,
    #[serde(default)]
    require: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

/// Platform requirements describe the runtime, not installable packages.
fn is_platform_requirement(name: &str) -> bool {
    name == "php"
        || name == "composer-plugin-api"
        || name.starts_with("ext-")
        || name.starts_with("lib-")
}

pub struct ComposerParser;

impl Parser for ComposerParser {
    fn parse_dependency_tree(&self, ctx: &ParseContext) -> Result<Project> {
        let lock_path = ctx.lockfile.as_ref().ok_or_else(|| {
            DepTrailError::parse(
                "composer",
                ParseErrorKind::EmptyInput("context has no lockfile".to_string()),
            )
        })?;
        let content =
            std::fs::read_to_string(lock_path).map_err(|e| DepTrailError::io(lock_path, e))?;
        let lock: LockFile = serde_json::from_str(&content)
            .map_err(|e| DepTrailError::parse("composer", ParseErrorKind::InvalidJson(e.to_string())))?;

        let manifest: Option<Manifest> = ctx
            .manifest
            .as_deref()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| serde_json::from_str(&s).ok());
        let name = manifest
            .as_ref()
            .and_then(|m| m.name.clone())
            .or_else(|| {
                ctx.root
                    .file_name()
                    .and_then(|s| s.to_str())
                    .map(String::from)
            })
            .unwrap_or_else(|| "composer-project".to_string());
        let version = manifest
            .and_then(|m| m.version)
            .unwrap_or_else(|| "0.0.0".to_string());

        let mut project = Project::new(name, version, lock_path.clone());

        // resolved version per package name, for edge construction
        let mut resolved: HashMap<&str, &str> = HashMap::new();
        for pkg in lock.packages.iter().chain(&lock.packages_dev) {
            resolved.insert(&pkg.name, &pkg.version);
        }

        for (pkg, dev) in lock
            .packages
            .iter()
            .map(|p| (p, false))
            .chain(lock.packages_dev.iter().map(|p| (p, true)))
        {
            let mut dep = Dependency::new(pkg.name.clone(), pkg.version.clone());
            if dev {
                dep = dep.with_type("dev");
            }
            project.add_dependency(dep);
        }
        for pkg in lock.packages.iter().chain(&lock.packages_dev) {
            let parent_id = dependency_id(&pkg.name, &pkg.version);
            for child_name in pkg.require.keys() {
                if is_platform_requirement(child_name) {
                    continue;
                }
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

pub struct ComposerChecker;

impl Checker for ComposerChecker {
    fn advisory_ecosystem(&self) -> &'static str {
        "Packagist"
    }

    fn purl(&self, name: &str, version: &str) -> Result<String> {
        // composer names are vendor/package; the vendor is the purl namespace
        match name.split_once('/') {
            Some((vendor, package)) => super::build_purl("composer", Some(vendor), package, version),
            None => super::build_purl("composer", None, name, version),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DependencyKind;
    use std::fs;

    const LOCK: &str = r#"{
      "packages": [
        {
          "name": "monolog/monolog",
          "version": "2.8.0",
          "require": { "php": ">=7.2", "psr/log": "^1.0.1 || ^2.0 || ^3.0" }
        },
        { "name": "psr/log", "version": "3.0.0", "require": { "php": ">=8.0.0" } }
      ],
      "packages-dev": [
        {
          "name": "phpunit/phpunit",
          "version": "9.5.27",
          "require": { "ext-dom": "*", "psr/log": "^3.0" }
        }
      ]
    }"#;

    fn parse(lock: &str, manifest: Option<&str>) -> Project {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(LOCK_FILE);
        fs::write(&lock_path, lock).unwrap();
        let manifest_path = manifest.map(|m| {
            let path = dir.path().join(MANIFEST_FILE);
            fs::write(&path, m).unwrap();
            path
        });
        let ctx = ParseContext {
            kind: ContextKind::ComposerLock,
            root: dir.path().to_path_buf(),
            manifest: manifest_path,
            lockfile: Some(lock_path),
        };
        ComposerParser.parse_dependency_tree(&ctx).unwrap()
    }

    #[test]
    fn test_lock_graph_with_platform_requirements_dropped() {
        let project = parse(
            LOCK,
            Some(r#"{ "name": "acme/site", "version": "1.0.0" }"#),
        );
        assert_eq!(project.root_id(), "acme/site@1.0.0");

        let monolog = &project.dependencies["monolog/monolog@2.8.0"];
        assert_eq!(project.classify(monolog), DependencyKind::Direct);
        // psr/log has incoming edges, so it never attaches to the root
        let log = &project.dependencies["psr/log@3.0.0"];
        assert_eq!(
            log.requested_by,
            vec!["monolog/monolog@2.8.0", "phpunit/phpunit@9.5.27"]
        );
        assert_eq!(project.classify(log), DependencyKind::Transitive);
        // php / ext-dom never become nodes
        assert!(!project.dependencies.keys().any(|k| k.starts_with("php@")));

        let phpunit = &project.dependencies["phpunit/phpunit@9.5.27"];
        assert_eq!(phpunit.dep_type.as_deref(), Some("dev"));
    }

    #[test]
    fn test_missing_manifest_falls_back_to_directory_name() {
        let project = parse(LOCK, None);
        assert_eq!(project.version, "0.0.0");
        assert!(!project.name.is_empty());
    }

    #[test]
    fn test_vendor_directory_is_filtered() {
        assert!(!ComposerExtractor.filter(Path::new("app/vendor/psr/log/composer.json")));
        assert!(ComposerExtractor.filter(Path::new("app/composer.lock")));
    }

    #[test]
    fn test_purl() {
        assert_eq!(
            ComposerChecker.purl("monolog/monolog", "2.8.0").unwrap(),
            "pkg:composer/monolog/monolog@2.8.0"
        );
    }
}
