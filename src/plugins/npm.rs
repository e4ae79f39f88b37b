//! node-package plugin: package.json / package-lock.json.
//!
//! Lockfile pairing: a lockfile pairs with the manifest in its own directory.
//! Manifests without a sibling lockfile search ancestor directories (up to 5
//! levels, never above the analyzed root) for one — monorepo workspaces keep
//! a single root lockfile. When no lockfile exists at all, one is generated
//! by invoking the package manager in lockfile-only mode; regeneration is
//! skipped if the file already exists.

use super::{Checker, ContextKind, Extractor, ParseContext, Parser};
use crate::error::{DepTrailError, ExtractionErrorKind, ParseErrorKind, Result};
use crate::model::{Dependency, Project};
use crate::utils::paths;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Command;

const MANIFEST: &str = "package.json";
const LOCKFILE: &str = "package-lock.json";
const ANCESTOR_SEARCH_DEPTH: usize = 5;

pub struct NpmExtractor {
    /// Invoke `npm` to generate missing lockfiles. Disabled in tests.
    pub generate_missing_lockfiles: bool,
}

impl Default for NpmExtractor {
    fn default() -> Self {
        Self {
            generate_missing_lockfiles: true,
        }
    }
}

impl Extractor for NpmExtractor {
    fn file_patterns(&self) -> &'static [&'static str] {
        &["**/package.json", "**/package-lock.json"]
    }

    fn filter(&self, path: &Path) -> bool {
        !paths::has_component(path, "node_modules")
    }

    fn create_contexts(&self, paths: &[PathBuf]) -> Result<Vec<ParseContext>> {
        let mut dirs: BTreeMap<PathBuf, (Option<PathBuf>, Option<PathBuf>)> = BTreeMap::new();
        for path in paths {
            let dir = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
            let slot = dirs.entry(dir).or_default();
            match path.file_name().and_then(|f| f.to_str()) {
                Some(MANIFEST) => slot.0 = Some(path.clone()),
                Some(LOCKFILE) => slot.1 = Some(path.clone()),
                _ => {}
            }
        }

        // ancestor search never escapes the analyzed file set's common root
        let boundary = paths::common_prefix(&dirs.keys().cloned().collect::<Vec<_>>());
        let mut contexts = Vec::new();
        for (dir, (manifest, lockfile)) in dirs {
            if let Some(lockfile) = lockfile {
                contexts.push(ParseContext {
                    kind: ContextKind::NpmLock,
                    root: dir,
                    manifest: manifest.or_else(|| existing(&dir_of(&lockfile), MANIFEST)),
                    lockfile: Some(lockfile),
                });
                continue;
            }
            let Some(manifest) = manifest else { continue };

            if let Some(found) = search_ancestors(&dir, &boundary, ANCESTOR_SEARCH_DEPTH) {
                tracing::debug!(
                    manifest = %manifest.display(),
                    lockfile = %found.display(),
                    "paired manifest with ancestor lockfile"
                );
                contexts.push(ParseContext {
                    kind: ContextKind::NpmLock,
                    root: dir,
                    manifest: Some(manifest),
                    lockfile: Some(found),
                });
            } else if self.generate_missing_lockfiles {
                match generate_lockfile(&dir) {
                    Ok(lockfile) => contexts.push(ParseContext {
                        kind: ContextKind::NpmLock,
                        root: dir,
                        manifest: Some(manifest),
                        lockfile: Some(lockfile),
                    }),
                    Err(err) => {
                        tracing::warn!(
                            manifest = %manifest.display(),
                            error = %err,
                            "skipping manifest, lockfile generation failed"
                        );
                    }
                }
            }
        }
        Ok(contexts)
    }
}

fn dir_of(path: &Path) -> PathBuf {
    path.parent().unwrap_or_else(|| Path::new("")).to_path_buf()
}

fn existing(dir: &Path, file: &str) -> Option<PathBuf> {
    let candidate = dir.join(file);
    candidate.is_file().then_some(candidate)
}

fn search_ancestors(dir: &Path, boundary: &Path, depth: usize) -> Option<PathBuf> {
    let mut current = dir.parent();
    for _ in 0..depth {
        let dir = current?;
        if !dir.starts_with(boundary) {
            return None;
        }
        if let Some(found) = existing(dir, LOCKFILE) {
            return Some(found);
        }
        current = dir.parent();
    }
    None
}

/// Generate a lockfile without installing anything. Idempotent: returns the
/// existing file when one appeared since the pairing pass.
fn generate_lockfile(dir: &Path) -> Result<PathBuf> {
    let target = dir.join(LOCKFILE);
    if target.is_file() {
        return Ok(target);
    }
    tracing::info!(dir = %dir.display(), "generating lockfile via npm");
    let output = Command::new("npm")
        .args(["install", "--package-lock-only", "--ignore-scripts"])
        .current_dir(dir)
        .output()
        .map_err(|e| {
            DepTrailError::extraction(
                "npm",
                ExtractionErrorKind::LockfileGeneration {
                    manifest: dir.join(MANIFEST).display().to_string(),
                    message: e.to_string(),
                },
            )
        })?;
    if !output.status.success() || !target.is_file() {
        return Err(DepTrailError::extraction(
            "npm",
            ExtractionErrorKind::LockfileGeneration {
                manifest: dir.join(MANIFEST).display().to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            },
        ));
    }
    Ok(target)
}

pub struct NpmParser;

impl Parser for NpmParser {
    fn parse_dependency_tree(&self, ctx: &ParseContext) -> Result<Project> {
        let lock_path = ctx.lockfile.as_ref().ok_or_else(|| {
            DepTrailError::parse(
                "npm",
                ParseErrorKind::EmptyInput("context has no lockfile".to_string()),
            )
        })?;
        let lock: Value = serde_json::from_str(
            &std::fs::read_to_string(lock_path).map_err(|e| DepTrailError::io(lock_path, e))?,
        )?;
        let manifest: Option<Value> = ctx
            .manifest
            .as_ref()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| serde_json::from_str(&s).ok());

        // The lockfile usually carries name/version; older ones fall back to
        // the manifest.
        let field = |key: &str| -> Option<String> {
            lock.get(key)
                .and_then(Value::as_str)
                .or_else(|| manifest.as_ref().and_then(|m| m.get(key)?.as_str()))
                .map(ToString::to_string)
        };
        let name = field("name")
            .or_else(|| {
                ctx.root
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
            })
            .ok_or_else(|| DepTrailError::missing_field("name", LOCKFILE))?;
        let version = field("version").unwrap_or_else(|| "0.0.0".to_string());

        let mut project = Project::new(name, version, lock_path.clone());
        let root_id = project.root_id();

        if let Some(packages) = lock.get("packages").and_then(Value::as_object) {
            parse_packages_graph(packages, &root_id, &mut project);
        } else if let Some(deps) = lock.get("dependencies").and_then(Value::as_object) {
            let mut visited = HashSet::new();
            parse_legacy_tree(deps, &root_id, &mut project, &mut visited);
        }

        project.attach_orphans_to_root();
        Ok(project)
    }
}

/// Lockfile v2/v3: a flat `packages` map keyed by install path. Requirement
/// names resolve to the nearest enclosing `node_modules` entry, matching the
/// package manager's own resolution.
fn parse_packages_graph(
    packages: &serde_json::Map<String, Value>,
    root_id: &str,
    project: &mut Project,
) {
    let mut ids_by_path: HashMap<&str, String> = HashMap::new();

    for (path, entry) in packages {
        if path.is_empty() {
            continue;
        }
        let Some(name) = package_name(path, entry) else {
            continue;
        };
        let Some(version) = entry.get("version").and_then(Value::as_str) else {
            continue;
        };
        let mut dep = Dependency::new(name, version);
        if entry.get("dev").and_then(Value::as_bool).unwrap_or(false) {
            dep = dep.with_type("dev");
        }
        ids_by_path.insert(path.as_str(), dep.id.clone());
        project.add_dependency(dep);
    }

    for (path, entry) in packages {
        let parent_id = if path.is_empty() {
            root_id.to_string()
        } else {
            match ids_by_path.get(path.as_str()) {
                Some(id) => id.clone(),
                None => continue,
            }
        };
        for key in ["dependencies", "devDependencies", "optionalDependencies"] {
            // nested package entries declare runtime deps only
            if !path.is_empty() && key != "dependencies" && key != "optionalDependencies" {
                continue;
            }
            let Some(requirements) = entry.get(key).and_then(Value::as_object) else {
                continue;
            };
            for requirement in requirements.keys() {
                if let Some(target) = resolve_requirement(path, requirement, &ids_by_path) {
                    if let Some(dep) = project.dependencies.get_mut(&target) {
                        dep.add_parent(&parent_id);
                    }
                }
            }
        }
    }
}

fn package_name<'a>(path: &'a str, entry: &'a Value) -> Option<&'a str> {
    if let Some(name) = entry.get("name").and_then(Value::as_str) {
        return Some(name);
    }
    path.rfind("node_modules/")
        .map(|idx| &path[idx + "node_modules/".len()..])
}

/// Walk up the install-path hierarchy looking for `{base}/node_modules/{name}`.
fn resolve_requirement(
    base: &str,
    name: &str,
    ids_by_path: &HashMap<&str, String>,
) -> Option<String> {
    let mut base = base.to_string();
    loop {
        let candidate = if base.is_empty() {
            format!("node_modules/{name}")
        } else {
            format!("{base}/node_modules/{name}")
        };
        if let Some(id) = ids_by_path.get(candidate.as_str()) {
            return Some(id.clone());
        }
        if base.is_empty() {
            return None;
        }
        match base.rfind("/node_modules/") {
            Some(idx) => base.truncate(idx),
            None => base.clear(),
        }
    }
}

/// Lockfile v1: a tree-shaped `dependencies` structure flattened recursively.
/// The visited set guards against cyclic peer/optional relationships; the
/// back-edge still records the extra parent.
fn parse_legacy_tree(
    deps: &serde_json::Map<String, Value>,
    parent_id: &str,
    project: &mut Project,
    visited: &mut HashSet<String>,
) {
    for (name, entry) in deps {
        let Some(version) = entry.get("version").and_then(Value::as_str) else {
            continue;
        };
        let mut dep = Dependency::new(name.clone(), version).requested_by(parent_id);
        if entry.get("dev").and_then(Value::as_bool).unwrap_or(false) {
            dep = dep.with_type("dev");
        }
        let id = dep.id.clone();
        project.add_dependency(dep);

        if !visited.insert(id.clone()) {
            continue;
        }
        if let Some(nested) = entry.get("dependencies").and_then(Value::as_object) {
            parse_legacy_tree(nested, &id, project, visited);
        }
    }
}

pub struct NpmChecker;

impl Checker for NpmChecker {
    fn advisory_ecosystem(&self) -> &'static str {
        "npm"
    }

    fn purl(&self, name: &str, version: &str) -> Result<String> {
        // scoped names put the scope in the purl namespace
        match name.strip_prefix('@').and_then(|_| name.split_once('/')) {
            Some((scope, bare)) => super::build_purl("npm", Some(scope), bare, version),
            None => super::build_purl("npm", None, name, version),
        }
    }
}
