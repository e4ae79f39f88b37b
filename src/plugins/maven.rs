//! Maven/Gradle plugin: pom.xml paired with a text dependency-tree dump.
//!
//! The tree file (`deptree.txt`) is the output of `mvn dependency:tree` (or
//! the Gradle `dependencies` task); it is not kept in version control, so the
//! history engine regenerates it per commit. `build.gradle` contexts are
//! recognized but fail fast at parse time rather than silently producing an
//! empty graph.

use super::{Checker, ContextKind, Extractor, ParseContext, Parser};
use crate::error::{DepTrailError, ExtractionErrorKind, ParseErrorKind, Result};
use crate::model::{Dependency, Project};
use crate::utils::paths;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const TREE_FILE: &str = "deptree.txt";

/// Character stride of one indentation level in `mvn dependency:tree` output
/// (`|  +- `).
pub const MAVEN_STRIDE: usize = 3;
/// Stride of the Gradle `dependencies` task output (`|    +--- `).
pub const GRADLE_STRIDE: usize = 5;

pub struct MavenExtractor;

impl Extractor for MavenExtractor {
    fn file_patterns(&self) -> &'static [&'static str] {
        &[
            "**/pom.xml",
            "**/deptree.txt",
            "**/build.gradle",
            "**/build.gradle.kts",
        ]
    }

    fn filter(&self, path: &Path) -> bool {
        !paths::has_component(path, "target")
    }

    fn create_contexts(&self, paths: &[PathBuf]) -> Result<Vec<ParseContext>> {
        let mut dirs: BTreeMap<PathBuf, (Option<PathBuf>, Option<PathBuf>, Option<PathBuf>)> =
            BTreeMap::new();
        for path in paths {
            let dir = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
            let slot = dirs.entry(dir).or_default();
            match path.file_name().and_then(|f| f.to_str()) {
                Some("pom.xml") => slot.0 = Some(path.clone()),
                Some(TREE_FILE) => slot.1 = Some(path.clone()),
                Some("build.gradle") | Some("build.gradle.kts") => slot.2 = Some(path.clone()),
                _ => {}
            }
        }

        let mut contexts = Vec::new();
        for (dir, (pom, tree, gradle)) in dirs {
            if let Some(gradle) = gradle {
                contexts.push(ParseContext {
                    kind: ContextKind::GradleBuild,
                    root: dir.clone(),
                    manifest: Some(gradle),
                    lockfile: None,
                });
            }
            if let Some(pom) = pom {
                let tree = tree.or_else(|| {
                    let candidate = dir.join(TREE_FILE);
                    candidate.is_file().then_some(candidate)
                });
                match tree {
                    Some(tree) => contexts.push(ParseContext {
                        kind: ContextKind::MavenTree,
                        root: dir,
                        manifest: Some(pom),
                        lockfile: Some(tree),
                    }),
                    None => {
                        tracing::debug!(
                            pom = %pom.display(),
                            "pom.xml without a dependency-tree dump, skipping"
                        );
                    }
                }
            }
        }
        Ok(contexts)
    }
}

/// Indentation level of a tree line: position of the first branch connector
/// (`+` or `\`) divided by the format's stride.
#[must_use]
pub fn indent_level(line: &str, stride: usize) -> usize {
    line.find(['+', '\\']).map_or(0, |pos| pos / stride)
}

/// Detect the stride from the first indented dependency line. Falls back to
/// the Maven stride when every line sits at level zero.
fn detect_stride(lines: &[&str]) -> usize {
    for line in lines {
        if let Some(pos) = line.find(['+', '\\']) {
            if pos > 0 {
                return if pos % GRADLE_STRIDE == 0 {
                    GRADLE_STRIDE
                } else {
                    MAVEN_STRIDE
                };
            }
        }
    }
    MAVEN_STRIDE
}

/// One parsed tree line.
struct TreeNode {
    name: String,
    version: String,
    scope: Option<String>,
}

/// Parse the coordinate fields of one line, branch prefix already stripped.
///
/// Fields are colon-delimited `group:artifact:packaging:version[:scope]`.
/// `X -> Y` means the declared version was conflict-resolved to `Y`.
/// `(optional)` suppresses the scope but keeps the node. Returns `None` for
/// lines that contribute nothing (the `(n)` duplicate marker).
fn parse_tree_line(raw: &str) -> Result<Option<TreeNode>> {
    let mut text = raw.trim();
    if text.ends_with("(n)") {
        return Ok(None);
    }
    let mut optional = false;
    if let Some(stripped) = text.strip_suffix("(optional)") {
        text = stripped.trim_end();
        optional = true;
    }

    let mut tokens = text.split_whitespace();
    let coordinate = tokens.next().ok_or_else(|| {
        DepTrailError::parse(
            "maven tree",
            ParseErrorKind::MalformedTreeLine(raw.to_string()),
        )
    })?;
    let fields: Vec<&str> = coordinate.split(':').collect();
    if fields.len() < 3 {
        return Err(DepTrailError::parse(
            "maven tree",
            ParseErrorKind::MalformedTreeLine(raw.to_string()),
        ));
    }
    // group:artifact:version (gradle) or group:artifact:packaging:version[:scope]
    let (name, mut version, scope) = if fields.len() == 3 {
        (
            format!("{}:{}", fields[0], fields[1]),
            fields[2].to_string(),
            None,
        )
    } else {
        (
            format!("{}:{}", fields[0], fields[1]),
            fields[fields.len().min(4) - 1].to_string(),
            fields.get(4).map(|s| (*s).to_string()),
        )
    };
    // conflict resolution marker: declared -> resolved
    if tokens.next() == Some("->") {
        if let Some(resolved) = tokens.next() {
            version = resolved.to_string();
        }
    }

    Ok(Some(TreeNode {
        name,
        version,
        scope: if optional { None } else { scope },
    }))
}

/// Strip the branch-drawing prefix (`|`, `+-`, `\-`, spaces) from a line.
fn strip_branch_prefix(line: &str) -> &str {
    line.trim_start_matches(['|', '+', '\\', '-', ' '])
}

/// Parse a full text dependency-tree dump into a project graph.
pub fn parse_tree(content: &str, path: &Path) -> Result<Project> {
    let lines: Vec<&str> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .collect();
    let (first, rest) = lines.split_first().ok_or_else(|| {
        DepTrailError::parse(
            "maven tree",
            ParseErrorKind::EmptyInput(path.display().to_string()),
        )
    })?;

    // First line is the root: group:artifact:packaging:version
    let root_fields: Vec<&str> = first.trim().split(':').collect();
    if root_fields.len() < 3 {
        return Err(DepTrailError::parse(
            "maven tree",
            ParseErrorKind::MalformedTreeLine((*first).to_string()),
        ));
    }
    let root_name = format!("{}:{}", root_fields[0], root_fields[1]);
    let root_version = root_fields[root_fields.len().min(4) - 1].to_string();
    let mut project = Project::new(root_name, root_version, path.to_path_buf());
    let root_id = project.root_id();

    let stride = detect_stride(rest);
    // stack of (id, level); the top entry below the current level is the parent
    let mut stack: Vec<(String, usize)> = Vec::new();

    for line in rest {
        let level = indent_level(line, stride);
        let Some(node) = parse_tree_line(strip_branch_prefix(line))? else {
            continue;
        };

        while stack.last().is_some_and(|(_, l)| *l >= level) {
            stack.pop();
        }
        let parent_id = stack
            .last()
            .map_or_else(|| root_id.clone(), |(id, _)| id.clone());

        let mut dep = Dependency::new(node.name, node.version).requested_by(&parent_id);
        if let Some(scope) = node.scope {
            dep = dep.with_type(scope);
        }
        let id = dep.id.clone();
        // repeated ids accumulate parents: diamond dependencies
        project.add_dependency(dep);
        stack.push((id, level));
    }
    Ok(project)
}

pub struct MavenParser;

impl Parser for MavenParser {
    fn parse_dependency_tree(&self, ctx: &ParseContext) -> Result<Project> {
        if ctx.kind == ContextKind::GradleBuild {
            return Err(DepTrailError::extraction(
                "maven",
                ExtractionErrorKind::UnsupportedContext {
                    kind: ContextKind::GradleBuild.label().to_string(),
                    detail: format!(
                        "dependency resolution from {} is not implemented; \
                         run the Gradle dependencies task and commit its output as {TREE_FILE}",
                        ctx.manifest
                            .as_deref()
                            .map_or_else(|| "build.gradle".to_string(), |p| p.display().to_string()),
                    ),
                },
            ));
        }
        let tree_path = ctx.lockfile.as_ref().ok_or_else(|| {
            DepTrailError::parse(
                "maven",
                ParseErrorKind::EmptyInput("context has no tree file".to_string()),
            )
        })?;
        let content =
            std::fs::read_to_string(tree_path).map_err(|e| DepTrailError::io(tree_path, e))?;
        parse_tree(&content, tree_path)
    }
}

pub struct MavenChecker;

impl Checker for MavenChecker {
    fn advisory_ecosystem(&self) -> &'static str {
        "Maven"
    }

    fn purl(&self, name: &str, version: &str) -> Result<String> {
        // dependency names are group:artifact; the group is the namespace
        match name.split_once(':') {
            Some((group, artifact)) => super::build_purl("maven", Some(group), artifact, version),
            None => super::build_purl("maven", None, name, version),
        }
    }
}
