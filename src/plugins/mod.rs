//! Ecosystem plugin bundles.
//!
//! A plugin bundles an `Extractor` (groups raw file paths into parse
//! contexts), an optional `Parser` (turns one context into a normalized
//! [`Project`]), and an optional `Checker` (advisory-ecosystem tag plus a
//! package-URL builder). Registrar chains for remote metadata live in
//! [`crate::registry`] and are reached through
//! [`Plugin::registrar_chain`].

mod composer;
mod gem;
mod maven;
mod npm;
mod nuget;
mod pypi;

pub use maven::indent_level;

use crate::error::{DepTrailError, Result};
use crate::model::Project;
use crate::registry::{self, RegistrarChain, RegistryConfig};
use glob::Pattern;
use packageurl::PackageUrl;
use std::path::{Path, PathBuf};

/// What a parse context contains and which parser understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// package.json + package-lock.json
    NpmLock,
    /// pom.xml + regenerated/committed deptree.txt
    MavenTree,
    /// build.gradle / build.gradle.kts — recognized but not parseable yet
    GradleBuild,
    /// packages.lock.json (+ optional .csproj)
    NugetLock,
    /// composer.json + composer.lock
    ComposerLock,
    /// requirements.txt + pipdeptree.json graph dump
    PipGraph,
    /// Gemfile + Gemfile.lock
    GemLock,
}

impl ContextKind {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NpmLock => "npm-lock",
            Self::MavenTree => "maven-tree",
            Self::GradleBuild => "gradle-build",
            Self::NugetLock => "nuget-lock",
            Self::ComposerLock => "composer-lock",
            Self::PipGraph => "pip-graph",
            Self::GemLock => "gem-lock",
        }
    }
}

/// The root directory plus the manifest/lock file paths needed to parse one
/// project.
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub kind: ContextKind,
    pub root: PathBuf,
    pub manifest: Option<PathBuf>,
    pub lockfile: Option<PathBuf>,
}

/// Groups raw file paths into ecosystem-specific parse contexts.
pub trait Extractor: Send + Sync {
    /// Glob patterns identifying relevant manifest/lock files
    fn file_patterns(&self) -> &'static [&'static str];

    /// Exclude paths such as vendored dependency caches
    fn filter(&self, _path: &Path) -> bool {
        true
    }

    /// Group the matched paths into parse contexts
    fn create_contexts(&self, paths: &[PathBuf]) -> Result<Vec<ParseContext>>;
}

/// Turns one context into a normalized [`Project`].
pub trait Parser: Send + Sync {
    fn parse_dependency_tree(&self, ctx: &ParseContext) -> Result<Project>;
}

/// Maps a dependency to a security-advisory ecosystem tag and a package-URL.
pub trait Checker: Send + Sync {
    /// Advisory database ecosystem tag (e.g. `npm`, `Maven`)
    fn advisory_ecosystem(&self) -> &'static str;

    /// Canonical purl for a (name, version) pair
    fn purl(&self, name: &str, version: &str) -> Result<String>;
}

/// Assemble a canonical purl; the `packageurl` crate owns the component
/// encoding rules.
pub(crate) fn build_purl(
    ty: &str,
    namespace: Option<&str>,
    name: &str,
    version: &str,
) -> Result<String> {
    let mut purl = PackageUrl::new(ty, name)
        .map_err(|e| DepTrailError::config(format!("purl for {ty}/{name}: {e}")))?;
    if let Some(namespace) = namespace {
        purl.with_namespace(namespace);
    }
    purl.with_version(version);
    Ok(purl.to_string())
}

/// One ecosystem's capability bundle.
pub struct Plugin {
    name: &'static str,
    aliases: &'static [&'static str],
    patterns: Vec<Pattern>,
    extractor: Box<dyn Extractor>,
    parser: Option<Box<dyn Parser>>,
    checker: Option<Box<dyn Checker>>,
}

impl Plugin {
    fn new(
        name: &'static str,
        aliases: &'static [&'static str],
        extractor: Box<dyn Extractor>,
        parser: Option<Box<dyn Parser>>,
        checker: Option<Box<dyn Checker>>,
    ) -> Self {
        let patterns = extractor
            .file_patterns()
            .iter()
            .map(|p| Pattern::new(p).expect("plugin glob patterns are static and valid"))
            .collect();
        Self {
            name,
            aliases,
            patterns,
            extractor,
            parser,
            checker,
        }
    }

    /// Canonical plugin name
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Case-sensitive exact match against the canonical name or any alias
    #[must_use]
    pub fn matches_name(&self, filter: &str) -> bool {
        self.name == filter || self.aliases.contains(&filter)
    }

    /// Whether a file path is relevant to this plugin (pattern match plus
    /// the extractor's exclusion filter)
    #[must_use]
    pub fn matches_path(&self, path: &Path) -> bool {
        self.patterns.iter().any(|p| p.matches_path(path)) && self.extractor.filter(path)
    }

    #[must_use]
    pub fn extractor(&self) -> &dyn Extractor {
        self.extractor.as_ref()
    }

    #[must_use]
    pub fn parser(&self) -> Option<&dyn Parser> {
        self.parser.as_deref()
    }

    #[must_use]
    pub fn checker(&self) -> Option<&dyn Checker> {
        self.checker.as_deref()
    }

    /// Ordered registrar fallback chain for this ecosystem
    #[must_use]
    pub fn registrar_chain(&self, config: &RegistryConfig) -> RegistrarChain {
        registry::chain_for(self.name, config)
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .finish_non_exhaustive()
    }
}

/// All known plugins plus name/alias-based selection.
pub struct PluginSet {
    plugins: Vec<Plugin>,
}

impl PluginSet {
    /// The six supported ecosystems
    #[must_use]
    pub fn all() -> Self {
        Self {
            plugins: vec![
                Plugin::new(
                    "npm",
                    &["node-package"],
                    Box::new(npm::NpmExtractor::default()),
                    Some(Box::new(npm::NpmParser)),
                    Some(Box::new(npm::NpmChecker)),
                ),
                Plugin::new(
                    "maven",
                    &["gradle"],
                    Box::new(maven::MavenExtractor),
                    Some(Box::new(maven::MavenParser)),
                    Some(Box::new(maven::MavenChecker)),
                ),
                Plugin::new(
                    "nuget",
                    &[],
                    Box::new(nuget::NugetExtractor),
                    Some(Box::new(nuget::NugetParser)),
                    Some(Box::new(nuget::NugetChecker)),
                ),
                Plugin::new(
                    "composer",
                    &["php"],
                    Box::new(composer::ComposerExtractor),
                    Some(Box::new(composer::ComposerParser)),
                    Some(Box::new(composer::ComposerChecker)),
                ),
                Plugin::new(
                    "pypi",
                    &["python"],
                    Box::new(pypi::PypiExtractor),
                    Some(Box::new(pypi::PypiParser)),
                    Some(Box::new(pypi::PypiChecker)),
                ),
                Plugin::new(
                    "gem",
                    &["ruby"],
                    Box::new(gem::GemExtractor),
                    Some(Box::new(gem::GemParser)),
                    Some(Box::new(gem::GemChecker)),
                ),
            ],
        }
    }

    /// Keep only plugins whose canonical name or alias appears in `filter`.
    /// An empty filter keeps every plugin.
    #[must_use]
    pub fn select(mut self, filter: &[String]) -> Self {
        if filter.is_empty() {
            return self;
        }
        self.plugins
            .retain(|p| filter.iter().any(|f| p.matches_name(f)));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_plugins_present() {
        let set = PluginSet::all();
        let names: Vec<_> = set.iter().map(Plugin::name).collect();
        assert_eq!(
            names,
            vec!["npm", "maven", "nuget", "composer", "pypi", "gem"]
        );
    }

    #[test]
    fn test_selection_by_alias() {
        let set = PluginSet::all().select(&["node-package".to_string(), "ruby".to_string()]);
        let names: Vec<_> = set.iter().map(Plugin::name).collect();
        assert_eq!(names, vec!["npm", "gem"]);
    }

    #[test]
    fn test_selection_is_case_sensitive() {
        let set = PluginSet::all().select(&["NPM".to_string()]);
        assert!(set.is_empty());
    }

    #[test]
    fn test_path_matching_honors_filter() {
        let set = PluginSet::all();
        let npm = set.iter().find(|p| p.name() == "npm").unwrap();
        assert!(npm.matches_path(Path::new("app/package-lock.json")));
        assert!(npm.matches_path(Path::new("package.json")));
        assert!(!npm.matches_path(Path::new("app/node_modules/left-pad/package.json")));
        assert!(!npm.matches_path(Path::new("app/pom.xml")));
    }
}
