//! Top-level orchestration: file-based analysis and history analysis.
//!
//! Callers (CLI, API) hand over root folder paths or repository paths plus
//! an options structure; everything else — plugin selection, extraction,
//! enrichment, persistence — happens here. Partial results are always
//! written; per-dependency and per-commit failures are logged and skipped.

use crate::cache::{CacheConfig, select_backend};
use crate::error::{DepTrailError, Result};
use crate::history::{BACKFILL_WORKERS, HistoryEngine};
use crate::metrics;
use crate::model::{CommitDependencyHistory, DependencyHistory, LibraryInfo, Project};
use crate::plugins::{Plugin, PluginSet};
use crate::registry::{AdvisoryClient, LibraryStore, RegistryConfig};
use crate::utils::paths::common_prefix;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Options recognized by both analysis entry points.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    /// Ecosystem name/alias filter; empty selects every plugin
    pub plugins: Vec<String>,
    /// Force the first registry lookup per dependency name to bypass the
    /// cache
    pub refresh: bool,
    /// Output folder for history artifacts and metric files
    pub results: Option<PathBuf>,
}

pub struct Analyzer {
    registry_config: RegistryConfig,
    cache_config: CacheConfig,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry_config: RegistryConfig::default(),
            cache_config: CacheConfig::default(),
        }
    }

    #[must_use]
    pub fn with_registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry_config = config;
        self
    }

    #[must_use]
    pub fn with_cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Analyze a list of root folders: extract, parse, enrich and persist
    /// every project found by the selected plugins.
    pub fn analyze_paths(&self, roots: &[PathBuf], options: &AnalysisOptions) -> Result<Vec<Project>> {
        let plugins = PluginSet::all().select(&options.plugins);
        if plugins.is_empty() {
            return Err(DepTrailError::config(format!(
                "no plugin matches the filter {:?}",
                options.plugins
            )));
        }

        let mut store = LibraryStore::new(select_backend("libraries", &self.cache_config));
        let mut projects = Vec::new();

        for root in roots {
            if !root.exists() {
                return Err(DepTrailError::config(format!(
                    "input path does not exist: {}",
                    root.display()
                )));
            }
            for plugin in plugins.iter() {
                match self.analyze_root(root, plugin, options, &mut store) {
                    Ok(found) => projects.extend(found),
                    Err(err) => {
                        // abort this root/plugin pair, not the whole run
                        tracing::error!(
                            root = %root.display(),
                            plugin = plugin.name(),
                            error = %err,
                            "analysis failed for input"
                        );
                    }
                }
            }
        }

        self.persist_projects(&projects)?;
        store.write()?;
        Ok(projects)
    }

    fn analyze_root(
        &self,
        root: &Path,
        plugin: &Plugin,
        options: &AnalysisOptions,
        store: &mut LibraryStore,
    ) -> Result<Vec<Project>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git")
            .filter_map(std::result::Result::ok)
        {
            if entry.file_type().is_file() && plugin.matches_path(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }
        if files.is_empty() {
            return Ok(Vec::new());
        }
        tracing::info!(
            plugin = plugin.name(),
            root = %root.display(),
            files = files.len(),
            "extracting parse contexts"
        );

        let contexts = plugin.extractor().create_contexts(&files)?;
        let parser = plugin.parser().ok_or_else(|| {
            DepTrailError::extraction(
                plugin.name(),
                crate::error::ExtractionErrorKind::NoParser(plugin.name().to_string()),
            )
        })?;

        let chain = plugin.registrar_chain(&self.registry_config);
        let advisories = AdvisoryClient::new(self.registry_config.clone());
        let mut projects = Vec::new();
        for ctx in &contexts {
            // a malformed lockfile aborts this project only, not its siblings
            let mut project = match parser.parse_dependency_tree(ctx) {
                Ok(project) => project,
                Err(err) => {
                    tracing::error!(
                        plugin = plugin.name(),
                        context = %ctx.root.display(),
                        error = %err,
                        "context failed to parse, skipping"
                    );
                    continue;
                }
            };
            for dep in project.dependencies.values_mut() {
                match store.lookup(plugin.name(), &dep.name, &chain, options.refresh) {
                    Ok(info) => {
                        dep.vulnerabilities = info.vulnerabilities.clone();
                        dep.library_info = Some(info);
                    }
                    Err(err) => {
                        // the dependency proceeds without enrichment
                        tracing::warn!(
                            plugin = plugin.name(),
                            dependency = %dep.name,
                            error = %err,
                            "enrichment failed"
                        );
                    }
                }
                if let Some(checker) = plugin.checker() {
                    let found = checker
                        .purl(&dep.name, &dep.version)
                        .and_then(|purl| advisories.vulnerabilities_for_purl(&purl));
                    match found {
                        Ok(vulns) => dep.vulnerabilities = vulns,
                        Err(err) => {
                            tracing::warn!(
                                plugin = plugin.name(),
                                dependency = %dep.name,
                                error = %err,
                                "advisory lookup failed"
                            );
                        }
                    }
                }
            }
            projects.push(project);
        }
        Ok(projects)
    }

    /// Persist enriched projects: one record per project keyed
    /// `{name}@{version}`, plus an aggregate record keyed by the common
    /// path prefix across all analyzed projects.
    fn persist_projects(&self, projects: &[Project]) -> Result<()> {
        if projects.is_empty() {
            return Ok(());
        }
        let mut cache = select_backend("projects", &self.cache_config);
        cache.load()?;
        for project in projects {
            cache.set(&project.root_id(), serde_json::to_value(project)?)?;
        }

        let paths: Vec<PathBuf> = projects.iter().map(|p| p.path.clone()).collect();
        let prefix = common_prefix(&paths);
        let aggregate = serde_json::json!({
            "path": prefix,
            "projects": projects.iter().map(Project::root_id).collect::<Vec<_>>(),
        });
        cache.set(&prefix.display().to_string(), aggregate)?;
        cache.write()
    }

    /// Replay every supplied repository's history and write the combined
    /// artifacts plus per-repository metric files. Returns the written file
    /// paths.
    pub fn analyze_history(
        &self,
        repos: &[PathBuf],
        options: &AnalysisOptions,
    ) -> Result<Vec<PathBuf>> {
        let plugins = PluginSet::all().select(&options.plugins);
        if plugins.is_empty() {
            return Err(DepTrailError::config(format!(
                "no plugin matches the filter {:?}",
                options.plugins
            )));
        }
        let results = options
            .results
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&results).map_err(|e| DepTrailError::io(&results, e))?;

        let engine =
            HistoryEngine::new(plugins).with_registry_config(self.registry_config.clone());
        let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string();

        let mut combined = DependencyHistory::default();
        let mut combined_by_commit = CommitDependencyHistory::default();
        let mut libraries: IndexMap<String, LibraryInfo> = IndexMap::new();
        let mut written = Vec::new();

        for repo in repos {
            let run = match engine.replay(repo) {
                Ok(run) => run,
                Err(err) => {
                    // one broken repository never aborts the others
                    tracing::error!(repo = %repo.display(), error = %err, "replay failed");
                    continue;
                }
            };
            if !run.failures.is_empty() {
                tracing::warn!(
                    repo = %repo.display(),
                    failures = run.failures.len(),
                    "some commits produced no snapshot"
                );
            }
            match engine.backfill_library_info(&run.observed, BACKFILL_WORKERS) {
                Ok(fetched) => libraries.extend(fetched),
                Err(err) => {
                    tracing::error!(repo = %repo.display(), error = %err, "backfill failed");
                }
            }

            let basename = repo
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("repository");
            written.extend(self.write_metrics(&results, basename, &run.commit_history, &libraries)?);

            for (name, entries) in run.history.0 {
                for entry in entries {
                    combined.push(&name, entry);
                }
            }
            for entries in run.commit_history.0.into_values() {
                for tagged in entries {
                    combined_by_commit.push(&tagged.dependency_name, tagged.entry);
                }
            }
        }

        for (file, value) in [
            (
                format!("dependency-history-{timestamp}.json"),
                serde_json::to_value(&combined)?,
            ),
            (
                format!("commit-dependency-history-{timestamp}.json"),
                serde_json::to_value(&combined_by_commit)?,
            ),
            (
                format!("library-info-{timestamp}.json"),
                serde_json::to_value(&libraries)?,
            ),
        ] {
            written.push(write_json(&results.join(file), &value)?);
        }
        Ok(written)
    }

    fn write_metrics(
        &self,
        results: &Path,
        basename: &str,
        history: &CommitDependencyHistory,
        libraries: &IndexMap<String, LibraryInfo>,
    ) -> Result<Vec<PathBuf>> {
        // timeliness looks libraries up by plain dependency name
        let by_name: IndexMap<String, LibraryInfo> = libraries
            .iter()
            .map(|(key, info)| {
                let name = key.split_once(':').map_or(key.as_str(), |(_, n)| n);
                (name.to_string(), info.clone())
            })
            .collect();

        Ok(vec![
            write_json(
                &results.join(format!("{basename}-churn-metric.json")),
                &metrics::dependency_churn(history),
            )?,
            write_json(
                &results.join(format!("{basename}-version-change-metric.json")),
                &metrics::version_changes(history),
            )?,
            write_json(
                &results.join(format!("{basename}-timeliness-metric.json")),
                &metrics::fix_timeliness(history, &by_name),
            )?,
        ])
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<PathBuf> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content).map_err(|e| DepTrailError::io(path, e))?;
    tracing::info!(file = %path.display(), "artifact written");
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_plugin_filter_is_a_config_error() {
        let options = AnalysisOptions {
            plugins: vec!["cobol".to_string()],
            ..AnalysisOptions::default()
        };
        let err = Analyzer::new()
            .analyze_paths(&[PathBuf::from(".")], &options)
            .unwrap_err();
        assert!(err.to_string().contains("cobol"));
    }

    #[test]
    fn test_missing_input_path_aborts() {
        let options = AnalysisOptions::default();
        let err = Analyzer::new()
            .analyze_paths(&[PathBuf::from("/definitely/not/here")], &options)
            .unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here"));
    }
}
