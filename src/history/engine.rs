//! Commit-history replay: snapshots, diffs and metadata backfill.

use super::commits::{self, CommitInfo};
use super::diff::{Snapshot, diff_snapshots, snapshot_of};
use super::materialize::{
    BuildToolRunner, HeadGuard, MaterializedSnapshot, changed_paths, checkout_and_regenerate,
    extract_contexts,
};
use crate::error::{DepTrailError, Result};
use crate::model::{CommitDependencyHistory, DependencyHistory, LibraryInfo};
use crate::plugins::{Plugin, PluginSet};
use crate::registry::{self, AdvisoryClient, RegistryConfig};
use indexmap::{IndexMap, IndexSet};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Default worker-pool width for the LibraryInfo backfill.
pub const BACKFILL_WORKERS: usize = 10;

/// Sentinel record for a commit/plugin whose snapshot could not be produced.
/// Replay continues past these.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReplayFailure {
    pub commit_id: String,
    pub plugin: String,
    pub message: String,
}

/// The outcome of replaying one repository.
#[derive(Debug, Default)]
pub struct HistoryRun {
    /// Events indexed by dependency name
    pub history: DependencyHistory,
    /// The same events indexed by commit id
    pub commit_history: CommitDependencyHistory,
    pub failures: Vec<ReplayFailure>,
    /// Distinct (plugin, dependency name) pairs observed in the event stream
    pub observed: IndexSet<(String, String)>,
}

pub struct HistoryEngine {
    plugins: PluginSet,
    registry_config: RegistryConfig,
    build_timeout: Duration,
}

impl HistoryEngine {
    #[must_use]
    pub fn new(plugins: PluginSet) -> Self {
        Self {
            plugins,
            registry_config: RegistryConfig::default(),
            build_timeout: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry_config = config;
        self
    }

    #[must_use]
    pub fn with_build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = timeout;
        self
    }

    /// Replay one repository's commit DAG in topological order, producing
    /// the typed event log. Per-commit failures become sentinels, never
    /// aborts.
    pub fn replay(&self, repo_path: &Path) -> Result<HistoryRun> {
        let repo = git2::Repository::open(repo_path)?;
        let ordered = commits::topological_order(&commits::enumerate(&repo)?);
        tracing::info!(
            repo = %repo_path.display(),
            commits = ordered.len(),
            "replaying commit history"
        );

        let mut run = HistoryRun::default();
        // last successfully parsed snapshot per (plugin, project name)
        let mut last_good: HashMap<(String, String), Snapshot> = HashMap::new();
        let mut last_hash: HashMap<(String, String), u64> = HashMap::new();
        let mut runner = BuildToolRunner::new(self.build_timeout);
        // taken out before the first checkout; restores HEAD when replay ends
        let mut head_guard: Option<HeadGuard<'_>> = None;

        for commit in &ordered {
            let changed = match changed_paths(&repo, commit) {
                Ok(paths) => paths,
                Err(err) => {
                    for plugin in self.plugins.iter() {
                        run.failures.push(ReplayFailure {
                            commit_id: commit.id.clone(),
                            plugin: plugin.name().to_string(),
                            message: err.to_string(),
                        });
                    }
                    continue;
                }
            };

            for plugin in self.plugins.iter() {
                if !changed.iter().any(|p| plugin.matches_path(p)) {
                    continue;
                }
                if let Err(err) = self.replay_commit_for_plugin(
                    &repo,
                    commit,
                    plugin,
                    &mut runner,
                    &mut head_guard,
                    &mut last_good,
                    &mut last_hash,
                    &mut run,
                ) {
                    tracing::warn!(
                        commit = %commit.id,
                        plugin = plugin.name(),
                        error = %err,
                        "snapshot failed, recording sentinel"
                    );
                    run.failures.push(ReplayFailure {
                        commit_id: commit.id.clone(),
                        plugin: plugin.name().to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(run)
    }

    #[allow(clippy::too_many_arguments)]
    fn replay_commit_for_plugin<'repo>(
        &self,
        repo: &'repo git2::Repository,
        commit: &CommitInfo,
        plugin: &Plugin,
        runner: &mut BuildToolRunner,
        head_guard: &mut Option<HeadGuard<'repo>>,
        last_good: &mut HashMap<(String, String), Snapshot>,
        last_hash: &mut HashMap<(String, String), u64>,
        run: &mut HistoryRun,
    ) -> Result<()> {
        // Maven trees are not in version control: check out and regenerate.
        // Everything else extracts blobs straight from the commit tree.
        let snapshot: MaterializedSnapshot = if plugin.name() == "maven" {
            if head_guard.is_none() {
                *head_guard = Some(HeadGuard::new(repo)?);
            }
            checkout_and_regenerate(repo, commit, plugin, runner)?
        } else {
            extract_contexts(repo, commit, plugin)?
        };
        let parser = plugin.parser().ok_or_else(|| {
            DepTrailError::extraction(
                plugin.name(),
                crate::error::ExtractionErrorKind::NoParser(plugin.name().to_string()),
            )
        })?;

        for ctx in &snapshot.contexts {
            let project = parser.parse_dependency_tree(ctx)?;
            let key = (plugin.name().to_string(), project.name.clone());

            let hash = project.content_hash();
            if last_hash.get(&key) == Some(&hash) {
                continue;
            }
            last_hash.insert(key.clone(), hash);

            let new_snapshot = snapshot_of(&project);
            let events = match last_good.get(&key) {
                Some(old) => diff_snapshots(old, &new_snapshot, commit, &project.name),
                // first successful snapshot: everything is ADDED
                None => diff_snapshots(&Snapshot::new(), &new_snapshot, commit, &project.name),
            };
            for (name, entry) in events {
                run.observed
                    .insert((plugin.name().to_string(), name.clone()));
                run.history.push(&name, entry.clone());
                run.commit_history.push(&name, entry);
            }
            last_good.insert(key, new_snapshot);
        }
        Ok(())
    }

    /// Fetch LibraryInfo for every observed (plugin, name) pair with a
    /// fixed-size worker pool, attaching known advisories to each record.
    /// Individual failures are logged and omitted, never failing the batch.
    pub fn backfill_library_info(
        &self,
        observed: &IndexSet<(String, String)>,
        workers: usize,
    ) -> Result<IndexMap<String, LibraryInfo>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| DepTrailError::config(format!("worker pool: {e}")))?;

        let advisories = AdvisoryClient::new(self.registry_config.clone());
        let ecosystems: HashMap<&str, &str> = self
            .plugins
            .iter()
            .filter_map(|p| p.checker().map(|c| (p.name(), c.advisory_ecosystem())))
            .collect();

        let pairs: Vec<&(String, String)> = observed.iter().collect();
        let fetched: Vec<Option<(String, LibraryInfo)>> = pool.install(|| {
            pairs
                .par_iter()
                .map(|(plugin, name)| {
                    let chain = registry::chain_for(plugin, &self.registry_config);
                    match chain.retrieve(name) {
                        Ok(mut info) => {
                            if let Some(ecosystem) = ecosystems.get(plugin.as_str()) {
                                match advisories.vulnerabilities_for_package(ecosystem, name) {
                                    Ok(vulns) => info.vulnerabilities = vulns,
                                    Err(err) => {
                                        tracing::warn!(
                                            plugin = %plugin,
                                            name = %name,
                                            error = %err,
                                            "advisory lookup failed"
                                        );
                                    }
                                }
                            }
                            Some((format!("{plugin}:{name}"), info))
                        }
                        Err(err) => {
                            tracing::warn!(plugin = %plugin, name = %name, error = %err, "backfill miss");
                            None
                        }
                    }
                })
                .collect()
        });
        Ok(fetched.into_iter().flatten().collect())
    }
}
