//! File-tree analysis through the public [`deptrail::Analyzer`] surface.
//!
//! Registry URLs point at an unroutable local port so enrichment fails fast;
//! the analysis itself must still succeed offline.

use deptrail::model::DependencyKind;
use deptrail::pipeline::{AnalysisOptions, Analyzer};
use deptrail::{CacheConfig, RegistryConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn offline_registry() -> RegistryConfig {
    let dead = "http://127.0.0.1:9".to_string();
    RegistryConfig {
        timeout: Duration::from_secs(1),
        request_delay: Duration::from_millis(0),
        npm_url: dead.clone(),
        maven_search_url: dead.clone(),
        maven_repo_url: dead.clone(),
        nuget_url: dead.clone(),
        pypi_url: dead.clone(),
        rubygems_url: dead.clone(),
        packagist_url: dead.clone(),
        aggregator_url: dead.clone(),
        advisory_url: dead,
    }
}

fn offline_cache(dir: &Path) -> CacheConfig {
    CacheConfig {
        dir: dir.to_path_buf(),
        couch_url: "http://127.0.0.1:9".to_string(),
        ..CacheConfig::default()
    }
}

fn write_npm_fixture(root: &Path) {
    std::fs::create_dir_all(root).unwrap();
    std::fs::write(
        root.join("package.json"),
        r#"{"name":"web-app","version":"2.1.0"}"#,
    )
    .unwrap();
    std::fs::write(
        root.join("package-lock.json"),
        r#"{
            "name": "web-app",
            "version": "2.1.0",
            "lockfileVersion": 3,
            "packages": {
                "": {
                    "name": "web-app",
                    "version": "2.1.0",
                    "dependencies": { "express": "^4.18.0" }
                },
                "node_modules/express": {
                    "version": "4.18.2",
                    "dependencies": { "accepts": "~1.3.8" }
                },
                "node_modules/accepts": { "version": "1.3.8" }
            }
        }"#,
    )
    .unwrap();
}

fn write_gem_fixture(root: &Path) {
    std::fs::create_dir_all(root).unwrap();
    std::fs::write(
        root.join("Gemfile.lock"),
        "GEM\n  remote: https://rubygems.org/\n  specs:\n    rake (13.0.6)\n\nDEPENDENCIES\n  rake\n",
    )
    .unwrap();
}

#[test]
fn analyzes_mixed_ecosystems_offline() {
    init_logging();
    let workspace = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    write_npm_fixture(&workspace.path().join("web-app"));
    write_gem_fixture(&workspace.path().join("ruby-tool"));

    let analyzer = Analyzer::new()
        .with_registry_config(offline_registry())
        .with_cache_config(offline_cache(cache_dir.path()));
    let options = AnalysisOptions::default();

    let projects = analyzer
        .analyze_paths(&[workspace.path().to_path_buf()], &options)
        .unwrap();
    assert_eq!(projects.len(), 2);

    let npm = projects.iter().find(|p| p.name == "web-app").unwrap();
    assert_eq!(npm.version, "2.1.0");
    let express = &npm.dependencies["express@4.18.2"];
    assert_eq!(npm.classify(express), DependencyKind::Direct);
    let accepts = &npm.dependencies["accepts@1.3.8"];
    assert_eq!(npm.classify(accepts), DependencyKind::Transitive);
    // enrichment against a dead registry leaves library info unattached
    assert!(express.library_info.is_none());

    let gem = projects.iter().find(|p| p.name == "ruby-tool").unwrap();
    assert_eq!(gem.dependencies.len(), 1);

    // projects land in the file cache since CouchDB is unreachable
    let cache_file = cache_dir.path().join("projects.json");
    assert!(cache_file.exists());
    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(cache_file).unwrap()).unwrap();
    assert!(stored.get("web-app@2.1.0").is_some());
}

#[test]
fn broken_lockfile_does_not_block_sibling_projects() {
    init_logging();
    let workspace = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    write_npm_fixture(&workspace.path().join("web-app"));

    let broken = workspace.path().join("broken-app");
    std::fs::create_dir_all(&broken).unwrap();
    std::fs::write(
        broken.join("package.json"),
        r#"{"name":"broken-app","version":"1.0.0"}"#,
    )
    .unwrap();
    std::fs::write(broken.join("package-lock.json"), "{ not json").unwrap();

    let analyzer = Analyzer::new()
        .with_registry_config(offline_registry())
        .with_cache_config(offline_cache(cache_dir.path()));
    let projects = analyzer
        .analyze_paths(
            &[workspace.path().to_path_buf()],
            &AnalysisOptions::default(),
        )
        .unwrap();

    // the malformed lockfile is skipped, its sibling still parses
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].name, "web-app");
}

#[test]
fn plugin_filter_limits_discovery() {
    init_logging();
    let workspace = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    write_npm_fixture(&workspace.path().join("web-app"));
    write_gem_fixture(&workspace.path().join("ruby-tool"));

    let analyzer = Analyzer::new()
        .with_registry_config(offline_registry())
        .with_cache_config(offline_cache(cache_dir.path()));
    let options = AnalysisOptions {
        plugins: vec!["ruby".to_string()],
        ..AnalysisOptions::default()
    };

    let projects = analyzer
        .analyze_paths(&[workspace.path().to_path_buf()], &options)
        .unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].name, "ruby-tool");
}

#[test]
fn history_artifacts_are_written() {
    init_logging();
    let repo = tempfile::tempdir().unwrap();
    let results = tempfile::tempdir().unwrap();
    let git = |args: &[&str]| {
        let status = std::process::Command::new("git")
            .args(args)
            .current_dir(repo.path())
            .env("GIT_AUTHOR_NAME", "test")
            .env("GIT_AUTHOR_EMAIL", "test@test")
            .env("GIT_COMMITTER_NAME", "test")
            .env("GIT_COMMITTER_EMAIL", "test@test")
            .status()
            .expect("git available");
        assert!(status.success());
    };
    git(&["init", "-q"]);
    write_npm_fixture(repo.path());
    git(&["add", "-A"]);
    git(&["commit", "-q", "-m", "initial"]);

    let analyzer = Analyzer::new().with_registry_config(offline_registry());
    let options = AnalysisOptions {
        results: Some(results.path().to_path_buf()),
        ..AnalysisOptions::default()
    };

    let written = analyzer
        .analyze_history(&[repo.path().to_path_buf()], &options)
        .unwrap();

    let names: Vec<String> = written
        .iter()
        .filter_map(|p: &PathBuf| p.file_name().and_then(|n| n.to_str()))
        .map(str::to_string)
        .collect();
    assert!(names.iter().any(|n| n.starts_with("dependency-history-")));
    assert!(names
        .iter()
        .any(|n| n.starts_with("commit-dependency-history-")));
    assert!(names.iter().any(|n| n.starts_with("library-info-")));
    assert!(names.iter().any(|n| n.ends_with("-churn-metric.json")));
    assert!(names
        .iter()
        .any(|n| n.ends_with("-version-change-metric.json")));
    assert!(names.iter().any(|n| n.ends_with("-timeliness-metric.json")));

    // the combined history records the initial snapshot as additions
    let history_file = written
        .iter()
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("dependency-history-"))
        })
        .unwrap();
    let history: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(history_file).unwrap()).unwrap();
    assert_eq!(history["express"][0]["action"], "ADDED");
}
