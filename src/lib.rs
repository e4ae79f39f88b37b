//! **Dependency-graph analysis across package-manager ecosystems.**
//!
//! `deptrail` turns heterogeneous manifest and lockfile formats — npm,
//! Maven/Gradle, NuGet, Composer, PyPI, RubyGems — into one normalized
//! dependency-graph model, enriches it with registry metadata through a
//! fallback chain of remote sources, and tracks how those graphs evolve
//! across a repository's commit history.
//!
//! ## Core Concepts & Modules
//!
//! - **[`model`]**: the normalized [`Project`]/[`Dependency`] graph plus
//!   [`LibraryInfo`] registry metadata and the typed change-event log.
//! - **[`plugins`]**: one [`plugins::Extractor`]+[`plugins::Parser`]+
//!   [`plugins::Checker`] bundle per ecosystem. Extractors group raw file
//!   paths into parse contexts; parsers turn one context into a `Project`.
//! - **[`registry`]**: per-ecosystem registrars composed into an ordered
//!   fallback chain ([`RegistrarChain`]), plus the cache-first
//!   [`LibraryStore`].
//! - **[`cache`]**: the swappable persistence contract with file-backed and
//!   document-store backends and a one-time backend-selection probe.
//! - **[`history`]**: the commit-replay engine — topological commit
//!   ordering, per-commit snapshot materialization, snapshot diffing and
//!   concurrent metadata backfill.
//! - **[`metrics`]**: pure processors over the event log: churn,
//!   upgrade/downgrade rates, vulnerability-fix timeliness.
//! - **[`pipeline`]**: the two entry points, [`Analyzer::analyze_paths`]
//!   and [`Analyzer::analyze_history`].
//!
//! ## Getting Started
//!
//! ```no_run
//! use deptrail::{AnalysisOptions, Analyzer};
//! use std::path::PathBuf;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = AnalysisOptions {
//!         plugins: vec!["npm".to_string()],
//!         ..AnalysisOptions::default()
//!     };
//!     let projects = Analyzer::new().analyze_paths(&[PathBuf::from(".")], &options)?;
//!     for project in &projects {
//!         println!("{}: {} dependencies", project.name, project.dependencies.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod history;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod plugins;
pub mod registry;
pub mod utils;

pub use cache::{Cache, CacheConfig, RefreshTracker};
pub use error::{DepTrailError, Result};
pub use history::{HistoryEngine, HistoryRun};
pub use model::{
    CommitDependencyHistory, Dependency, DependencyHistory, DependencyKind, LibraryInfo, Project,
    Severity, StatusAction, StatusEntry, Vulnerability,
};
pub use pipeline::{AnalysisOptions, Analyzer};
pub use plugins::{Plugin, PluginSet};
pub use registry::{AdvisoryClient, LibraryStore, Registrar, RegistrarChain, RegistryConfig};
