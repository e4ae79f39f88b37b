//! Commit-history replay engine.
//!
//! Pipeline per repository: enumerate the commit log, order it parent-before-
//! child, materialize a dependency snapshot at each relevant commit, diff
//! consecutive snapshots into typed change events, and backfill registry
//! metadata for everything the event stream touched.

mod commits;
mod diff;
mod engine;
mod materialize;

pub use commits::{CommitInfo, enumerate, topological_order};
pub use diff::{Snapshot, SnapshotEntry, diff_snapshots, snapshot_of};
pub use engine::{BACKFILL_WORKERS, HistoryEngine, HistoryRun, ReplayFailure};
pub use materialize::{BuildToolRunner, MaterializedSnapshot, changed_paths, extract_contexts};
