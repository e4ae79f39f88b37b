//! Path helpers.

use std::path::{Path, PathBuf};

/// Longest common component-wise prefix across a set of paths. Used to key
/// the aggregate analysis record in the cache.
#[must_use]
pub fn common_prefix(paths: &[PathBuf]) -> PathBuf {
    let Some(first) = paths.first() else {
        return PathBuf::new();
    };
    let mut prefix: Vec<_> = first.components().collect();
    for path in &paths[1..] {
        let components: Vec<_> = path.components().collect();
        let shared = prefix
            .iter()
            .zip(&components)
            .take_while(|(a, b)| a == b)
            .count();
        prefix.truncate(shared);
    }
    prefix.iter().collect()
}

/// True when `path` contains `component` anywhere.
#[must_use]
pub fn has_component(path: &Path, component: &str) -> bool {
    path.components().any(|c| c.as_os_str() == component)
}
