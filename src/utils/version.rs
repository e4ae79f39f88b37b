//! Version parsing and comparison utilities.
//!
//! Lockfile versions are frequently not strict semver (`1.2`, `v3.0`,
//! `2.1.0.RELEASE`). Parsing first tries the strict grammar, then a coercion
//! pass that extracts the leading numeric components; when even coercion
//! fails the caller keeps the raw string and no semantic version.

use regex::Regex;
use semver::Version;
use std::cmp::Ordering;
use std::sync::OnceLock;

fn coercion_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\d]*(\d+)(?:\.(\d+))?(?:\.(\d+))?").expect("valid coercion regex")
    })
}

/// Parse a version string, falling back to coercion.
pub fn parse(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    if let Ok(v) = Version::parse(trimmed) {
        return Some(v);
    }
    coerce(trimmed)
}

/// Coerce a loose version string into `major.minor.patch`, dropping any
/// trailing qualifier. Returns `None` when no leading digits exist.
pub fn coerce(raw: &str) -> Option<Version> {
    let caps = coercion_pattern().captures(raw)?;
    let major: u64 = caps.get(1)?.as_str().parse().ok()?;
    let minor: u64 = caps
        .get(2)
        .map_or(Some(0), |m| m.as_str().parse().ok())?;
    let patch: u64 = caps
        .get(3)
        .map_or(Some(0), |m| m.as_str().parse().ok())?;
    Some(Version::new(major, minor, patch))
}

/// Compare two version strings semantically.
///
/// Returns `None` when either side fails semantic-version validation even
/// after coercion; callers that classify upgrades/downgrades skip those.
pub fn compare(a: &str, b: &str) -> Option<Ordering> {
    let va = parse(a)?;
    let vb = parse(b)?;
    Some(va.cmp(&vb))
}

/// Whether a version satisfies an advisory range such as `< 4.17.21` or
/// `>= 2.0, < 2.3.1`. `None` when the version or the range cannot be
/// understood.
pub fn satisfies(version: &str, range: &str) -> Option<bool> {
    let version = parse(version)?;
    let req = semver::VersionReq::parse(range.trim()).ok()?;
    Some(req.matches(&version))
}
