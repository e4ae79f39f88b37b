//! Pure metric processors over the commit-indexed event log.

mod churn;
mod timeliness;
mod version_change;

pub use churn::{ChurnEntry, dependency_churn};
pub use timeliness::{TimelinessEntry, business_days, fix_threshold, fix_timeliness};
pub use version_change::{VersionChangeEntry, version_changes};
