//! Normalized dependency-graph model.
//!
//! Every ecosystem parser produces these structures; registry enrichment and
//! the history engine consume them. A [`Project`] is the graph for one
//! manifest, keyed by `name@version` dependency ids; [`LibraryInfo`] is
//! registry-level metadata independent of any consuming project.

mod history;
mod library;
mod project;

pub use history::*;
pub use library::*;
pub use project::*;
