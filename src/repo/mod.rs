//! Git repository access.

pub mod cloner;
pub mod history;

pub use cloner::{materialize, set_network_timeouts, CloneLimits, MaterializedRepo, GIT_TIMEOUT};
pub use history::count_commits_by;
