//! Mirror cache: git bindings, freshness tracking and locking

mod git;
mod lock;
mod manager;
mod paths;
mod staleness;
mod vcs;

#[cfg(test)]
pub(crate) mod fake;
#[cfg(test)]
pub(crate) mod fixture;

pub use git::{GitCli, GitError, open_repository, repository_exists};
pub use lock::{DEFAULT_LOCK_TIMEOUT, MirrorLock};
pub use manager::{CacheError, CacheManager, DEFAULT_TTL, RefreshOutcome};
pub use paths::{MARKER_FILE, MirrorPaths};
pub use staleness::{is_stale, last_refresh, touch_marker};
pub use vcs::VersionControl;
