//! Read files as they were at a git tag, from a local mirror that is only
//! refreshed once it is older than its TTL.

pub mod cache;
pub mod config;
pub mod reader;

pub use cache::{CacheError, CacheManager, GitCli, RefreshOutcome, VersionControl};
pub use config::MirrorConfig;
pub use reader::{ReadError, RepositoryReader};
