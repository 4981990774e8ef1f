//! Mirror configuration: which remote, where its mirror lives, how long it
//! stays fresh.

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::{CacheManager, DEFAULT_TTL};
use crate::reader::RepositoryReader;

/// Everything needed to build a cache manager or reader for one remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    pub remote: String,
    pub mirror_dir: PathBuf,
    pub ttl: Duration,
}

impl MirrorConfig {
    /// Config for `remote` with the default mirror location and TTL.
    pub fn new(remote: impl Into<String>) -> Self {
        let remote = remote.into();
        let mirror_dir = default_cache_root().join(remote_slug(&remote));
        Self {
            remote,
            mirror_dir,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_mirror_dir(mut self, mirror_dir: impl Into<PathBuf>) -> Self {
        self.mirror_dir = mirror_dir.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn cache_manager(&self) -> CacheManager {
        CacheManager::new(self.remote.clone(), self.mirror_dir.clone()).with_ttl(self.ttl)
    }

    pub fn reader(&self) -> RepositoryReader {
        RepositoryReader::from_cache(self.cache_manager())
    }
}

/// Root directory for mirrors when none is given.
///
/// Uses `dirs::cache_dir()` which resolves to:
/// - Linux: `~/.cache`
/// - macOS: `~/Library/Caches`
/// - Windows: `C:\Users\<user>\AppData\Local`
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("tagmirror")
}

/// Directory name for a remote's mirror.
///
/// Anything other than ASCII letters, digits and `-` becomes `_`, with runs
/// collapsed, so URLs and paths map to a single safe path component.
pub fn remote_slug(remote: &str) -> String {
    let mut slug = String::with_capacity(remote.len());
    for c in remote.chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            slug.push(c);
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }

    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "remote".to_string()
    } else {
        slug.to_string()
    }
}
