//! Mirror cache manager
//!
//! `CacheManager` owns one mirror directory and keeps it no older than its
//! TTL. Freshness is the mtime of the marker file inside the mirror, so it
//! survives restarts and is shared by every manager pointed at the same path.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::{debug, info, warn};
use thiserror::Error;

use super::git::{GitCli, GitError};
use super::lock::{DEFAULT_LOCK_TIMEOUT, MirrorLock};
use super::paths::MirrorPaths;
use super::staleness;
use super::vcs::VersionControl;

/// How long a mirror stays fresh unless configured otherwise.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Errors returned by cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Cloning or fetching the mirror failed. The previous mirror, if any,
    /// is left as it was.
    #[error("failed to refresh mirror {mirror}: {source}")]
    Refresh {
        mirror: PathBuf,
        #[source]
        source: GitError,
    },
    /// Another refresh held the mirror lock for longer than the timeout.
    #[error("timed out waiting for the mirror lock {0}")]
    LockTimeout(PathBuf),
    /// An underlying IO operation failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// What `ensure_fresh` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The mirror did not exist (or was unreadable) and was cloned.
    Cloned,
    /// The mirror was stale and was fetched.
    Fetched,
    /// The mirror was within its TTL, nothing ran.
    Fresh,
}

impl RefreshOutcome {
    /// Whether a clone or fetch was performed.
    pub fn refreshed(self) -> bool {
        !matches!(self, RefreshOutcome::Fresh)
    }
}

impl fmt::Display for RefreshOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshOutcome::Cloned => write!(f, "cloned"),
            RefreshOutcome::Fetched => write!(f, "fetched"),
            RefreshOutcome::Fresh => write!(f, "fresh"),
        }
    }
}

/// Cache manager for a single remote's mirror.
pub struct CacheManager<V = GitCli> {
    remote: String,
    paths: MirrorPaths,
    ttl: Duration,
    lock_timeout: Duration,
    vcs: V,
}

impl CacheManager<GitCli> {
    /// Create a cache manager that mirrors `remote` into `mirror_dir` using
    /// the system git.
    pub fn new(remote: impl Into<String>, mirror_dir: impl Into<PathBuf>) -> Self {
        Self::with_vcs(remote, mirror_dir, GitCli::new())
    }
}

impl<V: VersionControl> CacheManager<V> {
    /// Create a cache manager backed by the given VCS binding.
    pub fn with_vcs(remote: impl Into<String>, mirror_dir: impl Into<PathBuf>, vcs: V) -> Self {
        Self {
            remote: remote.into(),
            paths: MirrorPaths::new(mirror_dir),
            ttl: DEFAULT_TTL,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            vcs,
        }
    }

    /// Set how long a refreshed mirror stays fresh. Zero refreshes on every
    /// call.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set how long a refresh waits for a concurrent refresh to finish.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn mirror_path(&self) -> &Path {
        self.paths.mirror_dir()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    /// Whether the mirror directory exists.
    pub fn exists(&self) -> bool {
        self.paths.mirror_dir().is_dir()
    }

    /// When the mirror was last refreshed successfully, if ever.
    pub fn last_refresh(&self) -> Option<SystemTime> {
        if !self.exists() {
            return None;
        }
        staleness::last_refresh(&self.paths.marker_path())
    }

    /// Whether the next `ensure_fresh` would clone or fetch.
    ///
    /// A mirror that is no longer a readable repository is stale whatever
    /// its marker says.
    pub fn is_stale(&self) -> bool {
        let mirror = self.paths.mirror_dir();
        !self.exists()
            || !self.vcs.is_repository(mirror)
            || staleness::is_stale(&self.paths.marker_path(), self.ttl)
    }

    /// Make sure the mirror exists and is no older than the TTL.
    ///
    /// This will:
    /// 1. Return immediately if the mirror is within its TTL
    /// 2. Clone if the mirror is missing or unreadable
    /// 3. Fetch otherwise, including when the marker has gone missing
    pub fn ensure_fresh(&self) -> Result<RefreshOutcome, CacheError> {
        if !self.is_stale() {
            debug!("{} is fresh, skipping refresh", self.mirror_path().display());
            return Ok(RefreshOutcome::Fresh);
        }

        let _lock = self.lock()?;

        // Someone else may have refreshed while we waited for the lock
        if !self.is_stale() {
            debug!(
                "{} was refreshed while waiting for the lock",
                self.mirror_path().display()
            );
            return Ok(RefreshOutcome::Fresh);
        }

        self.refresh_locked()
    }

    /// Clone or fetch regardless of the TTL.
    pub fn force_refresh(&self) -> Result<RefreshOutcome, CacheError> {
        let _lock = self.lock()?;
        self.refresh_locked()
    }

    /// Delete the mirror. Deleting a mirror that does not exist is a no-op.
    pub fn clear(&self) -> Result<(), CacheError> {
        let mirror = self.paths.mirror_dir();
        if fs::symlink_metadata(mirror).is_err() {
            return Ok(());
        }

        let _lock = self.lock()?;
        match fs::remove_dir_all(mirror) {
            Ok(()) => {
                info!("Cleared mirror cache {}", mirror.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn lock(&self) -> Result<MirrorLock, CacheError> {
        let lock_path = self.paths.lock_path();
        match MirrorLock::acquire(&lock_path, self.lock_timeout) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Err(CacheError::LockTimeout(lock_path)),
            Err(e) => Err(CacheError::Io(e)),
        }
    }

    /// Must be called with the mirror lock held.
    fn refresh_locked(&self) -> Result<RefreshOutcome, CacheError> {
        let mirror = self.paths.mirror_dir();

        let outcome = if !mirror.exists() {
            self.clone_into_place()?;
            RefreshOutcome::Cloned
        } else if !self.vcs.is_repository(mirror) {
            warn!(
                "{} is not a readable repository, cloning it again",
                mirror.display()
            );
            fs::remove_dir_all(mirror)?;
            self.clone_into_place()?;
            RefreshOutcome::Cloned
        } else {
            info!("Fetching {} into {}", self.remote, mirror.display());
            self.vcs
                .fetch(mirror)
                .map_err(|source| self.refresh_error(source))?;
            RefreshOutcome::Fetched
        };

        staleness::touch_marker(&self.paths.marker_path())?;
        Ok(outcome)
    }

    /// Clone into a staging directory next to the mirror, then rename it
    /// into place. An interrupted clone never shows up at the mirror path.
    fn clone_into_place(&self) -> Result<(), CacheError> {
        let mirror = self.paths.mirror_dir();
        let parent = self.paths.staging_parent();
        fs::create_dir_all(&parent)?;
        self.sweep_staging(&parent);

        let staging = tempfile::Builder::new()
            .prefix(&self.paths.staging_prefix())
            .tempdir_in(&parent)?;

        info!("Cloning {} into {}", self.remote, mirror.display());
        self.vcs
            .clone_mirror(&self.remote, staging.path())
            .map_err(|source| self.refresh_error(source))?;

        fs::rename(staging.path(), mirror)?;
        // The staging path is gone now, dropping the guard finds nothing
        drop(staging);
        Ok(())
    }

    /// Remove staging directories left behind by killed clones.
    fn sweep_staging(&self, parent: &Path) {
        let prefix = self.paths.staging_prefix();
        let prefix = prefix.to_string_lossy();
        let Ok(entries) = fs::read_dir(parent) else {
            return;
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(prefix.as_ref()) {
                continue;
            }
            warn!("Removing abandoned clone {}", entry.path().display());
            if let Err(e) = fs::remove_dir_all(entry.path()) {
                warn!("Could not remove {}: {}", entry.path().display(), e);
            }
        }
    }

    fn refresh_error(&self, source: GitError) -> CacheError {
        CacheError::Refresh {
            mirror: self.mirror_path().to_path_buf(),
            source,
        }
    }
}
