//! Tag-addressed reads on top of the mirror cache.
//!
//! Every read first makes sure the mirror is fresh, then resolves the tag
//! against it. Files are read straight from git's tree objects; only
//! [`RepositoryReader::with_tag`] materializes a full checkout, and that
//! checkout is deleted as soon as the caller's closure is done with it.

use std::io;
use std::path::{Path, PathBuf};
use std::string::FromUtf8Error;

use log::debug;
use thiserror::Error;

use crate::cache::{CacheError, CacheManager, GitCli, GitError, VersionControl};

const CHECKOUT_PREFIX: &str = "tagmirror-checkout-";

/// Errors returned by reader operations.
#[derive(Error, Debug)]
pub enum ReadError {
    /// The mirror could not be brought up to date.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// The tag does not exist in the (fresh) mirror.
    #[error("tag {tag} does not exist in {mirror}")]
    Resolution { tag: String, mirror: PathBuf },
    /// The tag exists but has no file at the requested path.
    #[error("{path} does not exist at tag {tag} (looked up {tag}:{path})")]
    FileNotFound { path: String, tag: String },
    /// A local read from the mirror failed.
    #[error("failed to {operation}: {source}")]
    Git {
        operation: String,
        #[source]
        source: GitError,
    },
    /// The file is not valid UTF-8.
    #[error("{path} at tag {tag} is not valid UTF-8")]
    Utf8 {
        path: String,
        tag: String,
        #[source]
        source: FromUtf8Error,
    },
    /// Creating the checkout directory failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Reads files as they were at a given tag.
pub struct RepositoryReader<V = GitCli> {
    cache: CacheManager<V>,
}

impl RepositoryReader<GitCli> {
    /// Reader over a mirror of `remote` kept in `mirror_dir`, using the
    /// system git and the default TTL.
    pub fn new(remote: impl Into<String>, mirror_dir: impl Into<PathBuf>) -> Self {
        Self::from_cache(CacheManager::new(remote, mirror_dir))
    }
}

impl<V: VersionControl> RepositoryReader<V> {
    pub fn from_cache(cache: CacheManager<V>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &CacheManager<V> {
        &self.cache
    }

    /// Every tag in the mirror, sorted by name.
    pub fn tags(&self) -> Result<Vec<String>, ReadError> {
        self.cache.ensure_fresh()?;
        self.cache
            .vcs()
            .list_tags(self.cache.mirror_path())
            .map_err(|source| ReadError::Git {
                operation: "list tags".to_string(),
                source,
            })
    }

    /// The commit id `tag` points to.
    pub fn resolve(&self, tag: &str) -> Result<String, ReadError> {
        self.cache.ensure_fresh()?;
        self.resolve_fresh(tag)
    }

    /// Run `op` against a temporary checkout of `tag`.
    ///
    /// The checkout is removed when `op` returns, and also when it panics.
    pub fn with_tag<T, F>(&self, tag: &str, op: F) -> Result<T, ReadError>
    where
        F: FnOnce(&Path) -> T,
    {
        let commit = self.resolve(tag)?;

        let checkout = tempfile::Builder::new()
            .prefix(CHECKOUT_PREFIX)
            .tempdir()?;
        debug!("Checking out {} ({}) into {}", tag, commit, checkout.path().display());

        self.cache
            .vcs()
            .checkout(self.cache.mirror_path(), &commit, checkout.path())
            .map_err(|source| ReadError::Git {
                operation: format!("check out tag {tag}"),
                source,
            })?;

        Ok(op(checkout.path()))
    }

    /// Contents of `path` as it was at `tag`.
    pub fn read_file(&self, path: &str, tag: &str) -> Result<Vec<u8>, ReadError> {
        let commit = self.resolve(tag)?;

        let contents = self
            .cache
            .vcs()
            .show_file(self.cache.mirror_path(), &commit, path)
            .map_err(|source| ReadError::Git {
                operation: format!("read {tag}:{path}"),
                source,
            })?;

        contents.ok_or_else(|| ReadError::FileNotFound {
            path: path.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Like [`read_file`](Self::read_file), decoded as UTF-8.
    pub fn read_to_string(&self, path: &str, tag: &str) -> Result<String, ReadError> {
        let bytes = self.read_file(path, tag)?;
        String::from_utf8(bytes).map_err(|source| ReadError::Utf8 {
            path: path.to_string(),
            tag: tag.to_string(),
            source,
        })
    }

    /// Whether `tag` has a file at `path`.
    pub fn file_exists(&self, path: &str, tag: &str) -> Result<bool, ReadError> {
        match self.read_file(path, tag) {
            Ok(_) => Ok(true),
            Err(ReadError::FileNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn resolve_fresh(&self, tag: &str) -> Result<String, ReadError> {
        let mirror = self.cache.mirror_path();
        let commit = self
            .cache
            .vcs()
            .resolve_tag(mirror, tag)
            .map_err(|source| ReadError::Git {
                operation: format!("resolve tag {tag}"),
                source,
            })?;

        commit.ok_or_else(|| ReadError::Resolution {
            tag: tag.to_string(),
            mirror: mirror.to_path_buf(),
        })
    }
}
