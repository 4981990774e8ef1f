//! Capability interface over the version-control engine.

use std::path::Path;

use super::git::GitError;

/// The operations the cache and reader need from a VCS.
///
/// Every method is blocking. Paths passed as `mirror` point at a repository
/// previously produced by [`VersionControl::clone_mirror`].
pub trait VersionControl {
    /// Create a full mirror (all branches and tags) of `remote` at `dest`.
    /// `dest` does not exist yet.
    fn clone_mirror(&self, remote: &str, dest: &Path) -> Result<(), GitError>;

    /// Bring an existing mirror up to date with its origin.
    fn fetch(&self, mirror: &Path) -> Result<(), GitError>;

    /// Whether `path` holds a repository this VCS can read.
    fn is_repository(&self, path: &Path) -> bool;

    /// All tag names in the mirror.
    fn list_tags(&self, mirror: &Path) -> Result<Vec<String>, GitError>;

    /// The commit a tag points to, or `None` when there is no such tag.
    fn resolve_tag(&self, mirror: &Path, tag: &str) -> Result<Option<String>, GitError>;

    /// Contents of the file at `path` in `commit`, or `None` when the tree has
    /// no file there.
    fn show_file(&self, mirror: &Path, commit: &str, path: &str)
    -> Result<Option<Vec<u8>>, GitError>;

    /// Write the full tree of `commit` into the existing directory `dest`.
    fn checkout(&self, mirror: &Path, commit: &str, dest: &Path) -> Result<(), GitError>;
}
