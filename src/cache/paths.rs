//! Mirror path layout
//!
//! A mirror is addressed by a single directory. Everything else the cache
//! needs lives inside it or right next to it:
//!
//! ```text
//! <parent>/
//! ├── <name>/                      # Bare mirror (git clone --mirror)
//! │   └── FETCH_HEAD               # Freshness marker (mtime)
//! ├── <name>.lock                  # flock-based locking
//! └── .<name>.staging-XXXXXX/      # Transient clone target
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// File inside the mirror whose mtime records the last successful refresh.
pub const MARKER_FILE: &str = "FETCH_HEAD";

/// Manages the filesystem paths belonging to one mirror.
#[derive(Debug, Clone)]
pub struct MirrorPaths {
    mirror: PathBuf,
}

impl MirrorPaths {
    /// Creates a new MirrorPaths for the given mirror directory
    pub fn new(mirror: impl Into<PathBuf>) -> Self {
        Self {
            mirror: mirror.into(),
        }
    }

    /// Returns the mirror directory
    pub fn mirror_dir(&self) -> &Path {
        &self.mirror
    }

    /// Returns the freshness marker path: `{mirror}/FETCH_HEAD`
    pub fn marker_path(&self) -> PathBuf {
        self.mirror.join(MARKER_FILE)
    }

    /// Returns the lock file path: `{parent}/{name}.lock`
    ///
    /// Kept outside the mirror so that clearing the mirror does not remove a
    /// lock file that is currently held.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.file_name();
        name.push(".lock");
        self.parent().join(name)
    }

    /// Returns the directory new clones are staged in before being renamed
    /// onto the mirror path.
    pub fn staging_parent(&self) -> PathBuf {
        self.parent()
    }

    /// Returns the prefix used for staging directory names: `.{name}.staging-`
    pub fn staging_prefix(&self) -> OsString {
        let mut prefix = OsString::from(".");
        prefix.push(self.file_name());
        prefix.push(".staging-");
        prefix
    }

    fn parent(&self) -> PathBuf {
        match self.mirror.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn file_name(&self) -> OsString {
        self.mirror
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| OsString::from("mirror"))
    }
}
