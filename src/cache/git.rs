//! Git operations using a hybrid CLI + libgit2 approach.
//!
//! **CLI (with hardening) for operations that talk to the remote:**
//! - `clone_mirror` - `git clone --mirror`, so every branch and tag comes along
//! - `fetch` - `git fetch --atomic`, refs move all at once or not at all
//!
//! **libgit2 for local reads:**
//! - `list_tags`, `resolve_tag` - ref lookups
//! - `show_file` - blob lookup straight from the tree, no checkout needed
//! - `checkout` - tree walk into a target directory, the mirror is untouched

use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};

use git2::{ErrorCode, ObjectType, Oid, Repository, Tree};
use log::{debug, warn};
use thiserror::Error;

use super::vcs::VersionControl;

const FILEMODE_EXECUTABLE: i32 = 0o100755;
const FILEMODE_LINK: i32 = 0o120000;

/// Errors returned by git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// A git subprocess exited unsuccessfully.
    #[error("Error running Git command \"{command}\" ({status}): {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },
    /// A git subprocess could not be started at all.
    #[error("Error running Git command \"{command}\": {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    /// libgit2 reported an error.
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
    /// Repository path does not contain a git repo.
    #[error("repository not found at {0}")]
    NotFound(String),
    /// Output parsing or unexpected git data.
    #[error("failed to parse git data: {0}")]
    ParseError(String),
    /// Underlying IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid inputs were provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Validate that a remote location is safe to hand to `git clone`.
///
/// Rejects:
/// - Empty strings
/// - Strings starting with `-` (could be interpreted as flags)
/// - Strings containing null bytes or control characters
fn validate_remote(remote: &str) -> Result<(), GitError> {
    if remote.is_empty() {
        return Err(GitError::InvalidInput("remote cannot be empty".to_string()));
    }
    if remote.starts_with('-') {
        return Err(GitError::InvalidInput(format!(
            "remote cannot start with '-': {remote}"
        )));
    }
    if remote.bytes().any(|b| b < 0x20 || b == 0x7f) {
        return Err(GitError::InvalidInput(
            "remote cannot contain null or control characters".to_string(),
        ));
    }
    Ok(())
}

/// Render a command the way an operator would type it.
fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// CLI Operations
// ============================================================================

/// Git CLI wrapper with security hardening.
#[derive(Debug, Clone)]
pub struct GitCli {
    git_path: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    /// Create a new GitCli instance using the system git.
    pub fn new() -> Self {
        Self {
            git_path: "git".to_string(),
        }
    }

    #[cfg(test)]
    fn with_binary(git_path: impl Into<String>) -> Self {
        Self {
            git_path: git_path.into(),
        }
    }

    /// Create a hardened Command with security settings.
    ///
    /// Applies:
    /// - `GIT_LFS_SKIP_SMUDGE=1` - skip LFS file downloads
    /// - `GIT_TERMINAL_PROMPT=0` - disable interactive prompts
    /// - `core.hooksPath=` - disable hooks execution
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.git_path);
        cmd.env("GIT_LFS_SKIP_SMUDGE", "1");
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.args(["-c", "core.hooksPath="]);
        cmd.stdin(Stdio::null());
        cmd
    }

    /// Run a command to completion, turning any failure into a [`GitError`]
    /// that carries the command line.
    fn run(&self, mut cmd: Command) -> Result<Vec<u8>, GitError> {
        let command = describe(&cmd);
        debug!("running {command}");

        let output = cmd.output().map_err(|source| GitError::Spawn {
            command: command.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(GitError::Command {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

impl VersionControl for GitCli {
    fn clone_mirror(&self, remote: &str, dest: &Path) -> Result<(), GitError> {
        validate_remote(remote)?;

        let dest_existed = dest.exists();
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut cmd = self.command();
        cmd.args(["clone", "--mirror", "--quiet", "--"])
            .arg(remote)
            .arg(dest);

        if let Err(err) = self.run(cmd) {
            if !dest_existed {
                let _ = fs::remove_dir_all(dest);
            }
            return Err(err);
        }

        Ok(())
    }

    fn fetch(&self, mirror: &Path) -> Result<(), GitError> {
        let mut cmd = self.command();
        cmd.arg("-C")
            .arg(mirror)
            .args(["fetch", "--prune", "--atomic", "--quiet", "origin"]);
        self.run(cmd)?;
        Ok(())
    }

    fn is_repository(&self, path: &Path) -> bool {
        repository_exists(path)
    }

    fn list_tags(&self, mirror: &Path) -> Result<Vec<String>, GitError> {
        let repo = open_repository(mirror)?;
        let names = repo.tag_names(None)?;
        let mut tags: Vec<String> = names.iter().flatten().map(str::to_string).collect();
        tags.sort();
        Ok(tags)
    }

    fn resolve_tag(&self, mirror: &Path, tag: &str) -> Result<Option<String>, GitError> {
        let repo = open_repository(mirror)?;
        let reference = match repo.find_reference(&format!("refs/tags/{tag}")) {
            Ok(reference) => reference,
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        // Annotated tags point at a tag object, peel through to the commit
        let commit = reference.peel_to_commit()?;
        Ok(Some(commit.id().to_string()))
    }

    fn show_file(
        &self,
        mirror: &Path,
        commit: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, GitError> {
        let Some(path) = tree_path(path) else {
            return Ok(None);
        };

        let repo = open_repository(mirror)?;
        let tree = commit_tree(&repo, commit)?;
        let entry = match tree.get_path(&path) {
            Ok(entry) => entry,
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match entry.kind() {
            Some(ObjectType::Blob) => {
                let blob = repo.find_blob(entry.id())?;
                Ok(Some(blob.content().to_vec()))
            }
            _ => Ok(None),
        }
    }

    fn checkout(&self, mirror: &Path, commit: &str, dest: &Path) -> Result<(), GitError> {
        let repo = open_repository(mirror)?;
        let tree = commit_tree(&repo, commit)?;
        write_tree(&repo, &tree, dest)
    }
}

// ============================================================================
// libgit2 Operations
// ============================================================================

/// Open an existing repository at the given path.
pub fn open_repository(path: &Path) -> Result<Repository, GitError> {
    Repository::open(path).map_err(|e| {
        if e.code() == ErrorCode::NotFound {
            GitError::NotFound(path.display().to_string())
        } else {
            GitError::Git(e)
        }
    })
}

/// Check if a path contains a valid git repository.
pub fn repository_exists(path: &Path) -> bool {
    Repository::open(path).is_ok()
}

/// Normalize a caller path into one relative to the tree root.
///
/// Leading `/` and `.` components are dropped. `None` when nothing is left or
/// the path climbs out with `..`, neither of which can name a tree entry.
fn tree_path(path: &str) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }

    if normalized.as_os_str().is_empty() {
        None
    } else {
        Some(normalized)
    }
}

fn commit_tree<'r>(repo: &'r Repository, commit: &str) -> Result<Tree<'r>, GitError> {
    let oid = Oid::from_str(commit)
        .map_err(|_| GitError::ParseError(format!("not a commit id: {commit}")))?;
    Ok(repo.find_commit(oid)?.tree()?)
}

/// Materialize `tree` under `dir`, which must already exist.
fn write_tree(repo: &Repository, tree: &Tree<'_>, dir: &Path) -> Result<(), GitError> {
    for entry in tree.iter() {
        let name = entry.name().ok_or_else(|| {
            GitError::ParseError(format!("tree entry {} has a non UTF-8 name", entry.id()))
        })?;
        if name == "." || name == ".." || name.contains('/') {
            warn!("skipping suspicious tree entry {name:?}");
            continue;
        }
        let target = dir.join(name);

        match entry.kind() {
            Some(ObjectType::Tree) => {
                fs::create_dir(&target)?;
                let subtree = repo.find_tree(entry.id())?;
                write_tree(repo, &subtree, &target)?;
            }
            Some(ObjectType::Blob) => {
                let blob = repo.find_blob(entry.id())?;
                write_blob(&target, blob.content(), entry.filemode())?;
            }
            // Submodules are recorded as commits, leave an empty directory
            Some(ObjectType::Commit) => fs::create_dir(&target)?,
            _ => debug!("skipping tree entry {name} of kind {:?}", entry.kind()),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn write_blob(target: &Path, content: &[u8], filemode: i32) -> Result<(), GitError> {
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::fs::PermissionsExt;

    if filemode == FILEMODE_LINK {
        std::os::unix::fs::symlink(OsStr::from_bytes(content), target)?;
        return Ok(());
    }

    fs::write(target, content)?;
    if filemode == FILEMODE_EXECUTABLE {
        fs::set_permissions(target, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn write_blob(target: &Path, content: &[u8], _filemode: i32) -> Result<(), GitError> {
    fs::write(target, content)?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
