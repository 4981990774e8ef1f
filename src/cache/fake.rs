//! In-memory [`VersionControl`] used by the cache and reader tests.
//!
//! The "remote" is a table of tags to file maps. Cloning or fetching copies
//! that table into the mirror state, so tests can tell whether a change made
//! upstream has been picked up yet.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::git::GitError;
use super::vcs::VersionControl;

const REPO_MARKER: &str = "FAKE_REPO";

type Snapshot = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Clone, Default)]
struct Tagged {
    commit: String,
    files: Snapshot,
}

#[derive(Debug, Default)]
pub struct FakeVcs {
    remote: Mutex<BTreeMap<String, Tagged>>,
    mirrored: Mutex<BTreeMap<String, Tagged>>,
    next_commit: AtomicUsize,
    clones: AtomicUsize,
    fetches: AtomicUsize,
    fail_clone: AtomicBool,
    fail_fetch: AtomicBool,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upstream gains `tag` with the given files.
    pub fn add_tag(&self, tag: &str, files: &[(&str, &str)]) -> String {
        let files: Vec<(&str, &[u8])> = files
            .iter()
            .map(|(path, contents)| (*path, contents.as_bytes()))
            .collect();
        self.add_tag_bytes(tag, &files)
    }

    pub fn add_tag_bytes(&self, tag: &str, files: &[(&str, &[u8])]) -> String {
        let commit = format!("{:040x}", self.next_commit.fetch_add(1, Ordering::SeqCst) + 1);
        let files = files
            .iter()
            .map(|(path, contents)| (path.to_string(), contents.to_vec()))
            .collect();
        self.remote.lock().unwrap().insert(
            tag.to_string(),
            Tagged {
                commit: commit.clone(),
                files,
            },
        );
        commit
    }

    pub fn clones(&self) -> usize {
        self.clones.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Total number of clone and fetch calls.
    pub fn refreshes(&self) -> usize {
        self.clones() + self.fetches()
    }

    pub fn fail_clone(&self, fail: bool) {
        self.fail_clone.store(fail, Ordering::SeqCst);
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    fn failure(command: &str) -> GitError {
        GitError::Command {
            command: command.to_string(),
            status: "exit status: 128".to_string(),
            stderr: "fatal: could not read from remote repository".to_string(),
        }
    }

    fn snapshot_remote(&self) {
        let remote = self.remote.lock().unwrap().clone();
        *self.mirrored.lock().unwrap() = remote;
    }

    fn find_commit(&self, commit: &str) -> Result<Snapshot, GitError> {
        self.mirrored
            .lock()
            .unwrap()
            .values()
            .find(|tagged| tagged.commit == commit)
            .map(|tagged| tagged.files.clone())
            .ok_or_else(|| GitError::ParseError(format!("unknown commit {commit}")))
    }
}

impl VersionControl for FakeVcs {
    fn clone_mirror(&self, remote: &str, dest: &Path) -> Result<(), GitError> {
        self.clones.fetch_add(1, Ordering::SeqCst);
        fs::create_dir_all(dest)?;
        if self.fail_clone.load(Ordering::SeqCst) {
            // Leave debris behind, like a clone killed half way
            fs::write(dest.join("packed-refs"), "partial")?;
            return Err(Self::failure(&format!("git clone --mirror -- {remote}")));
        }
        fs::write(dest.join(REPO_MARKER), remote)?;
        self.snapshot_remote();
        Ok(())
    }

    fn fetch(&self, mirror: &Path) -> Result<(), GitError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Self::failure(&format!(
                "git -C {} fetch origin",
                mirror.display()
            )));
        }
        if !self.is_repository(mirror) {
            return Err(GitError::NotFound(mirror.display().to_string()));
        }
        self.snapshot_remote();
        Ok(())
    }

    fn is_repository(&self, path: &Path) -> bool {
        path.join(REPO_MARKER).is_file()
    }

    fn list_tags(&self, _mirror: &Path) -> Result<Vec<String>, GitError> {
        Ok(self.mirrored.lock().unwrap().keys().cloned().collect())
    }

    fn resolve_tag(&self, _mirror: &Path, tag: &str) -> Result<Option<String>, GitError> {
        Ok(self
            .mirrored
            .lock()
            .unwrap()
            .get(tag)
            .map(|tagged| tagged.commit.clone()))
    }

    fn show_file(
        &self,
        _mirror: &Path,
        commit: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, GitError> {
        Ok(self.find_commit(commit)?.get(path).cloned())
    }

    fn checkout(&self, _mirror: &Path, commit: &str, dest: &Path) -> Result<(), GitError> {
        for (path, contents) in self.find_commit(commit)? {
            let target = dest.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, contents)?;
        }
        Ok(())
    }
}
