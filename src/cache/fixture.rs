//! Test fixtures: throwaway upstream repositories built with libgit2.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use git2::{IndexAddOption, Oid, Repository, Signature};

/// Whether a usable `git` binary is on PATH.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn require_git() -> bool {
    if git_available() {
        true
    } else {
        eprintln!("skipping test that needs the git binary");
        false
    }
}

/// A non-bare repository standing in for the upstream remote.
pub struct FixtureRemote {
    path: PathBuf,
    repo: Repository,
}

impl FixtureRemote {
    pub fn init(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let repo = Repository::init(&path).unwrap();
        Self { path, repo }
    }

    /// One commit per tag, each writing a Modulefile whose version matches
    /// the tag.
    pub fn with_modulefile_tags(path: impl Into<PathBuf>, tags: &[&str]) -> Self {
        let remote = Self::init(path);
        for tag in tags {
            remote.commit_file("Modulefile", &modulefile(tag), &format!("Tagging {tag}"));
            remote.tag(tag);
        }
        remote
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn path_str(&self) -> &str {
        self.path.to_str().unwrap()
    }

    /// Write `contents` to `file` in the work tree and commit everything.
    pub fn commit_file(&self, file: &str, contents: &str, message: &str) -> Oid {
        let target = self.path.join(file);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&target, contents).unwrap();

        let mut index = self.repo.index().unwrap();
        index
            .add_all(["*"], IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();

        let signature = signature();
        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<_> = parent.iter().collect();

        self.repo
            .commit(
                Some("HEAD"),
                &signature,
                &signature,
                message,
                &tree,
                &parents,
            )
            .unwrap()
    }

    /// Lightweight tag on HEAD.
    pub fn tag(&self, name: &str) {
        let head = self.repo.head().unwrap().peel_to_commit().unwrap();
        self.repo
            .tag_lightweight(name, head.as_object(), false)
            .unwrap();
    }

    /// Annotated tag on HEAD.
    pub fn tag_annotated(&self, name: &str, message: &str) {
        let head = self.repo.head().unwrap().peel_to_commit().unwrap();
        self.repo
            .tag(name, head.as_object(), &signature(), message, false)
            .unwrap();
    }

    /// Commit id of HEAD.
    pub fn head(&self) -> String {
        self.repo
            .head()
            .unwrap()
            .peel_to_commit()
            .unwrap()
            .id()
            .to_string()
    }
}

pub fn modulefile(version: &str) -> String {
    format!("name 'puppetlabs-apache'\nversion '{version}'\nauthor 'puppetlabs'\n")
}

fn signature() -> Signature<'static> {
    Signature::now("tester", "tester@example.com").unwrap()
}
