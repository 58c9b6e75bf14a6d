//! # ralph-git
//!
//! Read-only git inspection for the ralph loop.
//!
//! The agent owns the repository: it edits files and commits on its own.
//! The loop only looks, to check that it runs inside a working tree, to
//! notice fresh commits, and to show the operator what changed.
//!
//! ## Key Types
//!
//! - [`GitRepo`] - An opened repository with the queries the loop needs
//! - [`DiffSummary`] - Files/lines changed against HEAD
//! - [`GitStatus`] - Working tree status, renderable like `git status --short`
//! - [`CommitInfo`] - One entry of the recent history

mod diff;
mod error;
mod log;
mod status;

pub use diff::DiffSummary;
pub use error::GitError;
pub use log::CommitInfo;
pub use status::{GitStatus, StatusEntry};

use git2::Repository;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A repository discovered from a working directory
pub struct GitRepo {
    repo: Repository,
}

impl GitRepo {
    /// Find the repository containing `working_dir`.
    ///
    /// Fails with [`GitError::NotARepo`] outside a working tree, including
    /// inside a bare repository.
    pub fn discover(working_dir: &Path) -> Result<Self, GitError> {
        let repo = Repository::discover(working_dir)
            .map_err(|_| GitError::NotARepo(working_dir.display().to_string()))?;
        if repo.is_bare() {
            return Err(GitError::NotARepo(working_dir.display().to_string()));
        }
        debug!(path = %working_dir.display(), "Opened git repository");
        Ok(Self { repo })
    }

    /// Root of the working tree
    pub fn workdir(&self) -> Option<PathBuf> {
        self.repo.workdir().map(Path::to_path_buf)
    }

    pub(crate) fn inner(&self) -> &Repository {
        &self.repo
    }
}

/// Whether `working_dir` is inside a git working tree
pub fn is_repository(working_dir: &Path) -> bool {
    GitRepo::discover(working_dir).is_ok()
}
