use git2::DiffOptions;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{GitError, GitRepo};

/// Summary of diff statistics against HEAD, index and working tree included
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
}

impl DiffSummary {
    pub fn is_empty(&self) -> bool {
        self.files_changed == 0
    }
}

impl GitRepo {
    /// Uncommitted changes relative to HEAD (or to nothing, before the first commit)
    pub fn diff_summary(&self) -> Result<DiffSummary, GitError> {
        let repo = self.inner();

        let head_tree = match repo.head() {
            Ok(head) => Some(head.peel_to_tree()?),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => None,
            Err(e) => return Err(GitError::GitOperationFailed(e)),
        };

        let mut opts = DiffOptions::new();
        let diff = repo.diff_tree_to_workdir_with_index(head_tree.as_ref(), Some(&mut opts))?;
        let stats = diff.stats()?;

        let summary = DiffSummary {
            files_changed: stats.files_changed(),
            insertions: stats.insertions(),
            deletions: stats.deletions(),
        };
        debug!(?summary, "Captured diff summary");
        Ok(summary)
    }
}
