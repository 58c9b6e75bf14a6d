use git2::Sort;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::{GitError, GitRepo};

/// One commit, as in `git log --oneline`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Abbreviated id
    pub id: String,
    pub summary: String,
    /// Committer time, seconds since the epoch
    pub time: i64,
}

impl std::fmt::Display for CommitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.id, self.summary)
    }
}

fn unborn(e: &git2::Error) -> bool {
    matches!(
        e.code(),
        git2::ErrorCode::UnbornBranch | git2::ErrorCode::NotFound
    )
}

impl GitRepo {
    /// Up to `limit` commits reachable from HEAD, newest first.
    /// Empty before the first commit.
    pub fn recent_commits(&self, limit: usize) -> Result<Vec<CommitInfo>, GitError> {
        let repo = self.inner();
        // push_head on an unborn branch fails with a generic error code
        let head = match repo.head() {
            Ok(head) => head,
            Err(e) if unborn(&e) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let Some(tip) = head.target() else {
            return Ok(Vec::new());
        };

        let mut walk = repo.revwalk()?;
        walk.set_sorting(Sort::TIME)?;
        walk.push(tip)?;

        let mut commits = Vec::new();
        for oid in walk.take(limit) {
            let commit = repo.find_commit(oid?)?;
            let id = commit.id().to_string();
            commits.push(CommitInfo {
                id: id.chars().take(7).collect(),
                summary: commit.summary().unwrap_or("").to_string(),
                time: commit.time().seconds(),
            });
        }
        Ok(commits)
    }

    /// Whether HEAD was committed within `window` of now
    pub fn committed_within(&self, window: Duration) -> Result<bool, GitError> {
        let head = match self.inner().head() {
            Ok(head) => head,
            Err(e) if unborn(&e) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let commit = head.peel_to_commit()?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        let age = now - commit.time().seconds();
        Ok(age <= window.as_secs() as i64)
    }
}
