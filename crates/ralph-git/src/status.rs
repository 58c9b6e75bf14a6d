use git2::{Status, StatusOptions};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{GitError, GitRepo};

/// One path in `git status --short` form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// Two-letter index/worktree code, e.g. ` M`, `A `, `??`
    pub code: String,
    pub path: String,
}

/// Status of the git working directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitStatus {
    pub modified: Vec<String>,
    pub added: Vec<String>,
    pub deleted: Vec<String>,
    pub untracked: Vec<String>,
    pub entries: Vec<StatusEntry>,
}

impl GitStatus {
    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_changes(&self) -> usize {
        self.entries.len()
    }

    /// Lines as printed by `git status --short`
    pub fn short(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| format!("{} {}", e.code, e.path))
            .collect()
    }
}

fn short_code(st: Status) -> String {
    if st.is_wt_new() && !st.is_index_new() {
        return "??".to_string();
    }

    let index = if st.is_index_new() {
        'A'
    } else if st.is_index_modified() {
        'M'
    } else if st.is_index_deleted() {
        'D'
    } else if st.is_index_renamed() {
        'R'
    } else if st.is_index_typechange() {
        'T'
    } else {
        ' '
    };

    let worktree = if st.is_wt_modified() {
        'M'
    } else if st.is_wt_deleted() {
        'D'
    } else if st.is_wt_renamed() {
        'R'
    } else if st.is_wt_typechange() {
        'T'
    } else {
        ' '
    };

    format!("{}{}", index, worktree)
}

impl GitRepo {
    /// Current working tree status, untracked files included, ignored files not
    pub fn status(&self) -> Result<GitStatus, GitError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let statuses = self.inner().statuses(Some(&mut opts))?;
        let mut status = GitStatus::default();

        for entry in statuses.iter() {
            let path = entry.path().unwrap_or("").to_string();
            let st = entry.status();

            if st.is_wt_modified() || st.is_index_modified() {
                status.modified.push(path.clone());
            }
            if st.is_wt_new() {
                status.untracked.push(path.clone());
            }
            if st.is_index_new() {
                status.added.push(path.clone());
            }
            if st.is_wt_deleted() || st.is_index_deleted() {
                status.deleted.push(path.clone());
            }
            status.entries.push(StatusEntry {
                code: short_code(st),
                path,
            });
        }

        debug!(
            modified = status.modified.len(),
            added = status.added.len(),
            deleted = status.deleted.len(),
            untracked = status.untracked.len(),
            "Captured git status"
        );

        Ok(status)
    }
}
