use ralph_git::{CommitInfo, GitStatus};

use crate::LoopError;

/// Number of commits shown when the operator asks for the log
pub const REVIEW_LOG_LIMIT: usize = 5;

/// What the operator picked at a review pause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Continue,
    Stop,
    ShowStatus,
    ShowLog,
}

/// Human-in-the-loop pause between iterations.
///
/// The loop keeps asking until the answer is [`ReviewDecision::Continue`] or
/// [`ReviewDecision::Stop`], showing status or log in between. Returning
/// [`LoopError::Interrupted`] ends the run as interrupted.
pub trait Reviewer: Send + Sync {
    fn choose(&self, iteration: usize) -> Result<ReviewDecision, LoopError>;

    fn show_status(&self, status: &GitStatus);

    fn show_log(&self, commits: &[CommitInfo]);
}
