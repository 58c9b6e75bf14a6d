use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::{build_feedback, ExitReason, IterationResult, PromptTemplate};

/// Shared context for the ralph loop
#[derive(Debug, Clone)]
pub struct LoopContext {
    /// Operator's task prompt
    pub prompt: String,
    /// Working directory
    pub working_dir: PathBuf,
    pub template: PromptTemplate,
    /// Completed iterations
    pub iteration: usize,
    /// History of all iterations
    pub history: Vec<IterationRecord>,
    /// When the loop started
    started_at: Instant,
    started_wall: DateTime<Local>,
    pub max_iterations: usize,
    /// Wall-clock budget for the whole run (None = unlimited)
    pub total_timeout: Option<Duration>,
    /// Last iteration's outcome, source of the next prompt's feedback
    pub last_result: Option<IterationResult>,
    previous_prompt: Option<String>,
}

/// Record of a single iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration_number: usize,
    pub success: bool,
    pub exit_code: i32,
    pub exit_reason: ExitReason,
    pub duration_secs: f64,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub git_files_changed: usize,
    pub committed: bool,
    pub timestamp: DateTime<Local>,
}

impl IterationRecord {
    pub fn from_result(result: &IterationResult, git_files_changed: usize, committed: bool) -> Self {
        Self {
            iteration_number: result.iteration,
            success: result.success,
            exit_code: result.exit_code,
            exit_reason: result.exit_reason(),
            duration_secs: result.duration_secs,
            input_tokens: result.input_tokens,
            output_tokens: result.output_tokens,
            git_files_changed,
            committed,
            timestamp: Local::now(),
        }
    }
}

impl LoopContext {
    pub fn new(prompt: String, working_dir: PathBuf, template: PromptTemplate) -> Self {
        Self {
            prompt,
            working_dir,
            template,
            iteration: 0,
            history: Vec::new(),
            started_at: Instant::now(),
            started_wall: Local::now(),
            max_iterations: 10,
            total_timeout: None,
            last_result: None,
            previous_prompt: None,
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = Some(timeout);
        self
    }

    pub fn total_duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn started_wall(&self) -> DateTime<Local> {
        self.started_wall
    }

    pub fn should_continue(&self) -> bool {
        self.iteration < self.max_iterations
    }

    /// Time left in the total budget; `None` without one
    pub fn remaining_budget(&self) -> Option<Duration> {
        self.total_timeout
            .map(|limit| limit.saturating_sub(self.total_duration()))
    }

    pub fn total_timeout_exceeded(&self) -> bool {
        matches!(self.remaining_budget(), Some(left) if left.is_zero())
    }

    /// Feedback derived from the previous iteration, if there was one
    pub fn feedback(&self) -> Option<String> {
        self.last_result.as_ref().map(build_feedback)
    }

    /// The wrapped prompt for the next iteration
    pub fn current_prompt(&self) -> String {
        let feedback = self.feedback();
        self.template
            .render(self.iteration + 1, &self.prompt, feedback.as_deref())
    }

    /// Swap in the prompt about to be sent, returning the previous one
    pub fn replace_prompt(&mut self, prompt: String) -> Option<String> {
        self.previous_prompt.replace(prompt)
    }

    pub fn push_record(&mut self, record: IterationRecord) {
        self.history.push(record);
    }

    pub fn increment_iteration(&mut self) {
        self.iteration += 1;
    }

    pub fn input_tokens(&self) -> usize {
        self.history.iter().map(|r| r.input_tokens).sum()
    }

    pub fn output_tokens(&self) -> usize {
        self.history.iter().map(|r| r.output_tokens).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> LoopContext {
        LoopContext::new(
            "Fix the build".into(),
            PathBuf::from("."),
            PromptTemplate::from_text("{iteration_num}: {user_prompt}{feedback}"),
        )
    }

    #[test]
    fn test_first_prompt_has_no_feedback() {
        assert_eq!(context().current_prompt(), "1: Fix the build");
    }

    #[test]
    fn test_iteration_limit() {
        let mut ctx = context().with_max_iterations(2);
        assert!(ctx.should_continue());
        ctx.increment_iteration();
        ctx.increment_iteration();
        assert!(!ctx.should_continue());
    }

    #[test]
    fn test_budget() {
        let ctx = context();
        assert!(ctx.remaining_budget().is_none());
        assert!(!ctx.total_timeout_exceeded());

        let ctx = context().with_total_timeout(Duration::ZERO);
        assert!(ctx.total_timeout_exceeded());

        let ctx = context().with_total_timeout(Duration::from_secs(3600));
        assert!(ctx.remaining_budget().unwrap() > Duration::from_secs(3500));
    }

    #[test]
    fn test_replace_prompt() {
        let mut ctx = context();
        assert_eq!(ctx.replace_prompt("one".into()), None);
        assert_eq!(ctx.replace_prompt("two".into()).as_deref(), Some("one"));
    }
}
