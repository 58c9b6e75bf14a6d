//! Interactive human-in-the-loop pause.

use colored::Colorize;
use dialoguer::Select;

use ralph_core::{LoopError, ReviewDecision, Reviewer, REVIEW_LOG_LIMIT};
use ralph_git::{CommitInfo, GitStatus};

const CHOICES: &[(&str, ReviewDecision)] = &[
    ("Continue to next iteration", ReviewDecision::Continue),
    ("Stop the loop", ReviewDecision::Stop),
    ("Show git status", ReviewDecision::ShowStatus),
    ("Show git log (last 5 commits)", ReviewDecision::ShowLog),
];

/// Asks on the terminal with a dialoguer menu
pub struct TerminalReviewer;

impl Reviewer for TerminalReviewer {
    fn choose(&self, iteration: usize) -> Result<ReviewDecision, LoopError> {
        let separator = "=".repeat(60);
        eprintln!();
        eprintln!("{}", separator);
        eprintln!(
            "🤚 {}",
            format!("HUMAN IN THE LOOP - Pausing for review after iteration {}", iteration).bold()
        );
        eprintln!("{}", separator);

        let items: Vec<&str> = CHOICES.iter().map(|(label, _)| *label).collect();
        let selection = Select::new()
            .with_prompt("Your choice")
            .items(&items)
            .default(0)
            .interact()
            .map_err(|e| match e {
                dialoguer::Error::IO(io) if io.kind() == std::io::ErrorKind::Interrupted => {
                    LoopError::Interrupted
                }
                other => LoopError::ConfigError(format!(
                    "human-in-the-loop needs an interactive terminal: {}",
                    other
                )),
            })?;

        Ok(CHOICES[selection].1)
    }

    fn show_status(&self, status: &GitStatus) {
        eprintln!();
        if status.is_clean() {
            eprintln!("  {}", "Working tree clean".dimmed());
            return;
        }
        for line in status.short() {
            eprintln!("  {}", line);
        }
    }

    fn show_log(&self, commits: &[CommitInfo]) {
        eprintln!();
        if commits.is_empty() {
            eprintln!("  {}", "No commits yet".dimmed());
            return;
        }
        for commit in commits.iter().take(REVIEW_LOG_LIMIT) {
            eprintln!("  {} {}", commit.id.yellow(), commit.summary);
        }
    }
}
