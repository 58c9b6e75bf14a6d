use chrono::Local;
use ralph_agent::{AgentError, SupervisedRun, Termination, TimestampedLine};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rough token count: one token per four characters.
///
/// This is an estimate, not a tokenization. Everything that surfaces it
/// labels it as such.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Case-insensitive scan for the CLI's turn-limit message.
///
/// The CLI has no dedicated exit code for this, so a prose mention of
/// "max turns" in the output also matches.
pub fn mentions_max_turns(text: &str) -> bool {
    text.to_lowercase().contains("max turns")
}

/// Why an iteration ended, in the order the run log reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Compaction,
    MaxTurns,
    Timeout,
    Error,
    NaturalCompletion,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Compaction => write!(f, "Compaction detected"),
            ExitReason::MaxTurns => write!(f, "Max turns reached"),
            ExitReason::Timeout => write!(f, "Timeout"),
            ExitReason::Error => write!(f, "Error"),
            ExitReason::NaturalCompletion => write!(f, "Natural completion"),
        }
    }
}

/// The outcome of one iteration, built once when its process is gone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationResult {
    /// 1-based
    pub iteration: usize,
    /// Exit status zero and no compaction
    pub success: bool,
    /// Full stdout text
    pub output: String,
    pub error: Option<String>,
    pub exit_code: i32,
    /// How the process ended; `None` when it never started
    pub termination: Option<Termination>,
    pub max_turns_reached: bool,
    pub timeout_occurred: bool,
    pub compaction_detected: bool,
    /// Estimated from the prompt
    pub input_tokens: usize,
    /// Estimated from stdout
    pub output_tokens: usize,
    pub duration_secs: f64,
    /// `YYYY-mm-dd HH:MM:SS`
    pub started_at: String,
    #[serde(skip)]
    pub lines: Vec<TimestampedLine>,
}

impl IterationResult {
    /// Classify a supervised run.
    ///
    /// `timeout` is the budget the run was given; it only shapes the error
    /// text of a timed-out run.
    pub fn from_run(
        run: &SupervisedRun,
        prompt: &str,
        iteration: usize,
        timeout: Option<Duration>,
    ) -> Self {
        let compaction_detected = run.compaction_detected();
        let timeout_occurred = run.timed_out();
        let max_turns_reached = mentions_max_turns(&run.combined_output());

        let error = match run.termination {
            Termination::TimedOut => Some(format!(
                "Iteration timed out after {} seconds",
                timeout.map(|t| t.as_secs()).unwrap_or_else(|| run.duration.as_secs())
            )),
            Termination::Stalled if run.stderr.trim().is_empty() => Some(format!(
                "Agent stopped producing output and was terminated after {:.0} seconds",
                run.duration.as_secs_f64()
            )),
            _ if run.exit_code != 0 => {
                if run.stderr.trim().is_empty() {
                    Some(format!("Process exited with code {}", run.exit_code))
                } else {
                    Some(run.stderr.clone())
                }
            }
            _ => None,
        };

        Self {
            iteration,
            success: run.exit_code == 0 && !compaction_detected,
            output: run.stdout.clone(),
            error,
            exit_code: run.exit_code,
            termination: Some(run.termination),
            max_turns_reached,
            timeout_occurred,
            compaction_detected,
            input_tokens: estimate_tokens(prompt),
            output_tokens: estimate_tokens(&run.stdout),
            duration_secs: run.duration.as_secs_f64(),
            started_at: run.started_at.clone(),
            lines: run.lines.clone(),
        }
    }

    /// A failed iteration for a process that could not be launched
    pub fn from_launch_failure(
        cli: &str,
        err: &AgentError,
        prompt: &str,
        iteration: usize,
        duration: Duration,
    ) -> Self {
        Self {
            iteration,
            success: false,
            output: String::new(),
            error: Some(format!("Failed to run {}: {}", cli, err)),
            exit_code: -1,
            termination: None,
            max_turns_reached: false,
            timeout_occurred: false,
            compaction_detected: false,
            input_tokens: estimate_tokens(prompt),
            output_tokens: 0,
            duration_secs: duration.as_secs_f64(),
            started_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            lines: Vec::new(),
        }
    }

    pub fn exit_reason(&self) -> ExitReason {
        if self.compaction_detected {
            ExitReason::Compaction
        } else if self.max_turns_reached {
            ExitReason::MaxTurns
        } else if self.timeout_occurred {
            ExitReason::Timeout
        } else if !self.success {
            ExitReason::Error
        } else {
            ExitReason::NaturalCompletion
        }
    }

    pub fn total_tokens(&self) -> usize {
        self.input_tokens + self.output_tokens
    }
}
