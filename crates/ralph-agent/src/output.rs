use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::conversation::ConversationSummary;
use crate::protocol::FinalResult;

/// A stdout line with the wall-clock time it arrived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedLine {
    /// `YYYY-mm-dd HH:MM:SS.mmm`
    pub at: String,
    pub line: String,
}

/// How a supervised run came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The process exited on its own
    Exited,
    /// Killed after a compaction phrase appeared in its output
    Compaction,
    /// Killed after finishing its work without emitting the terminal event
    HungCompletion,
    /// Killed after a long stretch of inactivity
    Stalled,
    /// Killed at the wall-clock deadline
    TimedOut,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Exited => write!(f, "exited"),
            Termination::Compaction => write!(f, "compaction"),
            Termination::HungCompletion => write!(f, "hung completion"),
            Termination::Stalled => write!(f, "stalled"),
            Termination::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Everything captured from one agent process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisedRun {
    /// Exit code; synthesized for runs we terminated ourselves
    pub exit_code: i32,
    /// Full stdout text, lines joined with `\n`
    pub stdout: String,
    /// Full stderr text
    pub stderr: String,
    /// Stdout lines in arrival order
    pub lines: Vec<TimestampedLine>,
    pub termination: Termination,
    /// Duration of execution
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// When the process was launched, `YYYY-mm-dd HH:MM:SS`
    pub started_at: String,
    /// The agent's terminal `result` event, when one arrived
    pub final_result: Option<FinalResult>,
    pub conversation: ConversationSummary,
}

impl SupervisedRun {
    /// Check if the agent exited successfully
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn compaction_detected(&self) -> bool {
        self.termination == Termination::Compaction
    }

    pub fn timed_out(&self) -> bool {
        self.termination == Termination::TimedOut
    }

    /// Get combined output (stdout + stderr)
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// Count lines in stdout
    pub fn stdout_lines(&self) -> usize {
        self.lines.len()
    }

    /// Count lines in stderr
    pub fn stderr_lines(&self) -> usize {
        self.stderr.lines().count()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
