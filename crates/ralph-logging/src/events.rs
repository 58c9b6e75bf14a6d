use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::transcript::{timestamp_seconds, Transcript};

const RULE_WIDTH: usize = 60;

/// Operator-facing events emitted by the loop and the stream classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    LoopStarted {
        prompt: String,
        working_dir: PathBuf,
        agent: String,
        model: Option<String>,
        max_iterations: usize,
        max_turns: Option<u32>,
        timeout_secs: u64,
        total_timeout_secs: Option<u64>,
        human_in_the_loop: bool,
        log_file: Option<PathBuf>,
    },
    IterationStarted {
        iteration: usize,
        max_iterations: usize,
        prompt_chars: usize,
        prompt_tokens: usize,
    },
    /// A tool invocation paired with its result, printed once the result arrives
    ToolCompleted {
        summary: String,
        result: String,
    },
    /// The agent CLI's own terminal `result` event
    AgentResult {
        subtype: String,
        duration_ms: u64,
        num_turns: u64,
    },
    IterationCompleted {
        iteration: usize,
        success: bool,
        exit_reason: String,
        duration_secs: f64,
        input_tokens: usize,
        output_tokens: usize,
    },
    GitChangesCaptured {
        iteration: usize,
        files_changed: usize,
        insertions: usize,
        deletions: usize,
    },
    CommitDetected {
        iteration: usize,
    },
    CompactionDetected {
        iteration: usize,
    },
    IterationFailed {
        iteration: usize,
        error: Option<String>,
        log_file: Option<PathBuf>,
    },
    TaskComplete {
        iteration: usize,
    },
    MaxIterationsReached {
        iterations: usize,
    },
    TotalTimeoutReached {
        elapsed_secs: f64,
        limit_secs: u64,
    },
    StoppedByOperator {
        iteration: usize,
    },
    Interrupted {
        iteration: usize,
    },
}

impl LogEvent {
    /// Events that only make sense on the console; the run log receives a
    /// richer rendering of the same information from the stream classifier.
    pub fn is_console_only(&self) -> bool {
        matches!(self, LogEvent::ToolCompleted { .. } | LogEvent::AgentResult { .. })
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors and visual structure
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Tees loop events to the console and to the run log.
///
/// The console rendering follows the configured [`LogFormat`]; the run log
/// always receives plain, uncolored text.
pub struct Logger {
    format: LogFormat,
    console: bool,
    transcript: Option<Arc<Transcript>>,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            console: true,
            transcript: None,
        }
    }

    /// Attach the run log that every non-console-only event is appended to
    pub fn with_transcript(mut self, transcript: Arc<Transcript>) -> Self {
        self.transcript = Some(transcript);
        self
    }

    /// Suppress console output, keeping the run log
    pub fn quiet(mut self) -> Self {
        self.console = false;
        self
    }

    pub fn transcript(&self) -> Option<&Arc<Transcript>> {
        self.transcript.as_ref()
    }

    pub fn log(&self, event: &LogEvent) {
        if let Some(ref transcript) = self.transcript {
            if !event.is_console_only() {
                transcript.write(&Self::plain_text(event));
            }
        }

        if !self.console {
            return;
        }

        match self.format {
            LogFormat::Json => self.log_json(event),
            LogFormat::Pretty => self.log_pretty(event),
            LogFormat::Compact => self.log_compact(event),
        }
    }

    fn log_json(&self, event: &LogEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{}", json);
        }
    }

    fn log_pretty(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        match event {
            LogEvent::LoopStarted {
                prompt,
                working_dir,
                agent,
                model,
                max_iterations,
                max_turns,
                timeout_secs,
                total_timeout_secs,
                human_in_the_loop,
                log_file,
            } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{}",
                    "╭─────────────────────────────────────────────────────────────────────╮"
                        .bright_blue()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {}{}",
                    "│".bright_blue(),
                    "🚀 Ralph Loop".bold().bright_white(),
                    " ".repeat(53) + &"│".bright_blue().to_string()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Task:".dimmed(),
                    Self::truncate_with_padding(prompt, 60, 67).dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Dir:".dimmed(),
                    Self::truncate_with_padding(&working_dir.display().to_string(), 60, 68)
                        .dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}",
                    "╰─────────────────────────────────────────────────────────────────────╯"
                        .bright_blue()
                );
                let agent_line = match model {
                    Some(model) => format!("{} ({})", agent, model),
                    None => agent.clone(),
                };
                let _ = writeln!(stderr, "  {} {}", "Agent:".dimmed(), agent_line);
                let mut limits = format!("{} iterations", max_iterations);
                if let Some(turns) = max_turns {
                    limits.push_str(&format!(", {} turns each", turns));
                }
                limits.push_str(&format!(", {}s per iteration", timeout_secs));
                if let Some(total) = total_timeout_secs {
                    limits.push_str(&format!(", {}s total", total));
                }
                let _ = writeln!(stderr, "  {} {}", "Limits:".dimmed(), limits);
                if *human_in_the_loop {
                    let _ = writeln!(stderr, "  {} enabled", "Human-in-the-loop:".dimmed());
                }
                if let Some(path) = log_file {
                    let _ = writeln!(stderr, "  {} {}", "📝 Log file:".dimmed(), path.display());
                }
                let _ = writeln!(stderr);
            }
            LogEvent::IterationStarted {
                iteration,
                max_iterations,
                prompt_tokens,
                ..
            } => {
                let iter_text = format!("─ Iteration {}/{} ", iteration, max_iterations);
                let padding = "─".repeat(67usize.saturating_sub(iter_text.chars().count()));
                let _ = writeln!(
                    stderr,
                    "{}{}{}",
                    "┌".bright_blue(),
                    iter_text.bright_blue().bold(),
                    padding.bright_blue()
                );
                let _ = writeln!(
                    stderr,
                    "  {} {} {}",
                    "⏰".dimmed(),
                    timestamp_seconds().dimmed(),
                    format!("(prompt ~{} tokens est.)", prompt_tokens).dimmed()
                );
                let _ = writeln!(stderr);
            }
            LogEvent::ToolCompleted { summary, result } => {
                let prefix = "    │".dimmed();
                if !summary.is_empty() {
                    let _ = writeln!(stderr, "{} {}", prefix, summary);
                }
                let styled = if result.trim_start().starts_with('✗') {
                    result.bright_red()
                } else {
                    result.dimmed()
                };
                let _ = writeln!(stderr, "{} {}", prefix, styled);
            }
            LogEvent::AgentResult {
                subtype,
                duration_ms,
                num_turns,
            } => {
                let _ = writeln!(
                    stderr,
                    "    {} {} {}",
                    "■".bright_cyan(),
                    format!("Iteration Complete: {}", subtype).bright_cyan(),
                    format!(
                        "({:.1}s | {} turns)",
                        *duration_ms as f64 / 1000.0,
                        num_turns
                    )
                    .dimmed()
                );
            }
            LogEvent::IterationCompleted {
                success,
                exit_reason,
                duration_secs,
                input_tokens,
                output_tokens,
                ..
            } => {
                if *success {
                    let _ = writeln!(
                        stderr,
                        "    {} {} ({:.1}s)",
                        "✓".bright_green(),
                        exit_reason,
                        duration_secs
                    );
                } else {
                    let _ = writeln!(
                        stderr,
                        "    {} {} ({:.1}s)",
                        "✗".bright_red(),
                        exit_reason,
                        duration_secs
                    );
                }
                let _ = writeln!(
                    stderr,
                    "    {} {}",
                    "📊".dimmed(),
                    format!(
                        "Tokens (estimated): {} in → {} out → {} total",
                        input_tokens,
                        output_tokens,
                        input_tokens + output_tokens
                    )
                    .dimmed()
                );
            }
            LogEvent::GitChangesCaptured {
                files_changed,
                insertions,
                deletions,
                ..
            } => {
                if *files_changed > 0 {
                    let _ = writeln!(
                        stderr,
                        "    {} {} {} {}, {} {}, {} {}",
                        "📁".dimmed(),
                        "Git:".dimmed(),
                        files_changed,
                        if *files_changed == 1 { "file" } else { "files" },
                        format!("+{}", insertions).green(),
                        if *insertions == 1 { "line" } else { "lines" },
                        format!("-{}", deletions).red(),
                        if *deletions == 1 { "line" } else { "lines" }
                    );
                } else {
                    let _ = writeln!(
                        stderr,
                        "    {} {}",
                        "📁".dimmed(),
                        "Git: no uncommitted changes".dimmed()
                    );
                }
            }
            LogEvent::CommitDetected { .. } => {
                let _ = writeln!(stderr, "    {} Commit detected", "✅".bright_green());
            }
            LogEvent::CompactionDetected { .. } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} {}",
                    "⚠".bright_yellow(),
                    "COMPACTION DETECTED".bright_yellow().bold()
                );
                let _ = writeln!(
                    stderr,
                    "  {}",
                    "The agent was about to compact its conversation. Iteration terminated early; moving on."
                        .dimmed()
                );
            }
            LogEvent::IterationFailed {
                iteration,
                error,
                log_file,
            } => {
                let _ = writeln!(
                    stderr,
                    "{} {}",
                    "❌".bright_red(),
                    format!("Iteration {} failed", iteration).bright_red()
                );
                if let Some(error) = error {
                    let _ = writeln!(stderr, "  {}", error.bright_red());
                }
                if let Some(path) = log_file {
                    let _ = writeln!(
                        stderr,
                        "  {} See full details in log file: {}",
                        "💡".dimmed(),
                        path.display()
                    );
                }
            }
            LogEvent::TaskComplete { .. } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} {}",
                    "✅".bright_green(),
                    "TASK COMPLETE - Agent emitted completion signal"
                        .bright_green()
                        .bold()
                );
            }
            LogEvent::MaxIterationsReached { iterations } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} Max iterations ({}) reached. Task may not be complete.",
                    "⚠".bright_yellow(),
                    iterations
                );
            }
            LogEvent::TotalTimeoutReached {
                elapsed_secs,
                limit_secs,
            } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} {} after {:.1} seconds elapsed (limit {}s)",
                    "⏱".bright_red(),
                    "TOTAL TIMEOUT REACHED".bright_red().bold(),
                    elapsed_secs,
                    limit_secs
                );
            }
            LogEvent::StoppedByOperator { iteration } => {
                let _ = writeln!(
                    stderr,
                    "{} Stopping loop at user request (after iteration {})",
                    "🛑".bright_yellow(),
                    iteration
                );
            }
            LogEvent::Interrupted { iteration } => {
                let _ = writeln!(
                    stderr,
                    "{} Interrupted after iteration {}",
                    "🛑".bright_yellow(),
                    iteration
                );
            }
        }
    }

    fn log_compact(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        let timestamp = chrono::Local::now().format("%H:%M:%S");
        let msg = match event {
            LogEvent::LoopStarted { agent, .. } => format!("[{}] loop:start {}", timestamp, agent),
            LogEvent::IterationStarted { iteration, .. } => {
                format!("[{}] iter:start:{}", timestamp, iteration)
            }
            LogEvent::ToolCompleted { summary, result } => {
                format!("[{}] tool {} {}", timestamp, summary, result.trim())
            }
            LogEvent::AgentResult { subtype, .. } => format!("[{}] result:{}", timestamp, subtype),
            LogEvent::IterationCompleted {
                iteration,
                success,
                duration_secs,
                ..
            } => format!(
                "[{}] iter:done:{} ok={} {:.1}s",
                timestamp, iteration, success, duration_secs
            ),
            LogEvent::GitChangesCaptured {
                iteration,
                files_changed,
                insertions,
                deletions,
            } => format!(
                "[{}] git:{} {}f +{} -{}",
                timestamp, iteration, files_changed, insertions, deletions
            ),
            LogEvent::CommitDetected { iteration } => {
                format!("[{}] git:commit:{}", timestamp, iteration)
            }
            LogEvent::CompactionDetected { iteration } => {
                format!("[{}] compaction:{}", timestamp, iteration)
            }
            LogEvent::IterationFailed {
                iteration, error, ..
            } => format!(
                "[{}] error:{}:{}",
                timestamp,
                iteration,
                error.as_deref().unwrap_or("unknown")
            ),
            LogEvent::TaskComplete { iteration } => {
                format!("[{}] loop:complete:{}", timestamp, iteration)
            }
            LogEvent::MaxIterationsReached { iterations } => {
                format!("[{}] loop:limit:{}", timestamp, iterations)
            }
            LogEvent::TotalTimeoutReached { elapsed_secs, .. } => {
                format!("[{}] loop:total-timeout {:.1}s", timestamp, elapsed_secs)
            }
            LogEvent::StoppedByOperator { iteration } => {
                format!("[{}] loop:stopped:{}", timestamp, iteration)
            }
            LogEvent::Interrupted { iteration } => {
                format!("[{}] loop:interrupted:{}", timestamp, iteration)
            }
        };
        let _ = writeln!(stderr, "{}", msg);
    }

    /// Plain-text rendering appended to the run log
    pub fn plain_text(event: &LogEvent) -> String {
        let separator = "=".repeat(RULE_WIDTH);
        match event {
            LogEvent::LoopStarted {
                prompt,
                agent,
                model,
                max_iterations,
                max_turns,
                timeout_secs,
                total_timeout_secs,
                human_in_the_loop,
                log_file,
                ..
            } => {
                let mut out = String::from("🚀 Ralph Loop Starting\n");
                if let Some(path) = log_file {
                    out.push_str(&format!("📝 Log file: {}\n", path.display()));
                }
                out.push_str(&format!("Task: {}\n", prompt));
                out.push_str(&format!("Max iterations: {}\n", max_iterations));
                if let Some(turns) = max_turns {
                    out.push_str(&format!("Max turns per iteration: {}\n", turns));
                }
                out.push_str(&format!("Timeout per iteration: {} seconds\n", timeout_secs));
                if let Some(total) = total_timeout_secs {
                    out.push_str(&format!("Total timeout: {} seconds\n", total));
                }
                out.push_str(&format!("CLI: {}\n", agent));
                if let Some(model) = model {
                    out.push_str(&format!("Model: {}\n", model));
                }
                out.push_str(&format!("Human-in-the-loop: {}\n", human_in_the_loop));
                out.push_str(&separator);
                out.push('\n');
                out
            }
            LogEvent::IterationStarted {
                iteration,
                max_iterations,
                ..
            } => format!(
                "\n🔄 Iteration {}/{}\n⏰ {}\n{}\n",
                iteration,
                max_iterations,
                timestamp_seconds(),
                "-".repeat(RULE_WIDTH)
            ),
            LogEvent::ToolCompleted { summary, result } => format!("{}\n{}\n", summary, result),
            LogEvent::AgentResult {
                subtype,
                duration_ms,
                num_turns,
            } => format!(
                "\n--- Iteration Complete: {} ---\nDuration: {:.1}s | Turns: {}\n",
                subtype,
                *duration_ms as f64 / 1000.0,
                num_turns
            ),
            LogEvent::IterationCompleted {
                iteration,
                success,
                exit_reason,
                duration_secs,
                input_tokens,
                output_tokens,
            } => format!(
                "\n{} Iteration {}: {} ({:.2}s)\n📊 Token usage (estimated): {} in, {} out, {} total\n",
                if *success { "✅" } else { "❌" },
                iteration,
                exit_reason,
                duration_secs,
                input_tokens,
                output_tokens,
                input_tokens + output_tokens
            ),
            LogEvent::GitChangesCaptured {
                files_changed,
                insertions,
                deletions,
                ..
            } => format!(
                "📁 Git: {} files changed, +{} -{}\n",
                files_changed, insertions, deletions
            ),
            LogEvent::CommitDetected { .. } => "✅ Commit detected\n".to_string(),
            LogEvent::CompactionDetected { .. } => format!(
                "\n{sep}\n⚠️  COMPACTION DETECTED\n{sep}\nThe agent was about to compact the conversation.\nIteration terminated early to preserve context.\nMoving to next iteration...\n{sep}\n",
                sep = separator
            ),
            LogEvent::IterationFailed {
                iteration,
                error,
                log_file,
            } => {
                let mut out = format!("❌ Iteration {} failed\n", iteration);
                if let Some(error) = error {
                    out.push_str(&format!("\nError message:\n{}\n", error));
                }
                if let Some(path) = log_file {
                    out.push_str(&format!("\n💡 See full details in log file: {}\n", path.display()));
                }
                out
            }
            LogEvent::TaskComplete { .. } => format!(
                "\n{sep}\n✅ TASK COMPLETE - Agent emitted completion signal\n{sep}\n",
                sep = separator
            ),
            LogEvent::MaxIterationsReached { iterations } => format!(
                "\n{sep}\n⚠️  Max iterations ({}) reached\nTask may not be complete\n{sep}\n",
                iterations,
                sep = separator
            ),
            LogEvent::TotalTimeoutReached {
                elapsed_secs,
                limit_secs,
            } => format!(
                "\n{sep}\n⏱ TOTAL TIMEOUT REACHED after {:.1} seconds elapsed (limit {}s)\n{sep}\n",
                elapsed_secs,
                limit_secs,
                sep = separator
            ),
            LogEvent::StoppedByOperator { .. } => "🛑 Stopping loop at user request\n".to_string(),
            LogEvent::Interrupted { iteration } => {
                format!("🛑 Interrupted after iteration {}\n", iteration)
            }
        }
    }

    /// Truncate a string and pad to exact width
    fn truncate_with_padding(s: &str, max_len: usize, total_width: usize) -> String {
        let truncated = if s.chars().count() > max_len {
            let head: String = s.chars().take(max_len - 3).collect();
            format!("{}...", head)
        } else {
            s.to_string()
        };

        let padding_needed = total_width.saturating_sub(truncated.chars().count() + 1);
        format!("{}{}│", truncated, " ".repeat(padding_needed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_only_events_skip_transcript() {
        let transcript = Arc::new(Transcript::in_memory());
        let logger = Logger::new(LogFormat::Compact)
            .quiet()
            .with_transcript(transcript.clone());

        logger.log(&LogEvent::ToolCompleted {
            summary: "⚡ Bash: ls".into(),
            result: "  ✓ Exit 0".into(),
        });
        assert!(transcript.contents().is_empty());

        logger.log(&LogEvent::TaskComplete { iteration: 3 });
        assert!(transcript
            .contents()
            .contains("TASK COMPLETE - Agent emitted completion signal"));
    }

    #[test]
    fn test_total_timeout_mentions_elapsed() {
        let text = Logger::plain_text(&LogEvent::TotalTimeoutReached {
            elapsed_secs: 1.5,
            limit_secs: 1,
        });
        assert!(text.contains("TOTAL TIMEOUT REACHED"));
        assert!(text.contains("1.5 seconds elapsed"));
    }

    #[test]
    fn test_loop_started_lists_total_timeout() {
        let text = Logger::plain_text(&LogEvent::LoopStarted {
            prompt: "Fix the build".into(),
            working_dir: PathBuf::from("/tmp/project"),
            agent: "claude".into(),
            model: Some("opus".into()),
            max_iterations: 10,
            max_turns: Some(50),
            timeout_secs: 600,
            total_timeout_secs: Some(3600),
            human_in_the_loop: false,
            log_file: None,
        });
        assert!(text.contains("Total timeout: 3600 seconds"));
        assert!(text.contains("Model: opus"));
        assert!(text.contains("Max turns per iteration: 50"));
    }

    #[test]
    fn test_parse_log_format() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("fancy".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_truncate_with_padding_is_char_safe() {
        let padded = Logger::truncate_with_padding("héllo wörld", 5, 10);
        assert!(padded.starts_with("hé..."));
        assert!(padded.ends_with('│'));
    }
}
