//! Box-drawn sections of the run log written by the loop itself.

use chrono::Local;
use ralph_agent::AgentConfig;
use ralph_logging::Transcript;

use crate::{estimate_tokens, IterationResult, LoopContext, PromptChange};

const TASK_PREVIEW: usize = 55;
const SYSTEM_PROMPT_PREVIEW: usize = 50;
const MAX_DIFF_LINES: usize = 20;

fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

fn timeout_label(config: &AgentConfig) -> String {
    match config.timeout {
        Some(t) => format!("{}s", t.as_secs()),
        None => "none".to_string(),
    }
}

pub(crate) fn write_run_header(
    transcript: &Transcript,
    ctx: &LoopContext,
    config: &AgentConfig,
    agent: &str,
    initial_prompt: &str,
) {
    transcript.box_header("RALPH LOOP EXECUTION");
    transcript.box_line("Initial Configuration");
    transcript.box_divider(false);
    transcript.box_line(&format!("Task: {}", preview(&ctx.prompt, TASK_PREVIEW)));
    transcript.box_line(&format!(
        "Start time: {}",
        ctx.started_wall().format("%Y-%m-%d %H:%M:%S")
    ));
    let turns = config
        .max_turns
        .map(|t| t.to_string())
        .unwrap_or_else(|| "-".to_string());
    transcript.box_line(&format!(
        "Max iterations: {} | Max turns: {} | Timeout: {}",
        ctx.max_iterations,
        turns,
        timeout_label(config)
    ));
    if let Some(total) = ctx.total_timeout {
        transcript.box_line(&format!("Total timeout: {}s", total.as_secs()));
    }
    transcript.box_line(&format!("CLI: {}", agent));
    if let Some(ref model) = config.model {
        transcript.box_line(&format!("Model: {}", model));
    }
    if let Some(ref system_prompt) = config.system_prompt {
        transcript.box_line(&format!(
            "System prompt: {}",
            preview(system_prompt, SYSTEM_PROMPT_PREVIEW)
        ));
    }
    transcript.box_line(&format!(
        "Prompt size: {} chars ({} tokens est.)",
        initial_prompt.chars().count(),
        estimate_tokens(initial_prompt)
    ));
    transcript.box_divider(false);
    transcript.box_line("Streaming Output (real-time)");
    transcript.box_divider(true);
    transcript.write("\n");
}

/// The full prompt on the first iteration, a change summary afterwards
pub(crate) fn write_prompt(
    transcript: &Transcript,
    iteration: usize,
    prompt: &str,
    previous: Option<&str>,
) {
    let chars = prompt.chars().count();
    transcript.write("\n");

    let Some(previous) = previous else {
        transcript.box_header(&format!("Iteration {} Prompt ({} chars)", iteration, chars));
        transcript.line(prompt);
        transcript.box_bottom();
        return;
    };

    let change = PromptChange::between(previous, prompt);
    transcript.box_header(&format!(
        "Iteration {} Prompt ({} chars, {} chars)",
        iteration,
        chars,
        change.delta_label()
    ));
    if change.is_empty() {
        transcript.box_line("[NO CHANGES FROM PREVIOUS ITERATION]");
    } else {
        transcript.box_line("[CHANGES FROM PREVIOUS ITERATION]");
        for line in change.lines.iter().take(MAX_DIFF_LINES) {
            transcript.box_line(line);
        }
        if change.lines.len() > MAX_DIFF_LINES {
            transcript.box_line(&format!(
                "... [{} more diff lines]",
                change.lines.len() - MAX_DIFF_LINES
            ));
        }
        if change.unchanged_chars > 0 {
            transcript.box_line("");
            transcript.box_line(&format!(
                "[UNCHANGED SECTIONS - {} chars omitted, see Iteration 1]",
                change.unchanged_chars
            ));
        }
    }
    transcript.box_bottom();
}

pub(crate) fn write_iteration_summary(
    transcript: &Transcript,
    result: &IterationResult,
    max_iterations: usize,
    command: &str,
    model: Option<&str>,
) {
    transcript.write("\n");
    transcript.box_header(&format!(
        "Iteration {}/{} | Started: {}",
        result.iteration, max_iterations, result.started_at
    ));
    transcript.box_line("Configuration:");
    transcript.box_line(&format!("  CLI: {}", command));
    if let Some(model) = model {
        transcript.box_line(&format!("  Model: {}", model));
    }
    transcript.box_line(&format!(
        "  Prompt size: {} chars ({} tokens est.)",
        result.input_tokens * 4,
        result.input_tokens
    ));
    transcript.box_divider(true);
    let (icon, status) = if result.success {
        ("✅", "Success")
    } else {
        ("❌", "Failed")
    };
    transcript.box_line(&format!(
        "Result: {} {} | Duration: {:.2}s",
        icon, status, result.duration_secs
    ));
    transcript.box_line(&format!(
        "Tokens (estimated): {} in → {} out → {} total",
        result.input_tokens,
        result.output_tokens,
        result.total_tokens()
    ));
    transcript.box_line(&format!("Exit reason: {}", result.exit_reason()));
    transcript.box_bottom();

    if let Some(ref error) = result.error {
        transcript.write("\n❌ ERROR DETAILS:\n");
        transcript.line(error);
    }
}

pub(crate) fn write_run_summary(
    transcript: &Transcript,
    ctx: &LoopContext,
    config: &AgentConfig,
    agent: &str,
) {
    let input = ctx.input_tokens();
    let output = ctx.output_tokens();

    transcript.write("\n\n");
    transcript.box_header("RALPH LOOP RUN SUMMARY");
    transcript.box_line(&format!("Task: {}", preview(&ctx.prompt, TASK_PREVIEW)));
    transcript.box_line(&format!(
        "Start: {} | End: {}",
        ctx.started_wall().format("%Y-%m-%d %H:%M:%S"),
        Local::now().format("%H:%M:%S")
    ));
    transcript.box_line(&format!(
        "Total elapsed: {:.1}s",
        ctx.total_duration().as_secs_f64()
    ));
    transcript.box_line(&format!("Iterations: {}/{}", ctx.iteration, ctx.max_iterations));
    transcript.box_divider(false);
    transcript.box_line("Token Usage (estimated):");
    transcript.box_line(&format!("  Input:  {} tokens", input));
    transcript.box_line(&format!("  Output: {} tokens", output));
    transcript.box_line(&format!("  Total:  {} tokens", input + output));
    transcript.box_divider(false);
    transcript.box_line("Configuration:");
    transcript.box_line(&format!("  CLI: {}", agent));
    if let Some(ref model) = config.model {
        transcript.box_line(&format!("  Model: {}", model));
    }
    if let Some(ref system_prompt) = config.system_prompt {
        transcript.box_line(&format!(
            "  System prompt: {}",
            preview(system_prompt, SYSTEM_PROMPT_PREVIEW)
        ));
    }
    let turns = config
        .max_turns
        .map(|t| t.to_string())
        .unwrap_or_else(|| "-".to_string());
    transcript.box_line(&format!(
        "  Max turns: {} | Timeout: {}",
        turns,
        timeout_label(config)
    ));
    transcript.box_bottom();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_prompt_written_in_full() {
        let transcript = Transcript::in_memory();
        write_prompt(&transcript, 1, "line one\nline two", None);
        let text = transcript.contents();
        assert!(text.contains("Iteration 1 Prompt (17 chars)"));
        assert!(text.contains("line one\nline two\n"));
    }

    #[test]
    fn test_later_prompt_written_as_change_summary() {
        let transcript = Transcript::in_memory();
        let old: String = (0..30).map(|n| format!("old {}\n", n)).collect();
        let new: String = (0..30).map(|n| format!("new {}\n", n)).collect();
        write_prompt(&transcript, 2, &new, Some(&old));
        let text = transcript.contents();
        assert!(text.contains("[CHANGES FROM PREVIOUS ITERATION]"));
        assert!(text.contains("... [40 more diff lines]"));
        assert!(!text.contains("UNCHANGED SECTIONS"));
    }

    #[test]
    fn test_unchanged_prompt() {
        let transcript = Transcript::in_memory();
        write_prompt(&transcript, 3, "same", Some("same"));
        let text = transcript.contents();
        assert!(text.contains("Iteration 3 Prompt (4 chars, +0 chars)"));
        assert!(text.contains("[NO CHANGES FROM PREVIOUS ITERATION]"));
    }

    #[test]
    fn test_preview_is_char_safe() {
        assert_eq!(preview("ééééé", 3), "ééé...");
        assert_eq!(preview("short", 10), "short");
    }
}
