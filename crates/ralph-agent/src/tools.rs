//! Tool invocation summaries, result formatting and the per-iteration ledger
//! that pairs each tool call with its result.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use crate::protocol::{self, ContentItem, StreamMessage};

const BASH_CMD_PREVIEW: usize = 60;
const BASH_OUTPUT_PREVIEW: usize = 64;
const PATTERN_PREVIEW: usize = 50;
const ERROR_PREVIEW: usize = 200;
const LARGE_RESULT: usize = 1000;

const TRUNCATE_TOOL_INPUT: usize = 1024;
const TRUNCATE_TOOL_RESULT: usize = 1024;
const TRUNCATE_ERROR_MSG: usize = 512;

pub const DEFAULT_TOOL_EMOJI: &str = "🔧";

lazy_static! {
    /// `Exit code: 1`, `exit code 127`, ...
    static ref EXIT_CODE: Regex = Regex::new(r"(?i)Exit code[:\s]+(\d+)").unwrap();
    static ref ERROR_TAG: Regex = Regex::new(r"(?s)<error>(.*?)</error>").unwrap();
}

pub fn tool_emoji(tool_name: &str) -> &'static str {
    match tool_name {
        "Read" => "📖",
        "Edit" => "✏️",
        "Write" => "📝",
        "Bash" => "⚡",
        "Glob" => "🔍",
        "Grep" => "🔎",
        "Task" => "🤖",
        "WebFetch" => "🌐",
        "WebSearch" => "🔍",
        "AskUserQuestion" => "❓",
        "TodoWrite" => "📋",
        _ => DEFAULT_TOOL_EMOJI,
    }
}

/// Truncate `text` to `max` characters and append `indicator`.
///
/// With `smart`, the cut moves back to the last space inside the limit so
/// words are not split.
pub fn truncate_text(text: &str, max: usize, smart: bool, indicator: &str) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }

    let head: String = text.chars().take(max).collect();
    let cut = match head.rfind(' ') {
        Some(idx) if smart => &head[..idx],
        _ => head.as_str(),
    };
    format!("{}{}", cut, indicator)
}

fn preview(text: &str, max: usize) -> String {
    truncate_text(text, max, true, "...")
}

fn str_field<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// One-line console summary for a tool invocation, e.g. `⚡ Bash: cargo test`.
pub fn build_tool_summary(tool_name: &str, input: &Value) -> String {
    let mut summary = format!("{} {}", tool_emoji(tool_name), tool_name);

    let detail = match tool_name {
        "Read" => str_field(input, "file_path").map(|path| {
            let offset = input.get("offset").and_then(Value::as_u64).filter(|n| *n > 0);
            let limit = input.get("limit").and_then(Value::as_u64).filter(|n| *n > 0);
            if offset.is_some() || limit.is_some() {
                let start = offset.unwrap_or(1);
                let end = start + limit.unwrap_or(100);
                format!("{} (lines {}-{})", path, start, end)
            } else {
                path.to_string()
            }
        }),
        "Edit" | "Write" => str_field(input, "file_path").map(str::to_string),
        "Bash" => str_field(input, "command").map(|cmd| preview(cmd, BASH_CMD_PREVIEW)),
        "Glob" => str_field(input, "pattern").map(str::to_string),
        "Grep" => str_field(input, "pattern").map(|p| preview(p, PATTERN_PREVIEW)),
        "Task" => str_field(input, "description").map(|d| preview(d, PATTERN_PREVIEW)),
        "TodoWrite" => input
            .get("todos")
            .and_then(Value::as_array)
            .filter(|todos| !todos.is_empty())
            .map(|todos| {
                // Keep first-seen order of statuses
                let mut order: Vec<String> = Vec::new();
                let mut counts: HashMap<String, usize> = HashMap::new();
                for todo in todos {
                    let status = todo
                        .get("status")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string();
                    if !counts.contains_key(&status) {
                        order.push(status.clone());
                    }
                    *counts.entry(status).or_default() += 1;
                }
                let breakdown: Vec<String> = order
                    .iter()
                    .map(|status| format!("{} {}", counts[status], status))
                    .collect();
                format!("{} tasks ({})", todos.len(), breakdown.join(", "))
            }),
        _ => None,
    };

    if let Some(detail) = detail {
        summary.push_str(": ");
        summary.push_str(&detail);
    }
    summary
}

/// Exit code reported in a shell tool result.
pub fn bash_exit_code(result: &str) -> Option<i32> {
    EXIT_CODE
        .captures(result)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Split a shell tool result into its exit code and the output before the
/// `Exit code` line.
pub fn parse_bash_result(result: &str) -> (i32, String) {
    let exit_code = bash_exit_code(result).unwrap_or(0);
    let output: Vec<&str> = result
        .lines()
        .take_while(|line| !line.to_lowercase().contains("exit code"))
        .collect();
    (exit_code, output.join("\n").trim().to_string())
}

/// Text inside the first `<error>...</error>` tag.
pub fn error_message(result: &str) -> Option<String> {
    ERROR_TAG
        .captures(result)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Whether a tool result represents a failure
pub fn result_failed(tool_name: Option<&str>, result: &str, is_error: bool) -> bool {
    if is_error || ERROR_TAG.is_match(result) {
        return true;
    }
    tool_name == Some("Bash") && bash_exit_code(result).is_some_and(|code| code != 0)
}

/// Console line describing a tool result.
pub fn format_tool_result(result: &str, is_error: bool, tool_name: Option<&str>) -> String {
    if is_error || ERROR_TAG.is_match(result) {
        let message = error_message(result).unwrap_or_else(|| result.to_string());
        return format!("  ✗ Error: {}", preview(&message, ERROR_PREVIEW));
    }

    if tool_name == Some("Bash") {
        let (exit_code, output) = parse_bash_result(result);
        let icon = if exit_code != 0 { "✗" } else { "✓" };
        return if output.is_empty() {
            format!("  {} Exit {}", icon, exit_code)
        } else {
            format!(
                "  {} Exit {}: {}",
                icon,
                exit_code,
                preview(&output, BASH_OUTPUT_PREVIEW)
            )
        };
    }

    let len = result.chars().count();
    if len > LARGE_RESULT {
        format!("  ✓ Completed ({} chars)", len)
    } else {
        "  ✓ Completed".to_string()
    }
}

/// A tool call waiting for its result
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub name: String,
    pub summary: String,
    pub invoked_at: Instant,
}

impl ToolInvocation {
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.invoked_at)
    }
}

/// Tool calls of the current iteration that have not been paired with a result.
///
/// Entries are removed when their result is taken, so each call is reported
/// at most once.
#[derive(Debug, Default)]
pub struct ToolLedger {
    open: HashMap<String, ToolInvocation>,
}

impl ToolLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: &str, name: &str, input: &Value, now: Instant) {
        self.open.insert(
            id.to_string(),
            ToolInvocation {
                name: name.to_string(),
                summary: build_tool_summary(name, input),
                invoked_at: now,
            },
        );
    }

    pub fn take(&mut self, id: &str) -> Option<ToolInvocation> {
        self.open.remove(id)
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

/// One tool call reconstructed from a captured stdout stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseRecord {
    pub name: String,
    pub input: String,
    pub result: String,
    pub has_error: bool,
    pub return_code: Option<i32>,
    pub error_message: String,
}

fn truncate_with_count(text: &str, max: usize) -> String {
    let len = text.chars().count();
    if len <= max {
        return text.to_string();
    }
    truncate_text(
        text,
        max,
        false,
        &format!("\n... [truncated, {} more chars]", len - max),
    )
}

/// Re-parse a full stdout capture into the tool calls it contains, in
/// invocation order. Lines that do not decode are skipped.
pub fn parse_tool_uses(output: &str) -> Vec<ToolUseRecord> {
    let mut records: Vec<ToolUseRecord> = Vec::new();
    let mut by_id: BTreeMap<String, usize> = BTreeMap::new();

    for line in output.lines() {
        let Ok(messages) = protocol::parse_line(line) else {
            continue;
        };

        for message in messages {
            match message {
                StreamMessage::Assistant(body) => {
                    for item in body.items() {
                        if let ContentItem::ToolUse { id, name, input } = item {
                            let pretty = serde_json::to_string_pretty(&input).unwrap_or_default();
                            by_id.insert(id, records.len());
                            records.push(ToolUseRecord {
                                name,
                                input: truncate_with_count(&pretty, TRUNCATE_TOOL_INPUT),
                                result: String::new(),
                                has_error: false,
                                return_code: None,
                                error_message: String::new(),
                            });
                        }
                    }
                }
                StreamMessage::User(body) => {
                    for item in body.items() {
                        let ContentItem::ToolResult {
                            tool_use_id,
                            content,
                            is_error,
                        } = item
                        else {
                            continue;
                        };
                        let Some(&idx) = by_id.get(&tool_use_id) else {
                            continue;
                        };
                        let record = &mut records[idx];
                        let text = protocol::result_text(&content);

                        if is_error {
                            record.has_error = true;
                        }
                        if let Some(message) = error_message(&text) {
                            record.has_error = true;
                            record.error_message = preview(&message, TRUNCATE_ERROR_MSG);
                        }
                        if record.name == "Bash" {
                            if let Some(code) = bash_exit_code(&text) {
                                record.return_code = Some(code);
                                if code != 0 {
                                    record.has_error = true;
                                }
                            }
                        }
                        record.result = truncate_with_count(&text, TRUNCATE_TOOL_RESULT);
                    }
                }
                _ => {}
            }
        }
    }

    records
}
