use ralph_logging::{LogEvent, Transcript};
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

use crate::conversation::ConversationState;
use crate::protocol::{self, ContentItem, FinalResult, MessageBody, StreamMessage};
use crate::tools::{self, ToolLedger};

const RESULT_PREVIEW_CHARS: usize = 500;
const RESULT_PREVIEW_LINES: usize = 10;
const UNMATCHED_PREVIEW_CHARS: usize = 200;
const OTHER_PREVIEW_CHARS: usize = 200;

/// Counters over one run's stdout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifierStats {
    pub lines: usize,
    /// Lines that did not decode as protocol messages
    pub opaque_lines: usize,
    pub tool_invocations: usize,
    pub tool_results: usize,
    /// Results whose id matched no open invocation
    pub unmatched_results: usize,
}

/// Turns stdout lines into typed protocol events.
///
/// Updates the conversation state used for hang detection, writes the
/// box-drawn tool sections to the run log, and returns the console events the
/// caller should emit. A line that does not decode is written verbatim and
/// never affects later lines.
pub struct StreamClassifier {
    ledger: ToolLedger,
    state: ConversationState,
    transcript: Option<Arc<Transcript>>,
    stats: ClassifierStats,
    final_result: Option<FinalResult>,
}

impl StreamClassifier {
    pub fn new(transcript: Option<Arc<Transcript>>, now: Instant) -> Self {
        Self {
            ledger: ToolLedger::new(),
            state: ConversationState::new(now),
            transcript,
            stats: ClassifierStats::default(),
            final_result: None,
        }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn stats(&self) -> ClassifierStats {
        self.stats
    }

    pub fn final_result(&self) -> Option<&FinalResult> {
        self.final_result.as_ref()
    }

    pub fn into_parts(self) -> (ConversationState, ClassifierStats, Option<FinalResult>) {
        (self.state, self.stats, self.final_result)
    }

    fn log(&self, text: &str) {
        if let Some(ref transcript) = self.transcript {
            transcript.write(text);
        }
    }

    /// Classify one stdout line received at `now`; `timestamp` is its
    /// wall-clock rendering for the run log.
    pub fn classify(&mut self, line: &str, timestamp: &str, now: Instant) -> Vec<LogEvent> {
        self.stats.lines += 1;

        let messages = match protocol::parse_line(line) {
            Ok(messages) => messages,
            Err(e) => {
                trace!(error = %e, "opaque stdout line");
                self.stats.opaque_lines += 1;
                self.log(&format!("[{}] {}\n", timestamp, line));
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        for message in messages {
            match message {
                StreamMessage::Assistant(body) => {
                    self.state.record_activity(now);
                    self.on_assistant(&body, timestamp, now);
                }
                StreamMessage::User(body) => {
                    self.state.record_activity(now);
                    self.on_user(&body, timestamp, now, &mut events);
                }
                StreamMessage::Result(result) => {
                    self.state.record_activity(now);
                    self.state.record_result();
                    self.on_result(result, timestamp, &mut events);
                }
                StreamMessage::Other { kind } => self.on_other(&kind, line, timestamp),
            }
        }
        events
    }

    fn on_assistant(&mut self, body: &MessageBody, timestamp: &str, now: Instant) {
        let mut has_tool_use = false;
        let mut has_text = false;

        for item in body.items() {
            match item {
                ContentItem::ToolUse { id, name, input } => {
                    has_tool_use = true;
                    self.stats.tool_invocations += 1;
                    self.state.record_tool_use(&id, now);
                    self.ledger.record(&id, &name, &input, now);

                    let pretty = serde_json::to_string_pretty(&input).unwrap_or_default();
                    let mut text = format!(
                        "\n[{}] TOOL INVOKED: {}\n┌─ Input {}\n",
                        timestamp,
                        name,
                        "─".repeat(40)
                    );
                    for json_line in pretty.lines() {
                        text.push_str(&format!("│ {}\n", json_line));
                    }
                    self.log(&text);
                }
                ContentItem::Text { text } => {
                    has_text = true;
                    self.log(&format!("[{}] [TEXT] {}\n", timestamp, text));
                }
                _ => {}
            }
        }

        self.state.record_assistant(has_tool_use, has_text, now);
    }

    fn on_user(
        &mut self,
        body: &MessageBody,
        timestamp: &str,
        now: Instant,
        events: &mut Vec<LogEvent>,
    ) {
        for item in body.items() {
            let ContentItem::ToolResult {
                tool_use_id,
                content,
                is_error,
            } = item
            else {
                continue;
            };

            self.stats.tool_results += 1;
            self.state.record_tool_result(&tool_use_id);
            let text = protocol::result_text(&content);

            match self.ledger.take(&tool_use_id) {
                Some(invocation) => {
                    let elapsed = invocation.elapsed(now).as_secs_f64();
                    self.log(&render_result_box(&text, is_error, elapsed));
                    events.push(LogEvent::ToolCompleted {
                        summary: invocation.summary,
                        result: tools::format_tool_result(
                            &text,
                            is_error,
                            Some(invocation.name.as_str()),
                        ),
                    });
                }
                None => {
                    self.stats.unmatched_results += 1;
                    let head: String = text.chars().take(UNMATCHED_PREVIEW_CHARS).collect();
                    self.log(&format!("[{}] [RESULT] {}\n", timestamp, head));
                    events.push(LogEvent::ToolCompleted {
                        summary: String::new(),
                        result: tools::format_tool_result(&text, is_error, None),
                    });
                }
            }
        }
    }

    fn on_result(&mut self, result: FinalResult, timestamp: &str, events: &mut Vec<LogEvent>) {
        self.log(&format!(
            "[{ts}] [FINAL_RESULT] Status: {}\n[{ts}]   Duration: {}ms\n[{ts}]   Turns: {}\n[{ts}]   Result: {}\n",
            result.subtype,
            result.duration_ms,
            result.num_turns,
            result.result,
            ts = timestamp
        ));
        events.push(LogEvent::AgentResult {
            subtype: result.subtype.clone(),
            duration_ms: result.duration_ms,
            num_turns: result.num_turns,
        });
        self.final_result = Some(result);
    }

    fn on_other(&mut self, kind: &str, line: &str, timestamp: &str) {
        let label = if kind.is_empty() {
            "UNKNOWN".to_string()
        } else {
            kind.to_uppercase()
        };
        if line.chars().count() > OTHER_PREVIEW_CHARS {
            let head: String = line.chars().take(OTHER_PREVIEW_CHARS).collect();
            self.log(&format!("[{}] [{}] {}...\n", timestamp, label, head));
        } else {
            self.log(&format!("[{}] [{}] {}\n", timestamp, label, line));
        }
    }
}

fn render_result_box(text: &str, is_error: bool, elapsed_secs: f64) -> String {
    let total = text.chars().count();
    let preview = if total > RESULT_PREVIEW_CHARS {
        let head: String = text.chars().take(RESULT_PREVIEW_CHARS).collect();
        format!("{}... [{} more chars]", head, total - RESULT_PREVIEW_CHARS)
    } else {
        text.to_string()
    };

    let mut out = format!("├─ Result [+{:.2}s] {}\n", elapsed_secs, "─".repeat(20));
    if is_error {
        out.push_str(&format!("│ ✖ ERROR: {}\n", preview));
    } else {
        let lines: Vec<&str> = preview.split('\n').collect();
        for line in lines.iter().take(RESULT_PREVIEW_LINES) {
            out.push_str(&format!("│ {}\n", line));
        }
        if lines.len() > RESULT_PREVIEW_LINES {
            out.push_str(&format!(
                "│   [... {} more lines ...]\n",
                lines.len() - RESULT_PREVIEW_LINES
            ));
        }
    }
    out.push_str(&format!("└{}┘\n", "─".repeat(44)));
    out
}
