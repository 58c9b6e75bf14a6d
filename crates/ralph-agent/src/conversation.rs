//! Phase-aware hang detection over the protocol stream.
//!
//! A single text-only assistant message mid-conversation is ordinary
//! narration ("Now let me run the tests"), not a sign the agent is done. The
//! detector therefore only applies its short completion timeout once work has
//! happened, nothing is pending, and at least two text-only messages arrived
//! back to back. Every other phase waits much longer, and a pending tool call
//! or an observed `result` event disables the verdict entirely.
//!
//! All methods take the current [`Instant`] explicitly so the state machine
//! can be driven deterministically.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Text-only messages in a row that mark the completion phase
const COMPLETION_TEXT_RUN: u32 = 2;

/// Inactivity limits for each phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HangThresholds {
    /// Silence tolerated once the agent looks finished
    pub completion_timeout: Duration,
    /// Silence tolerated before the first tool call, and as the fallback
    pub initialization_timeout: Duration,
    /// A tool invoked within this window keeps an ambiguous phase active
    pub recent_tool_window: Duration,
}

impl Default for HangThresholds {
    fn default() -> Self {
        Self {
            completion_timeout: Duration::from_secs(20),
            initialization_timeout: Duration::from_secs(90),
            recent_tool_window: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HangPhase {
    /// No tool has been invoked yet
    Initialization,
    /// At least one tool call is waiting for its result
    ActiveWork,
    /// Work happened, nothing pending, two or more text-only messages in a row
    Completion,
    /// Work happened, nothing pending, not clearly finished
    Ambiguous,
    /// The terminal `result` event was seen
    Finished,
}

impl std::fmt::Display for HangPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HangPhase::Initialization => "initialization",
            HangPhase::ActiveWork => "active-work",
            HangPhase::Completion => "completion",
            HangPhase::Ambiguous => "ambiguous",
            HangPhase::Finished => "finished",
        };
        write!(f, "{}", name)
    }
}

/// Snapshot of the conversation for logs and results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub tool_invocations: usize,
    pub pending_tools: usize,
    pub consecutive_text_only: u32,
    pub saw_result: bool,
}

/// Conversation bookkeeping for one agent run.
///
/// Owned by the supervisor task; only the stdout classifier mutates it.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pending: HashSet<String>,
    tool_invocations: usize,
    last_tool_at: Option<Instant>,
    last_activity_at: Instant,
    last_text_only_at: Option<Instant>,
    consecutive_text_only: u32,
    saw_result: bool,
}

impl ConversationState {
    pub fn new(now: Instant) -> Self {
        Self {
            pending: HashSet::new(),
            tool_invocations: 0,
            last_tool_at: None,
            last_activity_at: now,
            last_text_only_at: None,
            consecutive_text_only: 0,
            saw_result: false,
        }
    }

    /// Any recognized protocol message
    pub fn record_activity(&mut self, now: Instant) {
        self.last_activity_at = now;
    }

    /// A `tool_use` item. Calls without an id are not tracked as pending.
    pub fn record_tool_use(&mut self, id: &str, now: Instant) {
        if id.is_empty() {
            return;
        }
        self.pending.insert(id.to_string());
        self.tool_invocations += 1;
        self.last_tool_at = Some(now);
    }

    /// A `tool_result` item. Returns false for ids that were not pending.
    pub fn record_tool_result(&mut self, id: &str) -> bool {
        self.pending.remove(id)
    }

    /// Close out one assistant message after its items were recorded.
    pub fn record_assistant(&mut self, has_tool_use: bool, has_text: bool, now: Instant) {
        if has_tool_use {
            self.consecutive_text_only = 0;
        } else if has_text {
            self.consecutive_text_only += 1;
            self.last_text_only_at = Some(now);
        }
    }

    pub fn record_result(&mut self) {
        self.saw_result = true;
    }

    pub fn has_done_work(&self) -> bool {
        self.tool_invocations > 0
    }

    pub fn pending_tools(&self) -> usize {
        self.pending.len()
    }

    pub fn tool_invocations(&self) -> usize {
        self.tool_invocations
    }

    pub fn consecutive_text_only(&self) -> u32 {
        self.consecutive_text_only
    }

    pub fn saw_result(&self) -> bool {
        self.saw_result
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity_at)
    }

    pub fn phase(&self, now: Instant, thresholds: &HangThresholds) -> HangPhase {
        if self.saw_result {
            HangPhase::Finished
        } else if !self.has_done_work() {
            HangPhase::Initialization
        } else if !self.pending.is_empty() {
            HangPhase::ActiveWork
        } else if self.last_text_only_at.is_some()
            && self.consecutive_text_only >= COMPLETION_TEXT_RUN
        {
            HangPhase::Completion
        } else if self
            .last_tool_at
            .is_some_and(|at| now.saturating_duration_since(at) < thresholds.recent_tool_window)
        {
            HangPhase::ActiveWork
        } else {
            HangPhase::Ambiguous
        }
    }

    /// Whether the run should be treated as hung at `now`.
    pub fn is_hung(&self, now: Instant, thresholds: &HangThresholds) -> bool {
        let idle = self.idle_for(now);
        match self.phase(now, thresholds) {
            HangPhase::Finished | HangPhase::ActiveWork => false,
            HangPhase::Completion => idle > thresholds.completion_timeout,
            HangPhase::Initialization | HangPhase::Ambiguous => {
                idle > thresholds.initialization_timeout
            }
        }
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            tool_invocations: self.tool_invocations,
            pending_tools: self.pending.len(),
            consecutive_text_only: self.consecutive_text_only,
            saw_result: self.saw_result,
        }
    }
}
