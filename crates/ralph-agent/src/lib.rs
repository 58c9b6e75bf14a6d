//! # ralph-agent
//!
//! Agent CLI backends and the supervisor that runs them.
//!
//! ## Key Types
//!
//! - [`Agent`] - A coding-agent CLI that can run one prompt
//! - [`Supervisor`] - Launches a process, streams and classifies its output,
//!   and terminates it on timeout, compaction or hang
//! - [`StreamClassifier`] - Turns `stream-json` lines into typed events
//! - [`ConversationState`] - Phase-aware hang detection
//! - [`SupervisedRun`] - Everything captured from one process

mod claude;
mod classifier;
mod codex;
mod compaction;
mod conversation;
mod output;
pub mod protocol;
mod reader;
mod supervisor;
pub mod tools;
mod traits;

pub use claude::ClaudeCodeAgent;
pub use classifier::{ClassifierStats, StreamClassifier};
pub use codex::CodexAgent;
pub use compaction::{detect_compaction, COMPACTION_PATTERNS};
pub use conversation::{ConversationState, ConversationSummary, HangPhase, HangThresholds};
pub use output::{SupervisedRun, Termination, TimestampedLine};
pub use reader::{spawn_line_reader, StreamEvent, StreamKind};
pub use supervisor::{CommandSpec, StreamProtocol, Supervisor, SupervisorSettings};
pub use tools::{parse_tool_uses, ToolUseRecord};
pub use traits::{Agent, AgentConfig, AgentError, AgentType, UNATTENDED_ENV};

/// Create an agent by type
pub fn create_agent(agent_type: AgentType) -> Box<dyn Agent> {
    match agent_type {
        AgentType::ClaudeCode => Box::new(ClaudeCodeAgent::new()),
        AgentType::Codex => Box::new(CodexAgent::new()),
    }
}
