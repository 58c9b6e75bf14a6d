//! # ralph-core
//!
//! The ralph control loop: run the agent, classify what happened, turn it
//! into feedback for the next prompt, and decide whether to go on.
//!
//! Nothing but the previous iteration's feedback crosses iterations in
//! memory. Progress lives in the working tree and its git history, which
//! the agent manages itself.
//!
//! ## Key Types
//!
//! - [`LoopRunner`] - The iteration state machine
//! - [`LoopContext`] - Task, template, limits and history
//! - [`IterationResult`] - What one iteration produced
//! - [`LoopOutcome`] - How the run ended, with its exit code
//! - [`Reviewer`] - Human-in-the-loop pauses

mod completion;
mod context;
mod error;
mod feedback;
mod iteration;
mod loop_runner;
mod outcome;
mod prompt_diff;
mod report;
mod review;
mod template;

pub use completion::{mentions_commit, signals_completion, COMPLETION_GLYPH, COMPLETION_MARKER};
pub use context::{IterationRecord, LoopContext};
pub use error::LoopError;
pub use feedback::{build_feedback, NO_FEEDBACK, SUCCESS_ACK};
pub use iteration::{estimate_tokens, mentions_max_turns, ExitReason, IterationResult};
pub use loop_runner::LoopRunner;
pub use outcome::LoopOutcome;
pub use prompt_diff::PromptChange;
pub use review::{ReviewDecision, Reviewer, REVIEW_LOG_LIMIT};
pub use template::{PromptTemplate, TemplateError};
