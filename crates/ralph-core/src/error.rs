use thiserror::Error;

use crate::TemplateError;

#[derive(Error, Debug)]
pub enum LoopError {
    #[error("Agent error: {0}")]
    AgentError(#[from] ralph_agent::AgentError),

    #[error("Git error: {0}")]
    GitError(#[from] ralph_git::GitError),

    #[error("Prompt template error: {0}")]
    TemplateError(#[from] TemplateError),

    #[error("Loop was interrupted")]
    Interrupted,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}
