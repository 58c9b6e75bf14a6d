use async_trait::async_trait;
use ralph_logging::Logger;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::{CommandSpec, StreamProtocol, SupervisedRun, Supervisor, SupervisorSettings};

/// Set for every agent process so the CLI runs without interactive prompts
pub const UNATTENDED_ENV: (&str, &str) = ("CLAUDE_CODE_YOLO", "1");

/// Errors that can occur during agent execution
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("{0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("Agent not found at path: {0}")]
    NotFound(String),

    #[error("Agent configuration error: {0}")]
    ConfigError(String),

    #[error("Agent execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Agent output stream error: {0}")]
    Stream(String),
}

/// Configuration for agent execution
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Working directory for the agent
    pub working_dir: PathBuf,
    /// Wall-clock limit for one run (None = no limit)
    pub timeout: Option<Duration>,
    /// Additional environment variables
    pub env_vars: BTreeMap<String, String>,
    /// Model to use (if agent supports it)
    pub model: Option<String>,
    /// Turn limit per run (if agent supports it)
    pub max_turns: Option<u32>,
    /// Replacement system prompt (if agent supports it)
    pub system_prompt: Option<String>,
    pub supervision: SupervisorSettings,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            timeout: None,
            env_vars: BTreeMap::new(),
            model: None,
            max_turns: None,
            system_prompt: None,
            supervision: SupervisorSettings::default(),
        }
    }
}

impl AgentConfig {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: String) -> Self {
        self.system_prompt = Some(system_prompt);
        self
    }

    pub fn with_supervision(mut self, supervision: SupervisorSettings) -> Self {
        self.supervision = supervision;
        self
    }

    pub fn with_env(mut self, key: String, value: String) -> Self {
        self.env_vars.insert(key, value);
        self
    }

    /// The unattended-mode variable followed by the configured extras
    pub fn process_env(&self) -> Vec<(String, String)> {
        let mut env = vec![(UNATTENDED_ENV.0.to_string(), UNATTENDED_ENV.1.to_string())];
        env.extend(
            self.env_vars
                .iter()
                .filter(|(key, _)| key.as_str() != UNATTENDED_ENV.0)
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        env
    }
}

/// Supported agent types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AgentType {
    #[default]
    ClaudeCode,
    Codex,
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentType::ClaudeCode => write!(f, "claude"),
            AgentType::Codex => write!(f, "codex"),
        }
    }
}

impl std::str::FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" | "claude-code" | "claudecode" => Ok(AgentType::ClaudeCode),
            "codex" => Ok(AgentType::Codex),
            _ => Err(format!("Unknown agent type: {}", s)),
        }
    }
}

/// The core abstraction for coding agents
#[async_trait]
pub trait Agent: Send + Sync {
    /// Human-readable name of the agent (e.g., "Claude Code", "Codex")
    fn name(&self) -> &str;

    /// The agent type
    fn agent_type(&self) -> AgentType;

    /// Get the path to the agent binary
    fn binary_path(&self) -> &Path;

    /// What the agent writes on stdout
    fn protocol(&self) -> StreamProtocol;

    /// The command line that runs `prompt` non-interactively
    fn command(&self, prompt: &str, config: &AgentConfig) -> CommandSpec;

    /// Check if the agent CLI is available on the system
    async fn is_available(&self) -> bool;

    /// Run `prompt` once under supervision.
    ///
    /// Console events and the run log go through `logger` when given.
    async fn execute(
        &self,
        prompt: &str,
        config: &AgentConfig,
        logger: Option<Arc<Logger>>,
    ) -> Result<SupervisedRun, AgentError> {
        let spec = self.command(prompt, config);
        let mut supervisor = Supervisor::new(config.supervision);
        if let Some(logger) = logger {
            supervisor = supervisor.with_logger(logger);
        }
        supervisor.run(&spec, config.timeout).await
    }
}
