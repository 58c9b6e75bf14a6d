use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{Agent, AgentConfig, AgentType, CommandSpec, StreamProtocol};

/// Codex agent implementation
///
/// Codex prints free-form text, so runs are supervised for timeout and
/// compaction only.
pub struct CodexAgent {
    binary_path: PathBuf,
}

impl CodexAgent {
    pub fn new() -> Self {
        Self {
            binary_path: PathBuf::from("codex"),
        }
    }

    pub fn with_binary_path(path: PathBuf) -> Self {
        Self { binary_path: path }
    }
}

impl Default for CodexAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for CodexAgent {
    fn name(&self) -> &str {
        "Codex"
    }

    fn agent_type(&self) -> AgentType {
        AgentType::Codex
    }

    fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    fn protocol(&self) -> StreamProtocol {
        StreamProtocol::PlainText
    }

    fn command(&self, prompt: &str, config: &AgentConfig) -> CommandSpec {
        debug!(
            agent = self.name(),
            prompt_len = prompt.len(),
            "Building agent command"
        );

        if config.model.is_some() || config.max_turns.is_some() || config.system_prompt.is_some() {
            warn!("model, max turns and system prompt are ignored by codex");
        }

        // `exec` is the non-interactive subcommand
        let args = vec![
            "exec".to_string(),
            "-s".to_string(),
            "danger-full-access".to_string(),
            prompt.to_string(),
        ];

        CommandSpec {
            program: self.binary_path.clone(),
            args,
            working_dir: config.working_dir.clone(),
            env: config.process_env(),
            protocol: self.protocol(),
            prompt_chars: prompt.chars().count(),
        }
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.binary_path)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let spec = CodexAgent::new().command("Fix the bug", &AgentConfig::new(PathBuf::from(".")));
        assert_eq!(spec.program, PathBuf::from("codex"));
        assert_eq!(spec.args, vec!["exec", "-s", "danger-full-access", "Fix the bug"]);
        assert_eq!(spec.protocol, StreamProtocol::PlainText);
    }
}
