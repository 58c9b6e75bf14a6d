use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::{Agent, AgentConfig, AgentType, CommandSpec, StreamProtocol};

/// Claude Code agent implementation
pub struct ClaudeCodeAgent {
    binary_path: PathBuf,
}

impl ClaudeCodeAgent {
    pub fn new() -> Self {
        Self {
            binary_path: PathBuf::from("claude"),
        }
    }

    pub fn with_binary_path(path: PathBuf) -> Self {
        Self { binary_path: path }
    }
}

impl Default for ClaudeCodeAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for ClaudeCodeAgent {
    fn name(&self) -> &str {
        "Claude Code"
    }

    fn agent_type(&self) -> AgentType {
        AgentType::ClaudeCode
    }

    fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    fn protocol(&self) -> StreamProtocol {
        StreamProtocol::JsonLines
    }

    fn command(&self, prompt: &str, config: &AgentConfig) -> CommandSpec {
        debug!(
            agent = self.name(),
            prompt_len = prompt.len(),
            "Building agent command"
        );

        let mut args: Vec<String> = vec![
            "--print".into(),                        // Non-interactive mode
            "--dangerously-skip-permissions".into(), // Skip permission prompts
        ];

        if let Some(max_turns) = config.max_turns {
            args.push("--max-turns".into());
            args.push(max_turns.to_string());
        }

        if let Some(ref model) = config.model {
            args.push("--model".into());
            args.push(model.clone());
        }

        args.extend(
            ["--output-format", "stream-json", "--verbose"]
                .iter()
                .map(|s| s.to_string()),
        );

        if let Some(ref system_prompt) = config.system_prompt {
            args.push("--system-prompt".into());
            args.push(system_prompt.clone());
        }

        args.push("-p".into());
        args.push(prompt.to_string());

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
        let config = AgentConfig::new(PathBuf::from("/tmp/project"))
            .with_model("opus".into())
            .with_max_turns(50)
            .with_system_prompt("be brief".into());
        let spec = ClaudeCodeAgent::new().command("Fix the bug", &config);

        assert_eq!(spec.program, PathBuf::from("claude"));
        assert_eq!(
            spec.args,
            vec![
                "--print",
                "--dangerously-skip-permissions",
                "--max-turns",
                "50",
                "--model",
                "opus",
                "--output-format",
                "stream-json",
                "--verbose",
                "--system-prompt",
                "be brief",
                "-p",
                "Fix the bug",
            ]
        );
        assert_eq!(spec.protocol, StreamProtocol::JsonLines);
        assert_eq!(spec.prompt_chars, 11);
        assert_eq!(spec.env[0], ("CLAUDE_CODE_YOLO".to_string(), "1".to_string()));
    }

    #[test]
    fn test_optional_flags_are_omitted() {
        let spec = ClaudeCodeAgent::new().command("x", &AgentConfig::new(PathBuf::from(".")));
        assert!(!spec.args.iter().any(|a| a == "--model" || a == "--max-turns"));
    }
}
