//! Project configuration file support for ralph.
//!
//! Loads `ralph.toml` from the working directory and merges it with the
//! command line: flag > file > built-in default.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ralph_agent::{AgentType, SupervisorSettings};

/// The config file name
pub const CONFIG_FILE_NAME: &str = "ralph.toml";

pub const DEFAULT_MAX_ITERATIONS: usize = 10;
pub const DEFAULT_MAX_TURNS: u32 = 50;
pub const DEFAULT_MODEL: &str = "opus";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Project-level configuration loaded from `ralph.toml`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// `claude` or `codex`
    pub agent: Option<String>,
    pub model: Option<String>,
    pub max_iterations: Option<usize>,
    pub max_turns: Option<u32>,
    /// Per-iteration limit, e.g. `"10m"`
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// Limit for the whole run
    #[serde(default, with = "humantime_serde")]
    pub timeout_total: Option<Duration>,
    pub human_in_the_loop: Option<bool>,
    /// Relative paths resolve against the working directory
    pub outer_prompt: Option<PathBuf>,
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub detector: DetectorConfig,
}

/// Hang detection and process supervision knobs
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DetectorConfig {
    #[serde(default, with = "humantime_serde")]
    pub completion_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub initialization_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub recent_tool_window: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub heartbeat_interval: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub kill_grace: Option<Duration>,
}

impl DetectorConfig {
    /// Overlay the configured values on `base`
    pub fn apply(&self, base: SupervisorSettings) -> SupervisorSettings {
        let mut settings = base;
        if let Some(d) = self.completion_timeout {
            settings.hang.completion_timeout = d;
        }
        if let Some(d) = self.initialization_timeout {
            settings.hang.initialization_timeout = d;
        }
        if let Some(d) = self.recent_tool_window {
            settings.hang.recent_tool_window = d;
        }
        if let Some(d) = self.heartbeat_interval {
            settings.heartbeat_interval = d;
        }
        if let Some(d) = self.kill_grace {
            settings.kill_grace = d;
        }
        settings
    }
}

impl ProjectConfig {
    /// Load configuration from the working directory.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if file exists and parses successfully
    /// - `Ok(None)` if file does not exist
    /// - `Err(...)` if file exists but fails to parse (hard error)
    pub fn load(working_dir: &Path) -> Result<Option<Self>> {
        let config_path = working_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(Some(config))
    }
}

/// Values given on the command line; `None` means "not given"
#[derive(Debug, Default)]
pub struct Overrides {
    pub agent: Option<AgentType>,
    pub model: Option<String>,
    pub max_iterations: Option<usize>,
    pub max_turns: Option<u32>,
    pub timeout: Option<Duration>,
    pub timeout_total: Option<Duration>,
    pub human_in_the_loop: bool,
    pub outer_prompt: Option<PathBuf>,
    pub system_prompt: Option<String>,
}

/// Fully resolved settings for one run
#[derive(Debug)]
pub struct RunSettings {
    pub agent: AgentType,
    /// Only set for agents that take a model
    pub model: Option<String>,
    pub max_iterations: usize,
    /// Only set for agents that take a turn limit
    pub max_turns: Option<u32>,
    pub timeout: Duration,
    pub timeout_total: Option<Duration>,
    pub human_in_the_loop: bool,
    /// Explicit template; `None` means the installed default
    pub outer_prompt: Option<PathBuf>,
    pub system_prompt: Option<String>,
    pub supervision: SupervisorSettings,
}

impl RunSettings {
    pub fn resolve(cli: Overrides, file: &ProjectConfig, working_dir: &Path) -> Result<Self> {
        let agent = match (cli.agent, file.agent.as_deref()) {
            (Some(agent), _) => agent,
            (None, Some(name)) => name
                .parse::<AgentType>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("Invalid agent in {}", CONFIG_FILE_NAME))?,
            (None, None) => AgentType::default(),
        };
        let takes_model = agent == AgentType::ClaudeCode;

        let model = takes_model.then(|| {
            cli.model
                .or_else(|| file.model.clone())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string())
        });
        let max_turns = takes_model.then(|| {
            cli.max_turns
                .or(file.max_turns)
                .unwrap_or(DEFAULT_MAX_TURNS)
        });

        let outer_prompt = cli
            .outer_prompt
            .or_else(|| file.outer_prompt.as_ref().map(|p| working_dir.join(p)));

        Ok(Self {
            agent,
            model,
            max_iterations: cli
                .max_iterations
                .or(file.max_iterations)
                .unwrap_or(DEFAULT_MAX_ITERATIONS),
            max_turns,
            timeout: cli.timeout.or(file.timeout).unwrap_or(DEFAULT_TIMEOUT),
            timeout_total: cli.timeout_total.or(file.timeout_total),
            human_in_the_loop: cli.human_in_the_loop || file.human_in_the_loop.unwrap_or(false),
            outer_prompt,
            system_prompt: if takes_model {
                cli.system_prompt.or_else(|| file.system_prompt.clone())
            } else {
                None
            },
            supervision: file.detector.apply(SupervisorSettings::default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ProjectConfig {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProjectConfig::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_load_with_durations() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
agent = "claude"
model = "sonnet"
max_iterations = 25
timeout = "15m"
timeout_total = "2h"

[detector]
completion_timeout = "45s"
kill_grace = "2s"
"#,
        )
        .unwrap();

        let config = ProjectConfig::load(dir.path()).unwrap().unwrap();
        assert_eq!(config.max_iterations, Some(25));
        assert_eq!(config.timeout, Some(Duration::from_secs(900)));
        assert_eq!(config.timeout_total, Some(Duration::from_secs(7200)));
        assert_eq!(
            config.detector.completion_timeout,
            Some(Duration::from_secs(45))
        );
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "max_iteration = 3\n").unwrap();
        assert!(ProjectConfig::load(dir.path()).is_err());
    }

    #[test]
    fn test_defaults() {
        let settings =
            RunSettings::resolve(Overrides::default(), &ProjectConfig::default(), Path::new("."))
                .unwrap();
        assert_eq!(settings.agent, AgentType::ClaudeCode);
        assert_eq!(settings.model.as_deref(), Some("opus"));
        assert_eq!(settings.max_iterations, 10);
        assert_eq!(settings.max_turns, Some(50));
        assert_eq!(settings.timeout, Duration::from_secs(600));
        assert!(settings.timeout_total.is_none());
        assert!(!settings.human_in_the_loop);
        assert_eq!(settings.supervision, SupervisorSettings::default());
    }

    #[test]
    fn test_flags_beat_file() {
        let file = parse(
            r#"
model = "sonnet"
max_iterations = 40
timeout = "20m"
human_in_the_loop = true
outer_prompt = "prompts/outer.md"
"#,
        );
        let cli = Overrides {
            model: Some("haiku".into()),
            timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let settings = RunSettings::resolve(cli, &file, Path::new("/work")).unwrap();
        assert_eq!(settings.model.as_deref(), Some("haiku"));
        assert_eq!(settings.max_iterations, 40);
        assert_eq!(settings.timeout, Duration::from_secs(60));
        assert!(settings.human_in_the_loop);
        assert_eq!(
            settings.outer_prompt,
            Some(PathBuf::from("/work/prompts/outer.md"))
        );
    }

    #[test]
    fn test_codex_drops_claude_only_settings() {
        let file = parse("agent = \"codex\"\nmodel = \"sonnet\"\nsystem_prompt = \"Be brief\"\n");
        let settings = RunSettings::resolve(Overrides::default(), &file, Path::new(".")).unwrap();
        assert_eq!(settings.agent, AgentType::Codex);
        assert!(settings.model.is_none());
        assert!(settings.max_turns.is_none());
        assert!(settings.system_prompt.is_none());
    }

    #[test]
    fn test_invalid_agent_name() {
        let file = parse("agent = \"cursor\"\n");
        assert!(RunSettings::resolve(Overrides::default(), &file, Path::new(".")).is_err());
    }

    #[test]
    fn test_detector_overlay() {
        let file = parse("[detector]\ninitialization_timeout = \"2m\"\nheartbeat_interval = \"10s\"\n");
        let settings = RunSettings::resolve(Overrides::default(), &file, Path::new(".")).unwrap();
        assert_eq!(
            settings.supervision.hang.initialization_timeout,
            Duration::from_secs(120)
        );
        assert_eq!(settings.supervision.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(
            settings.supervision.hang.completion_timeout,
            SupervisorSettings::default().hang.completion_timeout
        );
    }
}
