use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;

use ralph_agent::{create_agent, AgentConfig, AgentType};
use ralph_core::{estimate_tokens, LoopContext, LoopOutcome, LoopRunner, PromptTemplate};
use ralph_git::GitRepo;
use ralph_logging::{init_tracing, LogFormat, Logger, Transcript};

mod config;
mod init;
mod review;

use config::{Overrides, ProjectConfig, RunSettings};
use review::TerminalReviewer;

/// File the agent keeps its progress notes in
const PROGRESS_FILE: &str = "progress.md";

#[derive(Parser, Debug)]
#[command(
    name = "ralph",
    about = "Ralph Loop: run a coding agent repeatedly until the task is done",
    version,
    after_help = "Examples:\n  \
        ralph \"Fix all type errors\" -n 15\n  \
        ralph -f prompt.md -n 20\n  \
        ralph \"Implement auth\" -n 20 --max-turns 20 --human-in-the-loop\n  \
        ralph \"Run tests\" -n 5 --model haiku\n  \
        ralph \"Build feature\" --agent codex --timeout 900"
)]
struct Cli {
    /// The task prompt to feed to the agent
    prompt: Option<String>,

    /// Read the prompt from a file
    #[arg(short = 'f', long)]
    prompt_file: Option<PathBuf>,

    /// Maximum number of iterations (default: 10)
    #[arg(short = 'n', long)]
    max_iterations: Option<usize>,

    /// Maximum turns per iteration, claude only (default: 50)
    #[arg(long)]
    max_turns: Option<u32>,

    /// Model to use, claude only (default: opus)
    #[arg(short, long)]
    model: Option<String>,

    /// Which agent CLI to run (default: claude)
    #[arg(short, long, value_enum)]
    agent: Option<AgentChoice>,

    /// Timeout in seconds for each iteration (default: 600)
    #[arg(long)]
    timeout: Option<u64>,

    /// Timeout in seconds for the whole run; exits with code 2 when reached
    #[arg(long)]
    timeout_total: Option<u64>,

    /// Pause after each iteration for human review
    #[arg(long)]
    human_in_the_loop: bool,

    /// Path to the run log (default: /tmp/ralph_<dir>_<timestamp>_iteration.log)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Outer prompt template (default: ~/.ralph/prompts/outer-prompt-default.md)
    #[arg(long)]
    outer_prompt: Option<PathBuf>,

    /// Use the concise bundled outer prompt
    #[arg(long, conflicts_with = "outer_prompt")]
    concise: bool,

    /// System prompt to pass to the agent, claude only
    #[arg(long)]
    system_prompt: Option<String>,

    /// Install default prompts to ~/.ralph/prompts/ for customization
    #[arg(long)]
    init: bool,

    /// Console output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormatChoice,

    /// Diagnostic log level (RUST_LOG overrides)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Working directory (default: current directory)
    #[arg(short = 'd', long)]
    working_dir: Option<PathBuf>,

    /// Show the resolved configuration and first prompt without running
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AgentChoice {
    Claude,
    Codex,
}

impl From<AgentChoice> for AgentType {
    fn from(choice: AgentChoice) -> Self {
        match choice {
            AgentChoice::Claude => AgentType::ClaudeCode,
            AgentChoice::Codex => AgentType::Codex,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "❌ Error:".bright_red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    if cli.init {
        init::handle_init()?;
        return Ok(0);
    }

    let log_format: LogFormat = cli.log_format.into();
    init_tracing(&cli.log_level, log_format);

    let working_dir = match cli.working_dir {
        Some(ref dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let prompt = get_prompt(&cli)?;

    let file_config = ProjectConfig::load(&working_dir)?.unwrap_or_default();
    let settings = RunSettings::resolve(overrides(&cli), &file_config, &working_dir)?;
    tracing::debug!(?settings, "resolved run settings");

    let template_path = match settings.outer_prompt {
        Some(ref path) => path.clone(),
        None if cli.concise => init::installed_prompt(init::CONCISE_PROMPT)?,
        None => init::installed_prompt(init::DEFAULT_PROMPT)?,
    };
    let template = PromptTemplate::load(&template_path)?;

    if !ralph_git::is_repository(&working_dir) {
        anyhow::bail!("Not in a git repository: {}", working_dir.display());
    }

    let mut context = LoopContext::new(prompt, working_dir.clone(), template)
        .with_max_iterations(settings.max_iterations);
    if let Some(total) = settings.timeout_total {
        context = context.with_total_timeout(total);
    }

    if cli.dry_run {
        print_dry_run(&settings, &context, &template_path);
        return Ok(0);
    }

    let agent = create_agent(settings.agent);
    if !agent.is_available().await {
        eprintln!(
            "{} Agent '{}' was not found at {}; iterations will fail until it is installed.",
            "⚠".bright_yellow(),
            agent.name(),
            agent.binary_path().display()
        );
    }

    let log_path = cli
        .log_file
        .clone()
        .unwrap_or_else(|| Transcript::default_path(&working_dir));
    let transcript = Arc::new(
        Transcript::create(&log_path)
            .with_context(|| format!("Failed to create log file {}", log_path.display()))?,
    );
    let logger = Arc::new(Logger::new(log_format).with_transcript(transcript));

    let mut agent_config = AgentConfig::new(working_dir.clone())
        .with_timeout(settings.timeout)
        .with_supervision(settings.supervision);
    if let Some(ref model) = settings.model {
        agent_config = agent_config.with_model(model.clone());
    }
    if let Some(turns) = settings.max_turns {
        agent_config = agent_config.with_max_turns(turns);
    }
    if let Some(ref system_prompt) = settings.system_prompt {
        agent_config = agent_config.with_system_prompt(system_prompt.clone());
    }

    let reviewer = TerminalReviewer;
    let mut runner = LoopRunner::new(agent.as_ref(), agent_config, logger);
    if settings.human_in_the_loop {
        runner = runner.with_reviewer(&reviewer);
    }

    // Handle Ctrl+C gracefully
    let interrupt_handle = runner.interrupt_handle();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Finishing current iteration...");
        interrupt_handle.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let result = runner.run(context).await;

    // The log path is reported on every exit path once the log exists
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("\n📄 Log file: {}", log_path.display());
            return Err(e.into());
        }
    };

    print_final_summary(&outcome, settings.max_iterations, &working_dir);
    eprintln!("\n📄 Log file: {}", log_path.display());

    Ok(outcome.exit_code())
}

fn overrides(cli: &Cli) -> Overrides {
    Overrides {
        agent: cli.agent.map(Into::into),
        model: cli.model.clone(),
        max_iterations: cli.max_iterations,
        max_turns: cli.max_turns,
        timeout: cli.timeout.map(Duration::from_secs),
        timeout_total: cli.timeout_total.map(Duration::from_secs),
        human_in_the_loop: cli.human_in_the_loop,
        outer_prompt: cli.outer_prompt.clone(),
        system_prompt: cli.system_prompt.clone(),
    }
}

fn get_prompt(cli: &Cli) -> Result<String> {
    if let Some(ref path) = cli.prompt_file {
        if !path.exists() {
            anyhow::bail!("Prompt file not found: {}", path.display());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Error reading prompt file {}", path.display()))?;
        return Ok(content.trim().to_string());
    }

    match cli.prompt {
        Some(ref prompt) if !prompt.trim().is_empty() => Ok(prompt.clone()),
        _ => anyhow::bail!("Either provide a prompt argument or use --prompt-file/-f"),
    }
}

fn print_dry_run(settings: &RunSettings, context: &LoopContext, template_path: &Path) {
    let separator = "=".repeat(60);
    let first_prompt = context.current_prompt();

    println!("=== Dry Run ===");
    println!("Working dir: {}", context.working_dir.display());
    println!("Agent: {}", settings.agent);
    if let Some(ref model) = settings.model {
        println!("Model: {}", model);
    }
    println!("Max iterations: {}", settings.max_iterations);
    if let Some(turns) = settings.max_turns {
        println!("Max turns per iteration: {}", turns);
    }
    println!("Timeout per iteration: {} seconds", settings.timeout.as_secs());
    match settings.timeout_total {
        Some(total) => println!("Total timeout: {} seconds", total.as_secs()),
        None => println!("Total timeout: none"),
    }
    println!("Human-in-the-loop: {}", settings.human_in_the_loop);
    if let Some(ref system_prompt) = settings.system_prompt {
        println!("System prompt: {}", system_prompt);
    }
    println!("Outer prompt: {}", template_path.display());
    println!(
        "Initial prompt size: {} tokens (estimated)",
        estimate_tokens(&first_prompt)
    );
    println!();
    println!("{}", separator);
    println!("INITIAL WRAPPED PROMPT");
    println!("{}", separator);
    println!("{}", first_prompt);
    println!("{}", separator);
}

fn print_final_summary(outcome: &LoopOutcome, max_iterations: usize, working_dir: &Path) {
    let input = outcome.input_tokens();
    let output = outcome.output_tokens();

    eprintln!();
    match outcome {
        LoopOutcome::Success { .. } => eprintln!("{}", "=== SUCCESS ===".bright_green().bold()),
        LoopOutcome::MaxIterationsReached { .. } => {
            eprintln!("{}", "=== INCOMPLETE ===".bright_yellow().bold())
        }
        LoopOutcome::StoppedByOperator { .. } => eprintln!("{}", "=== STOPPED ===".bold()),
        LoopOutcome::Interrupted { .. } => {
            eprintln!("{}", "=== INTERRUPTED ===".bright_yellow().bold())
        }
        LoopOutcome::TotalTimeout { limit_secs, .. } => eprintln!(
            "{} (limit {}s)",
            "=== TOTAL TIMEOUT ===".bright_red().bold(),
            limit_secs
        ),
    }
    eprintln!(
        "⏱️  Total time: {:.1}s",
        outcome.total_duration_secs()
    );
    eprintln!(
        "🔢 Iterations completed: {}/{}",
        outcome.iterations(),
        max_iterations
    );
    eprintln!();
    eprintln!("📊 Total token usage (estimated):");
    eprintln!("   Input:  {} tokens", input);
    eprintln!("   Output: {} tokens", output);
    eprintln!("   Total:  {} tokens", input + output);

    eprintln!();
    eprintln!("📊 Final git status:");
    match GitRepo::discover(working_dir).and_then(|repo| repo.status()) {
        Ok(status) if status.is_clean() => eprintln!("   {}", "Working tree clean".dimmed()),
        Ok(status) => {
            for line in status.short() {
                eprintln!("   {}", line);
            }
        }
        Err(e) => eprintln!("   {}", format!("unavailable: {}", e).dimmed()),
    }

    let progress = working_dir.join(PROGRESS_FILE);
    if let Ok(text) = std::fs::read_to_string(&progress) {
        eprintln!();
        eprintln!("📝 Current {}:", PROGRESS_FILE);
        eprintln!("{}", "-".repeat(60));
        eprintln!("{}", text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_full_flag_set() {
        let cli = Cli::try_parse_from([
            "ralph",
            "Fix all type errors",
            "-n",
            "15",
            "--max-turns",
            "20",
            "--agent",
            "codex",
            "--timeout",
            "900",
            "--timeout-total",
            "3600",
            "--human-in-the-loop",
            "--concise",
        ])
        .unwrap();

        assert_eq!(cli.prompt.as_deref(), Some("Fix all type errors"));
        let o = overrides(&cli);
        assert_eq!(o.max_iterations, Some(15));
        assert_eq!(o.max_turns, Some(20));
        assert_eq!(o.agent, Some(AgentType::Codex));
        assert_eq!(o.timeout, Some(Duration::from_secs(900)));
        assert_eq!(o.timeout_total, Some(Duration::from_secs(3600)));
        assert!(o.human_in_the_loop);
        assert!(cli.concise);
    }

    #[test]
    fn test_concise_conflicts_with_outer_prompt() {
        assert!(Cli::try_parse_from(["ralph", "x", "--concise", "--outer-prompt", "a.md"]).is_err());
    }

    #[test]
    fn test_prompt_file_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.md");
        std::fs::write(&path, "\n  Build the parser  \n\n").unwrap();

        let cli = Cli::try_parse_from(["ralph", "-f", path.to_str().unwrap()]).unwrap();
        assert_eq!(get_prompt(&cli).unwrap(), "Build the parser");
    }

    #[test]
    fn test_missing_prompt_is_an_error() {
        let cli = Cli::try_parse_from(["ralph"]).unwrap();
        let err = get_prompt(&cli).unwrap_err();
        assert!(err.to_string().contains("--prompt-file"));

        let cli = Cli::try_parse_from(["ralph", "-f", "/nonexistent/prompt.md"]).unwrap();
        assert!(get_prompt(&cli)
            .unwrap_err()
            .to_string()
            .contains("Prompt file not found"));
    }
}
