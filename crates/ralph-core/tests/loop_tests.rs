use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use ralph_agent::{
    Agent, AgentConfig, AgentError, AgentType, CommandSpec, ConversationSummary, StreamProtocol,
    SupervisedRun, Termination,
};
use ralph_core::{
    LoopContext, LoopError, LoopOutcome, LoopRunner, PromptTemplate, ReviewDecision, Reviewer,
};
use ralph_git::{CommitInfo, GitStatus};
use ralph_logging::{LogFormat, Logger, Transcript};

const TEMPLATE: &str = "Iteration {iteration_num}\nTask: {user_prompt}{feedback}\n";

/// Replays canned runs and remembers what it was asked to do
struct ScriptedAgent {
    runs: Mutex<VecDeque<Result<SupervisedRun, AgentError>>>,
    prompts: Mutex<Vec<String>>,
    timeouts: Mutex<Vec<Option<Duration>>>,
    binary: PathBuf,
}

impl ScriptedAgent {
    fn new(runs: Vec<Result<SupervisedRun, AgentError>>) -> Self {
        Self {
            runs: Mutex::new(runs.into()),
            prompts: Mutex::new(Vec::new()),
            timeouts: Mutex::new(Vec::new()),
            binary: PathBuf::from("scripted"),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn agent_type(&self) -> AgentType {
        AgentType::ClaudeCode
    }

    fn binary_path(&self) -> &Path {
        &self.binary
    }

    fn protocol(&self) -> StreamProtocol {
        StreamProtocol::JsonLines
    }

    fn command(&self, prompt: &str, config: &AgentConfig) -> CommandSpec {
        CommandSpec {
            program: self.binary.clone(),
            args: vec!["-p".into(), prompt.into()],
            working_dir: config.working_dir.clone(),
            env: config.process_env(),
            protocol: StreamProtocol::JsonLines,
            prompt_chars: prompt.chars().count(),
        }
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        prompt: &str,
        config: &AgentConfig,
        _logger: Option<Arc<Logger>>,
    ) -> Result<SupervisedRun, AgentError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.timeouts.lock().unwrap().push(config.timeout);
        self.runs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(run(0, Termination::Exited, "idle", "")))
    }
}

/// Answers review pauses from a script; `Continue` once the script runs out
struct ScriptedReviewer {
    decisions: Mutex<VecDeque<Result<ReviewDecision, LoopError>>>,
    asked: Mutex<Vec<usize>>,
    statuses: Mutex<usize>,
    logs: Mutex<Vec<usize>>,
}

impl ScriptedReviewer {
    fn new(decisions: Vec<Result<ReviewDecision, LoopError>>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into()),
            asked: Mutex::new(Vec::new()),
            statuses: Mutex::new(0),
            logs: Mutex::new(Vec::new()),
        }
    }
}

impl Reviewer for ScriptedReviewer {
    fn choose(&self, iteration: usize) -> Result<ReviewDecision, LoopError> {
        self.asked.lock().unwrap().push(iteration);
        self.decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ReviewDecision::Continue))
    }

    fn show_status(&self, _status: &GitStatus) {
        *self.statuses.lock().unwrap() += 1;
    }

    fn show_log(&self, commits: &[CommitInfo]) {
        self.logs.lock().unwrap().push(commits.len());
    }
}

fn run(exit_code: i32, termination: Termination, stdout: &str, stderr: &str) -> SupervisedRun {
    SupervisedRun {
        exit_code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        lines: Vec::new(),
        termination,
        duration: Duration::from_millis(1200),
        started_at: "2024-05-01 10:00:00".to_string(),
        final_result: None,
        conversation: ConversationSummary::default(),
    }
}

fn ok(stdout: &str) -> Result<SupervisedRun, AgentError> {
    Ok(run(0, Termination::Exited, stdout, ""))
}

fn repo() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    git2::Repository::init(dir.path()).unwrap();
    dir
}

fn logger() -> (Arc<Logger>, Arc<Transcript>) {
    let transcript = Arc::new(Transcript::in_memory());
    let logger = Logger::new(LogFormat::Compact)
        .quiet()
        .with_transcript(transcript.clone());
    (Arc::new(logger), transcript)
}

fn context(dir: &TempDir, max_iterations: usize) -> LoopContext {
    LoopContext::new(
        "Make the tests pass".into(),
        dir.path().to_path_buf(),
        PromptTemplate::from_text(TEMPLATE),
    )
    .with_max_iterations(max_iterations)
}

fn config(dir: &TempDir) -> AgentConfig {
    AgentConfig::new(dir.path().to_path_buf()).with_timeout(Duration::from_secs(600))
}

#[tokio::test]
async fn test_completion_signal_stops_the_loop() {
    let dir = repo();
    let agent = ScriptedAgent::new(vec![
        ok("working on it"),
        ok("All tasks done. RALPH_LOOP_COMPLETE 🎯"),
    ]);
    let (logger, transcript) = logger();
    let runner = LoopRunner::new(&agent, config(&dir), logger);

    let outcome = runner.run(context(&dir, 10)).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.iterations(), 2);
    assert_eq!(outcome.exit_code(), 0);

    let prompts = agent.prompts();
    assert_eq!(prompts[0], "Iteration 1\nTask: Make the tests pass\n");
    assert!(prompts[1].starts_with("Iteration 2\n"));
    assert!(prompts[1].contains("FEEDBACK FROM PREVIOUS ITERATION:"));
    assert!(prompts[1].contains("✅ Previous iteration completed successfully."));

    let log = transcript.contents();
    assert!(log.contains("RALPH LOOP EXECUTION"));
    assert!(log.contains("Iteration 1 Prompt ("));
    assert!(log.contains("[CHANGES FROM PREVIOUS ITERATION]"));
    assert!(log.contains("Iteration 2/10 | Started: 2024-05-01 10:00:00"));
    assert!(log.contains("Exit reason: Natural completion"));
    assert!(log.contains("TASK COMPLETE - Agent emitted completion signal"));
    assert!(log.contains("RALPH LOOP RUN SUMMARY"));
    assert!(log.contains("Iterations: 2/10"));
}

#[tokio::test]
async fn test_marker_without_glyph_keeps_going() {
    let dir = repo();
    let agent = ScriptedAgent::new(vec![
        ok("I will print RALPH_LOOP_COMPLETE when finished"),
        ok("still RALPH_LOOP_COMPLETE pending"),
    ]);
    let (logger, _) = logger();
    let runner = LoopRunner::new(&agent, config(&dir), logger);

    let outcome = runner.run(context(&dir, 2)).await.unwrap();

    assert!(matches!(outcome, LoopOutcome::MaxIterationsReached { iterations: 2, .. }));
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(agent.prompts().len(), 2);
}

#[tokio::test]
async fn test_compaction_continues_without_review() {
    let dir = repo();
    let agent = ScriptedAgent::new(vec![
        Ok(run(0, Termination::Compaction, "context window is nearly full", "")),
        ok("RALPH_LOOP_COMPLETE 🎯"),
    ]);
    let reviewer = ScriptedReviewer::new(vec![]);
    let (logger, transcript) = logger();
    let runner = LoopRunner::new(&agent, config(&dir), logger).with_reviewer(&reviewer);

    let outcome = runner.run(context(&dir, 5)).await.unwrap();

    assert!(outcome.is_success());
    assert!(reviewer.asked.lock().unwrap().is_empty());
    assert!(agent.prompts()[1].contains("PREVIOUS ITERATION DETECTED CONVERSATION COMPACTION"));

    let history = outcome.history();
    assert!(!history[0].success);
    assert_eq!(history[0].exit_reason, ralph_core::ExitReason::Compaction);

    let log = transcript.contents();
    assert!(log.contains("COMPACTION DETECTED"));
    assert!(log.contains("Exit reason: Compaction detected"));
}

#[tokio::test]
async fn test_failure_feeds_error_into_next_prompt() {
    let dir = repo();
    let agent = ScriptedAgent::new(vec![
        Ok(run(1, Termination::Exited, "", "API Error: overloaded")),
        Err(AgentError::SpawnFailed(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "No such file or directory (os error 2)",
        ))),
        ok("done"),
    ]);
    let (logger, transcript) = logger();
    let runner = LoopRunner::new(&agent, config(&dir), logger);

    let outcome = runner.run(context(&dir, 3)).await.unwrap();
    assert!(matches!(outcome, LoopOutcome::MaxIterationsReached { .. }));

    let prompts = agent.prompts();
    assert!(prompts[1].contains("PREVIOUS ITERATION ENCOUNTERED AN ERROR"));
    assert!(prompts[1].contains("Error: API Error: overloaded"));
    assert!(prompts[2].contains("Error: Failed to run claude: No such file or directory"));

    let log = transcript.contents();
    assert!(log.contains("❌ Iteration 1 failed"));
    assert!(log.contains("❌ ERROR DETAILS:"));
    assert!(log.contains("Exit reason: Error"));
}

#[tokio::test]
async fn test_timeout_feedback() {
    let dir = repo();
    let agent = ScriptedAgent::new(vec![Ok(run(-1, Termination::TimedOut, "partial", ""))]);
    let (logger, _) = logger();
    let runner = LoopRunner::new(&agent, config(&dir), logger);

    runner.run(context(&dir, 2)).await.unwrap();

    let prompts = agent.prompts();
    assert!(prompts[1].contains("PREVIOUS ITERATION TIMED OUT"));
    assert!(!prompts[1].contains("ENCOUNTERED AN ERROR"));
}

#[tokio::test]
async fn test_operator_can_inspect_then_stop() {
    let dir = repo();
    let agent = ScriptedAgent::new(vec![ok("first"), ok("second")]);
    let reviewer = ScriptedReviewer::new(vec![
        Ok(ReviewDecision::ShowStatus),
        Ok(ReviewDecision::ShowLog),
        Ok(ReviewDecision::Continue),
        Ok(ReviewDecision::Stop),
    ]);
    let (logger, transcript) = logger();
    let runner = LoopRunner::new(&agent, config(&dir), logger).with_reviewer(&reviewer);

    let outcome = runner.run(context(&dir, 10)).await.unwrap();

    assert!(matches!(outcome, LoopOutcome::StoppedByOperator { iterations: 2, .. }));
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(*reviewer.asked.lock().unwrap(), vec![1, 1, 1, 2]);
    assert_eq!(*reviewer.statuses.lock().unwrap(), 1);
    assert_eq!(*reviewer.logs.lock().unwrap(), vec![0]);
    assert!(transcript.contents().contains("Stopping loop at user request"));
}

#[tokio::test]
async fn test_failed_iteration_pauses_for_review() {
    let dir = repo();
    let agent = ScriptedAgent::new(vec![Ok(run(2, Termination::Exited, "", "bad"))]);
    let reviewer = ScriptedReviewer::new(vec![Ok(ReviewDecision::Stop)]);
    let (logger, _) = logger();
    let runner = LoopRunner::new(&agent, config(&dir), logger).with_reviewer(&reviewer);

    let outcome = runner.run(context(&dir, 10)).await.unwrap();
    assert!(matches!(outcome, LoopOutcome::StoppedByOperator { iterations: 1, .. }));
}

#[tokio::test]
async fn test_interrupted_review_ends_the_run() {
    let dir = repo();
    let agent = ScriptedAgent::new(vec![ok("first")]);
    let reviewer = ScriptedReviewer::new(vec![Err(LoopError::Interrupted)]);
    let (logger, _) = logger();
    let runner = LoopRunner::new(&agent, config(&dir), logger).with_reviewer(&reviewer);

    let outcome = runner.run(context(&dir, 10)).await.unwrap();
    assert!(matches!(outcome, LoopOutcome::Interrupted { iterations: 1, .. }));
    assert_eq!(outcome.exit_code(), 130);
}

#[tokio::test]
async fn test_interrupt_before_first_iteration() {
    let dir = repo();
    let agent = ScriptedAgent::new(vec![]);
    let (logger, _) = logger();
    let runner = LoopRunner::new(&agent, config(&dir), logger);
    runner.interrupt_handle().store(true, Ordering::SeqCst);

    let outcome = runner.run(context(&dir, 10)).await.unwrap();
    assert!(matches!(outcome, LoopOutcome::Interrupted { iterations: 0, .. }));
    assert!(agent.prompts().is_empty());
}

#[tokio::test]
async fn test_total_timeout_is_a_distinct_exit() {
    let dir = repo();
    let agent = ScriptedAgent::new(vec![]);
    let (logger, transcript) = logger();
    let runner = LoopRunner::new(&agent, config(&dir), logger);

    let ctx = context(&dir, 10).with_total_timeout(Duration::ZERO);
    let outcome = runner.run(ctx).await.unwrap();

    assert!(matches!(outcome, LoopOutcome::TotalTimeout { iterations: 0, .. }));
    assert_eq!(outcome.exit_code(), 2);
    assert!(transcript.contents().contains("TOTAL TIMEOUT REACHED"));
}

#[tokio::test]
async fn test_total_budget_caps_iteration_timeout() {
    let dir = repo();
    let agent = ScriptedAgent::new(vec![ok("one"), ok("two")]);
    let (logger, _) = logger();
    let runner = LoopRunner::new(&agent, config(&dir), logger);

    let ctx = context(&dir, 1).with_total_timeout(Duration::from_secs(100));
    runner.run(ctx).await.unwrap();

    let timeouts = agent.timeouts.lock().unwrap().clone();
    let first = timeouts[0].unwrap();
    assert!(first <= Duration::from_secs(100));
    assert!(first > Duration::from_secs(90));
}

#[tokio::test]
async fn test_commit_mention_is_reported() {
    let dir = repo();
    let agent = ScriptedAgent::new(vec![ok("⚡ Bash: git commit -m 'feat: parser'")]);
    let (logger, transcript) = logger();
    let runner = LoopRunner::new(&agent, config(&dir), logger);

    let outcome = runner.run(context(&dir, 1)).await.unwrap();
    assert!(outcome.history()[0].committed);
    assert!(transcript.contents().contains("Commit detected"));
}

#[tokio::test]
async fn test_tokens_are_accumulated() {
    let dir = repo();
    let agent = ScriptedAgent::new(vec![ok(&"x".repeat(400)), ok(&"y".repeat(40))]);
    let (logger, _) = logger();
    let runner = LoopRunner::new(&agent, config(&dir), logger);

    let outcome = runner.run(context(&dir, 2)).await.unwrap();
    assert_eq!(outcome.output_tokens(), 110);
    assert!(outcome.input_tokens() > 0);
}

#[tokio::test]
async fn test_requires_git_repository() {
    let dir = tempfile::tempdir().unwrap();
    let agent = ScriptedAgent::new(vec![]);
    let (logger, _) = logger();
    let runner = LoopRunner::new(&agent, config(&dir), logger);

    let err = runner.run(context(&dir, 3)).await.unwrap_err();
    assert!(matches!(err, LoopError::GitError(_)));
    assert!(agent.prompts().is_empty());
}

#[tokio::test]
async fn test_zero_iterations_is_a_config_error() {
    let dir = repo();
    let agent = ScriptedAgent::new(vec![]);
    let (logger, _) = logger();
    let runner = LoopRunner::new(&agent, config(&dir), logger);

    let err = runner.run(context(&dir, 0)).await.unwrap_err();
    assert!(matches!(err, LoopError::ConfigError(_)));
}
