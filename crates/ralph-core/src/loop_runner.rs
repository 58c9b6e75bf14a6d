use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use ralph_agent::{Agent, AgentConfig, AgentError};
use ralph_git::{DiffSummary, GitRepo};
use ralph_logging::{LogEvent, Logger};

use crate::completion::{mentions_commit, signals_completion};
use crate::context::IterationRecord;
use crate::error::LoopError;
use crate::iteration::{estimate_tokens, IterationResult};
use crate::outcome::LoopOutcome;
use crate::report;
use crate::review::{ReviewDecision, Reviewer, REVIEW_LOG_LIMIT};
use crate::LoopContext;

/// A HEAD commit younger than this counts as made by the last iteration
const COMMIT_WINDOW: Duration = Duration::from_secs(30);

/// Drives the agent one iteration at a time until a stop condition
pub struct LoopRunner<'a> {
    agent: &'a dyn Agent,
    config: AgentConfig,
    reviewer: Option<&'a dyn Reviewer>,
    logger: Arc<Logger>,
    interrupted: Arc<AtomicBool>,
}

impl<'a> LoopRunner<'a> {
    /// `config.timeout` is the per-iteration budget
    pub fn new(agent: &'a dyn Agent, config: AgentConfig, logger: Arc<Logger>) -> Self {
        Self {
            agent,
            config,
            reviewer: None,
            logger,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Pause for the operator after every iteration that is not a compaction
    pub fn with_reviewer(mut self, reviewer: &'a dyn Reviewer) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    /// Get a handle to signal interruption
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    fn log_file(&self) -> Option<PathBuf> {
        self.logger
            .transcript()
            .and_then(|t| t.path())
            .map(Path::to_path_buf)
    }

    /// Run the ralph loop until completion
    pub async fn run(&self, mut context: LoopContext) -> Result<LoopOutcome, LoopError> {
        if context.max_iterations == 0 {
            return Err(LoopError::ConfigError(
                "max iterations must be at least 1".to_string(),
            ));
        }
        GitRepo::discover(&context.working_dir)?;

        let agent_name = self.agent.agent_type().to_string();
        let initial_prompt = context.current_prompt();

        self.logger.log(&LogEvent::LoopStarted {
            prompt: context.prompt.clone(),
            working_dir: context.working_dir.clone(),
            agent: agent_name.clone(),
            model: self.config.model.clone(),
            max_iterations: context.max_iterations,
            max_turns: self.config.max_turns,
            timeout_secs: self.config.timeout.map(|t| t.as_secs()).unwrap_or(0),
            total_timeout_secs: context.total_timeout.map(|t| t.as_secs()),
            human_in_the_loop: self.reviewer.is_some(),
            log_file: self.log_file(),
        });
        if let Some(transcript) = self.logger.transcript() {
            report::write_run_header(
                transcript,
                &context,
                &self.config,
                &agent_name,
                &initial_prompt,
            );
        }

        let outcome = loop {
            if self.interrupted.load(Ordering::SeqCst) {
                info!("Loop interrupted by user");
                self.logger.log(&LogEvent::Interrupted {
                    iteration: context.iteration,
                });
                break LoopOutcome::interrupted(
                    context.iteration,
                    context.history.clone(),
                    context.total_duration(),
                );
            }

            if !context.should_continue() {
                self.logger.log(&LogEvent::MaxIterationsReached {
                    iterations: context.iteration,
                });
                break LoopOutcome::max_iterations_reached(
                    context.iteration,
                    context.history.clone(),
                    context.total_duration(),
                );
            }

            if let Some(limit) = context.total_timeout {
                if context.total_timeout_exceeded() {
                    let elapsed = context.total_duration();
                    self.logger.log(&LogEvent::TotalTimeoutReached {
                        elapsed_secs: elapsed.as_secs_f64(),
                        limit_secs: limit.as_secs(),
                    });
                    break LoopOutcome::total_timeout(
                        context.iteration,
                        context.history.clone(),
                        elapsed,
                        limit,
                    );
                }
            }

            if let Some(outcome) = self.run_iteration(&mut context).await? {
                break outcome;
            }
        };

        if let Some(transcript) = self.logger.transcript() {
            report::write_run_summary(transcript, &context, &self.config, &agent_name);
        }
        Ok(outcome)
    }

    /// Run a single iteration.
    /// Returns Some(outcome) if the loop should terminate, None to continue
    async fn run_iteration(
        &self,
        context: &mut LoopContext,
    ) -> Result<Option<LoopOutcome>, LoopError> {
        let iteration = context.iteration + 1;
        let prompt = context.current_prompt();

        self.logger.log(&LogEvent::IterationStarted {
            iteration,
            max_iterations: context.max_iterations,
            prompt_chars: prompt.chars().count(),
            prompt_tokens: estimate_tokens(&prompt),
        });
        let previous = context.replace_prompt(prompt.clone());
        if let Some(transcript) = self.logger.transcript() {
            report::write_prompt(transcript, iteration, &prompt, previous.as_deref());
        }

        // The per-iteration budget never outlives the total budget
        let mut config = self.config.clone();
        if let Some(left) = context.remaining_budget() {
            config.timeout = Some(config.timeout.map_or(left, |t| t.min(left)));
        }

        debug!(iteration, timeout = ?config.timeout, "Running agent");
        let started = Instant::now();
        let result = match self
            .agent
            .execute(&prompt, &config, Some(self.logger.clone()))
            .await
        {
            Ok(run) => IterationResult::from_run(&run, &prompt, iteration, config.timeout),
            Err(AgentError::ConfigError(msg)) => {
                return Err(AgentError::ConfigError(msg).into());
            }
            Err(e) => {
                warn!(iteration, error = %e, "Agent could not be run");
                IterationResult::from_launch_failure(
                    &self.agent.agent_type().to_string(),
                    &e,
                    &prompt,
                    iteration,
                    started.elapsed(),
                )
            }
        };
        context.increment_iteration();

        if let Some(transcript) = self.logger.transcript() {
            let command = self.agent.command("[prompt]", &config).display();
            report::write_iteration_summary(
                transcript,
                &result,
                context.max_iterations,
                &command,
                config.model.as_deref(),
            );
        }
        self.logger.log(&LogEvent::IterationCompleted {
            iteration,
            success: result.success,
            exit_reason: result.exit_reason().to_string(),
            duration_secs: result.duration_secs,
            input_tokens: result.input_tokens,
            output_tokens: result.output_tokens,
        });

        let changes = self.capture_changes(&context.working_dir, iteration);
        let complete = result.success && signals_completion(&result.output);
        let committed =
            result.success && !complete && self.detect_commit(&context.working_dir, &result.output);
        context.push_record(IterationRecord::from_result(
            &result,
            changes.files_changed,
            committed,
        ));

        let next = if result.compaction_detected {
            self.logger.log(&LogEvent::CompactionDetected { iteration });
            Ok(None)
        } else if !result.success {
            self.logger.log(&LogEvent::IterationFailed {
                iteration,
                error: result.error.clone(),
                log_file: self.log_file(),
            });
            self.review(context)
        } else {
            if let Some(transcript) = self.logger.transcript() {
                transcript.write(&format!("\n✅ Iteration {} completed successfully\n", iteration));
            }
            if complete {
                self.logger.log(&LogEvent::TaskComplete { iteration });
                Ok(Some(LoopOutcome::success(
                    iteration,
                    context.history.clone(),
                    context.total_duration(),
                )))
            } else {
                if committed {
                    self.logger.log(&LogEvent::CommitDetected { iteration });
                }
                self.review(context)
            }
        };

        context.last_result = Some(result);
        next
    }

    fn capture_changes(&self, working_dir: &Path, iteration: usize) -> DiffSummary {
        let summary = GitRepo::discover(working_dir)
            .and_then(|repo| repo.diff_summary())
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to capture git changes");
                DiffSummary::default()
            });

        self.logger.log(&LogEvent::GitChangesCaptured {
            iteration,
            files_changed: summary.files_changed,
            insertions: summary.insertions,
            deletions: summary.deletions,
        });
        summary
    }

    fn detect_commit(&self, working_dir: &Path, output: &str) -> bool {
        if mentions_commit(output) {
            return true;
        }
        GitRepo::discover(working_dir)
            .and_then(|repo| repo.committed_within(COMMIT_WINDOW))
            .unwrap_or_else(|e| {
                debug!(error = %e, "Commit check failed");
                false
            })
    }

    /// Ask the operator how to proceed; no-op without a reviewer
    fn review(&self, context: &LoopContext) -> Result<Option<LoopOutcome>, LoopError> {
        let Some(reviewer) = self.reviewer else {
            return Ok(None);
        };

        loop {
            if self.interrupted.load(Ordering::SeqCst) {
                return Ok(None);
            }

            let decision = match reviewer.choose(context.iteration) {
                Ok(decision) => decision,
                Err(LoopError::Interrupted) => {
                    self.interrupted.store(true, Ordering::SeqCst);
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };

            match decision {
                ReviewDecision::Continue => return Ok(None),
                ReviewDecision::Stop => {
                    self.logger.log(&LogEvent::StoppedByOperator {
                        iteration: context.iteration,
                    });
                    return Ok(Some(LoopOutcome::stopped(
                        context.iteration,
                        context.history.clone(),
                        context.total_duration(),
                    )));
                }
                ReviewDecision::ShowStatus => {
                    match GitRepo::discover(&context.working_dir).and_then(|repo| repo.status()) {
                        Ok(status) => reviewer.show_status(&status),
                        Err(e) => warn!(error = %e, "Failed to read git status"),
                    }
                }
                ReviewDecision::ShowLog => {
                    match GitRepo::discover(&context.working_dir)
                        .and_then(|repo| repo.recent_commits(REVIEW_LOG_LIMIT))
                    {
                        Ok(commits) => reviewer.show_log(&commits),
                        Err(e) => warn!(error = %e, "Failed to read git log"),
                    }
                }
            }
        }
    }
}
