//! Lifecycle of one agent process.
//!
//! The supervisor launches the child with piped output, runs one reader task
//! per stream plus a heartbeat task, and owns everything else itself: the
//! readers only forward lines over a channel, so the classifier and the
//! conversation state have a single writer. A short poll tick checks, in
//! order, for a compaction phrase, natural exit, a hang verdict and the
//! wall-clock deadline. Every early exit terminates the child (SIGTERM, then
//! SIGKILL after a grace period) and keeps whatever output was buffered.

use chrono::Local;
use ralph_logging::{timestamp_seconds, EventLog, Logger, Transcript};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::classifier::StreamClassifier;
use crate::compaction::detect_compaction;
use crate::conversation::{HangPhase, HangThresholds};
use crate::output::{SupervisedRun, Termination, TimestampedLine};
use crate::reader::{spawn_line_reader, StreamEvent, StreamKind};
use crate::AgentError;

const COMMAND_PREVIEW: usize = 60;

/// Timing knobs for supervising one process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// How often exit, hang, compaction and deadline are checked
    pub poll_interval: Duration,
    /// Interval between HEARTBEAT lines in the run log
    pub heartbeat_interval: Duration,
    /// How long to wait for reader tasks after the process is gone
    pub join_timeout: Duration,
    /// Time between SIGTERM and SIGKILL
    pub kill_grace: Duration,
    pub hang: HangThresholds,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            heartbeat_interval: Duration::from_secs(30),
            join_timeout: Duration::from_secs(2),
            kill_grace: Duration::from_secs(5),
            hang: HangThresholds::default(),
        }
    }
}

/// What the child writes on stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProtocol {
    /// `stream-json` lines; enables hang detection
    JsonLines,
    /// Free-form text
    PlainText,
}

/// A fully resolved command line
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
    pub protocol: StreamProtocol,
    /// Size of the prompt passed in `args`, for the log header
    pub prompt_chars: usize,
}

impl CommandSpec {
    /// The command line as one string, shortened for display
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        let full = parts.join(" ");
        if full.chars().count() > COMMAND_PREVIEW {
            let head: String = full.chars().take(COMMAND_PREVIEW).collect();
            format!("{}...", head)
        } else {
            full
        }
    }
}

/// Accumulates everything the readers send
struct Collector {
    classifier: StreamClassifier,
    stdout: Vec<String>,
    stderr: Vec<String>,
    lines: Vec<TimestampedLine>,
    compaction: Option<&'static str>,
}

impl Collector {
    fn accept(&mut self, event: StreamEvent, events: Option<&EventLog>, logger: Option<&Logger>) {
        match event {
            StreamEvent::Line {
                stream,
                at,
                received,
                line,
            } => {
                if self.compaction.is_none() {
                    if let Some(pattern) = detect_compaction(&line) {
                        info!(%stream, pattern, "compaction signal");
                        self.compaction = Some(pattern);
                        if let Some(events) = events {
                            events.event(
                                "COMPACTION_DETECTED",
                                &format!("Detected compaction signal: {}", pattern),
                                &[("stream", stream.to_string())],
                            );
                        }
                    }
                }

                match stream {
                    StreamKind::Stdout => {
                        let stamp = at.format("%Y-%m-%d %H:%M:%S%.3f").to_string();
                        for console in self.classifier.classify(&line, &stamp, received) {
                            if let Some(logger) = logger {
                                logger.log(&console);
                            }
                        }
                        self.stdout.push(line.clone());
                        self.lines.push(TimestampedLine { at: stamp, line });
                    }
                    StreamKind::Stderr => self.stderr.push(line),
                }
            }
            StreamEvent::Failed { stream, error } => {
                if let Some(events) = events {
                    events.event(
                        "STREAM_READ_ERROR",
                        &format!("Error reading {}: {}", stream, error),
                        &[],
                    );
                }
            }
        }
    }
}

/// Runs agent processes under supervision
pub struct Supervisor {
    settings: SupervisorSettings,
    logger: Option<Arc<Logger>>,
}

impl Supervisor {
    pub fn new(settings: SupervisorSettings) -> Self {
        Self {
            settings,
            logger: None,
        }
    }

    /// Route console events and run-log output through `logger`
    pub fn with_logger(mut self, logger: Arc<Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    fn transcript(&self) -> Option<Arc<Transcript>> {
        self.logger.as_ref().and_then(|l| l.transcript().cloned())
    }

    /// Launch `spec` and supervise it until it exits or is terminated.
    ///
    /// `timeout` of `None` means no wall-clock limit. Only a failure to
    /// launch is an `Err`; every other outcome is described by the returned
    /// [`SupervisedRun`].
    pub async fn run(
        &self,
        spec: &CommandSpec,
        timeout: Option<Duration>,
    ) -> Result<SupervisedRun, AgentError> {
        let transcript = self.transcript();
        let events = transcript.clone().map(EventLog::start);
        let started = Instant::now();
        let started_at = timestamp_seconds();

        if let Some(ref transcript) = transcript {
            write_command_box(transcript, spec, timeout);
        }

        debug!(
            program = %spec.program.display(),
            args = ?spec.args,
            working_dir = %spec.working_dir.display(),
            "Spawning agent process"
        );

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        // Own process group, so termination also reaches tool subprocesses
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            if let Some(ref events) = events {
                events.event("ERROR", &format!("Failed to launch: {}", e), &[]);
            }
            AgentError::SpawnFailed(e)
        })?;

        if let Some(ref events) = events {
            events.event(
                "SUBPROCESS_START",
                "Starting subprocess",
                &[
                    ("pid", child.id().map(|p| p.to_string()).unwrap_or_default()),
                    ("cmd", spec.display()),
                ],
            );
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Stream("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AgentError::Stream("stderr not captured".into()))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let readers = vec![
            spawn_line_reader(stdout, StreamKind::Stdout, tx.clone()),
            spawn_line_reader(stderr, StreamKind::Stderr, tx),
        ];

        let (stop_tx, stop_rx) = watch::channel(false);
        let heartbeat = events
            .clone()
            .map(|events| spawn_heartbeat(events, self.settings.heartbeat_interval, stop_rx));

        let mut collector = Collector {
            classifier: StreamClassifier::new(transcript.clone(), started),
            stdout: Vec::new(),
            stderr: Vec::new(),
            lines: Vec::new(),
            compaction: None,
        };

        let deadline = timeout.map(|t| started + t);
        let hang_detection = spec.protocol == StreamProtocol::JsonLines;
        let mut poll = tokio::time::interval(self.settings.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut exit_status: Option<ExitStatus> = None;
        let mut hang_phase: Option<HangPhase> = None;

        let termination = loop {
            tokio::select! {
                Some(event) = rx.recv() => {
                    collector.accept(event, events.as_ref(), self.logger.as_deref());
                }
                _ = poll.tick() => {
                    if collector.compaction.is_some() {
                        if let Ok(Some(status)) = child.try_wait() {
                            exit_status = Some(status);
                        }
                        if let Some(ref events) = events {
                            events.event("COMPACTION_KILL", "Killing process due to compaction detection", &[]);
                        }
                        break Termination::Compaction;
                    }

                    match child.try_wait() {
                        Ok(Some(status)) => {
                            exit_status = Some(status);
                            break Termination::Exited;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(error = %e, "failed to poll agent process");
                            let _ = stop_tx.send(true);
                            return Err(AgentError::ExecutionFailed(format!(
                                "Failed to poll process: {}",
                                e
                            )));
                        }
                    }

                    let now = Instant::now();
                    if hang_detection {
                        let state = collector.classifier.state();
                        if state.is_hung(now, &self.settings.hang) {
                            let phase = state.phase(now, &self.settings.hang);
                            hang_phase = Some(phase);
                            if let Some(ref events) = events {
                                events.event(
                                    "HANG_DETECTED",
                                    "No terminal result and no activity; terminating",
                                    &[
                                        ("phase", phase.to_string()),
                                        ("idle_sec", format!("{:.1}", state.idle_for(now).as_secs_f64())),
                                        ("tool_invocations", state.tool_invocations().to_string()),
                                        ("consecutive_text", state.consecutive_text_only().to_string()),
                                    ],
                                );
                            }
                            break if phase == HangPhase::Completion {
                                Termination::HungCompletion
                            } else {
                                Termination::Stalled
                            };
                        }
                    }

                    if deadline.is_some_and(|d| now >= d) {
                        if let Some(ref events) = events {
                            events.event(
                                "TIMEOUT",
                                &format!(
                                    "Subprocess exceeded timeout of {}s",
                                    timeout.map(|t| t.as_secs()).unwrap_or_default()
                                ),
                                &[],
                            );
                        }
                        break Termination::TimedOut;
                    }
                }
            }
        };

        if termination != Termination::Exited && exit_status.is_none() {
            terminate(&mut child, self.settings.kill_grace).await;
        }

        let _ = stop_tx.send(true);
        if let Some(heartbeat) = heartbeat {
            join_bounded(heartbeat, self.settings.join_timeout).await;
        }
        for reader in readers {
            join_bounded(reader, self.settings.join_timeout).await;
        }
        while let Ok(event) = rx.try_recv() {
            collector.accept(event, events.as_ref(), self.logger.as_deref());
        }

        // A phrase can arrive in the last lines before a natural exit.
        let termination = match termination {
            Termination::Exited if collector.compaction.is_some() => Termination::Compaction,
            other => other,
        };

        let exit_code = exit_code_for(termination, exit_status);
        let duration = started.elapsed();

        info!(
            exit_code,
            %termination,
            duration_ms = duration.as_millis() as u64,
            "Agent process finished"
        );

        let stderr_text = collector.stderr.join("\n");
        if let Some(ref events) = events {
            events.event(
                "SUBPROCESS_END",
                "Subprocess completed",
                &[
                    ("returncode", exit_code.to_string()),
                    ("termination", termination.to_string()),
                    ("duration_sec", format!("{:.2}", duration.as_secs_f64())),
                ],
            );
        }
        if let Some(ref transcript) = transcript {
            write_footer_box(
                transcript,
                termination,
                exit_code,
                duration,
                timeout,
                hang_phase,
                &stderr_text,
            );
        }

        let (state, _stats, final_result) = collector.classifier.into_parts();

        Ok(SupervisedRun {
            exit_code,
            stdout: collector.stdout.join("\n"),
            stderr: stderr_text,
            lines: collector.lines,
            termination,
            duration,
            started_at,
            final_result,
            conversation: state.summary(),
        })
    }
}

fn spawn_heartbeat(
    events: EventLog,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        let mut check = 0u64;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    check += 1;
                    events.event(
                        "HEARTBEAT",
                        &format!("Process still running (check #{})", check),
                        &[],
                    );
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

/// Exit code reported for a run.
///
/// A natural exit keeps its real status, even when compaction was seen on the
/// way out. Runs we cut short get a synthesized code.
fn exit_code_for(termination: Termination, exit_status: Option<ExitStatus>) -> i32 {
    match (termination, exit_status.and_then(|s| s.code())) {
        (Termination::Exited | Termination::Compaction, Some(code)) => code,
        (Termination::Exited, None) => -1,
        (Termination::Compaction | Termination::HungCompletion, _) => 0,
        (Termination::Stalled | Termination::TimedOut, _) => -1,
    }
}

/// Wait for a helper task, abandoning it if it does not finish in time.
async fn join_bounded(mut handle: JoinHandle<()>, limit: Duration) {
    if tokio::time::timeout(limit, &mut handle).await.is_err() {
        warn!("helper task did not finish in time; abandoning it");
        handle.abort();
    }
}

/// SIGTERM the process group, wait up to `grace` for the child, then SIGKILL
/// whatever is left of the group.
async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            let group = Pid::from_raw(pid as i32);
            if killpg(group, Signal::SIGTERM).is_ok() {
                let exited = matches!(tokio::time::timeout(grace, child.wait()).await, Ok(Ok(_)));
                if !exited {
                    debug!(pid, "process ignored SIGTERM; killing");
                }
                // Grandchildren may outlive the child; ESRCH means none did
                let _ = killpg(group, Signal::SIGKILL);
                if exited {
                    return;
                }
            }
        }
    }

    #[cfg(not(unix))]
    let _ = grace;

    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill agent process");
    }
}

fn write_command_box(transcript: &Transcript, spec: &CommandSpec, timeout: Option<Duration>) {
    transcript.box_divider(false);
    transcript.box_line(&format!("Command: {}", spec.display()));
    for (key, value) in &spec.env {
        transcript.box_line(&format!("Environment: {}={}", key, value));
    }
    let limit = match timeout {
        Some(t) => format!("{}s", t.as_secs()),
        None => "none".to_string(),
    };
    transcript.box_line(&format!(
        "Timeout: {} | Prompt: {} chars",
        limit, spec.prompt_chars
    ));
    transcript.box_divider(false);
    transcript.box_line(&format!(
        "Streaming Output (real-time) | Started: {}",
        Local::now().format("%H:%M:%S")
    ));
    transcript.box_divider(false);
}

fn write_footer_box(
    transcript: &Transcript,
    termination: Termination,
    exit_code: i32,
    duration: Duration,
    timeout: Option<Duration>,
    hang_phase: Option<HangPhase>,
    stderr: &str,
) {
    transcript.line("");
    transcript.box_divider(false);
    match termination {
        Termination::TimedOut => {
            transcript.box_line(&format!(
                "❌ TIMEOUT ERROR: Iteration timed out after {} seconds",
                timeout.map(|t| t.as_secs()).unwrap_or_default()
            ));
            transcript.box_line(&format!("Duration: {:.2}s", duration.as_secs_f64()));
        }
        _ => transcript.box_line(&format!(
            "Streaming Complete | Return code: {} | Duration: {:.2}s",
            exit_code,
            duration.as_secs_f64()
        )),
    }
    match termination {
        Termination::Compaction => {
            transcript.box_line("⚠ COMPACTION DETECTED - Iteration terminated early")
        }
        Termination::HungCompletion | Termination::Stalled => transcript.box_line(&format!(
            "⚠ HANG DETECTED in {} phase - process terminated",
            hang_phase.unwrap_or(HangPhase::Ambiguous)
        )),
        _ => {}
    }
    if !stderr.trim().is_empty() {
        transcript.box_line(&format!("STDERR: {} chars logged", stderr.chars().count()));
        transcript.write(&format!("\n{}\n", stderr));
    }
    transcript.box_divider(false);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_truncates_long_commands() {
        let spec = CommandSpec {
            program: PathBuf::from("claude"),
            args: vec!["--print".into(), "x".repeat(100)],
            working_dir: PathBuf::from("."),
            env: Vec::new(),
            protocol: StreamProtocol::JsonLines,
            prompt_chars: 100,
        };
        let shown = spec.display();
        assert!(shown.starts_with("claude --print xxx"));
        assert_eq!(shown.chars().count(), COMMAND_PREVIEW + 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_keeps_real_status_after_compaction() {
        use std::os::unix::process::ExitStatusExt;

        let failed = Some(ExitStatus::from_raw(3 << 8));
        let signalled = Some(ExitStatus::from_raw(15));

        assert_eq!(exit_code_for(Termination::Compaction, failed), 3);
        assert_eq!(exit_code_for(Termination::Compaction, None), 0);
        assert_eq!(exit_code_for(Termination::Compaction, signalled), 0);
        assert_eq!(exit_code_for(Termination::Exited, failed), 3);
        assert_eq!(exit_code_for(Termination::Exited, signalled), -1);
        assert_eq!(exit_code_for(Termination::HungCompletion, None), 0);
        assert_eq!(exit_code_for(Termination::Stalled, None), -1);
        assert_eq!(exit_code_for(Termination::TimedOut, None), -1);
    }

    #[test]
    fn test_footer_reports_compaction_and_stderr() {
        let transcript = Transcript::in_memory();
        write_footer_box(
            &transcript,
            Termination::Compaction,
            0,
            Duration::from_millis(1200),
            Some(Duration::from_secs(60)),
            None,
            "warning: something",
        );
        let log = transcript.contents();
        assert!(log.contains("Streaming Complete | Return code: 0 | Duration: 1.20s"));
        assert!(log.contains("COMPACTION DETECTED"));
        assert!(log.contains("STDERR: 18 chars logged"));
    }

    #[test]
    fn test_footer_reports_timeout() {
        let transcript = Transcript::in_memory();
        write_footer_box(
            &transcript,
            Termination::TimedOut,
            -1,
            Duration::from_secs(2),
            Some(Duration::from_secs(2)),
            None,
            "",
        );
        assert!(transcript
            .contents()
            .contains("TIMEOUT ERROR: Iteration timed out after 2 seconds"));
    }
}
