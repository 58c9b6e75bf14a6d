use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::IterationRecord;

/// How the ralph loop ended
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoopOutcome {
    /// The agent emitted the completion signal
    Success {
        iterations: usize,
        history: Vec<IterationRecord>,
        total_duration_secs: f64,
    },
    /// Ran out of iterations without a completion signal
    MaxIterationsReached {
        iterations: usize,
        history: Vec<IterationRecord>,
        total_duration_secs: f64,
    },
    /// The operator chose to stop at a review pause
    StoppedByOperator {
        iterations: usize,
        history: Vec<IterationRecord>,
        total_duration_secs: f64,
    },
    /// Ctrl+C
    Interrupted {
        iterations: usize,
        history: Vec<IterationRecord>,
        total_duration_secs: f64,
    },
    /// The wall-clock budget for the whole run ran out
    TotalTimeout {
        iterations: usize,
        history: Vec<IterationRecord>,
        total_duration_secs: f64,
        limit_secs: u64,
    },
}

impl LoopOutcome {
    pub fn success(iterations: usize, history: Vec<IterationRecord>, duration: Duration) -> Self {
        Self::Success {
            iterations,
            history,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn max_iterations_reached(
        iterations: usize,
        history: Vec<IterationRecord>,
        duration: Duration,
    ) -> Self {
        Self::MaxIterationsReached {
            iterations,
            history,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn stopped(iterations: usize, history: Vec<IterationRecord>, duration: Duration) -> Self {
        Self::StoppedByOperator {
            iterations,
            history,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn interrupted(
        iterations: usize,
        history: Vec<IterationRecord>,
        duration: Duration,
    ) -> Self {
        Self::Interrupted {
            iterations,
            history,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn total_timeout(
        iterations: usize,
        history: Vec<IterationRecord>,
        duration: Duration,
        limit: Duration,
    ) -> Self {
        Self::TotalTimeout {
            iterations,
            history,
            total_duration_secs: duration.as_secs_f64(),
            limit_secs: limit.as_secs(),
        }
    }

    pub fn iterations(&self) -> usize {
        match self {
            Self::Success { iterations, .. } => *iterations,
            Self::MaxIterationsReached { iterations, .. } => *iterations,
            Self::StoppedByOperator { iterations, .. } => *iterations,
            Self::Interrupted { iterations, .. } => *iterations,
            Self::TotalTimeout { iterations, .. } => *iterations,
        }
    }

    pub fn history(&self) -> &[IterationRecord] {
        match self {
            Self::Success { history, .. }
            | Self::MaxIterationsReached { history, .. }
            | Self::StoppedByOperator { history, .. }
            | Self::Interrupted { history, .. }
            | Self::TotalTimeout { history, .. } => history,
        }
    }

    pub fn total_duration_secs(&self) -> f64 {
        match self {
            Self::Success {
                total_duration_secs,
                ..
            }
            | Self::MaxIterationsReached {
                total_duration_secs,
                ..
            }
            | Self::StoppedByOperator {
                total_duration_secs,
                ..
            }
            | Self::Interrupted {
                total_duration_secs,
                ..
            }
            | Self::TotalTimeout {
                total_duration_secs,
                ..
            } => *total_duration_secs,
        }
    }

    /// Estimated tokens sent, summed over all iterations
    pub fn input_tokens(&self) -> usize {
        self.history().iter().map(|r| r.input_tokens).sum()
    }

    /// Estimated tokens received, summed over all iterations
    pub fn output_tokens(&self) -> usize {
        self.history().iter().map(|r| r.output_tokens).sum()
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Soft stops exit 0; Ctrl+C exits 130; a blown total budget exits 2
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success { .. } => 0,
            Self::MaxIterationsReached { .. } => 0,
            Self::StoppedByOperator { .. } => 0,
            Self::Interrupted { .. } => 130,
            Self::TotalTimeout { .. } => 2,
        }
    }
}
