//! Job state machine
//!
//! `Running` moves to exactly one of the terminal states and never back.
//! Output and return code live inside `Finished`, so a half-populated
//! result cannot exist.

use serde::{Deserialize, Serialize};

/// Outcome of a process that ran to completion (or was stopped at its deadline)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Exit code; `-signal` when killed by a signal on unix
    pub return_code: i32,

    /// Merged stdout/stderr
    pub output: String,

    /// Stopped because the wall-clock timeout expired
    pub timed_out: bool,
}

impl JobResult {
    pub fn new(return_code: i32, output: impl Into<String>) -> Self {
        Self {
            return_code,
            output: output.into(),
            timed_out: false,
        }
    }

    pub fn timed_out(mut self) -> Self {
        self.timed_out = true;
        self
    }
}

/// Possible states of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Process is (or is about to be) running
    Running,

    /// Process exited; result captured
    Finished(JobResult),

    /// Process could not be started or waited on
    Failed(String),
}

impl JobState {
    /// Check if this is a terminal state (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished(_) | JobState::Failed(_))
    }

    pub fn is_running(&self) -> bool {
        matches!(self, JobState::Running)
    }

    /// Wire name used by the status endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Running => "running",
            JobState::Finished(_) => "finished",
            JobState::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
