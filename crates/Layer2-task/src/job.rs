//! Job definition and types

use crate::state::{JobResult, JobState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque job identifier handed to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new random JobId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// What a job runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    /// A validated terminal command line
    Command { command: String },

    /// A script from the scripts directory
    Script { script: String, path: PathBuf },
}

impl JobKind {
    pub fn command(command: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
        }
    }

    pub fn script(script: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::Script {
            script: script.into(),
            path: path.into(),
        }
    }

    /// Short human label: the command line or the script name
    pub fn label(&self) -> &str {
        match self {
            JobKind::Command { command } => command,
            JobKind::Script { script, .. } => script,
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(self, JobKind::Script { .. })
    }
}

/// One asynchronous unit of work
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique job identifier
    pub id: JobId,

    /// Command or script being run
    pub kind: JobKind,

    /// OS process id, once spawned
    pub pid: Option<u32>,

    /// Current state
    pub state: JobState,

    /// When the job was submitted
    pub created_at: DateTime<Utc>,

    /// When the job reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new running job
    pub fn new(kind: JobKind) -> Self {
        Self {
            id: JobId::new(),
            kind,
            pid: None,
            state: JobState::Running,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Mark job as finished. Returns false if it was already terminal.
    pub fn finish(&mut self, result: JobResult) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = JobState::Finished(result);
        self.completed_at = Some(Utc::now());
        true
    }

    /// Mark job as failed. Returns false if it was already terminal.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = JobState::Failed(error.into());
        self.completed_at = Some(Utc::now());
        true
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
