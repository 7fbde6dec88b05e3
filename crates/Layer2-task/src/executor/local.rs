//! Local runner - spawns host processes and supervises them to completion
//!
//! Features:
//! - stdin closed, stdout/stderr merged line-wise into one capped buffer
//! - one supervising tokio task per job; `launch` returns as soon as the
//!   process exists
//! - graceful timeout: SIGTERM at the deadline, SIGKILL after the grace period
//! - cancellation through the registry (`terminate`) uses the same escalation
//! - completion is reported exactly once through the registry

use crate::executor::signal;
use crate::job::JobId;
use crate::output::{self, SharedOutput};
use crate::registry::JobRegistry;
use crate::state::JobResult;
use desk_foundation::config::{
    DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_GRACE_PERIOD_SECS, DEFAULT_MAX_OUTPUT_BYTES,
};
use desk_foundation::{DeskConfig, Error, Result};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long to keep reading output after the process is gone. Background
/// grandchildren can hold the pipes open indefinitely.
const READER_DRAIN: Duration = Duration::from_secs(2);

/// Timeout with grace period: terminate at `timeout`, kill at
/// `timeout + grace_period`
#[derive(Debug, Clone, Copy)]
pub struct TimeoutPolicy {
    pub timeout: Duration,
    pub grace_period: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::graceful(DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_GRACE_PERIOD_SECS)
    }
}

impl TimeoutPolicy {
    pub fn graceful(timeout_secs: u64, grace_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            grace_period: Duration::from_secs(grace_secs),
        }
    }

    /// Latest point at which the process is guaranteed gone
    pub fn max_duration(&self) -> Duration {
        self.timeout + self.grace_period
    }
}

/// Local runner configuration
#[derive(Debug, Clone)]
pub struct LocalRunnerConfig {
    pub timeout_policy: TimeoutPolicy,

    /// Cap on captured output per job
    pub max_output_bytes: usize,
}

impl Default for LocalRunnerConfig {
    fn default() -> Self {
        Self {
            timeout_policy: TimeoutPolicy::default(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl LocalRunnerConfig {
    pub fn from_config(config: &DeskConfig) -> Self {
        Self {
            timeout_policy: TimeoutPolicy {
                timeout: config.command_timeout,
                grace_period: config.grace_period,
            },
            max_output_bytes: config.max_output_bytes,
        }
    }
}

/// A process to start: full argv plus working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub argv: Vec<String>,
    pub cwd: PathBuf,
}

impl Launch {
    pub fn new(argv: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            argv,
            cwd: cwd.into(),
        }
    }
}

/// Runs jobs as child processes of this server
pub struct LocalRunner {
    registry: Arc<JobRegistry>,
    config: LocalRunnerConfig,
}

impl LocalRunner {
    pub fn new(registry: Arc<JobRegistry>, config: LocalRunnerConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &LocalRunnerConfig {
        &self.config
    }

    /// Spawn the process for an already-created job and hand it to a
    /// supervisor task. Returns the pid.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn launch(&self, job_id: JobId, launch: Launch) -> Result<u32> {
        let (program, args) = launch
            .argv
            .split_first()
            .ok_or_else(|| Error::InvalidInput("Nothing to run".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&launch.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        debug!(
            "Job {} spawning {:?} in {}",
            job_id,
            launch.argv,
            launch.cwd.display()
        );

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::ProcessSpawn(format!("{}: {}", program, e)))?;
        let pid = child
            .id()
            .ok_or_else(|| Error::ProcessSpawn(format!("{} exited before it was tracked", program)))?;

        let output = output::shared(self.config.max_output_bytes);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(output::spawn_reader(stdout, output.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(output::spawn_reader(stderr, output.clone()));
        }

        let cancel = CancellationToken::new();
        if !self.registry.attach(job_id, pid, cancel.clone()) {
            debug!("Job {} was stopped before pid {} was attached", job_id, pid);
            cancel.cancel();
        }

        info!("Job {} started as pid {}", job_id, pid);

        tokio::spawn(supervise(Supervision {
            job_id,
            pid,
            child,
            readers,
            output,
            cancel,
            policy: self.config.timeout_policy,
            registry: Arc::clone(&self.registry),
        }));

        Ok(pid)
    }
}

// ============================================================================
// Supervision
// ============================================================================

struct Supervision {
    job_id: JobId,
    pid: u32,
    child: Child,
    readers: Vec<JoinHandle<()>>,
    output: SharedOutput,
    cancel: CancellationToken,
    policy: TimeoutPolicy,
    registry: Arc<JobRegistry>,
}

enum Stop {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

async fn supervise(mut s: Supervision) {
    let stop = tokio::select! {
        status = s.child.wait() => Stop::Exited(status),
        _ = tokio::time::sleep(s.policy.timeout) => Stop::TimedOut,
        _ = s.cancel.cancelled() => Stop::Cancelled,
    };

    let (status, timed_out) = match stop {
        Stop::Exited(status) => (status, false),
        Stop::TimedOut => {
            warn!(
                "Job {} exceeded {:.1}s, terminating pid {}",
                s.job_id,
                s.policy.timeout.as_secs_f64(),
                s.pid
            );
            (escalate(&mut s.child, s.pid, s.policy.grace_period).await, true)
        }
        Stop::Cancelled => {
            info!("Job {} cancelled, stopping pid {}", s.job_id, s.pid);
            let _ = escalate(&mut s.child, s.pid, s.policy.grace_period).await;
            // The registry already dropped the job; nothing to report
            return;
        }
    };

    for mut reader in s.readers {
        if tokio::time::timeout(READER_DRAIN, &mut reader).await.is_err() {
            debug!("Job {} output still open after exit, detaching", s.job_id);
            reader.abort();
        }
    }

    match status {
        Ok(status) => {
            let mut return_code = exit_code(status);
            let mut text = output::take(&s.output);
            if timed_out {
                if return_code == 0 {
                    return_code = -1;
                }
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&format!("[timed out after {:?}]", s.policy.timeout));
            }

            let mut result = JobResult::new(return_code, text);
            if timed_out {
                result = result.timed_out();
            }
            s.registry.complete(s.job_id, result);
        }
        Err(e) => {
            s.registry
                .fail(s.job_id, format!("Failed to wait for process: {}", e));
        }
    }
}

/// Terminate, wait up to `grace`, then kill
async fn escalate(child: &mut Child, pid: u32, grace: Duration) -> std::io::Result<ExitStatus> {
    if let Err(e) = signal::terminate(pid) {
        debug!("Terminate signal for pid {} not delivered: {}", pid, e);
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(
                "pid {} ignored termination for {:.1}s, killing",
                pid,
                grace.as_secs_f64()
            );
            if signal::kill(pid).is_err() {
                child.start_kill()?;
            }
            child.wait().await
        }
    }
}

/// Exit code, or `-signal` for signal deaths on unix
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return -sig;
        }
    }

    -1
}
