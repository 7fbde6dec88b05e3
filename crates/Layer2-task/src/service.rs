//! Job Service - the operations the HTTP layer exposes
//!
//! Validation happens before a job exists; once a job id has been handed
//! out, every later failure is recorded on the job itself.

use crate::executor::local::{Launch, LocalRunner, LocalRunnerConfig};
use crate::executor::script::{resolve_script, script_argv};
use crate::executor::shell_policy::CommandPolicy;
use crate::job::{Job, JobId, JobKind};
use crate::registry::{JobRegistry, UNKNOWN_JOB};
use crate::snapshot::JobSnapshot;
use desk_foundation::{DeskConfig, Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Where jobs run and how long results are kept
#[derive(Debug, Clone)]
pub struct JobServiceConfig {
    /// Working directory for terminal commands
    pub root_dir: PathBuf,

    /// Scripts are resolved here and run with it as working directory
    pub scripts_dir: PathBuf,

    pub runner: LocalRunnerConfig,

    /// Finished jobs nobody polled are dropped after this long
    pub job_retention: Duration,
}

impl JobServiceConfig {
    pub fn new(root_dir: impl Into<PathBuf>, scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            scripts_dir: scripts_dir.into(),
            runner: LocalRunnerConfig::default(),
            job_retention: Duration::from_secs(desk_foundation::config::DEFAULT_JOB_RETENTION_SECS),
        }
    }
}

/// Result of a successful script launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLaunch {
    pub job_id: JobId,
    pub pid: u32,
    pub script: String,
}

pub struct JobService {
    registry: Arc<JobRegistry>,
    runner: LocalRunner,
    policy: CommandPolicy,
    root_dir: PathBuf,
    scripts_dir: PathBuf,
    job_retention: Duration,
}

impl JobService {
    pub fn new(policy: CommandPolicy, registry: Arc<JobRegistry>, config: JobServiceConfig) -> Self {
        Self {
            runner: LocalRunner::new(Arc::clone(&registry), config.runner),
            registry,
            policy,
            root_dir: config.root_dir,
            scripts_dir: config.scripts_dir,
            job_retention: config.job_retention,
        }
    }

    /// Build everything from runtime settings, restoring live jobs from the
    /// snapshot when one is configured
    pub fn from_config(config: &DeskConfig) -> Result<Self> {
        let root_dir = config.root_dir.canonicalize().map_err(|e| {
            Error::Config(format!(
                "Root {} is not usable: {}",
                config.root_dir.display(),
                e
            ))
        })?;

        let mut registry = JobRegistry::new().with_grace_period(config.grace_period);
        if let Some(path) = &config.job_snapshot {
            registry = registry.with_snapshot(JobSnapshot::new(path)?);
        }
        let registry = Arc::new(registry);
        let restored = registry.restore();
        if restored > 0 {
            info!("{} jobs still running from a previous run", restored);
        }

        let service_config = JobServiceConfig {
            scripts_dir: config.scripts_dir.clone().unwrap_or_else(|| root_dir.join("scripts")),
            root_dir,
            runner: LocalRunnerConfig::from_config(config),
            job_retention: config.job_retention,
        };

        Ok(Self::new(
            CommandPolicy::from_config(config),
            registry,
            service_config,
        ))
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> &CommandPolicy {
        &self.policy
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Validate and start a terminal command.
    ///
    /// Rejections return an error and create nothing. Once validated, a job
    /// id is always returned; a spawn failure shows up as a failed job.
    pub fn submit_command(&self, raw: &str) -> Result<JobId> {
        let command = self.policy.validate(raw)?;
        let id = self.registry.create(JobKind::command(command.raw.clone()));

        if let Err(e) = self
            .runner
            .launch(id, Launch::new(command.argv(), &self.root_dir))
        {
            self.registry.fail(id, e.to_string());
        }
        Ok(id)
    }

    /// Start a script from the scripts directory
    pub fn submit_script(&self, name: &str) -> Result<ScriptLaunch> {
        let path = resolve_script(&self.scripts_dir, name)?;
        let script = name.trim().replace('\\', "/");
        let argv = script_argv(&path, self.policy.platform());

        let id = self
            .registry
            .create(JobKind::script(script.clone(), path.clone()));

        match self
            .runner
            .launch(id, Launch::new(argv, &self.scripts_dir))
        {
            Ok(pid) => Ok(ScriptLaunch {
                job_id: id,
                pid,
                script,
            }),
            Err(e) => {
                // The caller never sees this id
                self.registry.fail(id, e.to_string());
                let _ = self.registry.poll(id);
                Err(e)
            }
        }
    }

    // ========================================================================
    // Status / control
    // ========================================================================

    /// Poll a job; terminal jobs are reaped by this read
    pub fn job_status(&self, job_id: &str) -> Result<Job> {
        self.registry.poll(parse_id(job_id)?)
    }

    pub fn stop_job(&self, job_id: &str) -> Result<Job> {
        self.registry.terminate(parse_id(job_id)?)
    }

    pub fn stop_pid(&self, pid: u32) -> Result<Job> {
        self.registry.terminate_pid(pid)
    }

    pub fn list_jobs(&self) -> Vec<Job> {
        self.registry.list()
    }

    /// Drop results older than the retention window
    pub fn reap_expired(&self) -> usize {
        self.registry.reap_expired(self.job_retention)
    }

    /// Run [`reap_expired`](Self::reap_expired) every `interval`
    pub fn start_periodic_reap(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);

            loop {
                timer.tick().await;

                let reaped = self.reap_expired();
                if reaped > 0 {
                    debug!("Periodic reap: removed {} jobs", reaped);
                }
            }
        })
    }
}

fn parse_id(job_id: &str) -> Result<JobId> {
    job_id
        .parse()
        .map_err(|_| Error::NotFound(UNKNOWN_JOB.to_string()))
}
