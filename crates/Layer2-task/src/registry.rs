//! Job Registry - the single owner of every job record
//!
//! All state lives behind one `parking_lot::Mutex`. Critical sections only
//! touch the map: liveness checks and signals happen after the guard is
//! dropped, and snapshot files are written on the blocking pool.

use crate::executor::signal;
use crate::job::{Job, JobId, JobKind};
use crate::snapshot::{JobSnapshot, SnapshotEntry};
use crate::state::JobResult;
use chrono::Utc;
use desk_foundation::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Client-facing message for ids the registry does not hold
pub const UNKNOWN_JOB: &str = "Unknown job ID";

/// Grace period for processes the registry has to signal by pid
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

struct Entry {
    job: Job,

    /// Cancels the supervising task; `None` for jobs restored from the
    /// snapshot, which are stopped by pid instead
    supervisor: Option<CancellationToken>,
}

impl Entry {
    fn is_orphan(&self) -> bool {
        self.supervisor.is_none() && self.job.pid.is_some() && self.job.is_running()
    }
}

/// Snapshot file plus write ordering. Each state of the live set gets a
/// generation number; a write older than the one on disk is skipped.
struct SnapshotWriter {
    snapshot: JobSnapshot,
    issued: AtomicU64,
    written: Mutex<u64>,
}

impl SnapshotWriter {
    fn new(snapshot: JobSnapshot) -> Self {
        Self {
            snapshot,
            issued: AtomicU64::new(0),
            written: Mutex::new(0),
        }
    }

    fn write(&self, generation: u64, entries: Vec<SnapshotEntry>) {
        let mut written = self.written.lock();
        if generation <= *written {
            return;
        }
        match self.snapshot.save(entries) {
            Ok(()) => *written = generation,
            Err(e) => warn!("Failed to write job snapshot: {}", e),
        }
    }
}

/// In-memory table of jobs keyed by id, also addressable by pid
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, Entry>>,
    snapshot: Option<Arc<SnapshotWriter>>,
    grace_period: Duration,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::with_capacity(16)),
            snapshot: None,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    /// Mirror running jobs to `snapshot` after every mutation
    pub fn with_snapshot(mut self, snapshot: JobSnapshot) -> Self {
        self.snapshot = Some(Arc::new(SnapshotWriter::new(snapshot)));
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Register a new running job. The id is visible to readers as soon as
    /// this returns.
    pub fn create(&self, kind: JobKind) -> JobId {
        let job = Job::new(kind);
        let id = job.id;
        debug!("Job {} created: {}", id, job.kind.label());
        self.jobs.lock().insert(
            id,
            Entry {
                job,
                supervisor: None,
            },
        );
        id
    }

    /// Record the spawned pid and the supervisor's cancel handle.
    ///
    /// Returns false when the job is gone (terminated before the process was
    /// up) or already terminal; the caller must then stop the process itself.
    pub fn attach(&self, id: JobId, pid: u32, cancel: CancellationToken) -> bool {
        let attached = {
            let mut jobs = self.jobs.lock();
            match jobs.get_mut(&id) {
                Some(entry) if entry.job.is_running() => {
                    entry.job.pid = Some(pid);
                    entry.supervisor = Some(cancel);
                    true
                }
                _ => false,
            }
        };

        if attached {
            self.persist();
        }
        attached
    }

    /// Running -> Finished. Duplicates and unknown ids are ignored.
    pub fn complete(&self, id: JobId, result: JobResult) -> bool {
        let return_code = result.return_code;
        let completed = {
            let mut jobs = self.jobs.lock();
            match jobs.get_mut(&id) {
                Some(entry) => {
                    let done = entry.job.finish(result);
                    if done {
                        entry.supervisor = None;
                    }
                    done
                }
                None => false,
            }
        };

        if completed {
            info!("Job {} finished with code {}", id, return_code);
            self.persist();
        } else {
            debug!("Ignoring completion for job {}", id);
        }
        completed
    }

    /// Running -> Failed. Duplicates and unknown ids are ignored.
    pub fn fail(&self, id: JobId, error: impl Into<String>) -> bool {
        let error = error.into();
        let failed = {
            let mut jobs = self.jobs.lock();
            match jobs.get_mut(&id) {
                Some(entry) => {
                    let done = entry.job.fail(error.clone());
                    if done {
                        entry.supervisor = None;
                    }
                    done
                }
                None => false,
            }
        };

        if failed {
            warn!("Job {} failed: {}", id, error);
            self.persist();
        }
        failed
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Current view of a job
    pub fn get(&self, id: JobId) -> Result<Job> {
        let (job, orphan) = {
            let jobs = self.jobs.lock();
            let entry = jobs.get(&id).ok_or_else(unknown)?;
            (entry.job.clone(), entry.is_orphan())
        };

        if orphan && !job.pid.is_some_and(signal::is_alive) {
            self.forget(&[id]);
            return Err(unknown());
        }
        Ok(job)
    }

    /// Like [`get`](Self::get), but a terminal job is removed once read
    pub fn poll(&self, id: JobId) -> Result<Job> {
        let job = self.get(id)?;
        if job.is_terminal() {
            self.jobs.lock().remove(&id);
            debug!("Job {} reaped after poll", id);
        }
        Ok(job)
    }

    /// Running jobs, oldest first. Restored jobs whose process has exited
    /// are dropped on the way.
    pub fn list(&self) -> Vec<Job> {
        let (mut running, orphans) = {
            let jobs = self.jobs.lock();
            let running: Vec<Job> = jobs
                .values()
                .filter(|e| e.job.is_running())
                .map(|e| e.job.clone())
                .collect();
            let orphans: Vec<(JobId, u32)> = jobs
                .values()
                .filter(|e| e.is_orphan())
                .filter_map(|e| e.job.pid.map(|pid| (e.job.id, pid)))
                .collect();
            (running, orphans)
        };

        let dead: Vec<JobId> = orphans
            .into_iter()
            .filter(|(_, pid)| !signal::is_alive(*pid))
            .map(|(id, _)| id)
            .collect();

        if !dead.is_empty() {
            self.forget(&dead);
            running.retain(|job| !dead.contains(&job.id));
        }

        running.sort_by_key(|job| job.created_at);
        running
    }

    /// Find the job owning `pid`
    pub fn find_by_pid(&self, pid: u32) -> Option<JobId> {
        self.jobs
            .lock()
            .values()
            .find(|e| e.job.pid == Some(pid))
            .map(|e| e.job.id)
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    // ========================================================================
    // Termination
    // ========================================================================

    /// Remove the job now, then stop its process in the background
    pub fn terminate(&self, id: JobId) -> Result<Job> {
        let entry = self.jobs.lock().remove(&id).ok_or_else(unknown)?;
        info!("Job {} terminated", id);
        self.stop(&entry);
        self.persist();
        Ok(entry.job)
    }

    /// [`terminate`](Self::terminate) addressed by OS pid. Only pids that
    /// belong to a registered job can be signalled.
    pub fn terminate_pid(&self, pid: u32) -> Result<Job> {
        let id = self
            .find_by_pid(pid)
            .ok_or_else(|| Error::NotFound(format!("No job with pid {}", pid)))?;
        self.terminate(id)
    }

    fn stop(&self, entry: &Entry) {
        if !entry.job.is_running() {
            return;
        }

        match (&entry.supervisor, entry.job.pid) {
            (Some(token), _) => token.cancel(),
            (None, Some(pid)) => self.signal_orphan(pid),
            // Never spawned: the runner sees the failed attach and cleans up
            (None, None) => {}
        }
    }

    fn signal_orphan(&self, pid: u32) {
        if let Err(e) = signal::terminate(pid) {
            warn!("Failed to signal pid {}: {}", pid, e);
            return;
        }

        let grace = self.grace_period;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                tokio::time::sleep(grace).await;
                if signal::is_alive(pid) {
                    warn!("pid {} still alive after {:?}, killing", pid, grace);
                    if let Err(e) = signal::kill(pid) {
                        warn!("Failed to kill pid {}: {}", pid, e);
                    }
                }
            });
        }
    }

    // ========================================================================
    // Housekeeping
    // ========================================================================

    /// Drop terminal jobs that completed more than `max_age` ago
    pub fn reap_expired(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_default();

        let count = {
            let mut jobs = self.jobs.lock();
            let before = jobs.len();
            jobs.retain(|_, entry| {
                !(entry.job.is_terminal()
                    && entry.job.completed_at.map(|t| t <= cutoff).unwrap_or(false))
            });
            before - jobs.len()
        };

        if count > 0 {
            debug!("Reaped {} jobs older than {:?}", count, max_age);
        }
        count
    }

    /// Re-register live processes from the snapshot. Returns how many were
    /// restored.
    pub fn restore(&self) -> usize {
        let Some(writer) = &self.snapshot else {
            return 0;
        };
        let snapshot = &writer.snapshot;

        let entries = snapshot.load();
        let total = entries.len();
        let live: Vec<SnapshotEntry> = entries
            .into_iter()
            .filter(|e| signal::is_alive(e.pid))
            .collect();
        let restored = live.len();

        {
            let mut jobs = self.jobs.lock();
            for entry in live {
                let job = Job {
                    id: entry.id,
                    kind: entry.kind,
                    pid: Some(entry.pid),
                    state: crate::state::JobState::Running,
                    created_at: Utc::now(),
                    completed_at: None,
                };
                jobs.insert(
                    entry.id,
                    Entry {
                        job,
                        supervisor: None,
                    },
                );
            }
        }

        if total > 0 {
            info!(
                "Restored {} of {} jobs from {}",
                restored,
                total,
                snapshot.path().display()
            );
        }
        self.persist();
        restored
    }

    fn forget(&self, ids: &[JobId]) {
        {
            let mut jobs = self.jobs.lock();
            for id in ids {
                jobs.remove(id);
            }
        }
        debug!("Pruned {} exited jobs", ids.len());
        self.persist();
    }

    /// Write the current live set to the snapshot before returning
    pub fn sync_snapshot(&self) {
        if let Some((writer, generation, entries)) = self.snapshot_state() {
            writer.write(generation, entries);
        }
    }

    /// Queue a snapshot write on the blocking pool (inline outside a runtime)
    fn persist(&self) {
        let Some((writer, generation, entries)) = self.snapshot_state() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || writer.write(generation, entries));
            }
            Err(_) => writer.write(generation, entries),
        }
    }

    fn snapshot_state(&self) -> Option<(Arc<SnapshotWriter>, u64, Vec<SnapshotEntry>)> {
        let writer = self.snapshot.as_ref()?;

        let jobs = self.jobs.lock();
        let entries = jobs
            .values()
            .filter(|e| e.job.is_running())
            .filter_map(|e| {
                e.job.pid.map(|pid| SnapshotEntry {
                    id: e.job.id,
                    pid,
                    kind: e.job.kind.clone(),
                })
            })
            .collect();
        // Numbered under the map lock so generations follow the map's order
        let generation = writer.issued.fetch_add(1, Ordering::SeqCst) + 1;

        Some((Arc::clone(writer), generation, entries))
    }
}

fn unknown() -> Error {
    Error::NotFound(UNKNOWN_JOB.to_string())
}
