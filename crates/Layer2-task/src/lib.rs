//! # desk-task
//!
//! Background job execution for desk.
//!
//! ## Features
//!
//! - Whitelist validation of terminal commands, no shell involved
//! - Script launching confined to the scripts directory
//! - One supervising task per process with graceful timeout escalation
//! - Job registry with reap-on-poll, termination by id or pid, retention sweep
//! - Optional on-disk snapshot so a restart can still stop old processes

pub mod executor;
pub mod job;
pub mod output;
pub mod registry;
pub mod service;
pub mod snapshot;
pub mod state;

pub use executor::{
    CommandPolicy, Invocation, Launch, LocalRunner, LocalRunnerConfig, Platform, TimeoutPolicy,
    ValidatedCommand, SCRIPT_NOT_FOUND,
};
pub use job::{Job, JobId, JobKind};
pub use registry::{JobRegistry, UNKNOWN_JOB};
pub use service::{JobService, JobServiceConfig, ScriptLaunch};
pub use snapshot::{JobSnapshot, SnapshotEntry};
pub use state::{JobResult, JobState};
