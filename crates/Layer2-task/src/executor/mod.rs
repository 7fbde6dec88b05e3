//! Job execution
//!
//! - `LocalRunner` - spawns host processes and supervises them
//! - `CommandPolicy` - whitelist validation for terminal commands
//! - `script` - script lookup and interpreter selection
//! - `signal` - pid-level termination and liveness checks

pub mod local;
pub mod script;
pub mod shell_policy;
pub mod signal;

pub use local::{Launch, LocalRunner, LocalRunnerConfig, TimeoutPolicy};
pub use script::{resolve_script, script_argv, SCRIPT_NOT_FOUND};
pub use shell_policy::{CommandPolicy, Invocation, Platform, ValidatedCommand};
