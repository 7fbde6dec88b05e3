//! DeskConfig - runtime settings, read once from the environment at startup

use crate::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_WHITELIST: &str = "ls,dir,echo,ping";
pub const DEFAULT_MAX_COMMAND_LENGTH: usize = 2000;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 5;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 25;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;
pub const DEFAULT_JOB_RETENTION_SECS: u64 = 600;
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Snapshot file name used when `JOB_SNAPSHOT` is switched on without a path
pub const DEFAULT_SNAPSHOT_FILE: &str = "jobs.json";

/// Directory under the per-user data directory for saved chat histories
pub const DEFAULT_CHAT_HISTORY_DIR: &str = "chat";

// ============================================================================
// DeskConfig
// ============================================================================

#[derive(Debug, Clone)]
pub struct DeskConfig {
    pub host: String,
    pub port: u16,

    /// Confinement root for the file manager, static files and commands
    pub root_dir: PathBuf,

    /// `None` means `<root>/scripts`
    pub scripts_dir: Option<PathBuf>,

    /// `None` means `<root>/icons`
    pub icons_dir: Option<PathBuf>,

    /// First-token whitelist for terminal commands (exact match)
    pub terminal_whitelist: HashSet<String>,

    pub max_command_length: usize,
    pub command_timeout: Duration,
    pub grace_period: Duration,
    pub max_upload_bytes: usize,
    pub max_output_bytes: usize,

    /// How long a finished job stays pollable before the sweep drops it
    pub job_retention: Duration,

    /// Where running jobs are mirrored; `None` disables the snapshot
    pub job_snapshot: Option<PathBuf>,

    /// One JSON file per chat profile; `None` keeps no history
    pub chat_history_dir: Option<PathBuf>,

    pub ollama_url: String,
    pub log_level: String,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            root_dir: PathBuf::from("."),
            scripts_dir: None,
            icons_dir: None,
            terminal_whitelist: parse_list(DEFAULT_WHITELIST),
            max_command_length: DEFAULT_MAX_COMMAND_LENGTH,
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            grace_period: Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            job_retention: Duration::from_secs(DEFAULT_JOB_RETENTION_SECS),
            job_snapshot: None,
            chat_history_dir: None,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl DeskConfig {
    /// Read from the process environment. `ROOT_DIR` defaults to the
    /// current directory.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        if config.root_dir == Path::new(".") {
            config.root_dir = std::env::current_dir()
                .map_err(|e| Error::Config(format!("Cannot get current directory: {}", e)))?;
        }
        Ok(config)
    }

    /// Build from any key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(host) = get("HOST") {
            config.host = host.trim().to_string();
        }
        if let Some(port) = get("PORT") {
            config.port = parse_number("PORT", &port)?;
        }
        if let Some(root) = get("ROOT_DIR") {
            config.root_dir = PathBuf::from(root);
        }
        config.scripts_dir = get("SCRIPTS_DIR").map(PathBuf::from);
        config.icons_dir = get("ICONS_DIR").map(PathBuf::from);

        if let Some(list) = get("TERMINAL_WHITELIST") {
            config.terminal_whitelist = parse_list(&list);
        }
        if let Some(v) = get("MAX_COMMAND_LENGTH") {
            config.max_command_length = parse_number("MAX_COMMAND_LENGTH", &v)?;
        }
        if let Some(v) = get("COMMAND_TIMEOUT_SECS") {
            config.command_timeout = Duration::from_secs(parse_number("COMMAND_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("GRACE_PERIOD_SECS") {
            config.grace_period = Duration::from_secs(parse_number("GRACE_PERIOD_SECS", &v)?);
        }
        if let Some(v) = get("MAX_UPLOAD_MB") {
            let mb: usize = parse_number("MAX_UPLOAD_MB", &v)?;
            config.max_upload_bytes = mb * 1024 * 1024;
        }
        if let Some(v) = get("MAX_OUTPUT_BYTES") {
            config.max_output_bytes = parse_number("MAX_OUTPUT_BYTES", &v)?;
        }
        if let Some(v) = get("JOB_RETENTION_SECS") {
            config.job_retention = Duration::from_secs(parse_number("JOB_RETENTION_SECS", &v)?);
        }
        if let Some(v) = get("JOB_SNAPSHOT") {
            config.job_snapshot = parse_snapshot(&v)?;
        }
        config.chat_history_dir = match get("CHAT_HISTORY_DIR") {
            Some(v) => parse_chat_history(&v),
            None => dirs::data_local_dir().map(|d| d.join("desk").join(DEFAULT_CHAT_HISTORY_DIR)),
        };
        if let Some(url) = get("OLLAMA_URL") {
            config.ollama_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(level) = get("LOG_LEVEL") {
            config.log_level = level.trim().to_lowercase();
        }

        Ok(config)
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.scripts_dir
            .clone()
            .unwrap_or_else(|| self.root_dir.join("scripts"))
    }

    pub fn icons_dir(&self) -> PathBuf {
        self.icons_dir
            .clone()
            .unwrap_or_else(|| self.root_dir.join("icons"))
    }

    /// `host:port` for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Parsing helpers
// ============================================================================

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a non-negative integer, got '{}'", key, value)))
}

/// Comma separated, whitespace trimmed, empties dropped
fn parse_list(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// `off`/`0`/`false` disable, `on`/`1`/`true` use the per-user data
/// directory, anything else is a file path
fn parse_snapshot(value: &str) -> Result<Option<PathBuf>> {
    match value.trim().to_lowercase().as_str() {
        "off" | "0" | "false" | "no" => Ok(None),
        "on" | "1" | "true" | "yes" => {
            let dir = dirs::data_local_dir()
                .ok_or_else(|| Error::Config("Cannot find local data directory".to_string()))?;
            Ok(Some(dir.join("desk").join(DEFAULT_SNAPSHOT_FILE)))
        }
        _ => Ok(Some(PathBuf::from(value.trim()))),
    }
}

/// `off`/`0`/`false`/`no` disable, anything else is a directory
fn parse_chat_history(value: &str) -> Option<PathBuf> {
    match value.trim().to_lowercase().as_str() {
        "off" | "0" | "false" | "no" => None,
        _ => Some(PathBuf::from(value.trim())),
    }
}
