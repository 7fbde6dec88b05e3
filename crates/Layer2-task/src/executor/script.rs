//! Script launching - locate a script under the scripts directory and pick
//! its interpreter

use crate::executor::shell_policy::Platform;
use desk_foundation::permission;
use desk_foundation::{Error, Result};
use std::path::{Path, PathBuf};

/// Client-facing message for a missing script
pub const SCRIPT_NOT_FOUND: &str = "Script not found";

/// Resolve `name` inside `scripts_dir`. Escapes are refused by the path
/// guard; anything that is not an existing regular file (including a
/// missing scripts directory) is `NotFound`.
pub fn resolve_script(scripts_dir: &Path, name: &str) -> Result<PathBuf> {
    if name.trim().is_empty() || !scripts_dir.is_dir() {
        return Err(Error::NotFound(SCRIPT_NOT_FOUND.to_string()));
    }

    let path = permission::resolve(scripts_dir, name.trim())?;
    if !path.is_file() {
        return Err(Error::NotFound(SCRIPT_NOT_FOUND.to_string()));
    }
    Ok(path)
}

/// Full argv for running `script`, chosen by extension
pub fn script_argv(script: &Path, platform: Platform) -> Vec<String> {
    let path = script.to_string_lossy().into_owned();
    let extension = script
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    let prefix: &[&str] = match (extension.as_str(), platform) {
        ("py", Platform::Unix) => &["python3"],
        ("py", Platform::Windows) => &["python"],
        ("sh", _) => &["sh"],
        ("js", _) => &["node"],
        ("bat" | "cmd", _) => &["cmd", "/c"],
        ("ps1", _) => &["powershell", "-NoProfile", "-File"],
        _ => &[],
    };

    prefix
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(path))
        .collect()
}
