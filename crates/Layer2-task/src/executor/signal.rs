//! Process signalling by pid
//!
//! Used for liveness checks and for stopping processes the runner does not
//! hold a child handle for (jobs restored from the snapshot).

use desk_foundation::{Error, Result};
use tracing::debug;

/// Whether a process with this pid currently exists
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        // Exists but belongs to someone else
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(windows)]
pub fn is_alive(pid: u32) -> bool {
    let filter = format!("PID eq {}", pid);
    std::process::Command::new("tasklist")
        .args(["/FI", &filter, "/FO", "CSV", "/NH"])
        .output()
        .map(|out| tasklist_has_pid(&String::from_utf8_lossy(&out.stdout), pid))
        .unwrap_or(false)
}

/// Whether `tasklist /FO CSV /NH` output has a row whose PID column
/// (the second field) is exactly `pid`
#[cfg_attr(not(windows), allow(dead_code))]
fn tasklist_has_pid(csv: &str, pid: u32) -> bool {
    let wanted = pid.to_string();
    csv.lines().any(|line| {
        line.split(',')
            .nth(1)
            .map(|field| field.trim().trim_matches('"'))
            .is_some_and(|field| field == wanted)
    })
}

/// Ask the process to exit (SIGTERM on unix)
#[cfg(unix)]
pub fn terminate(pid: u32) -> Result<()> {
    send(pid, nix::sys::signal::Signal::SIGTERM)
}

/// Kill the process outright (SIGKILL on unix)
#[cfg(unix)]
pub fn kill(pid: u32) -> Result<()> {
    send(pid, nix::sys::signal::Signal::SIGKILL)
}

#[cfg(unix)]
fn send(pid: u32, signal: nix::sys::signal::Signal) -> Result<()> {
    use nix::unistd::Pid;

    let raw = i32::try_from(pid)
        .map_err(|_| Error::InvalidInput(format!("pid {} out of range", pid)))?;
    if raw <= 0 {
        return Err(Error::InvalidInput(format!("refusing to signal pid {}", pid)));
    }
    debug!("Sending {} to pid {}", signal, pid);
    // Runner children lead their own process group; signal the whole group
    // so grandchildren go too, and fall back to the single pid otherwise
    nix::sys::signal::killpg(Pid::from_raw(raw), signal)
        .or_else(|_| nix::sys::signal::kill(Pid::from_raw(raw), signal))
        .map_err(|e| Error::Internal(format!("Failed to send {} to {}: {}", signal, pid, e)))
}

#[cfg(windows)]
pub fn terminate(pid: u32) -> Result<()> {
    taskkill(pid, false)
}

#[cfg(windows)]
pub fn kill(pid: u32) -> Result<()> {
    taskkill(pid, true)
}

#[cfg(windows)]
fn taskkill(pid: u32, force: bool) -> Result<()> {
    let pid_arg = pid.to_string();
    let mut cmd = std::process::Command::new("taskkill");
    if force {
        cmd.arg("/F");
    }
    debug!("taskkill {} (force: {})", pid, force);
    let status = cmd.args(["/T", "/PID", &pid_arg]).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::Internal(format!("taskkill failed for {}", pid)))
    }
}


#[cfg(all(test, unix))]
mod unix_tests {
    use super::*;

    #[test]
    fn test_own_process_is_alive() {
        assert!(is_alive(std::process::id()));
    }

    #[test]
    fn test_exited_child_is_not_alive() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!is_alive(pid));
    }

    #[test]
    fn test_terminate_stops_process() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        terminate(child.id()).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_refuses_pid_zero() {
        assert!(terminate(0).is_err());
    }
}
