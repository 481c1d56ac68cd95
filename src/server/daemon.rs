//! Daemon supervision: pid file, log file, detached start, stop and
//! status probes.
//!
//! The server is launched as a detached child of the CLI process with
//! its output appended to `~/.2kc/server.log`. The pid file is probed
//! with a zero signal; a stale file (ESRCH) is reaped on sight.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::info;

use crate::config::{broker_home, Config};
use crate::errors::{BrokerError, Result};

pub fn pid_path() -> Result<PathBuf> {
    Ok(broker_home()?.join("server.pid"))
}

pub fn log_path() -> Result<PathBuf> {
    Ok(broker_home()?.join("server.log"))
}

/// What a pid-file probe found.
#[derive(Debug, PartialEq, Eq)]
pub enum ServerStatus {
    Running(i32),
    /// No pid file, or a stale one that was just reaped.
    Stopped,
}

/// Probe the pid file. A dead pid (ESRCH) counts as stopped and the
/// stale file is removed.
pub fn status() -> Result<ServerStatus> {
    let path = pid_path()?;
    let Ok(raw) = std::fs::read_to_string(&path) else {
        return Ok(ServerStatus::Stopped);
    };

    let pid: i32 = match raw.trim().parse() {
        Ok(pid) => pid,
        Err(_) => {
            std::fs::remove_file(&path)?;
            return Ok(ServerStatus::Stopped);
        }
    };

    if process_alive(pid)? {
        Ok(ServerStatus::Running(pid))
    } else {
        info!(pid, "reaping stale pid file");
        std::fs::remove_file(&path)?;
        Ok(ServerStatus::Stopped)
    }
}

/// Launch the server as a detached child and record its pid.
///
/// Re-invokes the current executable with the hidden `--foreground`
/// flag; stdout and stderr are appended to the log file, whose mode is
/// left untouched.
pub fn start_detached(config_path: Option<&PathBuf>) -> Result<i32> {
    if let ServerStatus::Running(pid) = status()? {
        return Err(BrokerError::CommandFailed(format!(
            "server already running (pid {pid})"
        )));
    }

    let exe = std::env::current_exe()?;
    let log = log_path()?;
    if let Some(parent) = log.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let open_log = || {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log)
    };

    let mut command = Command::new(exe);
    command.args(["server", "start", "--foreground"]);
    if let Some(path) = config_path {
        command.arg("--config").arg(path);
    }
    let child = command
        .stdin(Stdio::null())
        .stdout(open_log()?)
        .stderr(open_log()?)
        .spawn()
        .map_err(|e| BrokerError::SpawnFailure(e.to_string()))?;

    let pid = child.id() as i32;
    let pid_file = pid_path()?;
    if let Some(parent) = pid_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&pid_file, format!("{pid}\n"))?;
    info!(pid, "server started");
    Ok(pid)
}

/// SIGTERM the recorded server process and drop the pid file.
pub fn stop() -> Result<()> {
    match status()? {
        ServerStatus::Running(pid) => {
            terminate(pid)?;
            std::fs::remove_file(pid_path()?)?;
            info!(pid, "server stopped");
            Ok(())
        }
        ServerStatus::Stopped => Err(BrokerError::CommandFailed("server is not running".into())),
    }
}

/// Run the server in the foreground (the detached child lands here).
pub fn run_foreground(config: Config) -> Result<()> {
    crate::server::run_blocking(config)
}

#[cfg(unix)]
fn process_alive(pid: i32) -> Result<bool> {
    // Zero signal: no-op delivery, only an existence check.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(code) if code == libc::ESRCH => Ok(false),
        // EPERM means the process exists but belongs to someone else.
        Some(code) if code == libc::EPERM => Ok(true),
        _ => Err(err.into()),
    }
}

#[cfg(unix)]
fn terminate(pid: i32) -> Result<()> {
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error().into())
    }
}

#[cfg(not(unix))]
fn process_alive(_pid: i32) -> Result<bool> {
    Err(BrokerError::CommandFailed(
        "server supervision is only supported on unix".into(),
    ))
}

#[cfg(not(unix))]
fn terminate(_pid: i32) -> Result<()> {
    Err(BrokerError::CommandFailed(
        "server supervision is only supported on unix".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn own_pid_is_alive() {
        assert!(process_alive(std::process::id() as i32).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn exited_child_pid_is_dead() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id() as i32;
        child.wait().unwrap();
        assert!(!process_alive(pid).unwrap());
    }
}
