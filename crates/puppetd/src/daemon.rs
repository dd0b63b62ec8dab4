//! Daemon control surface
//!
//! The robot-control daemon is an opaque child process identified by a PID
//! file. Its state is never cached: every status query goes back to the PID
//! file and the OS process table.

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use puppet_common::store::atomic_write;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use sysinfo::System;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How long a graceful stop may take before it counts as failed
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Daemon state as observed from the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    Running,
    Stopped,
    /// PID file present but unusable
    Error,
}

impl DaemonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Failed to start daemon: {0}")]
    Start(String),

    #[error("Daemon did not stop: {0}")]
    Stop(String),

    #[error("Cannot read PID file {path}: {source}")]
    StatusCheck {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Force clean failed: {0}")]
    ForceClean(String),
}

/// Control surface over one supervised process
#[async_trait]
pub trait DaemonController: Send + Sync {
    /// Launch the daemon; a no-op when it already runs
    async fn start(&self) -> Result<(), DaemonError>;

    /// Ask the daemon to terminate; an error means "needs force clean"
    async fn stop(&self) -> Result<(), DaemonError>;

    /// Query the OS; "not running" is a status, not an error
    async fn status(&self) -> Result<DaemonStatus, DaemonError>;

    /// Clear the PID file and kill anything matching the process pattern
    async fn force_clean(&self) -> Result<(), DaemonError>;

    fn pid_file(&self) -> &Path;

    /// Command-line fragment identifying daemon processes
    fn process_pattern(&self) -> &str;
}

enum PidFile {
    Missing,
    Garbage,
    Pid(Pid),
}

fn read_pid_file(path: &Path) -> Result<PidFile, DaemonError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content
            .trim()
            .parse::<i32>()
            .ok()
            .filter(|pid| *pid > 0)
            .map(|pid| PidFile::Pid(Pid::from_raw(pid)))
            .unwrap_or(PidFile::Garbage)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PidFile::Missing),
        Err(source) => Err(DaemonError::StatusCheck {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn process_alive(pid: Pid) -> bool {
    match kill(pid, None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn remove_pid_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed PID file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Cannot remove PID file {}: {}", path.display(), e),
    }
}

/// Kill every process whose command line contains `pattern`
///
/// Returns how many processes were signalled.
pub fn kill_by_pattern(pattern: &str) -> usize {
    if pattern.is_empty() {
        return 0;
    }

    let own_pid = sysinfo::get_current_pid().ok();
    let mut system = System::new();
    system.refresh_processes();

    let mut killed = 0;
    for (pid, process) in system.processes() {
        if Some(*pid) == own_pid {
            continue;
        }
        if process.cmd().join(" ").contains(pattern) && process.kill() {
            debug!("Killed {} ({})", pid, process.name());
            killed += 1;
        }
    }
    killed
}

/// Daemon launched as a child process and tracked through a PID file
pub struct PidFileDaemon {
    program: String,
    args: Vec<String>,
    pid_file: PathBuf,
    log_file: PathBuf,
    pattern: String,
    stop_timeout: Duration,
    child: Mutex<Option<Child>>,
}

impl PidFileDaemon {
    pub fn new<I, S>(program: &str, args: I, pid_file: impl Into<PathBuf>, log_file: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            pid_file: pid_file.into(),
            log_file: log_file.into(),
            pattern: program.to_string(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            child: Mutex::new(None),
        }
    }

    /// The robot daemon: `<program> --config <config_file>`
    pub fn for_config(
        program: &str,
        config_file: &Path,
        pid_file: impl Into<PathBuf>,
        log_file: impl Into<PathBuf>,
    ) -> Self {
        let config = config_file.to_string_lossy().to_string();
        Self::new(program, ["--config".to_string(), config], pid_file, log_file)
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.pattern = pattern.to_string();
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Reap our own child if it already exited
    async fn reap_child(&self) -> bool {
        let mut child = self.child.lock().await;
        let exited = match child.as_mut() {
            Some(process) => matches!(process.try_wait(), Ok(Some(_))),
            None => false,
        };
        if exited {
            child.take();
        }
        exited
    }

    async fn wait_for_exit(&self, pid: Pid) -> bool {
        let deadline = Instant::now() + self.stop_timeout;

        loop {
            if self.reap_child().await || !process_alive(pid) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl DaemonController for PidFileDaemon {
    async fn start(&self) -> Result<(), DaemonError> {
        if self.status().await? == DaemonStatus::Running {
            info!("Daemon already running, nothing to start");
            return Ok(());
        }

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .map_err(|e| DaemonError::Start(format!("log {}: {}", self.log_file.display(), e)))?;
        let log_err = log
            .try_clone()
            .map_err(|e| DaemonError::Start(format!("log {}: {}", self.log_file.display(), e)))?;

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|e| DaemonError::Start(format!("{}: {}", self.program, e)))?;

        let pid = child
            .id()
            .ok_or_else(|| DaemonError::Start("child exited immediately".to_string()))?;

        atomic_write(&self.pid_file, pid.to_string().as_bytes())
            .map_err(|e| DaemonError::Start(format!("PID file {}: {}", self.pid_file.display(), e)))?;

        *self.child.lock().await = Some(child);
        info!("Daemon started: {} (pid {})", self.program, pid);
        Ok(())
    }

    async fn stop(&self) -> Result<(), DaemonError> {
        let pid = match read_pid_file(&self.pid_file)? {
            PidFile::Missing => {
                info!("Daemon not running, nothing to stop");
                return Ok(());
            }
            PidFile::Garbage => {
                return Err(DaemonError::Stop(format!(
                    "unreadable PID file {}",
                    self.pid_file.display()
                )))
            }
            PidFile::Pid(pid) => pid,
        };

        match kill(pid, Signal::SIGTERM) {
            Ok(()) => {}
            Err(Errno::ESRCH) => {
                info!("Daemon pid {} already gone, clearing stale PID file", pid);
                remove_pid_file(&self.pid_file);
                self.child.lock().await.take();
                return Ok(());
            }
            Err(e) => return Err(DaemonError::Stop(format!("SIGTERM to {}: {}", pid, e))),
        }

        if !self.wait_for_exit(pid).await {
            return Err(DaemonError::Stop(format!(
                "pid {} still alive after {:?}",
                pid, self.stop_timeout
            )));
        }

        remove_pid_file(&self.pid_file);
        info!("Daemon stopped (pid {})", pid);
        Ok(())
    }

    async fn status(&self) -> Result<DaemonStatus, DaemonError> {
        match read_pid_file(&self.pid_file)? {
            PidFile::Missing => Ok(DaemonStatus::Stopped),
            PidFile::Garbage => Ok(DaemonStatus::Error),
            PidFile::Pid(pid) => {
                if self.reap_child().await || !process_alive(pid) {
                    Ok(DaemonStatus::Stopped)
                } else {
                    Ok(DaemonStatus::Running)
                }
            }
        }
    }

    async fn force_clean(&self) -> Result<(), DaemonError> {
        if let Ok(PidFile::Pid(pid)) = read_pid_file(&self.pid_file) {
            if let Err(e) = kill(pid, Signal::SIGKILL) {
                debug!("SIGKILL to {}: {}", pid, e);
            }
        }
        remove_pid_file(&self.pid_file);

        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
        }

        // The process table scan blocks, keep it off the runtime threads
        let pattern = self.pattern.clone();
        let killed = tokio::task::spawn_blocking(move || kill_by_pattern(&pattern))
            .await
            .map_err(|e| DaemonError::ForceClean(e.to_string()))?;
        info!("Force clean done ({} stray processes killed)", killed);
        Ok(())
    }

    fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    fn process_pattern(&self) -> &str {
        &self.pattern
    }
}
