//! Test-mode collaborators
//!
//! With `--test` nothing on the host is touched: the daemon is simulated by
//! writing its usual banner to the daemon log, system commands are only
//! logged, and the updater fakes an install into the update log.

use crate::commands::{CommandError, CommandRunner, ExternalCommand};
use crate::daemon::{DaemonController, DaemonError, DaemonStatus};
use crate::motors::{MotorApi, MotorError};
use crate::sessions::{SessionError, SessionManager};
use async_trait::async_trait;
use puppet_common::logs::{append_log, write_log};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

const STARTED_BANNER: &str = "Attempt 1 to start the robot...
SnapRobotServer is now running on: http://0.0.0.0:6969

Robot created and running!
";

/// Daemon that only pretends to run
pub struct DummyDaemon {
    log_file: PathBuf,
    pid_file: PathBuf,
    running: AtomicBool,
}

impl DummyDaemon {
    pub fn new(log_file: impl Into<PathBuf>, pid_file: impl Into<PathBuf>) -> Self {
        Self {
            log_file: log_file.into(),
            pid_file: pid_file.into(),
            running: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DaemonController for DummyDaemon {
    async fn start(&self) -> Result<(), DaemonError> {
        write_log(&self.log_file, STARTED_BANNER)
            .map_err(|e| DaemonError::Start(format!("{}: {}", self.log_file.display(), e)))?;
        self.running.store(true, Ordering::SeqCst);
        info!("[test mode] daemon started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), DaemonError> {
        append_log(&self.log_file, "Stop daemon")
            .map_err(|e| DaemonError::Stop(format!("{}: {}", self.log_file.display(), e)))?;
        self.running.store(false, Ordering::SeqCst);
        info!("[test mode] daemon stopped");
        Ok(())
    }

    async fn status(&self) -> Result<DaemonStatus, DaemonError> {
        Ok(if self.running.load(Ordering::SeqCst) {
            DaemonStatus::Running
        } else {
            DaemonStatus::Stopped
        })
    }

    async fn force_clean(&self) -> Result<(), DaemonError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    fn process_pattern(&self) -> &str {
        "poppy-services"
    }
}

/// Command runner that logs instead of executing
///
/// The updater is the exception: it writes a fake install transcript.
pub struct DummyRunner {
    update_program: String,
    update_log: PathBuf,
    step_delay: Duration,
}

impl DummyRunner {
    pub fn new(update_program: &str, update_log: impl Into<PathBuf>) -> Self {
        Self {
            update_program: update_program.to_string(),
            update_log: update_log.into(),
            step_delay: Duration::from_millis(500),
        }
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    async fn fake_install(&self) -> Result<(), CommandError> {
        let log_err = |source| CommandError::LogFile {
            path: self.update_log.clone(),
            source,
        };

        for _ in 0..5 {
            append_log(&self.update_log, "Faking some install...").map_err(log_err)?;
            tokio::time::sleep(self.step_delay).await;
        }
        append_log(&self.update_log, "Your robot is now up-to-date!").map_err(log_err)?;
        Ok(())
    }
}

#[async_trait]
impl CommandRunner for DummyRunner {
    async fn run(&self, command: &ExternalCommand) -> Result<(), CommandError> {
        if command.program == self.update_program {
            return self.fake_install().await;
        }
        info!("[test mode] would run: {}", command);
        Ok(())
    }

    async fn run_logged(&self, command: &ExternalCommand, log: &Path) -> Result<(), CommandError> {
        info!("[test mode] would run: {}", command);
        write_log(log, &format!("[test mode] {}\n", command)).map_err(|source| CommandError::LogFile {
            path: log.to_path_buf(),
            source,
        })
    }
}

/// Motor service serving a fixed motor list
pub struct DummyMotors {
    motors: Vec<String>,
}

impl DummyMotors {
    pub fn new(motors: Vec<String>) -> Self {
        Self { motors }
    }
}

#[async_trait]
impl MotorApi for DummyMotors {
    async fn list_motors(&self) -> Result<Vec<String>, MotorError> {
        Ok(self.motors.clone())
    }

    async fn set_register(
        &self,
        motor: &str,
        register: &str,
        value: serde_json::Value,
    ) -> Result<(), MotorError> {
        info!("[test mode] {}.{} = {}", motor, register, value);
        Ok(())
    }
}

/// No interactive sessions to evict
pub struct NoSessions;

#[async_trait]
impl SessionManager for NoSessions {
    async fn evict_all(&self) -> Result<usize, SessionError> {
        Ok(0)
    }
}
