//! External command execution
//!
//! OS-level tools (hostname change, service restarts, halt, the motor
//! configure tool, the updater) are opaque: only their exit status is
//! observable, plus redirected output for the tools that log.
//!
//! Production code uses [`SystemCommandRunner`]. Test mode and tests swap in
//! other [`CommandRunner`] implementations.

use async_trait::async_trait;
use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Program plus arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ExternalCommand {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Same command run through `sudo`
    pub fn sudo<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut full = vec![program.to_string()];
        full.extend(args.into_iter().map(Into::into));
        Self {
            program: "sudo".to_string(),
            args: full,
        }
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Well-known commands used by the supervisor workflows
pub mod known {
    use super::ExternalCommand;

    pub fn restart_service(service: &str) -> ExternalCommand {
        ExternalCommand::sudo("systemctl", ["restart", service])
    }

    pub fn hostname_change(name: &str) -> Vec<ExternalCommand> {
        vec![
            ExternalCommand::sudo("raspi-config", ["--change-hostname", name]),
            ExternalCommand::sudo("hostnamectl", ["set-hostname", name]),
            restart_service("networking.service"),
            restart_service("avahi-daemon.service"),
        ]
    }

    pub fn kill_matching(pattern: &str) -> ExternalCommand {
        ExternalCommand::new("pkill", ["-f", pattern])
    }

    pub fn halt() -> ExternalCommand {
        ExternalCommand::sudo("halt", Vec::<String>::new())
    }

    pub fn reboot() -> ExternalCommand {
        ExternalCommand::sudo("reboot", Vec::<String>::new())
    }

    pub fn self_update() -> ExternalCommand {
        ExternalCommand::new("poppy-update", Vec::<String>::new())
    }

    pub fn configure_motor(creature: &str, motor: &str) -> ExternalCommand {
        ExternalCommand::new("poppy-configure", [creature, motor])
    }

    pub fn move_file(from: &str, to: &str) -> ExternalCommand {
        ExternalCommand::sudo("mv", [from, to])
    }
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to launch '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("'{command}' exited with status {code:?}")]
    NonZeroExit { command: String, code: Option<i32> },

    #[error("Cannot open command log {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Runs external commands to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run and wait; non-zero exit is an error
    async fn run(&self, command: &ExternalCommand) -> Result<(), CommandError>;

    /// Run with stdout and stderr redirected into `log`
    async fn run_logged(&self, command: &ExternalCommand, log: &Path) -> Result<(), CommandError>;
}

/// Run a command whose failure must not stop the workflow
pub async fn run_best_effort(runner: &dyn CommandRunner, command: &ExternalCommand) -> bool {
    match runner.run(command).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Ignoring failed command: {}", e);
            false
        }
    }
}

/// Runs commands on the host
#[derive(Debug, Default, Clone)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }

    async fn wait(command: &ExternalCommand, mut process: Command) -> Result<(), CommandError> {
        let status = process.status().await.map_err(|source| CommandError::Spawn {
            command: command.to_string(),
            source,
        })?;

        if status.success() {
            debug!("'{}' succeeded", command);
            Ok(())
        } else {
            Err(CommandError::NonZeroExit {
                command: command.to_string(),
                code: status.code(),
            })
        }
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, command: &ExternalCommand) -> Result<(), CommandError> {
        info!("Executing: {}", command);

        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        Self::wait(command, process).await
    }

    async fn run_logged(&self, command: &ExternalCommand, log: &Path) -> Result<(), CommandError> {
        info!("Executing: {} (output to {})", command, log.display());

        let open = || {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(log)
                .map_err(|source| CommandError::LogFile {
                    path: log.to_path_buf(),
                    source,
                })
        };
        let stdout = open()?;
        let stderr = stdout.try_clone().map_err(|source| CommandError::LogFile {
            path: log.to_path_buf(),
            source,
        })?;

        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        Self::wait(command, process).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sudo_display() {
        let cmd = known::restart_service("networking.service");
        assert_eq!(cmd.program, "sudo");
        assert_eq!(cmd.to_string(), "sudo systemctl restart networking.service");
        assert_eq!(known::halt().to_string(), "sudo halt");
    }

    #[test]
    fn test_hostname_change_order() {
        let cmds: Vec<String> = known::hostname_change("mybot")
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(
            cmds,
            vec![
                "sudo raspi-config --change-hostname mybot",
                "sudo hostnamectl set-hostname mybot",
                "sudo systemctl restart networking.service",
                "sudo systemctl restart avahi-daemon.service",
            ]
        );
    }

    #[tokio::test]
    async fn test_run_success_and_failure() {
        let runner = SystemCommandRunner::new();
        assert!(runner.run(&ExternalCommand::new("true", Vec::<String>::new())).await.is_ok());

        let err = runner
            .run(&ExternalCommand::new("false", Vec::<String>::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::NonZeroExit { code: Some(1), .. }));
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let runner = SystemCommandRunner::new();
        let err = runner
            .run(&ExternalCommand::new("definitely-not-a-real-tool-xyz", ["--help"]))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
        assert!(!run_best_effort(&runner, &ExternalCommand::new("false", Vec::<String>::new())).await);
    }

    #[tokio::test]
    async fn test_run_logged_captures_output() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("configure.log");
        let runner = SystemCommandRunner::new();

        let cmd = ExternalCommand::new("sh", ["-c", "echo motor ok; echo oops >&2; exit 3"]);
        let err = runner.run_logged(&cmd, &log).await.unwrap_err();
        assert!(matches!(err, CommandError::NonZeroExit { code: Some(3), .. }));

        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.contains("motor ok"));
        assert!(content.contains("oops"));
    }
}
