//! Recording fakes for supervisor integration tests
//!
//! Every collaborator appends to one shared journal, so tests can assert on
//! the order of side effects across daemon, commands and motors.

#![allow(dead_code)]

use async_trait::async_trait;
use puppet_common::{Config, ConfigStore};
use puppetd::commands::{CommandError, CommandRunner, ExternalCommand};
use puppetd::daemon::{DaemonController, DaemonError, DaemonStatus};
use puppetd::motors::{MotorApi, MotorError};
use puppetd::sessions::{SessionError, SessionManager};
use puppetd::{Services, Supervisor, SupervisorSettings};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| e.as_str() == event).count()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    pub fn contains_prefix(&self, prefix: &str) -> bool {
        self.events().iter().any(|e| e.starts_with(prefix))
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

pub struct FakeDaemon {
    journal: Journal,
    pid_file: PathBuf,
    running: AtomicBool,
    pub fail_start: AtomicBool,
    pub fail_stop: AtomicBool,
    pub fail_force_clean: AtomicBool,
    start_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

#[async_trait]
impl DaemonController for FakeDaemon {
    async fn start(&self) -> Result<(), DaemonError> {
        self.journal.record("daemon.start");
        self.enter();
        let delay = *self.start_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        self.leave();

        if self.fail_start.load(Ordering::SeqCst) {
            return Err(DaemonError::Start("refused".into()));
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), DaemonError> {
        self.journal.record("daemon.stop");
        self.enter();
        tokio::task::yield_now().await;
        self.leave();

        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(DaemonError::Stop("timed out".into()));
        }
        self.running.store(false, Ordering::SeqCst);
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
        self.journal.record("daemon.force_clean");
        if self.fail_force_clean.load(Ordering::SeqCst) {
            return Err(DaemonError::ForceClean("process table unavailable".into()));
        }
        let _ = fs::remove_file(&self.pid_file);
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

impl FakeDaemon {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_start_delay(&self, delay: Duration) {
        *self.start_delay.lock().unwrap() = delay;
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Records commands; `sudo mv` really moves files so hotspot flows work
pub struct FakeRunner {
    journal: Journal,
    failing: Mutex<Vec<String>>,
    update_delay: Mutex<Duration>,
    pub update_runs: AtomicUsize,
}

impl FakeRunner {
    /// Make every command whose program is `program` exit non-zero
    pub fn fail(&self, program: &str) {
        self.failing.lock().unwrap().push(program.to_string());
    }

    pub fn set_update_delay(&self, delay: Duration) {
        *self.update_delay.lock().unwrap() = delay;
    }

    fn fails(&self, command: &ExternalCommand) -> bool {
        let program = match command.program.as_str() {
            "sudo" => command.args.first().map(String::as_str).unwrap_or(""),
            other => other,
        };
        self.failing.lock().unwrap().iter().any(|p| p == program)
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, command: &ExternalCommand) -> Result<(), CommandError> {
        self.journal.record(format!("run {}", command));

        if command.program == "poppy-update" {
            self.update_runs.fetch_add(1, Ordering::SeqCst);
            let delay = *self.update_delay.lock().unwrap();
            tokio::time::sleep(delay).await;
        }

        if self.fails(command) {
            return Err(CommandError::NonZeroExit {
                command: command.to_string(),
                code: Some(1),
            });
        }

        if command.program == "sudo" && command.args.first().map(String::as_str) == Some("mv") {
            fs::rename(&command.args[1], &command.args[2]).map_err(|source| CommandError::Spawn {
                command: command.to_string(),
                source,
            })?;
        }
        Ok(())
    }

    async fn run_logged(&self, command: &ExternalCommand, log: &Path) -> Result<(), CommandError> {
        self.journal.record(format!("run_logged {}", command));
        fs::write(log, format!("{}\n", command)).map_err(|source| CommandError::LogFile {
            path: log.to_path_buf(),
            source,
        })?;
        if self.fails(command) {
            return Err(CommandError::NonZeroExit {
                command: command.to_string(),
                code: Some(2),
            });
        }
        Ok(())
    }
}

pub struct FakeMotors {
    journal: Journal,
    motors: Vec<String>,
    pub unreachable: AtomicBool,
}

#[async_trait]
impl MotorApi for FakeMotors {
    async fn list_motors(&self) -> Result<Vec<String>, MotorError> {
        self.journal.record("motors.list");
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(MotorError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        }
        Ok(self.motors.clone())
    }

    async fn set_register(
        &self,
        motor: &str,
        register: &str,
        value: serde_json::Value,
    ) -> Result<(), MotorError> {
        self.journal
            .record(format!("motors.set {}.{}={}", motor, register, value));
        Ok(())
    }
}

pub struct FakeSessions {
    journal: Journal,
}

#[async_trait]
impl SessionManager for FakeSessions {
    async fn evict_all(&self) -> Result<usize, SessionError> {
        self.journal.record("sessions.evict");
        Ok(0)
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub journal: Journal,
    pub daemon: Arc<FakeDaemon>,
    pub runner: Arc<FakeRunner>,
    pub motors: Arc<FakeMotors>,
    pub supervisor: Arc<Supervisor>,
}

pub struct HarnessBuilder {
    config: Config,
    stale_pid: bool,
    halt_delay: Duration,
    ready_url: String,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::for_creature("poppy-ergo-jr"),
            stale_pid: false,
            halt_delay: Duration::from_millis(50),
            // Discard port: nothing answers there
            ready_url: "http://127.0.0.1:9/motors/get/positions".to_string(),
        }
    }

    pub fn config(mut self, edit: impl FnOnce(&mut Config)) -> Self {
        edit(&mut self.config);
        self
    }

    pub fn stale_pid(mut self) -> Self {
        self.stale_pid = true;
        self
    }

    pub fn halt_delay(mut self, delay: Duration) -> Self {
        self.halt_delay = delay;
        self
    }

    pub fn ready_url(mut self, url: &str) -> Self {
        self.ready_url = url.to_string();
        self
    }

    pub async fn build(self) -> Harness {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let journal = Journal::default();

        let mut config = self.config;
        config.info.logfile = path_str(&root.join("daemon.log"));
        config.update.logfile = path_str(&root.join("update.log"));
        config.poppy_configure.logfile = path_str(&root.join("configure.log"));
        config.wifi.hostspot_conf_file = path_str(&root.join("hotspot.conf"));

        let store = ConfigStore::new(root.join("poppy_config.yaml"));
        store.create(&config).unwrap();

        let pid_file = root.join("daemon.pid");
        if self.stale_pid {
            fs::write(&pid_file, "4242\n").unwrap();
        }

        let daemon = Arc::new(FakeDaemon {
            journal: journal.clone(),
            pid_file,
            running: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            fail_force_clean: AtomicBool::new(false),
            start_delay: Mutex::new(Duration::ZERO),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });
        let runner = Arc::new(FakeRunner {
            journal: journal.clone(),
            failing: Mutex::new(Vec::new()),
            update_delay: Mutex::new(Duration::ZERO),
            update_runs: AtomicUsize::new(0),
        });
        let motors = Arc::new(FakeMotors {
            journal: journal.clone(),
            motors: vec!["m1".into(), "m2".into()],
            unreachable: AtomicBool::new(false),
        });
        let sessions = Arc::new(FakeSessions {
            journal: journal.clone(),
        });

        let services = Services {
            runner: runner.clone(),
            motors: motors.clone(),
            sessions,
        };
        let settings = SupervisorSettings {
            halt_delay: self.halt_delay,
            hotspot_staging: root.join("hotspot.staging"),
            ready_url: self.ready_url,
            ..SupervisorSettings::default()
        };

        let supervisor = Supervisor::open(store, daemon.clone(), services, settings).await;

        Harness {
            dir,
            journal,
            daemon,
            runner,
            motors,
            supervisor,
        }
    }
}

impl Harness {
    pub async fn new() -> Self {
        HarnessBuilder::new().build().await
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
