//! Robot daemon supervisor
//!
//! Owns the daemon lifecycle, the config-change dispatch and the long
//! workflows (self-update, shutdown, motor reconfiguration, network).
//!
//! Start, stop and restart share one lifecycle lock, so overlapping requests
//! (including restarts fired by config handlers) never interleave. The
//! self-update and motor reconfiguration hold that lock for their whole run.

mod handlers;
mod network;
mod power;
mod readiness;
mod reconfigure;
mod update;

pub use handlers::ConfigKey;
pub use network::HotspotSettings;
pub use update::{UpdateFlag, UpdateGuard, UpdateOutcome};

use crate::commands::{known, run_best_effort, CommandRunner, ExternalCommand};
use crate::daemon::{DaemonController, DaemonStatus};
use crate::error::{Result, SupervisorError};
use crate::motors::MotorApi;
use crate::sessions::SessionManager;
use puppet_common::{Config, ConfigError, ConfigStore, ConfigValue};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// External collaborators of the supervisor
#[derive(Clone)]
pub struct Services {
    pub runner: Arc<dyn CommandRunner>,
    pub motors: Arc<dyn MotorApi>,
    pub sessions: Arc<dyn SessionManager>,
}

/// Tunables that do not live in the config file
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Delay between a halt/reboot request and the actual command
    pub halt_delay: Duration,
    /// Where hotspot settings are written before being moved into place
    pub hotspot_staging: PathBuf,
    pub update_command: ExternalCommand,
    /// Endpoint that answers 200 once the daemon serves requests
    pub ready_url: String,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            halt_delay: Duration::from_secs(5),
            hotspot_staging: PathBuf::from("/tmp/hotspot.conf"),
            update_command: known::self_update(),
            ready_url: readiness::DEFAULT_READY_URL.to_string(),
        }
    }
}

pub struct Supervisor {
    store: ConfigStore,
    daemon: Arc<dyn DaemonController>,
    services: Services,
    settings: SupervisorSettings,
    lifecycle: Mutex<()>,
    update_flag: UpdateFlag,
}

impl Supervisor {
    pub fn new(
        store: ConfigStore,
        daemon: Arc<dyn DaemonController>,
        services: Services,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            store,
            daemon,
            services,
            settings,
            lifecycle: Mutex::new(()),
            update_flag: UpdateFlag::default(),
        }
    }

    /// Build a supervisor, recovering from a previous run first
    ///
    /// A PID file left on disk belongs to a daemon this supervisor never
    /// started, so it is force-cleaned.
    pub async fn open(
        store: ConfigStore,
        daemon: Arc<dyn DaemonController>,
        services: Services,
        settings: SupervisorSettings,
    ) -> Arc<Self> {
        let supervisor = Arc::new(Self::new(store, daemon, services, settings));

        let pid_file = supervisor.daemon.pid_file().to_path_buf();
        if pid_file.exists() {
            info!("Stale PID file {} found, force cleaning", pid_file.display());
            if let Err(e) = supervisor.force_clean().await {
                warn!("Force clean at startup failed: {}", e);
            }
        }

        supervisor
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Fresh copy of the configuration
    pub fn config(&self) -> Result<Config> {
        Ok(self.store.load()?)
    }

    pub async fn status(&self) -> Result<DaemonStatus> {
        Ok(self.daemon.status().await?)
    }

    /// Whether the daemon is up; status failures count as "not running"
    pub async fn running(&self) -> bool {
        match self.daemon.status().await {
            Ok(status) => status == DaemonStatus::Running,
            Err(e) => {
                warn!("Daemon status check failed: {}", e);
                false
            }
        }
    }

    pub async fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.start_unlocked().await
    }

    pub async fn stop(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_unlocked().await
    }

    /// Stop if running, then start
    pub async fn restart(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.running().await {
            self.stop_unlocked().await?;
        }
        self.start_unlocked().await
    }

    pub async fn force_clean(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.force_clean_unlocked().await
    }

    async fn start_unlocked(&self) -> Result<()> {
        match self.services.sessions.evict_all().await {
            Ok(count) => debug!("{} interactive sessions evicted before start", count),
            Err(e) => warn!("Could not evict interactive sessions: {}", e),
        }

        self.daemon.start().await?;
        Ok(())
    }

    async fn stop_unlocked(&self) -> Result<()> {
        if let Err(e) = self.daemon.stop().await {
            warn!("Graceful stop failed ({}), force cleaning", e);
            self.force_clean_unlocked().await?;
        }
        Ok(())
    }

    async fn force_clean_unlocked(&self) -> Result<()> {
        self.daemon.force_clean().await?;
        let pattern = self.daemon.process_pattern();
        run_best_effort(self.services.runner.as_ref(), &known::kill_matching(pattern)).await;
        Ok(())
    }

    /// Write a config value and fire its handler if the value changed
    ///
    /// Returns whether the stored value changed. The handler runs after the
    /// new value is persisted.
    pub async fn update_config(&self, path: &str, value: impl Into<ConfigValue>) -> Result<bool> {
        let change = self.store.replace(path, value)?;
        if !change.changed() {
            debug!("Config {} unchanged", path);
            return Ok(false);
        }

        info!("Config {} changed: {} -> {}", path, change.previous, change.current);

        if let Some(key) = ConfigKey::from_path(path) {
            self.on_change(key, &change.current).await?;
        }
        Ok(true)
    }

    async fn on_change(&self, key: ConfigKey, value: &ConfigValue) -> Result<()> {
        let invalid = |expected| {
            SupervisorError::Config(ConfigError::InvalidValue {
                path: key.path().to_string(),
                expected,
            })
        };

        match key {
            ConfigKey::Camera => self.restart().await,
            ConfigKey::Name => {
                let name = value.as_str().ok_or_else(|| invalid("a string"))?;
                self.change_hostname(name).await
            }
            ConfigKey::Motors => {
                let motor = value.as_str().ok_or_else(|| invalid("a string"))?;
                self.configure_motors(motor).await
            }
            ConfigKey::HotspotStart => {
                if value.as_bool().ok_or_else(|| invalid("a boolean"))? {
                    self.enable_hotspot().await
                } else {
                    self.disable_hotspot().await
                }
            }
        }
    }

    fn runner(&self) -> &dyn CommandRunner {
        self.services.runner.as_ref()
    }
}
