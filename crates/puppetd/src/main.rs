//! puppetd - robot daemon supervisor
//!
//! Recovers from a previous run, honours `robot.autoStart`, then serves the
//! control API. Subcommands run a single lifecycle operation instead.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use puppet_common::logs::write_log;
use puppet_common::{Config, ConfigStore};
use puppetd::commands::{known, SystemCommandRunner};
use puppetd::daemon::{DaemonController, PidFileDaemon};
use puppetd::dummy::{DummyDaemon, DummyMotors, DummyRunner, NoSessions};
use puppetd::motors::{motor_list, HttpMotorApi, DEFAULT_MOTOR_URL};
use puppetd::server::{self, AppState};
use puppetd::sessions::{NotebookSessions, DEFAULT_SESSION_URL};
use puppetd::{Services, Supervisor, SupervisorSettings};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const TEST_CONFIG: &str = "/tmp/poppy_config.yaml";
const TEST_UPDATE_LOG: &str = "/tmp/update.log";
const AUTO_START_DISABLED: &str =
    "Auto-start API disable ! \nShow configuration page for enable auto-start, or start manually.";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("puppetd v{} starting", env!("CARGO_PKG_VERSION"));

    let config_path = config_path(&cli)?;
    let store = ConfigStore::new(&config_path);
    if cli.test {
        prepare_test_config(&store, cli.creature.as_deref())?;
    }
    let config = store
        .load()
        .with_context(|| format!("Cannot load config {}", config_path.display()))?;

    let (daemon, services) = collaborators(&cli, &config_path, &config)?;
    let settings = SupervisorSettings::default();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let supervisor = Supervisor::open(store, daemon, services, settings).await;
            bootstrap(&supervisor, &config).await;
            server::run(AppState::new(supervisor), cli.port).await
        }
        // One-shot commands leave an existing PID file alone
        command => {
            let supervisor = Supervisor::new(store, daemon, services, settings);
            one_shot(&supervisor, command).await
        }
    }
}

fn config_path(cli: &Cli) -> Result<PathBuf> {
    if cli.test {
        return Ok(PathBuf::from(TEST_CONFIG));
    }
    if let Some(path) = &cli.config {
        return Ok(path.clone());
    }
    let home = dirs::home_dir().context("Cannot locate the home directory")?;
    Ok(home.join(".poppy_config.yaml"))
}

/// Create the throwaway config and point it at the simulated collaborators
fn prepare_test_config(store: &ConfigStore, creature: Option<&str>) -> Result<()> {
    if !store.path().exists() {
        let creature = creature.context("--creature is required in test mode")?;
        info!("Creating test config for {} at {}", creature, store.path().display());
        store.create(&Config::for_creature(creature))?;
    }

    let mut config = store.edit()?;
    config.robot.use_dummy = true;
    config.update.logfile = TEST_UPDATE_LOG.to_string();
    config.commit()?;
    Ok(())
}

fn collaborators(
    cli: &Cli,
    config_path: &Path,
    config: &Config,
) -> Result<(Arc<dyn DaemonController>, Services)> {
    if config.robot.use_dummy {
        info!("Using simulated daemon and commands");
        let update = known::self_update();
        let daemon: Arc<dyn DaemonController> =
            Arc::new(DummyDaemon::new(&config.info.logfile, &cli.pid_file));
        let services = Services {
            runner: Arc::new(DummyRunner::new(&update.program, &config.update.logfile)),
            motors: Arc::new(DummyMotors::new(motor_list(&config.robot.creature))),
            sessions: Arc::new(NoSessions),
        };
        return Ok((daemon, services));
    }

    let daemon: Arc<dyn DaemonController> = Arc::new(PidFileDaemon::for_config(
        &cli.daemon_program,
        config_path,
        &cli.pid_file,
        &config.info.logfile,
    ));
    let services = Services {
        runner: Arc::new(SystemCommandRunner::new()),
        motors: Arc::new(HttpMotorApi::new(DEFAULT_MOTOR_URL).context("Cannot build motor client")?),
        sessions: Arc::new(
            NotebookSessions::new(DEFAULT_SESSION_URL).context("Cannot build session client")?,
        ),
    };
    Ok((daemon, services))
}

/// Start the daemon if configured to, otherwise leave a note in its log
async fn bootstrap(supervisor: &Supervisor, config: &Config) {
    if config.robot.auto_start {
        info!("Auto-start enabled, starting daemon");
        if let Err(e) = supervisor.start().await {
            warn!("Auto-start failed: {}", e);
        }
        return;
    }

    let log = Path::new(&config.info.logfile);
    if let Err(e) = write_log(log, AUTO_START_DISABLED) {
        warn!("Cannot write {}: {}", log.display(), e);
    }
}

async fn one_shot(supervisor: &Supervisor, command: Commands) -> Result<()> {
    match command {
        Commands::Start => supervisor.start().await.context("Start failed"),
        Commands::Stop => supervisor.stop().await.context("Stop failed"),
        Commands::ForceClean => supervisor.force_clean().await.context("Force clean failed"),
        Commands::Status | Commands::Serve => {
            let status = supervisor.status().await.context("Status check failed")?;
            println!("{}", status);
            Ok(())
        }
    }
}
