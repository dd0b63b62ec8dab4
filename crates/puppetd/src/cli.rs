//! Command-line argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Supervisor for the robot control daemon
#[derive(Parser, Debug)]
#[command(name = "puppetd")]
#[command(about = "Supervises the robot daemon and serves its control API", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: ~/.poppy_config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// PID file of the supervised daemon
    #[arg(long, global = true, default_value = "/tmp/puppet-master-pid.lock")]
    pub pid_file: PathBuf,

    /// HTTP port of the control API
    #[arg(long, default_value_t = 2280)]
    pub port: u16,

    /// Program launched as the robot daemon
    #[arg(long, global = true, default_value = "poppy-services")]
    pub daemon_program: String,

    /// Test mode: throwaway config, simulated daemon, no system commands
    #[arg(long, global = true, requires = "creature")]
    pub test: bool,

    /// Creature used to build the test-mode configuration
    #[arg(long, global = true)]
    pub creature: Option<String>,

    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Subcommand (serves the API when omitted)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP control API
    Serve,
    /// Start the daemon and exit
    Start,
    /// Stop the daemon and exit
    Stop,
    /// Print the daemon status
    Status,
    /// Kill every trace of the daemon
    ForceClean,
}
