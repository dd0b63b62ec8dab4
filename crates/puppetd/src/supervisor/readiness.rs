//! Daemon readiness check
//!
//! The daemon is ready once its log carries the startup banner and the motor
//! API answers. Any failure along the way reads as "not ready".

use super::Supervisor;
use puppet_common::logs::read_log_or;
use reqwest::StatusCode;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

pub(super) const DEFAULT_READY_URL: &str = "http://localhost:6969/motors/get/positions";

/// Printed by the daemon once its HTTP server is bound
const STARTED_BANNER: &str = "SnapRobotServer is now running on";

const READY_TIMEOUT: Duration = Duration::from_secs(3);

impl Supervisor {
    /// Whether the daemon has finished starting and serves motor requests
    pub async fn ready(&self) -> bool {
        let config = match self.store.load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Cannot load config for readiness check: {}", e);
                return false;
            }
        };

        let log = read_log_or(&PathBuf::from(&config.info.logfile), "");
        if !log.contains(STARTED_BANNER) {
            debug!("Daemon log has no startup banner yet");
            return false;
        }

        let client = match reqwest::Client::builder().timeout(READY_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                warn!("Cannot build readiness client: {}", e);
                return false;
            }
        };

        match client.get(&self.settings.ready_url).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                debug!("Daemon not answering on {}: {}", self.settings.ready_url, e);
                false
            }
        }
    }
}
