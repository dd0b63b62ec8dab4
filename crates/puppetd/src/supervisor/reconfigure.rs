//! Motor reconfiguration workflow

use super::Supervisor;
use crate::commands::known;
use crate::error::Result;
use crate::motors::{creature_short_name, motor_list};
use std::path::PathBuf;
use tracing::{info, warn};

impl Supervisor {
    /// Motors the configured creature supports, `[""]` if it is unknown
    pub fn robot_motor_list(&self) -> Result<Vec<String>> {
        let config = self.store.load()?;
        Ok(motor_list(&config.robot.creature))
    }

    /// stop -> configure tool for `motor` -> start
    ///
    /// The tool's output goes to the configure log, which is the only record
    /// of success; the daemon is started again whatever the stop or the tool
    /// returned.
    pub async fn configure_motors(&self, motor: &str) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        let config = self.store.load()?;

        let supported = motor_list(&config.robot.creature);
        if !supported.iter().any(|m| m == motor) {
            warn!(
                "Motor '{}' is not listed for creature {}",
                motor, config.robot.creature
            );
        }

        if let Err(e) = self.stop_unlocked().await {
            warn!("Daemon did not stop cleanly, configuring anyway: {}", e);
        }

        let creature = creature_short_name(&config.robot.creature);
        let log = PathBuf::from(&config.poppy_configure.logfile);
        let command = known::configure_motor(creature, motor);
        info!("Configuring motor {} of {}", motor, creature);

        if let Err(e) = self.runner().run_logged(&command, &log).await {
            warn!("Motor configuration failed, see {}: {}", log.display(), e);
        }

        self.start_unlocked().await
    }
}
