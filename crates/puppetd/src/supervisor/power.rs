//! Shutdown and reboot
//!
//! Motors are relaxed first so the robot does not collapse under torque when
//! power goes away. The halt itself is delayed on a background task, giving
//! the HTTP response that asked for it time to reach the user.

use super::Supervisor;
use crate::commands::{known, run_best_effort, ExternalCommand};
use crate::task::BackgroundTask;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

impl Supervisor {
    /// Relax motors, then halt the machine after the configured delay
    pub async fn shutdown(&self) -> BackgroundTask<()> {
        self.relax_motors().await;
        self.schedule_power_command("delayed-halt", known::halt())
    }

    /// Relax motors, then reboot the machine after the configured delay
    pub async fn reboot(&self) -> BackgroundTask<()> {
        self.relax_motors().await;
        self.schedule_power_command("delayed-reboot", known::reboot())
    }

    /// Set every attached motor compliant; failures are ignored
    async fn relax_motors(&self) {
        let motors = match self.services.motors.list_motors().await {
            Ok(motors) => motors,
            Err(e) => {
                warn!("Cannot list motors before power-off: {}", e);
                return;
            }
        };

        for motor in &motors {
            if let Err(e) = self
                .services
                .motors
                .set_register(motor, "compliant", json!(true))
                .await
            {
                warn!("Cannot relax motor {}: {}", motor, e);
            }
        }
        info!("Relaxed {} motors", motors.len());
    }

    fn schedule_power_command(&self, name: &'static str, command: ExternalCommand) -> BackgroundTask<()> {
        let runner = Arc::clone(&self.services.runner);
        let delay = self.settings.halt_delay;
        info!("'{}' scheduled in {:?}", command, delay);

        BackgroundTask::spawn(name, async move {
            tokio::time::sleep(delay).await;
            run_best_effort(runner.as_ref(), &command).await;
        })
    }
}
