//! Hostname and hotspot management
//!
//! The hotspot is driven by a small `key=value` file owned by root. New
//! settings are staged in a writable location and moved into place with
//! `sudo`. Disabling moves the file aside to `<file>.backup`; enabling
//! restores that backup, or writes defaults when there is none.

use super::Supervisor;
use crate::commands::{known, run_best_effort};
use crate::error::{Result, SupervisorError};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Contents of the hotspot file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HotspotSettings {
    pub ssid: String,
    pub passphrase: String,
    pub hide_hostname: bool,
}

impl HotspotSettings {
    pub fn new(ssid: &str, passphrase: &str) -> Self {
        Self {
            ssid: ssid.to_string(),
            passphrase: passphrase.to_string(),
            hide_hostname: false,
        }
    }

    pub fn render(&self) -> String {
        format!(
            "ssid={}\npassphrase={}\nhide_hostname={}\n",
            self.ssid,
            self.passphrase,
            u8::from(self.hide_hostname)
        )
    }

    /// Parse the file; missing keys come back empty
    pub fn parse(content: &str) -> Self {
        let mut settings = Self::new("", "");
        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key.trim() {
                "ssid" => settings.ssid = value.trim().to_string(),
                "passphrase" => settings.passphrase = value.trim().to_string(),
                "hide_hostname" => {
                    settings.hide_hostname = matches!(value.trim(), "1" | "true")
                }
                _ => {}
            }
        }
        settings
    }
}

fn backup_path(conf: &Path) -> PathBuf {
    let mut name = conf.as_os_str().to_owned();
    name.push(".backup");
    PathBuf::from(name)
}

impl Supervisor {
    /// Hostname change commands, then a daemon restart to rebind
    ///
    /// Each command is fire-and-forget.
    pub async fn change_hostname(&self, name: &str) -> Result<()> {
        info!("Changing hostname to {}", name);
        for command in known::hostname_change(name) {
            run_best_effort(self.runner(), &command).await;
        }
        self.restart().await
    }

    /// Restart networking and the hotspot service
    pub async fn restart_network(&self) -> Result<()> {
        let config = self.store.load()?;
        run_best_effort(self.runner(), &known::restart_service("networking.service")).await;
        run_best_effort(self.runner(), &known::restart_service(&config.wifi.hostspot_service)).await;
        Ok(())
    }

    /// Stage the hotspot file, move it into place and restart the service
    pub async fn set_hotspot_configuration(&self, settings: &HotspotSettings) -> Result<()> {
        let config = self.store.load()?;
        let staging = &self.settings.hotspot_staging;

        fs::write(staging, settings.render()).map_err(|e| SupervisorError::io(staging, e))?;

        let staging = staging.to_string_lossy();
        self.runner()
            .run(&known::move_file(&staging, &config.wifi.hostspot_conf_file))
            .await?;
        run_best_effort(self.runner(), &known::restart_service(&config.wifi.hostspot_service)).await;

        info!("Hotspot configured for ssid '{}'", settings.ssid);
        Ok(())
    }

    /// Settings of the active hotspot, `None` when it is disabled
    pub fn hotspot_configuration(&self) -> Result<Option<HotspotSettings>> {
        let config = self.store.load()?;
        let conf = Path::new(&config.wifi.hostspot_conf_file);
        match fs::read_to_string(conf) {
            Ok(content) => Ok(Some(HotspotSettings::parse(&content))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SupervisorError::io(conf, e)),
        }
    }

    pub async fn disable_hotspot(&self) -> Result<()> {
        let config = self.store.load()?;
        let conf = Path::new(&config.wifi.hostspot_conf_file);
        if !conf.is_file() {
            info!("Hotspot already disabled");
            return Ok(());
        }

        let backup = backup_path(conf);
        self.runner()
            .run(&known::move_file(&conf.to_string_lossy(), &backup.to_string_lossy()))
            .await?;
        run_best_effort(self.runner(), &known::restart_service(&config.wifi.hostspot_service)).await;

        info!("Hotspot disabled");
        Ok(())
    }

    pub async fn enable_hotspot(&self) -> Result<()> {
        let config = self.store.load()?;
        let conf = Path::new(&config.wifi.hostspot_conf_file);
        let backup = backup_path(conf);

        if backup.is_file() {
            self.runner()
                .run(&known::move_file(&backup.to_string_lossy(), &conf.to_string_lossy()))
                .await?;
            run_best_effort(self.runner(), &known::restart_service(&config.wifi.hostspot_service)).await;
            info!("Hotspot restored from {}", backup.display());
        } else if conf.is_file() {
            info!("Hotspot already enabled");
        } else {
            let defaults = HotspotSettings::new(&config.wifi.default_ssid, &config.wifi.default_password);
            self.set_hotspot_configuration(&defaults).await?;
        }
        Ok(())
    }
}
