//! Local motor HTTP service and the creature motor registry

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Motor service on the robot
pub const DEFAULT_MOTOR_URL: &str = "http://localhost:8080";

/// Namespace prefix of creature identifiers
pub const CREATURE_PREFIX: &str = "poppy-";

#[derive(Error, Debug)]
pub enum MotorError {
    #[error("Motor service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Motor service returned {0}")]
    Status(reqwest::StatusCode),
}

/// Access to the motor registers exposed by the running daemon
#[async_trait]
pub trait MotorApi: Send + Sync {
    /// Names of the attached motors
    async fn list_motors(&self) -> Result<Vec<String>, MotorError>;

    /// Write a register, e.g. `compliant = true`
    async fn set_register(
        &self,
        motor: &str,
        register: &str,
        value: serde_json::Value,
    ) -> Result<(), MotorError>;
}

#[derive(Debug, Deserialize)]
struct MotorList {
    motors: Vec<String>,
}

/// JSON-over-HTTP motor service client
pub struct HttpMotorApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMotorApi {
    pub fn new(base_url: &str) -> Result<Self, MotorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MotorApi for HttpMotorApi {
    async fn list_motors(&self) -> Result<Vec<String>, MotorError> {
        let url = format!("{}/motor/list.json", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(MotorError::Status(response.status()));
        }
        let list: MotorList = response.json().await?;
        Ok(list.motors)
    }

    async fn set_register(
        &self,
        motor: &str,
        register: &str,
        value: serde_json::Value,
    ) -> Result<(), MotorError> {
        let url = format!(
            "{}/motor/{}/register/{}/value.json",
            self.base_url, motor, register
        );
        debug!("POST {} <- {}", url, value);
        let response = self.client.post(&url).json(&value).send().await?;
        if !response.status().is_success() {
            return Err(MotorError::Status(response.status()));
        }
        Ok(())
    }
}

const ERGO_JR_MOTORS: &[&str] = &["m1", "m2", "m3", "m4", "m5", "m6"];

const TORSO_MOTORS: &[&str] = &[
    "abs_x", "abs_y", "abs_z", "bust_x", "bust_y", "head_y", "head_z",
    "l_arm_z", "l_elbow_y", "l_shoulder_x", "l_shoulder_y",
    "r_arm_z", "r_elbow_y", "r_shoulder_x", "r_shoulder_y",
];

const LEG_MOTORS: &[&str] = &[
    "l_ankle_y", "l_hip_x", "l_hip_y", "l_hip_z", "l_knee_y",
    "r_ankle_y", "r_hip_x", "r_hip_y", "r_hip_z", "r_knee_y",
];

/// Strip the namespace prefix: `poppy-ergo-jr` -> `ergo-jr`
pub fn creature_short_name(creature: &str) -> &str {
    creature.strip_prefix(CREATURE_PREFIX).unwrap_or(creature)
}

/// Sorted motor names for a creature, `[""]` when the creature is unknown
pub fn motor_list(creature: &str) -> Vec<String> {
    let motors: Vec<&str> = match creature.strip_prefix(CREATURE_PREFIX) {
        Some("ergo-jr") => ERGO_JR_MOTORS.to_vec(),
        Some("torso") => TORSO_MOTORS.to_vec(),
        Some("humanoid") => TORSO_MOTORS.iter().chain(LEG_MOTORS).copied().collect(),
        _ => return vec![String::new()],
    };

    let mut motors: Vec<String> = motors.into_iter().map(String::from).collect();
    motors.sort();
    motors
}
