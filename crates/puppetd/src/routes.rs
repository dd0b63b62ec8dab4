//! API routes for puppetd
//!
//! Thin wrappers over [`Supervisor`](crate::supervisor::Supervisor)
//! operations. Long work (self-update, halt) is spawned and tracked in
//! [`AppState`]; everything else answers once the operation is done.

use crate::error::SupervisorError;
use crate::server::AppState;
use crate::supervisor::HotspotSettings;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use puppet_common::logs::{read_log, remove_log};
use puppet_common::{Config, ConfigError, ConfigValue};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

type AppStateArc = Arc<AppState>;
type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn reject(e: SupervisorError) -> (StatusCode, String) {
    let status = match &e {
        SupervisorError::Config(ConfigError::KeyNotFound(_)) => StatusCode::NOT_FOUND,
        SupervisorError::Config(ConfigError::InvalidValue { .. }) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Request failed: {}", e);
    }
    (status, e.to_string())
}

// ============================================================================
// Daemon Routes
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub updating: bool,
    pub uptime_secs: u64,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    pub running: bool,
    /// The daemon was already in the requested state
    pub already: bool,
}

pub fn daemon_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/start", post(start))
        .route("/api/stop", post(stop))
        .route("/api/restart", post(restart))
        .route("/api/ready", get(ready))
}

async fn status(State(state): State<AppStateArc>) -> Json<StatusResponse> {
    Json(StatusResponse {
        running: state.supervisor.running().await,
        updating: state.supervisor.is_updating(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        checked_at: Utc::now(),
    })
}

async fn start(State(state): State<AppStateArc>) -> ApiResult<LifecycleResponse> {
    let already = state.supervisor.running().await;
    if !already {
        state.supervisor.start().await.map_err(reject)?;
    }
    Ok(Json(LifecycleResponse {
        running: state.supervisor.running().await,
        already,
    }))
}

async fn stop(State(state): State<AppStateArc>) -> ApiResult<LifecycleResponse> {
    let already = !state.supervisor.running().await;
    if !already {
        state.supervisor.stop().await.map_err(reject)?;
    }
    Ok(Json(LifecycleResponse {
        running: state.supervisor.running().await,
        already,
    }))
}

async fn restart(State(state): State<AppStateArc>) -> ApiResult<LifecycleResponse> {
    state.supervisor.restart().await.map_err(reject)?;
    Ok(Json(LifecycleResponse {
        running: state.supervisor.running().await,
        already: false,
    }))
}

/// "OK" once the daemon serves motor requests, "KO" otherwise
async fn ready(State(state): State<AppStateArc>) -> &'static str {
    if state.supervisor.ready().await {
        "OK"
    } else {
        "KO"
    }
}

// ============================================================================
// Config Routes
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SetConfigRequest {
    pub path: String,
    pub value: ConfigValue,
}

#[derive(Debug, Serialize)]
pub struct SetConfigResponse {
    pub changed: bool,
}

pub fn config_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/config", get(get_config).post(set_config))
        .route("/api/config/:path", get(get_config_value))
}

async fn get_config(State(state): State<AppStateArc>) -> ApiResult<Config> {
    state.supervisor.config().map(Json).map_err(reject)
}

async fn get_config_value(
    State(state): State<AppStateArc>,
    Path(path): Path<String>,
) -> ApiResult<ConfigValue> {
    state
        .supervisor
        .store()
        .get(&path)
        .map(Json)
        .map_err(|e| reject(e.into()))
}

async fn set_config(
    State(state): State<AppStateArc>,
    Json(req): Json<SetConfigRequest>,
) -> ApiResult<SetConfigResponse> {
    let changed = state
        .supervisor
        .update_config(&req.path, req.value)
        .await
        .map_err(reject)?;
    Ok(Json(SetConfigResponse { changed }))
}

// ============================================================================
// Update Routes
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UpdateStartedResponse {
    pub started: bool,
}

#[derive(Debug, Serialize)]
pub struct UpdatingResponse {
    pub updating: bool,
    pub last_success: Option<bool>,
}

pub fn update_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/update", post(update))
        .route("/api/updating", get(updating))
}

async fn update(State(state): State<AppStateArc>) -> Json<UpdateStartedResponse> {
    let Some(task) = state.supervisor.spawn_self_update() else {
        return Json(UpdateStartedResponse { started: false });
    };

    state.track_update(task).await;
    info!("Self-update requested");
    Json(UpdateStartedResponse { started: true })
}

async fn updating(State(state): State<AppStateArc>) -> Json<UpdatingResponse> {
    let last_success = state.reap_update().await;
    Json(UpdatingResponse {
        updating: state.supervisor.is_updating(),
        last_success,
    })
}

// ============================================================================
// Power Routes
// ============================================================================

#[derive(Debug, Serialize)]
pub struct PowerResponse {
    pub scheduled: &'static str,
}

pub fn power_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/shutdown", post(shutdown))
        .route("/api/reboot", post(reboot))
}

async fn shutdown(State(state): State<AppStateArc>) -> Json<PowerResponse> {
    let task = state.supervisor.shutdown().await;
    *state.halt_task.lock().await = Some(task);
    Json(PowerResponse { scheduled: "halt" })
}

async fn reboot(State(state): State<AppStateArc>) -> Json<PowerResponse> {
    let task = state.supervisor.reboot().await;
    *state.halt_task.lock().await = Some(task);
    Json(PowerResponse { scheduled: "reboot" })
}

// ============================================================================
// Motor Routes
// ============================================================================

#[derive(Debug, Serialize)]
pub struct MotorListResponse {
    pub motors: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfigureMotorRequest {
    pub motor: String,
}

#[derive(Debug, Serialize)]
pub struct CameraResponse {
    pub camera: bool,
}

pub fn motor_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/motors", get(list_motors))
        .route("/api/motors/configure", post(configure_motor))
        .route("/api/camera/toggle", post(toggle_camera))
}

async fn list_motors(State(state): State<AppStateArc>) -> ApiResult<MotorListResponse> {
    let config = state.supervisor.config().map_err(reject)?;

    // A stale configure log would read as the outcome of the next run
    let log = PathBuf::from(&config.poppy_configure.logfile);
    if let Err(e) = remove_log(&log) {
        warn!("Cannot remove {}: {}", log.display(), e);
    }

    let motors = state.supervisor.robot_motor_list().map_err(reject)?;
    Ok(Json(MotorListResponse { motors }))
}

async fn configure_motor(
    State(state): State<AppStateArc>,
    Json(req): Json<ConfigureMotorRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let changed = state
        .supervisor
        .update_config("robot.motors", req.motor.as_str())
        .await
        .map_err(reject)?;

    // Same motor as last time: the handler did not fire, run it explicitly
    if !changed {
        state
            .supervisor
            .configure_motors(&req.motor)
            .await
            .map_err(reject)?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_camera(State(state): State<AppStateArc>) -> ApiResult<CameraResponse> {
    let config = state.supervisor.config().map_err(reject)?;
    let camera = !config.robot.camera;
    state
        .supervisor
        .update_config("robot.camera", camera)
        .await
        .map_err(reject)?;
    Ok(Json(CameraResponse { camera }))
}

// ============================================================================
// Network Routes
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HotspotResponse {
    pub enabled: bool,
    pub settings: Option<HotspotSettings>,
}

pub fn network_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/hotspot", get(hotspot))
        .route("/api/hotspot/enable", post(enable_hotspot))
        .route("/api/hotspot/disable", post(disable_hotspot))
        .route("/api/network/restart", post(restart_network))
}

async fn hotspot(State(state): State<AppStateArc>) -> ApiResult<HotspotResponse> {
    let settings = state.supervisor.hotspot_configuration().map_err(reject)?;
    Ok(Json(HotspotResponse {
        enabled: settings.is_some(),
        settings,
    }))
}

async fn enable_hotspot(State(state): State<AppStateArc>) -> ApiResult<SetConfigResponse> {
    let changed = state
        .supervisor
        .update_config("hotspot.start", true)
        .await
        .map_err(reject)?;
    if !changed {
        state.supervisor.enable_hotspot().await.map_err(reject)?;
    }
    Ok(Json(SetConfigResponse { changed }))
}

async fn disable_hotspot(State(state): State<AppStateArc>) -> ApiResult<SetConfigResponse> {
    let changed = state
        .supervisor
        .update_config("hotspot.start", false)
        .await
        .map_err(reject)?;
    if !changed {
        state.supervisor.disable_hotspot().await.map_err(reject)?;
    }
    Ok(Json(SetConfigResponse { changed }))
}

async fn restart_network(State(state): State<AppStateArc>) -> Result<StatusCode, (StatusCode, String)> {
    state.supervisor.restart_network().await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Log Routes
// ============================================================================

pub fn log_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/logs/:name", get(read_named_log))
        .route("/api/logs/virtual/:id", get(read_virtual_bot_log))
}

/// Plain-text workflow log; a missing file reads as the "no log" notice
async fn read_named_log(
    State(state): State<AppStateArc>,
    Path(name): Path<String>,
) -> Result<String, (StatusCode, String)> {
    let config = state.supervisor.config().map_err(reject)?;
    let path = match name.as_str() {
        "daemon" => config.info.logfile,
        "update" => config.update.logfile,
        "configure" => config.poppy_configure.logfile,
        other => {
            return Err((StatusCode::NOT_FOUND, format!("Unknown log '{}'", other)));
        }
    };
    Ok(read_log(&PathBuf::from(path)))
}

/// Log of one simulated robot instance, keyed by its numeric id
async fn read_virtual_bot_log(
    State(state): State<AppStateArc>,
    Path(id): Path<u32>,
) -> Result<String, (StatusCode, String)> {
    let config = state.supervisor.config().map_err(reject)?;
    Ok(read_log(&PathBuf::from(config.info.virtual_bot_log_for(id))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_maps_config_errors() {
        let (status, _) = reject(ConfigError::KeyNotFound("robot.nope".into()).into());
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = reject(
            ConfigError::InvalidValue {
                path: "robot.camera".into(),
                expected: "a boolean",
            }
            .into(),
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("robot.camera"));
    }

    #[test]
    fn test_reject_maps_io_to_500() {
        let err = SupervisorError::Io {
            path: "/etc/hotspot.conf".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(reject(err).0, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
