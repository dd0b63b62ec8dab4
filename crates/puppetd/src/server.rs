//! HTTP server for puppetd

use crate::error::Result as SupervisorResult;
use crate::routes;
use crate::supervisor::Supervisor;
use crate::task::BackgroundTask;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Application state shared across handlers
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    /// Self-update spawned by the last `POST /api/update`
    pub update_task: Mutex<Option<BackgroundTask<SupervisorResult<bool>>>>,
    /// Verdict of the last finished update
    pub last_update: Mutex<Option<bool>>,
    /// Pending halt or reboot
    pub halt_task: Mutex<Option<BackgroundTask<()>>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self {
            supervisor,
            update_task: Mutex::new(None),
            last_update: Mutex::new(None),
            halt_task: Mutex::new(None),
            start_time: Instant::now(),
        }
    }

    /// Collect the verdict of a finished update task, if any
    pub async fn reap_update(&self) -> Option<bool> {
        let finished = {
            let mut slot = self.update_task.lock().await;
            match slot.as_ref() {
                Some(task) if task.is_finished() => slot.take(),
                _ => None,
            }
        };
        if let Some(task) = finished {
            self.record_update(task).await;
        }
        *self.last_update.lock().await
    }

    /// Track a freshly spawned update, recording the verdict of the one it replaces
    pub async fn track_update(&self, task: BackgroundTask<SupervisorResult<bool>>) {
        let previous = self.update_task.lock().await.replace(task);
        if let Some(previous) = previous {
            self.record_update(previous).await;
        }
    }

    async fn record_update(&self, task: BackgroundTask<SupervisorResult<bool>>) {
        let verdict = match task.wait().await {
            Ok(Ok(success)) => success,
            Ok(Err(e)) => {
                warn!("Self-update aborted: {}", e);
                false
            }
            Err(e) => {
                warn!("Self-update task failed: {}", e);
                false
            }
        };
        *self.last_update.lock().await = Some(verdict);
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::daemon_routes())
        .merge(routes::config_routes())
        .merge(routes::update_routes())
        .merge(routes::power_routes())
        .merge(routes::motor_routes())
        .merge(routes::network_routes())
        .merge(routes::log_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server
pub async fn run(state: AppState, port: u16) -> Result<()> {
    let app = router(Arc::new(state));

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
