//! HTTP control surface, driven in-process

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{Harness, HarnessBuilder};
use puppetd::server::{router, AppState};
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;
use tower::ServiceExt;

fn app(h: &Harness) -> Router {
    router(Arc::new(AppState::new(h.supervisor.clone())))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, String) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn parse(body: &str) -> Value {
    serde_json::from_str(body).unwrap()
}

#[tokio::test]
async fn test_status_reports_stopped_daemon() {
    let h = Harness::new().await;
    let (status, body) = call(&app(&h), "GET", "/api/status", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = parse(&body);
    assert_eq!(body["running"], json!(false));
    assert_eq!(body["updating"], json!(false));
    assert!(body["checked_at"].is_string());
}

#[tokio::test]
async fn test_start_reports_already_running() {
    let h = Harness::new().await;
    let app = app(&h);

    let (_, first) = call(&app, "POST", "/api/start", None).await;
    assert_eq!(parse(&first), json!({"running": true, "already": false}));

    let (_, second) = call(&app, "POST", "/api/start", None).await;
    assert_eq!(parse(&second), json!({"running": true, "already": true}));
    assert_eq!(h.journal.count("daemon.start"), 1);
}

#[tokio::test]
async fn test_stop_when_stopped_is_already() {
    let h = Harness::new().await;
    let (_, body) = call(&app(&h), "POST", "/api/stop", None).await;

    assert_eq!(parse(&body), json!({"running": false, "already": true}));
    assert_eq!(h.journal.count("daemon.stop"), 0);
}

#[tokio::test]
async fn test_config_read_and_write() {
    let h = Harness::new().await;
    let app = app(&h);

    let (status, body) = call(&app, "GET", "/api/config/robot.camera", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body), json!(false));

    let request = json!({"path": "robot.camera", "value": "on"});
    let (status, body) = call(&app, "POST", "/api/config", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body), json!({"changed": true}));
    assert_eq!(h.journal.count("daemon.start"), 1);

    let (_, body) = call(&app, "GET", "/api/config", None).await;
    assert_eq!(parse(&body)["robot"]["camera"], json!(true));
}

#[tokio::test]
async fn test_config_errors_map_to_status_codes() {
    let h = Harness::new().await;
    let app = app(&h);

    let (status, _) = call(&app, "GET", "/api/config/robot.nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let request = json!({"path": "robot.camera", "value": "sometimes"});
    let (status, _) = call(&app, "POST", "/api/config", Some(request)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_camera_toggle_flips_value() {
    let h = Harness::new().await;
    let (_, body) = call(&app(&h), "POST", "/api/camera/toggle", None).await;

    assert_eq!(parse(&body), json!({"camera": true}));
    assert!(h.supervisor.config().unwrap().robot.camera);
}

#[tokio::test]
async fn test_update_then_poll() {
    let h = Harness::new().await;
    let app = app(&h);

    let (_, body) = call(&app, "POST", "/api/update", None).await;
    assert_eq!(parse(&body), json!({"started": true}));

    // Poll until the background task is reaped
    let mut last = Value::Null;
    for _ in 0..100 {
        let (_, body) = call(&app, "GET", "/api/updating", None).await;
        last = parse(&body);
        if last["last_success"] != Value::Null {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(last, json!({"updating": false, "last_success": true}));
    assert!(h.daemon.is_running());
}

#[tokio::test]
async fn test_motor_list_clears_configure_log() {
    let h = Harness::new().await;
    fs::write(h.path("configure.log"), "previous run").unwrap();

    let (_, body) = call(&app(&h), "GET", "/api/motors", None).await;

    assert_eq!(
        parse(&body),
        json!({"motors": ["m1", "m2", "m3", "m4", "m5", "m6"]})
    );
    assert!(!h.path("configure.log").exists());
}

#[tokio::test]
async fn test_configure_same_motor_twice_runs_tool_twice() {
    let h = Harness::new().await;
    let app = app(&h);

    for _ in 0..2 {
        let (status, _) = call(&app, "POST", "/api/motors/configure", Some(json!({"motor": "m4"}))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
    assert_eq!(h.journal.count("run_logged poppy-configure ergo-jr m4"), 2);
}

#[tokio::test]
async fn test_logs_fall_back_to_notice() {
    let h = Harness::new().await;
    let app = app(&h);

    let (status, body) = call(&app, "GET", "/api/logs/update", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "No log found...");

    fs::write(h.path("daemon.log"), "Robot created and running!\n").unwrap();
    let (_, body) = call(&app, "GET", "/api/logs/daemon", None).await;
    assert_eq!(body, "Robot created and running!\n");

    let (status, _) = call(&app, "GET", "/api/logs/kernel", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_virtual_bot_log_by_id() {
    let h = HarnessBuilder::new()
        .config(|c| c.info.virtual_bot_log = "/nonexistent/virtual-bot.log".into())
        .build()
        .await;
    let app = app(&h);

    let (status, body) = call(&app, "GET", "/api/logs/virtual/2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "No log found...");

    let log = h.path("sim.log");
    let instance = h.path("sim_2.log");
    fs::write(&instance, "Virtual robot 2 up\n").unwrap();
    h.supervisor
        .update_config("info.virtualBotLog", log.to_string_lossy().as_ref())
        .await
        .unwrap();

    let (_, body) = call(&app, "GET", "/api/logs/virtual/2", None).await;
    assert_eq!(body, "Virtual robot 2 up\n");

    let (status, _) = call(&app, "GET", "/api/logs/virtual/two", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ready_is_ko_before_banner() {
    let h = Harness::new().await;
    let (status, body) = call(&app(&h), "GET", "/api/ready", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "KO");
}

#[tokio::test]
async fn test_hotspot_enable_and_read_back() {
    let h = Harness::new().await;
    let app = app(&h);

    let (_, body) = call(&app, "GET", "/api/hotspot", None).await;
    assert_eq!(parse(&body)["enabled"], json!(false));

    let (status, _) = call(&app, "POST", "/api/hotspot/enable", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call(&app, "GET", "/api/hotspot", None).await;
    let body = parse(&body);
    assert_eq!(body["enabled"], json!(true));
    assert_eq!(body["settings"]["ssid"], json!("poppy-hotspot"));
}
