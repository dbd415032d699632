#[path = "common/mod.rs"]
mod common;

use axum::{body::Body, http::Request, http::StatusCode, Router};
use common::{session, EnvGuard, HOLD};
use http_body_util::BodyExt;
use holdgate::policy::{PolicyConfig, SendHandler, RESTART_GUIDANCE};
use holdgate::{app, build_state_from_env, AppConfig, AppState};
use once_cell::sync::Lazy;
use tokio::sync::Mutex;
use tower::ServiceExt;

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn state(send_handler: SendHandler) -> AppState {
    AppState::new(
        AppConfig {
            send_handler,
            max_request_bytes: None,
            handler_warn_ms: 120,
        },
        PolicyConfig::default(),
    )
}

async fn post(app: Router, event: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method("POST")
        .uri(format!("/events/{}", event))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let v = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, v)
}

#[tokio::test]
async fn recipients_changed_returns_bcc_with_hold_mailbox() {
    let body = serde_json::to_value(session("L1", &["a@x.com"])).unwrap();
    let (status, v) = post(app(state(SendHandler::SendGate)), "OnMessageRecipientsChanged", body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["handler"], "hold_recipient");
    assert_eq!(v["disposition"], serde_json::json!({"action": "continue"}));
    let bcc = v["changes"]["bcc"].as_array().expect("bcc change present");
    assert_eq!(bcc.len(), 2);
    assert_eq!(bcc[1]["emailAddress"], HOLD);
    assert!(v["changes"].get("sensitivityLabel").is_none());
    assert!(v.get("ts").and_then(|t| t.as_str()).is_some());
}

#[tokio::test]
async fn label_changed_without_change_reports_no_changes() {
    let body = serde_json::to_value(session("L1", &[HOLD])).unwrap();
    let (status, v) = post(app(state(SendHandler::SendGate)), "OnSensitivityLabelChanged", body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["changes"], serde_json::json!({}));
    let calls = v["hostCalls"].as_array().unwrap();
    assert!(calls.iter().all(|c| c["op"] != "setField"));
}

#[tokio::test]
async fn send_with_classification_binding_applies_label() {
    let body = serde_json::to_value(session("", &[])).unwrap();
    let (status, v) = post(app(state(SendHandler::Classification)), "OnMessageSend", body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["handler"], "classification");
    assert_eq!(v["disposition"]["action"], "block");
    assert_eq!(
        v["disposition"]["message"],
        PolicyConfig::default().label_applied_message()
    );
    assert_eq!(v["changes"]["sensitivityLabel"], "L1");
}

#[tokio::test]
async fn default_send_binding_is_the_sender_gate() {
    let mut snap = session("L1", &[]);
    snap.sender = None;
    let body = serde_json::to_value(snap).unwrap();
    let (status, v) = post(app(state(SendHandler::SendGate)), "OnMessageSend", body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["handler"], "send_gate");
    assert_eq!(v["disposition"]["message"], RESTART_GUIDANCE);
    assert_eq!(v["hostCalls"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_event_is_not_found() {
    let (status, v) = post(
        app(state(SendHandler::SendGate)),
        "OnAppointmentSend",
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(v["errorCode"], 4004);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let _lock = ENV_MUTEX.lock().await;
    let mut env = EnvGuard::new();
    env.remove("HOLDGATE_SEND_HANDLER");
    env.remove("HOLDGATE_HANDLER_WARN_MS");
    env.set("HOLDGATE_MAX_REQUEST_BYTES", "16");
    let state = build_state_from_env().await.unwrap();

    let body = serde_json::to_value(session("L1", &["a@x.com"])).unwrap();
    let (status, v) = post(app(state), "OnMessageRecipientsChanged", body).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(v["errorCode"], 4001);
}

#[tokio::test]
async fn metrics_count_events_and_hold_changes() {
    let app = app(state(SendHandler::SendGate));
    let add = serde_json::to_value(session("L1", &[])).unwrap();
    let remove = serde_json::to_value(session("", &[HOLD])).unwrap();
    post(app.clone(), "OnMessageRecipientsChanged", add).await;
    post(app.clone(), "OnSensitivityLabelChanged", remove).await;

    let req = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert!(resp.status().is_success());
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(text.contains("holdgate_events_total{event=\"OnMessageRecipientsChanged\"} 1"));
    assert!(text.contains("holdgate_events_total{event=\"OnSensitivityLabelChanged\"} 1"));
    assert!(text.contains("holdgate_hold_added_total 1"));
    assert!(text.contains("holdgate_hold_removed_total 1"));
    assert!(text.contains("holdgate_blocks_total 0"));
    assert!(text.contains("holdgate_handler_latency_ms_count 2"));
}

#[tokio::test]
async fn healthz_lists_registered_events() {
    let req = Request::builder()
        .uri("/healthz")
        .body(Body::empty())
        .unwrap();
    let resp = app(state(SendHandler::SendGate)).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let events = v["events"].as_array().unwrap();
    assert_eq!(events.len(), 3);
    assert!(events.iter().any(|e| e == "OnMessageSend"));
}
