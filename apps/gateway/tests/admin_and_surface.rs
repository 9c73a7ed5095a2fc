mod support;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use cvi_core::{EventSink, FileEventSink, LoggedEvent, Topic};
use cvi_gateway::AppState;
use serde_json::json;
use support::{config, json_body, router, send, text_body};

const ADMIN: &[(&str, &str)] = &[
    ("TAVUS_WEBHOOK_BASIC_USER", "ops"),
    ("TAVUS_WEBHOOK_BASIC_PASS", "hunter2"),
];

// 2024-03-09T12:00:00Z
const DAY_1: i64 = 1_709_985_600_000;

fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{pass}")))
}

fn events_request(query: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(format!("/api/admin/webhook-events{query}"));
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::empty()).unwrap()
}

async fn seed(dir: &std::path::Path) {
    let sink = FileEventSink::new(dir);
    for (offset, topic) in [
        (0, Topic::Conversation),
        (1_000, Topic::Video),
        (2_000, Topic::Conversation),
    ] {
        sink.try_append(&LoggedEvent::new(
            DAY_1 + offset,
            topic,
            json!({ "conversation_id": format!("c-{offset}") }),
        ))
        .await
        .unwrap();
    }
}

#[tokio::test]
async fn admin_viewer_requires_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(AppState::new(config(dir.path(), ADMIN)));

    for authorization in [None, Some(basic("ops", "wrong")), Some("Bearer token".into())] {
        let response = send(&app, events_request("", authorization.as_deref())).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            "Basic realm=\"Webhook Admin Panel\""
        );
        assert_eq!(text_body(response).await, "Authentication required");
    }
}

#[tokio::test]
async fn admin_viewer_lists_events_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path()).await;
    let app = router(AppState::new(config(dir.path(), ADMIN)));
    let auth = basic("ops", "hunter2");

    let response = send(&app, events_request("", Some(&auth))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = json_body(response).await;
    assert_eq!(page["total"], 3);
    assert_eq!(page["limit"], 100);
    let stamps: Vec<i64> = page["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["ts"].as_i64().unwrap())
        .collect();
    assert_eq!(stamps, vec![DAY_1 + 2_000, DAY_1 + 1_000, DAY_1]);

    let response = send(
        &app,
        events_request("?topic=conversation&limit=1&date=2024-03-09", Some(&auth)),
    )
    .await;
    let page = json_body(response).await;
    assert_eq!(page["total"], 2);
    assert_eq!(page["limit"], 1);
    assert_eq!(page["events"][0]["payload"]["conversation_id"], "c-2000");
}

#[tokio::test]
async fn admin_viewer_rejects_bad_filters() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(AppState::new(config(dir.path(), ADMIN)));
    let auth = basic("ops", "hunter2");

    let response = send(&app, events_request("?date=../../etc/passwd", Some(&auth))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&app, events_request("?topic=billing", Some(&auth))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_viewer_is_absent_without_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(AppState::new(config(dir.path(), &[])));

    let response = send(&app, events_request("", Some(&basic("ops", "hunter2")))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn every_response_carries_hardening_headers() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(AppState::new(config(dir.path(), &[])));

    let response = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["referrer-policy"], "strict-origin-when-cross-origin");
    assert!(!headers["x-request-id"].is_empty());
    assert_eq!(json_body(response).await, json!({ "ok": true }));

    let response = send(
        &app,
        Request::builder()
            .uri("/health")
            .header("x-request-id", "trace-abc")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.headers()["x-request-id"], "trace-abc");
}

#[tokio::test]
async fn injected_sink_does_not_change_admin_log_source() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path()).await;
    let memory = Arc::new(cvi_core::MemoryEventSink::new());
    let state = AppState::new(config(dir.path(), ADMIN)).with_sink(memory);
    let app = router(state);

    let response = send(
        &app,
        events_request("?topic=video", Some(&basic("ops", "hunter2"))),
    )
    .await;
    let page = json_body(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["events"][0]["topic"], "video");
}
