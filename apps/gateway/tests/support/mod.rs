#![allow(dead_code)]

use std::path::Path;

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use cvi_gateway::{AppState, GatewayConfig, build_router};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

pub const SECRET: &str = "whsec_test";

/// Configuration rooted at `events_dir` plus any overrides.
pub fn config(events_dir: &Path, extra: &[(&str, &str)]) -> GatewayConfig {
    let mut vars = vec![(
        "EVENTS_DIR".to_string(),
        events_dir.display().to_string(),
    )];
    vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    GatewayConfig::from_vars(vars).expect("config")
}

pub fn router(state: AppState) -> Router {
    build_router(state)
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.expect("router response")
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn text_body(response: Response<Body>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

/// All lines across every day file under `dir`.
pub fn logged_lines(dir: &Path) -> Vec<Value> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut lines = Vec::new();
    for entry in entries.flatten() {
        let content = std::fs::read_to_string(entry.path()).expect("read day file");
        lines.extend(
            content
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| serde_json::from_str::<Value>(l).expect("json line")),
        );
    }
    lines
}
