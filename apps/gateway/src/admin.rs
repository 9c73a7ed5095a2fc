use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use cvi_core::{EventQuery, SinkError, Topic};
use security::ADMIN_CHALLENGE;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use crate::http::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EventsParams {
    pub limit: Option<usize>,
    pub topic: Option<String>,
    pub date: Option<String>,
}

/// `GET /api/admin/webhook-events`: newest-first view over the event log.
pub async fn webhook_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<EventsParams>,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let authorized = state
        .config
        .admin
        .as_ref()
        .is_some_and(|creds| creds.check(authorization));
    if !authorized {
        warn!("admin event viewer: authentication failed");
        return challenge();
    }

    let topic = match params.topic.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(raw) => match raw.parse::<Topic>() {
            Ok(topic) => Some(topic),
            Err(err) => return bad_request(err.to_string()),
        },
        None => None,
    };
    let mut query = EventQuery {
        topic,
        date: params.date.filter(|d| !d.trim().is_empty()),
        ..EventQuery::default()
    };
    if let Some(limit) = params.limit {
        query.limit = limit;
    }

    match state.event_log.query(query).await {
        Ok(page) => Json(page).into_response(),
        Err(SinkError::InvalidDate(date)) => bad_request(format!("invalid date `{date}`")),
        Err(err) => {
            error!(error = %err, "failed to read webhook events");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to read events" })),
            )
                .into_response()
        }
    }
}

fn challenge() -> Response {
    let mut response = (StatusCode::UNAUTHORIZED, "Authentication required").into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static(ADMIN_CHALLENGE),
    );
    response
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}
