use std::time::Instant;

use axum::{Json, body::Bytes, extract::State};
use cvi_client::{
    ConversationProperties, ConversationSession, CreateConversationRequest, LaunchRequest,
};
use cvi_telemetry::{TelemetryLabels, record_counter, record_histogram};
use tracing::{error, info, warn};

use crate::config::DEFAULT_VERTICAL;
use crate::error::GatewayError;
use crate::http::AppState;

/// `POST /api/tavus/create-conversation`.
///
/// An empty body launches the default vertical.
pub async fn create(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ConversationSession>, GatewayError> {
    let launch: LaunchRequest = if body.iter().all(u8::is_ascii_whitespace) {
        LaunchRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| GatewayError::BadRequest(format!("invalid request body: {err}")))?
    };

    let vertical_name = launch
        .vertical
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_VERTICAL)
        .to_ascii_uppercase();
    let Some(vertical) = state.config.vertical(&vertical_name) else {
        warn!(vertical = %vertical_name, "no persona/replica configured for vertical");
        return Err(GatewayError::BadRequest(
            "Invalid vertical configuration".into(),
        ));
    };

    let Some(provider) = state.provider.as_ref() else {
        error!("conversation requested but TAVUS_API_KEY is not configured");
        return Err(GatewayError::Configuration(
            "conversation provider is not configured".into(),
        ));
    };

    let request = CreateConversationRequest {
        persona_id: vertical.persona_id.clone(),
        replica_id: vertical.replica_id.clone(),
        document_tags: launch.document_tags.filter(|tags| !tags.is_empty()),
        memory_stores: launch
            .memory_key
            .filter(|key| !key.trim().is_empty())
            .map(|key| vec![key]),
        callback_url: state.config.callback_url(),
        properties: ConversationProperties::default(),
    };

    let labels =
        TelemetryLabels::topic("conversation").with_extra("vertical", vertical_name.as_str());
    let started = Instant::now();
    let result = provider.create_conversation(&request).await;
    record_histogram(
        "conversation_create_duration_ms",
        started.elapsed().as_secs_f64() * 1000.0,
        &labels,
    );

    match result {
        Ok(created) => {
            info!(
                conversation_id = %created.conversation_id,
                vertical = %vertical_name,
                "conversation created"
            );
            record_counter(
                "conversations_created_total",
                1,
                &labels.with_outcome("success"),
            );
            Ok(Json(ConversationSession {
                conversation_id: created.conversation_id,
                conversation_url: created.conversation_url,
            }))
        }
        Err(err) => {
            error!(error = %err, vertical = %vertical_name, "conversation creation failed");
            record_counter(
                "conversations_created_total",
                1,
                &labels.with_outcome("failure"),
            );
            Err(err.into())
        }
    }
}
