use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use cvi_core::{AnalyticsRecord, LoggedEvent, Topic, dispatch_all};
use cvi_telemetry::{TelemetryLabels, record_counter, with_common_fields};
use security::{RawWebhookRequest, Verified};
use tracing::{Instrument, field::Empty, info, warn};

use crate::error::GatewayError;
use crate::http::AppState;
use crate::respond::ack;

pub async fn conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    deliver(state, Topic::Conversation, headers, body).await
}

pub async fn video(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    deliver(state, Topic::Video, headers, body).await
}

/// Target of the `callback_url` handed to the provider on conversation creation.
pub async fn callback(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    deliver(state, Topic::Conversation, headers, body).await
}

async fn deliver(state: AppState, topic: Topic, headers: HeaderMap, body: Bytes) -> Response {
    let span = tracing::info_span!(
        "webhook",
        topic = Empty,
        conversation_id = Empty,
        event_kind = Empty
    );
    with_common_fields(&span, topic.as_str(), None, None);

    let outcome = handle_delivery(&state, topic, &headers, body)
        .instrument(span)
        .await;
    let labels = TelemetryLabels::topic(topic.as_str());
    let labels = match &outcome {
        Ok(kind) => labels.with_event_kind(*kind).with_outcome("accepted"),
        Err(GatewayError::Unauthorized(_)) => labels.with_outcome("unauthorized"),
        Err(GatewayError::BadRequest(_)) => labels.with_outcome("malformed"),
        Err(_) => labels.with_outcome("error"),
    };
    record_counter("webhook_deliveries_total", 1, &labels);

    match outcome {
        Ok(_) => ack().into_response(),
        Err(err) => err.into_response(),
    }
}

/// Verify, normalize, persist, then fan out. Persistence and dispatch
/// failures are logged and never change the acknowledgement. Returns the
/// bounded metric label of the accepted event.
async fn handle_delivery(
    state: &AppState,
    topic: Topic,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<&'static str, GatewayError> {
    let mut request = RawWebhookRequest::new(body);
    if let Some(signature) = header_text(headers, &state.config.signature_header) {
        request = request.with_signature(signature);
    }
    if let Some(timestamp) = header_text(headers, &state.config.timestamp_header) {
        request = request.with_timestamp(timestamp);
    }

    match state.verifier.check(&request) {
        Ok(Verified::Signed) => {}
        Ok(Verified::Bypassed) => {
            record_counter(
                "webhook_verification_bypassed_total",
                1,
                &TelemetryLabels::topic(topic.as_str()),
            );
        }
        Err(err) => {
            warn!(error = %err, "webhook verification failed");
            return Err(err.into());
        }
    }

    let envelope = state
        .normalizer
        .parse(&request.body, topic)
        .map_err(|err| {
            warn!(error = %err, "rejecting malformed webhook payload");
            GatewayError::BadRequest(err.to_string())
        })?;
    with_common_fields(
        &tracing::Span::current(),
        topic.as_str(),
        Some(&envelope.conversation_id),
        Some(envelope.event_type.as_str()),
    );
    if envelope.event_type.is_unknown() {
        warn!(event_type = %envelope.event_type.as_str(), "unrecognized webhook event type");
    }

    let payload =
        serde_json::to_value(&envelope).map_err(|err| GatewayError::Internal(err.into()))?;
    state.sink.append(&LoggedEvent::now(topic, payload)).await;

    let records = AnalyticsRecord::from_envelope(topic, &envelope);
    let failures = dispatch_all(state.dispatcher.as_ref(), &records).await;
    info!(
        event_kind = envelope.event_type.as_str(),
        dispatched = records.len() - failures,
        failures,
        "webhook accepted"
    );
    Ok(envelope.event_type.metric_label())
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
