use tracing::Span;

use crate::context::TelemetryLabels;

pub fn record_counter(name: &'static str, value: u64, labels: &TelemetryLabels) {
    ::metrics::counter!(name, labels.metric_labels()).increment(value);
}

pub fn record_histogram(name: &'static str, value: f64, labels: &TelemetryLabels) {
    ::metrics::histogram!(name, labels.metric_labels()).record(value);
}

pub fn record_gauge(name: &'static str, value: f64, labels: &TelemetryLabels) {
    ::metrics::gauge!(name, labels.metric_labels()).set(value);
}

/// Fills the common webhook fields on a span declared with them as `Empty`.
pub fn with_common_fields(
    span: &Span,
    topic: &str,
    conversation_id: Option<&str>,
    event_kind: Option<&str>,
) {
    span.record("topic", tracing::field::display(topic));
    if let Some(conversation_id) = conversation_id {
        span.record("conversation_id", tracing::field::display(conversation_id));
    }
    if let Some(event_kind) = event_kind {
        span.record("event_kind", tracing::field::display(event_kind));
    }
}
