//! Typed analytics events derived from normalized webhook deliveries.

use async_trait::async_trait;
use cvi_telemetry::{TelemetryLabels, record_counter};
use serde::Serialize;
use tracing::{info, warn};

use crate::taxonomy::EventKind;
use crate::types::{Topic, WebhookEnvelope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AnalyticsEvent {
    WebhookConversationReceived,
    WebhookVideoReceived,
    ConversationStarted,
    ConversationEnded,
    ConversationJoined,
    ConversationLeft,
    TranscriptReady,
    RecordingReady,
    SummaryReady,
    UtteranceReceived,
    PerceptionToolUsed,
    ConversationError,
    UnknownEvent,
}

impl AnalyticsEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AnalyticsEvent::WebhookConversationReceived => "Webhook Conversation Received",
            AnalyticsEvent::WebhookVideoReceived => "Webhook Video Received",
            AnalyticsEvent::ConversationStarted => "Webhook Conversation Started",
            AnalyticsEvent::ConversationEnded => "Webhook Conversation Ended",
            AnalyticsEvent::ConversationJoined => "Webhook Conversation Joined",
            AnalyticsEvent::ConversationLeft => "Webhook Conversation Left",
            AnalyticsEvent::TranscriptReady => "Webhook Transcript Ready",
            AnalyticsEvent::RecordingReady => "Webhook Recording Ready",
            AnalyticsEvent::SummaryReady => "Webhook Summary Ready",
            AnalyticsEvent::UtteranceReceived => "Webhook Utterance Received",
            AnalyticsEvent::PerceptionToolUsed => "Webhook Perception Tool Used",
            AnalyticsEvent::ConversationError => "Webhook Conversation Error",
            AnalyticsEvent::UnknownEvent => "Webhook Unknown Event",
        }
    }

    fn for_kind(kind: &EventKind) -> Self {
        match kind {
            EventKind::StartedConversation => AnalyticsEvent::ConversationStarted,
            EventKind::EndedConversation => AnalyticsEvent::ConversationEnded,
            EventKind::JoinedConversation => AnalyticsEvent::ConversationJoined,
            EventKind::LeftConversation => AnalyticsEvent::ConversationLeft,
            EventKind::TranscriptReady => AnalyticsEvent::TranscriptReady,
            EventKind::RecordingReady => AnalyticsEvent::RecordingReady,
            EventKind::SummaryReady => AnalyticsEvent::SummaryReady,
            EventKind::Utterance => AnalyticsEvent::UtteranceReceived,
            EventKind::PerceptionToolCall => AnalyticsEvent::PerceptionToolUsed,
            EventKind::Error => AnalyticsEvent::ConversationError,
            EventKind::Unknown(_) => AnalyticsEvent::UnknownEvent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsRecord {
    pub event: AnalyticsEvent,
    pub topic: Topic,
    pub conversation_id: String,
    pub event_type: String,
}

impl AnalyticsRecord {
    /// A "received" record for the topic followed by the kind-specific one.
    pub fn from_envelope(topic: Topic, envelope: &WebhookEnvelope) -> Vec<Self> {
        let received = match topic {
            Topic::Video => AnalyticsEvent::WebhookVideoReceived,
            _ => AnalyticsEvent::WebhookConversationReceived,
        };
        [received, AnalyticsEvent::for_kind(&envelope.event_type)]
            .into_iter()
            .map(|event| Self {
                event,
                topic,
                conversation_id: envelope.conversation_id.clone(),
                event_type: envelope.event_type.as_str().to_string(),
            })
            .collect()
    }
}

#[async_trait]
pub trait EventDispatcher: Send + Sync {
    async fn dispatch(&self, record: &AnalyticsRecord) -> anyhow::Result<()>;
}

/// Emits analytics as structured log events plus a counter per event name.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDispatcher;

#[async_trait]
impl EventDispatcher for TracingDispatcher {
    async fn dispatch(&self, record: &AnalyticsRecord) -> anyhow::Result<()> {
        info!(
            target: "cvi::analytics",
            event = record.event.name(),
            topic = record.topic.as_str(),
            conversation_id = %record.conversation_id,
            event_type = %record.event_type,
            "analytics event"
        );
        record_counter(
            "webhook_analytics_events_total",
            1,
            &TelemetryLabels::topic(record.topic.as_str()).with_extra("event", record.event.name()),
        );
        Ok(())
    }
}

/// Sends every record, logging failures. Returns how many dispatches failed.
pub async fn dispatch_all(dispatcher: &dyn EventDispatcher, records: &[AnalyticsRecord]) -> usize {
    let mut failures = 0;
    for record in records {
        if let Err(err) = dispatcher.dispatch(record).await {
            failures += 1;
            warn!(
                event = record.event.name(),
                conversation_id = %record.conversation_id,
                error = %err,
                "analytics dispatch failed"
            );
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Normalizer;
    use serde_json::json;

    struct Failing;

    #[async_trait]
    impl EventDispatcher for Failing {
        async fn dispatch(&self, _record: &AnalyticsRecord) -> anyhow::Result<()> {
            anyhow::bail!("analytics backend offline")
        }
    }

    fn envelope(kind: &str, topic: Topic) -> WebhookEnvelope {
        Normalizer::default()
            .validate(json!({"event_type": kind, "conversation_id": "abc123"}), topic)
            .unwrap()
    }

    #[test]
    fn records_follow_topic_and_kind() {
        let records = AnalyticsRecord::from_envelope(
            Topic::Conversation,
            &envelope("joined", Topic::Conversation),
        );
        let events: Vec<_> = records.iter().map(|r| r.event).collect();
        assert_eq!(
            events,
            vec![
                AnalyticsEvent::WebhookConversationReceived,
                AnalyticsEvent::ConversationJoined
            ]
        );
        assert_eq!(records[1].event_type, "conversation.joined");

        let video = AnalyticsRecord::from_envelope(Topic::Video, &envelope("oops", Topic::Video));
        assert_eq!(video[0].event, AnalyticsEvent::WebhookVideoReceived);
        assert_eq!(video[1].event, AnalyticsEvent::UnknownEvent);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn tracing_dispatcher_logs_event_name() {
        let records = AnalyticsRecord::from_envelope(
            Topic::Conversation,
            &envelope("transcript_ready", Topic::Conversation),
        );
        assert_eq!(dispatch_all(&TracingDispatcher, &records).await, 0);
        assert!(logs_contain("Webhook Transcript Ready"));
    }

    #[tokio::test]
    async fn failures_are_counted_not_propagated() {
        let records = AnalyticsRecord::from_envelope(
            Topic::Conversation,
            &envelope("left", Topic::Conversation),
        );
        assert_eq!(dispatch_all(&Failing, &records).await, 2);
    }
}
