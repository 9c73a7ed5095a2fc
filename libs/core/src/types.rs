use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

use crate::taxonomy::EventKind;

/// Category under which a record is written to the event log.
///
/// ```
/// use cvi_core::Topic;
///
/// assert_eq!(Topic::Video.as_str(), "video");
/// assert_eq!("conversation".parse::<Topic>().unwrap(), Topic::Conversation);
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Conversation,
    Video,
    Webhook,
    Error,
    Info,
    Conversion,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Conversation => "conversation",
            Topic::Video => "video",
            Topic::Webhook => "webhook",
            Topic::Error => "error",
            Topic::Info => "info",
            Topic::Conversion => "conversion",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown topic `{0}`")]
pub struct UnknownTopic(pub String);

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conversation" => Ok(Topic::Conversation),
            "video" => Ok(Topic::Video),
            "webhook" => Ok(Topic::Webhook),
            "error" => Ok(Topic::Error),
            "info" => Ok(Topic::Info),
            "conversion" => Ok(Topic::Conversion),
            _ => Err(UnknownTopic(s.to_string())),
        }
    }
}

/// Normalized webhook delivery.
///
/// `data` holds every field of the original payload that was not lifted into
/// the typed fields above it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookEnvelope {
    pub event_type: EventKind,
    pub conversation_id: String,
    pub timestamp: String, // ISO-8601
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// One line of the day-partitioned event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggedEvent {
    /// Milliseconds since the Unix epoch.
    pub ts: i64,
    pub topic: Topic,
    pub payload: Value,
}

impl LoggedEvent {
    pub fn new(ts: i64, topic: Topic, payload: Value) -> Self {
        Self { ts, topic, payload }
    }

    /// Stamps the record with the current wall-clock time.
    pub fn now(topic: Topic, payload: Value) -> Self {
        Self::new(now_millis(), topic, payload)
    }
}

pub(crate) fn now_millis() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn logged_event_serializes_with_lowercase_topic() {
        let event = LoggedEvent::new(1_700_000_000_000, Topic::Conversation, json!({"a": 1}));
        let line = serde_json::to_string(&event).unwrap();
        assert_eq!(
            line,
            r#"{"ts":1700000000000,"topic":"conversation","payload":{"a":1}}"#
        );
    }

    #[test]
    fn topic_parsing_rejects_unknown_values() {
        assert_eq!(" VIDEO ".parse::<Topic>().unwrap(), Topic::Video);
        assert!("billing".parse::<Topic>().is_err());
    }

    #[test]
    fn now_is_in_milliseconds() {
        let ts = LoggedEvent::now(Topic::Info, Value::Null).ts;
        // 2020-01-01 in ms; anything smaller would mean seconds were used.
        assert!(ts > 1_577_836_800_000);
    }
}
