//! Turns raw webhook bodies into [`WebhookEnvelope`] values.

use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::taxonomy::{EventKind, EventTaxonomy};
use crate::types::{Topic, WebhookEnvelope};

const EVENT_TYPE_KEYS: &[&str] = &["event_type", "eventType", "type"];
const CONVERSATION_ID_KEYS: &[&str] = &["conversation_id", "conversationId"];
const VIDEO_ID_KEYS: &[&str] = &["video_id", "videoId"];
const TIMESTAMP_KEY: &str = "timestamp";
/// Epoch values at or above this magnitude are read as milliseconds.
const EPOCH_MILLIS_FLOOR: u64 = 100_000_000_000;

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("malformed JSON payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("payload must be a JSON object")]
    NotAnObject,
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    taxonomy: EventTaxonomy,
}

impl Normalizer {
    pub fn new(taxonomy: EventTaxonomy) -> Self {
        Self { taxonomy }
    }

    pub fn parse(&self, raw_body: &[u8], topic: Topic) -> Result<WebhookEnvelope, NormalizeError> {
        let value: Value = serde_json::from_slice(raw_body)?;
        self.validate(value, topic)
    }

    pub fn validate(&self, value: Value, topic: Topic) -> Result<WebhookEnvelope, NormalizeError> {
        let Value::Object(mut fields) = value else {
            return Err(NormalizeError::NotAnObject);
        };

        let raw_type = take_text(&mut fields, EVENT_TYPE_KEYS)
            .ok_or(NormalizeError::MissingField("event_type"))?;

        let mut id_keys = CONVERSATION_ID_KEYS.to_vec();
        if topic == Topic::Video {
            id_keys.extend_from_slice(VIDEO_ID_KEYS);
        }
        let conversation_id = take_text(&mut fields, &id_keys)
            .ok_or(NormalizeError::MissingField("conversation_id"))?;

        let timestamp = take_timestamp(&mut fields).unwrap_or_else(now_rfc3339);

        let event_type = self.taxonomy.resolve(&raw_type);
        if let EventKind::Unknown(original) = &event_type {
            fields.insert("original_event_type".into(), Value::String(original.clone()));
        }

        Ok(WebhookEnvelope {
            event_type,
            conversation_id,
            timestamp,
            data: fields,
        })
    }
}

/// Returns the first non-empty text value among `keys`, in key order, and
/// removes only that key. Other aliases stay in `fields`.
fn take_text(fields: &mut Map<String, Value>, keys: &[&str]) -> Option<String> {
    let (key, text) = keys
        .iter()
        .find_map(|key| text_value(fields.get(*key)?).map(|text| (*key, text)))?;
    fields.remove(key);
    Some(text)
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Lifts `timestamp` as RFC 3339 text. Epoch numbers (seconds, or
/// milliseconds above [`EPOCH_MILLIS_FLOOR`]) are converted; anything else is
/// left in `fields` untouched.
fn take_timestamp(fields: &mut Map<String, Value>) -> Option<String> {
    let normalized = match fields.get(TIMESTAMP_KEY)? {
        Value::String(s) => {
            let s = s.trim();
            match OffsetDateTime::parse(s, &Rfc3339) {
                Ok(_) => Some(s.to_string()),
                Err(_) => s.parse::<i64>().ok().and_then(from_epoch),
            }
        }
        Value::Number(n) => n.as_i64().and_then(from_epoch),
        _ => None,
    }?;
    fields.remove(TIMESTAMP_KEY);
    Some(normalized)
}

fn from_epoch(value: i64) -> Option<String> {
    let nanos = if value.unsigned_abs() >= EPOCH_MILLIS_FLOOR {
        i128::from(value) * 1_000_000
    } else {
        i128::from(value) * 1_000_000_000
    };
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()?
        .format(&Rfc3339)
        .ok()
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::UNIX_EPOCH.to_string())
}
