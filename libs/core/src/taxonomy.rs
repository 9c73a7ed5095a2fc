//! Canonical webhook event kinds and the alias table that resolves provider
//! spellings into them.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Closed set of event kinds downstream code switches on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    StartedConversation,
    EndedConversation,
    JoinedConversation,
    LeftConversation,
    TranscriptReady,
    RecordingReady,
    SummaryReady,
    Utterance,
    PerceptionToolCall,
    Error,
    /// Anything the table does not know, with the spelling that was received.
    Unknown(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::StartedConversation => "conversation.started",
            EventKind::EndedConversation => "conversation.ended",
            EventKind::JoinedConversation => "conversation.joined",
            EventKind::LeftConversation => "conversation.left",
            EventKind::TranscriptReady => "conversation.transcript_ready",
            EventKind::RecordingReady => "conversation.recording_ready",
            EventKind::SummaryReady => "conversation.summary_ready",
            EventKind::Utterance => "conversation.utterance",
            EventKind::PerceptionToolCall => "conversation.perception_tool_call",
            EventKind::Error => "conversation.error",
            EventKind::Unknown(original) => original,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, EventKind::Unknown(_))
    }

    /// Bounded label for metrics; unknown spellings collapse into one value.
    pub fn metric_label(&self) -> &'static str {
        match self {
            EventKind::StartedConversation => "started",
            EventKind::EndedConversation => "ended",
            EventKind::JoinedConversation => "joined",
            EventKind::LeftConversation => "left",
            EventKind::TranscriptReady => "transcript_ready",
            EventKind::RecordingReady => "recording_ready",
            EventKind::SummaryReady => "summary_ready",
            EventKind::Utterance => "utterance",
            EventKind::PerceptionToolCall => "perception_tool_call",
            EventKind::Error => "error",
            EventKind::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(EventTaxonomy::default().resolve(&raw))
    }
}

const DEFAULT_ALIASES: &[(&str, EventKind)] = &[
    ("conversation.started", EventKind::StartedConversation),
    ("started", EventKind::StartedConversation),
    ("conversation.ended", EventKind::EndedConversation),
    ("ended", EventKind::EndedConversation),
    ("conversation.completed", EventKind::EndedConversation),
    ("completed", EventKind::EndedConversation),
    ("conversation.joined", EventKind::JoinedConversation),
    ("joined", EventKind::JoinedConversation),
    ("conversation.left", EventKind::LeftConversation),
    ("left", EventKind::LeftConversation),
    ("conversation.transcript_ready", EventKind::TranscriptReady),
    ("transcript_ready", EventKind::TranscriptReady),
    ("conversation.recording_ready", EventKind::RecordingReady),
    ("recording_ready", EventKind::RecordingReady),
    ("recording.ready", EventKind::RecordingReady),
    ("conversation.summary_ready", EventKind::SummaryReady),
    ("summary_ready", EventKind::SummaryReady),
    ("conversation.utterance", EventKind::Utterance),
    ("utterance", EventKind::Utterance),
    ("conversation.perception_tool_call", EventKind::PerceptionToolCall),
    ("perception_tool_call", EventKind::PerceptionToolCall),
    ("conversation.error", EventKind::Error),
    ("error", EventKind::Error),
];

/// Alias table from received spellings to [`EventKind`].
///
/// ```
/// use cvi_core::{EventKind, EventTaxonomy};
///
/// let taxonomy = EventTaxonomy::default()
///     .with_alias("participant.joined", EventKind::JoinedConversation);
/// assert_eq!(taxonomy.resolve("Joined"), EventKind::JoinedConversation);
/// assert_eq!(taxonomy.resolve("participant.joined"), EventKind::JoinedConversation);
/// assert!(taxonomy.resolve("conversation.paused").is_unknown());
/// ```
#[derive(Debug, Clone)]
pub struct EventTaxonomy {
    aliases: HashMap<String, EventKind>,
}

impl Default for EventTaxonomy {
    fn default() -> Self {
        let aliases = DEFAULT_ALIASES
            .iter()
            .map(|(alias, kind)| ((*alias).to_string(), kind.clone()))
            .collect();
        Self { aliases }
    }
}

impl EventTaxonomy {
    pub fn with_alias(mut self, alias: &str, kind: EventKind) -> Self {
        self.aliases.insert(normalize_key(alias), kind);
        self
    }

    pub fn resolve(&self, raw: &str) -> EventKind {
        self.aliases
            .get(&normalize_key(raw))
            .cloned()
            .unwrap_or_else(|| EventKind::Unknown(raw.to_string()))
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_and_dotted_spellings_agree() {
        let taxonomy = EventTaxonomy::default();
        for (dotted, bare) in [
            ("conversation.started", "started"),
            ("conversation.ended", "ended"),
            ("conversation.joined", "joined"),
            ("conversation.left", "left"),
            ("conversation.transcript_ready", "transcript_ready"),
            ("conversation.recording_ready", "recording_ready"),
            ("conversation.summary_ready", "summary_ready"),
            ("conversation.utterance", "utterance"),
            ("conversation.perception_tool_call", "perception_tool_call"),
            ("conversation.error", "error"),
        ] {
            assert_eq!(taxonomy.resolve(dotted), taxonomy.resolve(bare), "{bare}");
            assert!(!taxonomy.resolve(bare).is_unknown());
        }
    }

    #[test]
    fn legacy_spellings_resolve() {
        let taxonomy = EventTaxonomy::default();
        assert_eq!(taxonomy.resolve("completed"), EventKind::EndedConversation);
        assert_eq!(taxonomy.resolve("recording.ready"), EventKind::RecordingReady);
        assert_eq!(
            taxonomy.resolve("  Conversation.Joined "),
            EventKind::JoinedConversation
        );
    }

    #[test]
    fn unknown_keeps_original_spelling() {
        let kind = EventTaxonomy::default().resolve("Replica.Paused");
        assert_eq!(kind, EventKind::Unknown("Replica.Paused".into()));
        assert_eq!(kind.as_str(), "Replica.Paused");
        assert_eq!(kind.metric_label(), "unknown");
    }

    #[test]
    fn kinds_serialize_to_canonical_spelling() {
        let json = serde_json::to_string(&EventKind::RecordingReady).unwrap();
        assert_eq!(json, "\"conversation.recording_ready\"");
        let back: EventKind = serde_json::from_str("\"recording.ready\"").unwrap();
        assert_eq!(back, EventKind::RecordingReady);
    }
}
