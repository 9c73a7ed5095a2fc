use ::metrics::Label;

/// Labels attached to metrics recorded while handling one webhook delivery or
/// one outbound provider call.
#[derive(Debug, Clone, Default)]
pub struct TelemetryLabels {
    pub topic: Option<String>,
    pub event_kind: Option<String>,
    pub outcome: Option<String>,
    pub extra: Vec<(String, String)>,
}

impl TelemetryLabels {
    pub fn topic(topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            ..Self::default()
        }
    }

    pub fn with_event_kind(mut self, kind: impl Into<String>) -> Self {
        self.event_kind = Some(kind.into());
        self
    }

    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }

    pub fn tags(&self) -> Vec<(String, String)> {
        let mut tags = Vec::with_capacity(3 + self.extra.len());
        if let Some(topic) = &self.topic {
            tags.push(("topic".into(), topic.clone()));
        }
        if let Some(kind) = &self.event_kind {
            tags.push(("event_kind".into(), kind.clone()));
        }
        if let Some(outcome) = &self.outcome {
            tags.push(("outcome".into(), outcome.clone()));
        }
        tags.extend(self.extra.iter().cloned());
        tags
    }

    pub(crate) fn metric_labels(&self) -> Vec<Label> {
        self.tags()
            .into_iter()
            .map(|(key, value)| Label::new(key, value))
            .collect()
    }
}
