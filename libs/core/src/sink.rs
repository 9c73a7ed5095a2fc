//! Append-only event log partitioned by UTC day.

use async_trait::async_trait;
use cvi_telemetry::{TelemetryLabels, record_counter};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::types::{LoggedEvent, Topic};

pub const WRITE_FAILURES_METRIC: &str = "event_sink_write_failures_total";
pub const DEFAULT_QUERY_LIMIT: usize = 100;
pub const MAX_QUERY_LIMIT: usize = 1_000;
/// Day files scanned when a query does not name a date.
pub const QUERY_DAYS: usize = 7;

const LOG_EXTENSION: &str = "jsonl";

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("event log i/o failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("event timestamp {0} is out of range")]
    Timestamp(i64),
    #[error("invalid date `{0}`, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn try_append(&self, record: &LoggedEvent) -> Result<(), SinkError>;

    /// Best-effort append: failures are logged and counted, never returned.
    async fn append(&self, record: &LoggedEvent) {
        if let Err(err) = self.try_append(record).await {
            error!(topic = record.topic.as_str(), error = %err, "failed to persist event");
            record_counter(
                WRITE_FAILURES_METRIC,
                1,
                &TelemetryLabels::topic(record.topic.as_str()),
            );
        }
    }
}

/// `YYYY-MM-DD` of the UTC day containing `ts_ms`.
pub fn day_key(ts_ms: i64) -> Result<String, SinkError> {
    let at = OffsetDateTime::from_unix_timestamp_nanos(i128::from(ts_ms) * 1_000_000)
        .map_err(|_| SinkError::Timestamp(ts_ms))?;
    format_day(at.date()).ok_or(SinkError::Timestamp(ts_ms))
}

fn format_day(date: Date) -> Option<String> {
    date.format(format_description!("[year]-[month]-[day]")).ok()
}

fn parse_day(raw: &str) -> Result<Date, SinkError> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| SinkError::InvalidDate(raw.to_string()))
}

#[derive(Debug, Clone)]
pub struct FileEventSink {
    root: PathBuf,
}

impl FileEventSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, ts_ms: i64) -> Result<PathBuf, SinkError> {
        Ok(self.root.join(format!("{}.{LOG_EXTENSION}", day_key(ts_ms)?)))
    }

    pub async fn query(&self, query: EventQuery) -> Result<EventPage, SinkError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || read_events(&root, &query)).await?
    }
}

#[async_trait]
impl EventSink for FileEventSink {
    async fn try_append(&self, record: &LoggedEvent) -> Result<(), SinkError> {
        let path = self.path_for(record.ts)?;
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let root = self.root.clone();

        tokio::task::spawn_blocking(move || {
            fs::create_dir_all(&root).map_err(|source| SinkError::Io {
                path: root.clone(),
                source,
            })?;
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|source| SinkError::Io {
                    path: path.clone(),
                    source,
                })?;
            // One write per record so concurrent appends never interleave mid-line.
            file.write_all(&line)
                .map_err(|source| SinkError::Io { path, source })
        })
        .await??;

        debug!(topic = record.topic.as_str(), ts = record.ts, "event appended");
        Ok(())
    }
}

/// Filters for reading the log back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub limit: usize,
    pub topic: Option<Topic>,
    /// Restricts the read to one `YYYY-MM-DD` day file.
    pub date: Option<String>,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_QUERY_LIMIT,
            topic: None,
            date: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EventPage {
    pub events: Vec<LoggedEvent>,
    /// Matching events before the limit was applied.
    pub total: usize,
    pub limit: usize,
}

fn read_events(root: &Path, query: &EventQuery) -> Result<EventPage, SinkError> {
    let limit = query.limit.clamp(1, MAX_QUERY_LIMIT);
    let files = match &query.date {
        Some(date) => {
            let day = parse_day(date)?;
            let name = format_day(day).ok_or_else(|| SinkError::InvalidDate(date.clone()))?;
            vec![root.join(format!("{name}.{LOG_EXTENSION}"))]
        }
        None => recent_day_files(root)?,
    };

    let mut events = Vec::new();
    for path in files {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(source) => return Err(SinkError::Io { path, source }),
        };
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<LoggedEvent>(line) {
                Ok(event) if query.topic.is_none_or(|t| t == event.topic) => events.push(event),
                Ok(_) => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unparsable event line")
                }
            }
        }
    }

    events.sort_by(|a, b| b.ts.cmp(&a.ts));
    let total = events.len();
    events.truncate(limit);
    Ok(EventPage {
        events,
        total,
        limit,
    })
}

fn recent_day_files(root: &Path) -> Result<Vec<PathBuf>, SinkError> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(SinkError::Io {
                path: root.to_path_buf(),
                source,
            });
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == LOG_EXTENSION)
                && path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .is_some_and(|stem| parse_day(stem).is_ok())
        })
        .collect();
    files.sort();
    files.reverse();
    files.truncate(QUERY_DAYS);
    Ok(files)
}

/// In-memory sink for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<LoggedEvent>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<LoggedEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn try_append(&self, record: &LoggedEvent) -> Result<(), SinkError> {
        self.events.lock().await.push(record.clone());
        Ok(())
    }
}
