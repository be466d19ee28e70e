use std::{collections::VecDeque, fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{excerpt, StreamLogger};
use tokio::task::spawn_blocking;
use tracing::warn;

use crate::actions::{ExecutionResult, OutcomeTag, RequestId};

const DEFAULT_EXCERPT_CHARS: usize = 200;
const DEFAULT_JOURNAL_CAPACITY: usize = 1_024;

/// Audit stream a record belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Completed host actions.
    CommandExecution,
    /// Blocks, refusals and dangerous classifications.
    SecurityEvent,
    /// Classification decisions and other domain activity.
    Activity,
}

impl AuditKind {
    /// Stream name, also the file stem.
    #[must_use]
    pub const fn stream(self) -> &'static str {
        match self {
            Self::CommandExecution => "command_execution",
            Self::SecurityEvent => "security_event",
            Self::Activity => "activity",
        }
    }
}

/// Append-only fact about a classification or execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    /// When the fact was recorded.
    pub timestamp: DateTime<Utc>,
    /// Stream.
    pub kind: AuditKind,
    /// Caller identity.
    pub caller: String,
    /// What was attempted.
    pub action: String,
    /// Short event label for security and activity records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Outcome tag, when the record concerns an execution attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OutcomeTag>,
    /// Bounded excerpt of output or error text.
    #[serde(default)]
    pub excerpt: String,
    /// Related request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    /// Structured extras.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl AuditRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(kind: AuditKind, caller: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            caller: caller.into(),
            action: action.into(),
            event: None,
            outcome: None,
            excerpt: String::new(),
            request_id: None,
            details: Value::Null,
        }
    }

    /// Sets the event label.
    #[must_use]
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Sets the outcome tag.
    #[must_use]
    pub const fn outcome(mut self, outcome: OutcomeTag) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Sets the request id.
    #[must_use]
    pub const fn request(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Sets structured extras.
    #[must_use]
    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Sets the excerpt; the recorder bounds it on write.
    #[must_use]
    pub fn excerpt(mut self, text: impl Into<String>) -> Self {
        self.excerpt = text.into();
        self
    }
}

/// Builder for [`AuditRecorder`].
pub struct AuditRecorderBuilder {
    source: String,
    dir: Option<PathBuf>,
    publisher: Option<Arc<dyn EventPublisher>>,
    excerpt_chars: usize,
    journal_capacity: usize,
}

impl AuditRecorderBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            dir: None,
            publisher: None,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
        }
    }

    /// Directory receiving `<stream>.jsonl` files.
    #[must_use]
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// External audit collaborator.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Excerpt bound in characters.
    #[must_use]
    pub const fn excerpt_chars(mut self, chars: usize) -> Self {
        self.excerpt_chars = chars;
        self
    }

    /// Number of records kept in memory.
    #[must_use]
    pub fn journal_capacity(mut self, capacity: usize) -> Self {
        self.journal_capacity = capacity.max(1);
        self
    }

    /// Builds the recorder, creating the audit directory.
    pub fn build(self) -> Result<AuditRecorder> {
        let streams = self.dir.map(StreamLogger::new).transpose()?.map(Arc::new);
        Ok(AuditRecorder {
            inner: Arc::new(RecorderInner {
                source: self.source,
                streams,
                publisher: self.publisher,
                excerpt_chars: self.excerpt_chars,
                journal: RwLock::new(VecDeque::new()),
                journal_capacity: self.journal_capacity,
            }),
        })
    }
}

struct RecorderInner {
    source: String,
    streams: Option<Arc<StreamLogger>>,
    publisher: Option<Arc<dyn EventPublisher>>,
    excerpt_chars: usize,
    journal: RwLock<VecDeque<AuditRecord>>,
    journal_capacity: usize,
}

/// Append-only audit trail shared across the pipeline.
///
/// Each record goes to its stream file, to the event publisher as
/// `audit.<stream>`, and to a bounded in-memory journal. Sink failures are
/// logged and never retried.
#[derive(Clone)]
pub struct AuditRecorder {
    inner: Arc<RecorderInner>,
}

impl fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditRecorder")
            .field("source", &self.inner.source)
            .field("dir", &self.inner.streams.as_ref().map(|streams| streams.dir()))
            .finish_non_exhaustive()
    }
}

impl AuditRecorder {
    /// Returns a builder.
    #[must_use]
    pub fn builder(source: impl Into<String>) -> AuditRecorderBuilder {
        AuditRecorderBuilder::new(source)
    }

    /// Recorder keeping records only in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(RecorderInner {
                source: "hostgate".into(),
                streams: None,
                publisher: None,
                excerpt_chars: DEFAULT_EXCERPT_CHARS,
                journal: RwLock::new(VecDeque::new()),
                journal_capacity: DEFAULT_JOURNAL_CAPACITY,
            }),
        }
    }

    /// Appends a record to every configured sink.
    pub async fn record(&self, mut record: AuditRecord) {
        record.action = excerpt(&record.action, self.inner.excerpt_chars);
        record.excerpt = excerpt(&record.excerpt, self.inner.excerpt_chars);
        let stream = record.kind.stream();

        if let Some(streams) = &self.inner.streams {
            let streams = Arc::clone(streams);
            let line = record.clone();
            match spawn_blocking(move || streams.append(stream, &line)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(stream, error = %err, "audit write failed"),
                Err(err) => warn!(stream, error = %err, "audit writer task failed"),
            }
        }

        if let Some(publisher) = &self.inner.publisher {
            match serde_json::to_value(&record) {
                Ok(payload) => {
                    let event = EventRecord::new(&self.inner.source, format!("audit.{stream}"), payload);
                    if let Err(err) = publisher.publish(event).await {
                        warn!(stream, error = %err, "audit publish failed");
                    }
                }
                Err(err) => warn!(stream, error = %err, "audit record not serializable"),
            }
        }

        let mut journal = self.inner.journal.write();
        journal.push_back(record);
        while journal.len() > self.inner.journal_capacity {
            journal.pop_front();
        }
    }

    /// Records a completed host action.
    pub async fn command_execution(&self, caller: &str, action: &str, result: &ExecutionResult) {
        let record = AuditRecord::new(AuditKind::CommandExecution, caller, action)
            .outcome(result.outcome())
            .request(result.request_id)
            .excerpt(result.audit_text())
            .details(serde_json::json!({
                "exit_code": result.exit_code,
                "duration_ms": result.duration_ms,
            }));
        self.record(record).await;
    }

    /// Records a security-relevant event.
    pub async fn security_event(&self, caller: &str, event: &str, action: &str, details: Value) {
        let record = AuditRecord::new(AuditKind::SecurityEvent, caller, action)
            .event(event)
            .details(details);
        self.record(record).await;
    }

    /// Records a refusal as a security event carrying the outcome.
    pub async fn refusal(&self, caller: &str, event: &str, action: &str, result: &ExecutionResult) {
        let record = AuditRecord::new(AuditKind::SecurityEvent, caller, action)
            .event(event)
            .outcome(result.outcome())
            .request(result.request_id)
            .excerpt(&result.error)
            .details(serde_json::to_value(&result.detail).unwrap_or(Value::Null));
        self.record(record).await;
    }

    /// Records domain activity.
    pub async fn activity(&self, caller: &str, event: &str, action: &str, details: Value) {
        let record = AuditRecord::new(AuditKind::Activity, caller, action)
            .event(event)
            .details(details);
        self.record(record).await;
    }

    /// Snapshot of the in-memory journal.
    #[must_use]
    pub fn journal(&self) -> Vec<AuditRecord> {
        self.inner.journal.read().iter().cloned().collect()
    }

    /// Journal entries of one stream.
    #[must_use]
    pub fn journal_of(&self, kind: AuditKind) -> Vec<AuditRecord> {
        self.inner
            .journal
            .read()
            .iter()
            .filter(|record| record.kind == kind)
            .cloned()
            .collect()
    }

    /// File backing `kind`, when a directory is configured.
    #[must_use]
    pub fn stream_path(&self, kind: AuditKind) -> Option<PathBuf> {
        self.inner
            .streams
            .as_ref()
            .map(|streams| streams.stream_path(kind.stream()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ResultDetail;
    use shared_event_bus::MemoryEventBus;
    use shared_logging::read_records;
    use tempfile::tempdir;

    #[tokio::test]
    async fn records_reach_file_bus_and_journal() {
        let tmp = tempdir().unwrap();
        let bus = Arc::new(MemoryEventBus::new(16));
        let recorder = AuditRecorder::builder("gate")
            .dir(tmp.path().join("audit"))
            .event_publisher(bus.clone())
            .build()
            .unwrap();

        recorder
            .security_event("ops", "SCRIPT_BLOCKED", "run_script: Remove-Item x", Value::Null)
            .await;
        recorder
            .activity("ops", "CLASSIFIED", "install git", serde_json::json!({"tier": "caution"}))
            .await;

        let path = recorder.stream_path(AuditKind::SecurityEvent).unwrap();
        let security: Vec<AuditRecord> = read_records(path).unwrap();
        assert_eq!(security.len(), 1);
        assert_eq!(security[0].event.as_deref(), Some("SCRIPT_BLOCKED"));
        assert_eq!(bus.snapshot_of("audit.security_event").len(), 1);
        assert_eq!(bus.snapshot_of("audit.activity").len(), 1);
        assert_eq!(recorder.journal().len(), 2);
        assert_eq!(recorder.journal_of(AuditKind::Activity).len(), 1);
    }

    #[tokio::test]
    async fn excerpts_are_bounded() {
        let recorder = AuditRecorder::builder("gate").excerpt_chars(10).build().unwrap();
        let result = ExecutionResult::completed(
            RequestId::new_v4(),
            "x".repeat(500),
            ResultDetail::Script { argv: Vec::new() },
        );
        recorder.command_execution("ops", "run_script", &result).await;
        let journal = recorder.journal_of(AuditKind::CommandExecution);
        assert_eq!(journal[0].excerpt.len(), 10);
        assert_eq!(journal[0].outcome, Some(OutcomeTag::Success));
    }

    #[tokio::test]
    async fn long_actions_are_bounded_in_every_sink() {
        let tmp = tempdir().unwrap();
        let bus = Arc::new(MemoryEventBus::new(4));
        let recorder = AuditRecorder::builder("gate")
            .dir(tmp.path())
            .event_publisher(bus.clone())
            .excerpt_chars(50)
            .build()
            .unwrap();
        let action = format!("run_script: {}", "Get-Date; ".repeat(10_000));
        recorder
            .security_event("ops", "SCRIPT_BLOCKED", &action, Value::Null)
            .await;

        let journal = recorder.journal();
        assert_eq!(journal[0].action.chars().count(), 50);
        assert!(journal[0].action.starts_with("run_script: Get-Date;"));
        let path = recorder.stream_path(AuditKind::SecurityEvent).unwrap();
        let on_disk: Vec<AuditRecord> = read_records(path).unwrap();
        assert_eq!(on_disk[0].action.chars().count(), 50);
        let published = bus.snapshot_of("audit.security_event");
        assert_eq!(published[0].payload["action"].as_str().map(str::len), Some(50));
    }

    #[tokio::test]
    async fn journal_is_bounded() {
        let recorder = AuditRecorder::builder("gate").journal_capacity(2).build().unwrap();
        for idx in 0..5 {
            recorder
                .activity("ops", "CLASSIFIED", &format!("cmd {idx}"), Value::Null)
                .await;
        }
        let journal = recorder.journal();
        assert_eq!(journal.len(), 2);
        assert_eq!(journal[1].action, "cmd 4");
    }
}
