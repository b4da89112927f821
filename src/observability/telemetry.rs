//! Query telemetry
//!
//! Three named events per query: `query.start`, `query.stop` and
//! `query.exception`. Metadata carries counts and a redacted filter summary
//! (`binding.field op`), never filter values.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::logger::{Logger, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryKind {
    Start,
    Stop,
    Exception,
}

impl TelemetryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryKind::Start => "query.start",
            TelemetryKind::Stop => "query.stop",
            TelemetryKind::Exception => "query.exception",
        }
    }
}

impl fmt::Display for TelemetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What every event of one query shares
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMetadata {
    pub source: String,
    pub operation_count: usize,
    pub join_count: usize,
    pub filter_count: usize,
    pub filter_summary: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub kind: TelemetryKind,
    /// Correlates the events of one execution
    pub query_id: Uuid,
    pub system_time: DateTime<Utc>,
    pub duration: Option<Duration>,
    pub query_time: Option<Duration>,
    pub metadata: QueryMetadata,
    pub row_count: Option<usize>,
    pub error_kind: Option<String>,
}

impl TelemetryEvent {
    pub fn start(query_id: Uuid, metadata: QueryMetadata) -> Self {
        Self {
            kind: TelemetryKind::Start,
            query_id,
            system_time: Utc::now(),
            duration: None,
            query_time: None,
            metadata,
            row_count: None,
            error_kind: None,
        }
    }

    pub fn stop(
        query_id: Uuid,
        metadata: QueryMetadata,
        duration: Duration,
        query_time: Duration,
        row_count: usize,
    ) -> Self {
        Self {
            kind: TelemetryKind::Stop,
            duration: Some(duration),
            query_time: Some(query_time),
            row_count: Some(row_count),
            ..Self::start(query_id, metadata)
        }
    }

    pub fn exception(
        query_id: Uuid,
        metadata: QueryMetadata,
        duration: Duration,
        error_kind: impl Into<String>,
    ) -> Self {
        Self {
            kind: TelemetryKind::Exception,
            duration: Some(duration),
            error_kind: Some(error_kind.into()),
            ..Self::start(query_id, metadata)
        }
    }

    /// Flat string fields, as written to the log
    pub fn fields(&self) -> BTreeMap<&'static str, String> {
        let mut fields = BTreeMap::new();
        fields.insert("query_id", self.query_id.to_string());
        fields.insert("system_time", self.system_time.to_rfc3339());
        fields.insert("source", self.metadata.source.clone());
        fields.insert("operation_count", self.metadata.operation_count.to_string());
        fields.insert("join_count", self.metadata.join_count.to_string());
        fields.insert("filter_count", self.metadata.filter_count.to_string());
        fields.insert("filters", self.metadata.filter_summary.join(", "));
        if let Some(d) = self.duration {
            fields.insert("duration_us", d.as_micros().to_string());
        }
        if let Some(d) = self.query_time {
            fields.insert("query_time_us", d.as_micros().to_string());
        }
        if let Some(rows) = self.row_count {
            fields.insert("row_count", rows.to_string());
        }
        if let Some(kind) = &self.error_kind {
            fields.insert("error_kind", kind.clone());
        }
        fields
    }
}

/// Consumer of telemetry events
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: &TelemetryEvent);
}

/// Writes events through the structured logger
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn emit(&self, event: &TelemetryEvent) {
        let severity = match event.kind {
            TelemetryKind::Start => Severity::Trace,
            TelemetryKind::Stop => Severity::Info,
            TelemetryKind::Exception => Severity::Error,
        };
        let fields = event.fields();
        let pairs: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        Logger::log(severity, event.kind.as_str(), &pairs);
    }
}

/// Collects events in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Event kinds in emission order
    pub fn kinds(&self) -> Vec<TelemetryKind> {
        self.events().iter().map(|e| e.kind).collect()
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TelemetrySink for MemorySink {
    fn emit(&self, event: &TelemetryEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}
