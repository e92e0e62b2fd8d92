//! Trace / debug output (spec §3 "Trace" entity, §6 "Trace / debug output").
//!
//! A `Trace` is the root record for one `AgentRequest`; debug events are
//! attached to it as span events rather than a second log pipeline. This
//! module provides the record shape and a `TraceRecorder` that persists one
//! JSON line per closed span -- the mechanism left unspecified by §6.

use std::io::Write;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub name: String,
    pub at_ms: i64,
    /// Attribute values are never `null` (§6); callers substitute "".
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanRecord {
    pub trace_id: String,
    pub context_id: String,
    pub conversation_id: String,
    pub span_name: String,
    pub prompt_preview: String,
    pub status: SpanStatus,
    pub error_kind: Option<crate::error::ErrorKind>,
    pub events: Vec<TraceEvent>,
    pub started_ms: i64,
    pub ended_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanStatus {
    Ok,
    Error,
}

/// Substitutes "" for attribute values that would otherwise be null/missing.
pub fn attr(value: Option<impl Into<serde_json::Value>>) -> serde_json::Value {
    value
        .map(Into::into)
        .filter(|v| !v.is_null())
        .unwrap_or_else(|| serde_json::Value::String(String::new()))
}

/// Sink for `SpanRecord`s. The in-memory recorder backs tests; the file
/// recorder appends one JSON line per record, matching the "rotating
/// JSON-lines stream" contract.
pub trait TraceRecorder: Send + Sync {
    fn record(&self, span: SpanRecord);
}

#[derive(Default)]
pub struct InMemoryTraceRecorder {
    records: Mutex<Vec<SpanRecord>>,
}

impl InMemoryTraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SpanRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl TraceRecorder for InMemoryTraceRecorder {
    fn record(&self, span: SpanRecord) {
        self.records.lock().unwrap().push(span);
    }
}

pub struct JsonLinesTraceRecorder {
    file: Mutex<std::fs::File>,
}

impl JsonLinesTraceRecorder {
    pub fn open(path: &std::path::Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl TraceRecorder for JsonLinesTraceRecorder {
    fn record(&self, span: SpanRecord) {
        let Ok(line) = serde_json::to_string(&span) else {
            return;
        };
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "{line}");
        }
    }
}
