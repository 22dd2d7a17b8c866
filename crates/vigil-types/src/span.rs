//! Span value types: the immutable + mutable state of a distributed trace span.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{SpanId, TraceId};

/// Terminal status of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Unset,
    Ok,
    Error,
}

impl Default for SpanStatus {
    fn default() -> Self {
        SpanStatus::Unset
    }
}

/// A single point-in-time event recorded on a span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<IndexMap<String, Value>>,
}

/// The full state of a span: immutable identity fields plus mutable
/// attributes/events/status that freeze once `ended_at` is set.
///
/// This is a plain value type — [`vigil-core`]'s `Span` wraps it with
/// interior mutability and processor notification; this struct is what
/// gets handed to transports/exporters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanData {
    pub span_id: SpanId,
    pub trace_id: TraceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub attributes: IndexMap<String, Value>,
    pub events: Vec<SpanEvent>,
    pub status: SpanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl SpanData {
    pub fn new(span_id: SpanId, trace_id: TraceId, parent_span_id: Option<SpanId>, name: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            span_id,
            trace_id,
            parent_span_id,
            name: name.into(),
            start_time,
            end_time: None,
            attributes: IndexMap::new(),
            events: Vec::new(),
            status: SpanStatus::Unset,
            status_message: None,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }

    /// `end_time - start_time`, or `None` if not yet ended.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_is_none_until_ended() {
        let span = SpanData::new(
            SpanId::from_bytes([1; 8]),
            TraceId::from_bytes([2; 16]),
            None,
            "op",
            Utc::now(),
        );
        assert!(span.duration().is_none());
    }
}
