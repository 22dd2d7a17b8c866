//! Wide-event value types: an accumulating record emitted once at the end
//! of a unit of work.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::CorrelationContext;
use crate::error::SerializedError;
use crate::level::LogLevel;

/// Terminal status of a wide event. Extensible: callers may use any string
/// beyond the four named here (success, error, timeout, cancelled).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WideEventStatus {
    Success,
    Error,
    Timeout,
    Cancelled,
    Other(String),
}

impl WideEventStatus {
    pub fn as_str(&self) -> &str {
        match self {
            WideEventStatus::Success => "success",
            WideEventStatus::Error => "error",
            WideEventStatus::Timeout => "timeout",
            WideEventStatus::Cancelled => "cancelled",
            WideEventStatus::Other(s) => s,
        }
    }

    /// Whether this status is in the default tail-sampling always-keep set.
    pub fn is_error(&self) -> bool {
        matches!(self, WideEventStatus::Error)
    }
}

/// The accumulated, frozen-at-end state of a wide event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WideEvent {
    pub event_type: String,
    pub started_at: DateTime<Utc>,
    /// category -> key -> value
    pub fields: IndexMap<String, IndexMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<CorrelationContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<WideEventStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SerializedError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
}

impl WideEvent {
    pub fn new(event_type: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            event_type: event_type.into(),
            started_at,
            fields: IndexMap::new(),
            context: None,
            ended_at: None,
            duration_ms: None,
            status: None,
            error: None,
            level: None,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Flatten the two-level `category.key` mapping into dotted keys,
    /// suitable for emission as log-record metadata.
    pub fn to_metadata(&self) -> IndexMap<String, Value> {
        let mut out = IndexMap::new();
        for (category, kvs) in &self.fields {
            for (key, value) in kvs {
                out.insert(format!("{category}.{key}"), value.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn to_metadata_flattens_categories() {
        let mut event = WideEvent::new("http.request", Utc::now());
        event
            .fields
            .entry("request".to_string())
            .or_default()
            .insert("method".to_string(), json!("GET"));
        event
            .fields
            .entry("response".to_string())
            .or_default()
            .insert("status".to_string(), json!(200));

        let flat = event.to_metadata();
        assert_eq!(flat.get("request.method"), Some(&json!("GET")));
        assert_eq!(flat.get("response.status"), Some(&json!(200)));
    }
}
