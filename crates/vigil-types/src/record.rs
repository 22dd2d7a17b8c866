//! The emitted-once log record.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::CorrelationContext;
use crate::error::SerializedError;
use crate::level::LogLevel;

/// A single log line after all pipeline transformations; the unit delivered
/// to a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Millisecond-precision UTC timestamp.
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<IndexMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<CorrelationContext>,
    /// The runtime tag from [`crate::RuntimeProbe`]-equivalent; kept here as
    /// a plain string since `vigil-types` has no dependency on `vigil-core`.
    pub runtime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SerializedError>,
}

impl LogRecord {
    pub fn new(level: LogLevel, message: impl Into<String>, runtime: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            metadata: None,
            context: None,
            runtime: runtime.into(),
            namespace: None,
            error: None,
        }
    }

    /// The `(namespace, level, message)` triple dedup signatures are built from.
    pub fn dedup_key_parts(&self) -> (Option<&str>, LogLevel, &str) {
        (self.namespace.as_deref(), self.level, self.message.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_without_optional_fields() {
        let record = LogRecord::new(LogLevel::Info, "hello", "rust");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("metadata").is_none());
        assert!(json.get("context").is_none());
        assert!(json.get("error").is_none());
    }
}
