//! OTLP/JSON export payload tree: `resourceSpans[] -> scopeSpans[] -> spans[]`.
//!
//! Timestamps are 64-bit unsigned nanoseconds since the Unix epoch,
//! serialized as decimal strings to avoid float precision loss; integers
//! round-trip through `intValue` decimal strings for the same reason.

use serde::{Deserialize, Serialize};

/// OTLP status code: UNSET=0, OK=1, ERROR=2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OtlpStatusCode {
    Unset = 0,
    Ok = 1,
    Error = 2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtlpStatus {
    pub code: OtlpStatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Union-typed OTLP attribute value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OtlpAttributeValue {
    #[serde(rename = "stringValue")]
    StringValue(String),
    #[serde(rename = "intValue")]
    IntValue(String),
    #[serde(rename = "doubleValue")]
    DoubleValue(f64),
    #[serde(rename = "boolValue")]
    BoolValue(bool),
    #[serde(rename = "arrayValue")]
    ArrayValue(OtlpArrayValue),
    #[serde(rename = "kvlistValue")]
    KvListValue(OtlpKeyValueList),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtlpArrayValue {
    pub values: Vec<OtlpAttributeValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtlpKeyValueList {
    pub values: Vec<OtlpKeyValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtlpKeyValue {
    pub key: String,
    pub value: OtlpAttributeValue,
}

impl OtlpKeyValue {
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: OtlpAttributeValue::StringValue(value.into()) }
    }

    pub fn int(key: impl Into<String>, value: i64) -> Self {
        Self { key: key.into(), value: OtlpAttributeValue::IntValue(value.to_string()) }
    }

    pub fn double(key: impl Into<String>, value: f64) -> Self {
        Self { key: key.into(), value: OtlpAttributeValue::DoubleValue(value) }
    }

    pub fn boolean(key: impl Into<String>, value: bool) -> Self {
        Self { key: key.into(), value: OtlpAttributeValue::BoolValue(value) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtlpResource {
    pub attributes: Vec<OtlpKeyValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtlpInstrumentationScope {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtlpEvent {
    #[serde(rename = "timeUnixNano")]
    pub time_unix_nano: String,
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub attributes: Vec<OtlpKeyValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtlpSpan {
    #[serde(rename = "traceId")]
    pub trace_id: String,
    #[serde(rename = "spanId")]
    pub span_id: String,
    #[serde(rename = "parentSpanId", skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub name: String,
    pub kind: i32,
    #[serde(rename = "startTimeUnixNano")]
    pub start_time_unix_nano: String,
    #[serde(rename = "endTimeUnixNano")]
    pub end_time_unix_nano: String,
    #[serde(default)]
    pub attributes: Vec<OtlpKeyValue>,
    #[serde(default)]
    pub events: Vec<OtlpEvent>,
    pub status: OtlpStatus,
}

/// OTLP span kind; this crate only ever emits `Internal` (default) or
/// `Client` (fetch instrumentation).
pub const SPAN_KIND_UNSPECIFIED: i32 = 0;
pub const SPAN_KIND_INTERNAL: i32 = 1;
pub const SPAN_KIND_CLIENT: i32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtlpScopeSpans {
    pub scope: OtlpInstrumentationScope,
    pub spans: Vec<OtlpSpan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtlpResourceSpans {
    pub resource: OtlpResource,
    #[serde(rename = "scopeSpans")]
    pub scope_spans: Vec<OtlpScopeSpans>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportTraceServiceRequest {
    #[serde(rename = "resourceSpans")]
    pub resource_spans: Vec<OtlpResourceSpans>,
}

// serde_repr isn't pulled in as a dependency; hand-roll the int<->enum
// mapping instead of taking on another crate for one three-way enum.
use serde::de::Error as _;
use serde::{Deserializer, Serializer};

mod repr {
    use super::*;

    impl Serialize for OtlpStatusCode {
        fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_u8(*self as u8)
        }
    }

    impl<'de> Deserialize<'de> for OtlpStatusCode {
        fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
            let v = u8::deserialize(d)?;
            match v {
                0 => Ok(OtlpStatusCode::Unset),
                1 => Ok(OtlpStatusCode::Ok),
                2 => Ok(OtlpStatusCode::Error),
                other => Err(D::Error::custom(format!("invalid OTLP status code {other}"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_round_trips_through_json() {
        for code in [OtlpStatusCode::Unset, OtlpStatusCode::Ok, OtlpStatusCode::Error] {
            let json = serde_json::to_string(&code).unwrap();
            let back: OtlpStatusCode = serde_json::from_str(&json).unwrap();
            assert_eq!(code as u8, back as u8);
        }
    }

    #[test]
    fn int_value_is_decimal_string() {
        let kv = OtlpKeyValue::int("retry.count", 42);
        let json = serde_json::to_value(&kv).unwrap();
        assert_eq!(json["value"]["intValue"], "42");
    }
}
