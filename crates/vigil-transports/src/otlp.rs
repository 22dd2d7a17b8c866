//! OTLP/HTTP span exporter: batches ended spans through the same
//! [`BatchEngine`] machinery the log-record transports use, and ships them
//! as a single `ExportTraceServiceRequest` JSON body per flush.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use reqwest::Client;
use serde_json::Value;
use vigil_core::spans::SpanProcessor;
use vigil_core::transport::{BatchEngine, BatchSink, TransportError};
use vigil_types::otlp::{
    ExportTraceServiceRequest, OtlpAttributeValue, OtlpArrayValue, OtlpEvent, OtlpInstrumentationScope, OtlpKeyValue, OtlpKeyValueList, OtlpResource,
    OtlpResourceSpans, OtlpScopeSpans, OtlpSpan, OtlpStatus, OtlpStatusCode, SPAN_KIND_INTERNAL,
};
use vigil_types::span::{SpanData, SpanEvent, SpanStatus};

/// The fixed instrumentation scope name every export carries.
const SCOPE_NAME: &str = "vestig-like-sdk";

#[derive(Clone)]
pub struct OtlpExporterConfig {
    pub endpoint: String,
    pub service_name: String,
    pub service_version: Option<String>,
    pub environment: Option<String>,
    pub headers: HashMap<String, String>,
    pub resource_attributes: IndexMap<String, Value>,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub enabled: bool,
}

impl OtlpExporterConfig {
    pub fn new(endpoint: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            service_name: service_name.into(),
            service_version: None,
            environment: None,
            headers: HashMap::new(),
            resource_attributes: IndexMap::new(),
            batch_size: 100,
            flush_interval: Duration::from_millis(5_000),
            timeout: Duration::from_millis(30_000),
            max_retries: 3,
            retry_delay: Duration::from_millis(1_000),
            enabled: true,
        }
    }

    fn batch_config(&self) -> vigil_types::transport::BatchTransportConfig {
        vigil_types::transport::BatchTransportConfig {
            batch_size: self.batch_size,
            flush_interval: self.flush_interval,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
        }
    }
}

fn nanos_since_epoch(at: DateTime<Utc>) -> String {
    at.timestamp_nanos_opt().unwrap_or(0).to_string()
}

fn value_to_attribute(value: &Value) -> OtlpAttributeValue {
    match value {
        Value::String(s) => OtlpAttributeValue::StringValue(s.clone()),
        Value::Bool(b) => OtlpAttributeValue::BoolValue(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => OtlpAttributeValue::IntValue(i.to_string()),
            None => OtlpAttributeValue::DoubleValue(n.as_f64().unwrap_or(0.0)),
        },
        Value::Array(items) => OtlpAttributeValue::ArrayValue(OtlpArrayValue { values: items.iter().map(value_to_attribute).collect() }),
        Value::Object(map) => {
            OtlpAttributeValue::KvListValue(OtlpKeyValueList { values: map.iter().map(|(k, v)| OtlpKeyValue { key: k.clone(), value: value_to_attribute(v) }).collect() })
        }
        Value::Null => OtlpAttributeValue::StringValue(String::new()),
    }
}

fn to_otlp_kv(key: &str, value: &Value) -> OtlpKeyValue {
    OtlpKeyValue { key: key.to_string(), value: value_to_attribute(value) }
}

fn to_otlp_event(event: &SpanEvent) -> OtlpEvent {
    OtlpEvent {
        time_unix_nano: nanos_since_epoch(event.timestamp),
        name: event.name.clone(),
        attributes: event.attributes.as_ref().map(|attrs| attrs.iter().map(|(k, v)| to_otlp_kv(k, v)).collect()).unwrap_or_default(),
    }
}

fn to_otlp_span(span: &SpanData) -> OtlpSpan {
    let status_code = match span.status {
        SpanStatus::Unset => OtlpStatusCode::Unset,
        SpanStatus::Ok => OtlpStatusCode::Ok,
        SpanStatus::Error => OtlpStatusCode::Error,
    };

    OtlpSpan {
        trace_id: span.trace_id.to_string(),
        span_id: span.span_id.to_string(),
        parent_span_id: span.parent_span_id.map(|id| id.to_string()),
        name: span.name.clone(),
        kind: SPAN_KIND_INTERNAL,
        start_time_unix_nano: nanos_since_epoch(span.start_time),
        end_time_unix_nano: span.end_time.map(nanos_since_epoch).unwrap_or_else(|| nanos_since_epoch(span.start_time)),
        attributes: span.attributes.iter().map(|(k, v)| to_otlp_kv(k, v)).collect(),
        events: span.events.iter().map(to_otlp_event).collect(),
        status: OtlpStatus { code: status_code, message: span.status_message.clone() },
    }
}

/// Fixed `service.*`/`telemetry.sdk.*` resource attributes plus whatever the
/// caller supplied.
fn resource_attributes(config: &OtlpExporterConfig) -> Vec<OtlpKeyValue> {
    let mut attrs = vec![OtlpKeyValue::string("service.name", &config.service_name)];
    if let Some(version) = &config.service_version {
        attrs.push(OtlpKeyValue::string("service.version", version));
    }
    if let Some(environment) = &config.environment {
        attrs.push(OtlpKeyValue::string("deployment.environment", environment));
    }
    attrs.push(OtlpKeyValue::string("telemetry.sdk.name", "vigil"));
    attrs.push(OtlpKeyValue::string("telemetry.sdk.version", env!("CARGO_PKG_VERSION")));
    attrs.push(OtlpKeyValue::string("telemetry.sdk.language", "rust"));
    for (key, value) in &config.resource_attributes {
        attrs.push(to_otlp_kv(key, value));
    }
    attrs
}

struct OtlpSink {
    client: Client,
    config: OtlpExporterConfig,
}

#[async_trait]
impl BatchSink for OtlpSink {
    type Record = SpanData;

    async fn send(&self, records: &[SpanData]) -> Result<(), TransportError> {
        let request_body = ExportTraceServiceRequest {
            resource_spans: vec![OtlpResourceSpans {
                resource: OtlpResource { attributes: resource_attributes(&self.config) },
                scope_spans: vec![OtlpScopeSpans {
                    scope: OtlpInstrumentationScope { name: SCOPE_NAME.to_string(), version: Some(env!("CARGO_PKG_VERSION").to_string()) },
                    spans: records.iter().map(to_otlp_span).collect(),
                }],
            }],
        };

        let mut request = self.client.post(&self.config.endpoint).timeout(self.config.timeout).header("Content-Type", "application/json").json(&request_body);
        for (name, value) in &self.config.headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                TransportError::Send { retryable: true, message: "request timed out".to_string(), status_code: Some(408) }
            } else {
                TransportError::Send { retryable: true, message: err.to_string(), status_code: None }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Send { retryable: !(400..500).contains(&code), message: body, status_code: Some(code) });
        }

        Ok(())
    }
}

/// Exports ended spans to an OTLP/HTTP collector. One such processor is
/// registered per [`vigil_core::spans::TracingEngine`]; disabled exporters
/// (`enabled: false`) never buffer or send anything.
pub struct OtlpExporter {
    engine: Arc<BatchEngine<OtlpSink>>,
    enabled: bool,
    shutdown: AtomicBool,
}

impl OtlpExporter {
    /// Must be called from within a Tokio runtime; starts the periodic
    /// flush timer immediately unless `config.enabled` is `false`.
    pub fn new(config: OtlpExporterConfig) -> Self {
        let enabled = config.enabled;
        let batch = config.batch_config();
        let sink = OtlpSink { client: Client::new(), config };
        let engine = BatchEngine::new(sink, batch);
        if enabled {
            engine.init();
        }
        Self { engine, enabled, shutdown: AtomicBool::new(false) }
    }

    pub async fn force_flush(&self) {
        if self.enabled {
            self.engine.flush().await;
        }
    }

    pub async fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        self.engine.destroy().await;
    }
}

#[async_trait]
impl SpanProcessor for OtlpExporter {
    fn name(&self) -> &str {
        "otlp"
    }

    fn on_end(&self, span: &SpanData) {
        if !self.enabled || self.shutdown.load(Ordering::SeqCst) {
            return;
        }
        self.engine.log(span.clone());
    }

    async fn force_flush(&self) {
        OtlpExporter::force_flush(self).await;
    }

    async fn shutdown(&self) {
        OtlpExporter::shutdown(self).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_types::ids::{SpanId, TraceId};

    fn span(name: &str) -> SpanData {
        let mut data = SpanData::new(SpanId::from_bytes([1; 8]), TraceId::from_bytes([2; 16]), None, name, Utc::now());
        data.end_time = Some(Utc::now());
        data
    }

    #[test]
    fn resource_attributes_include_fixed_sdk_fields_and_user_attributes() {
        let mut config = OtlpExporterConfig::new("https://collector.example/v1/traces", "checkout");
        config.service_version = Some("1.2.3".to_string());
        config.environment = Some("prod".to_string());
        config.resource_attributes.insert("team".to_string(), Value::String("payments".to_string()));

        let attrs = resource_attributes(&config);
        let find = |key: &str| attrs.iter().find(|kv| kv.key == key);

        assert!(matches!(find("service.name").unwrap().value, OtlpAttributeValue::StringValue(ref v) if v == "checkout"));
        assert!(matches!(find("service.version").unwrap().value, OtlpAttributeValue::StringValue(ref v) if v == "1.2.3"));
        assert!(matches!(find("deployment.environment").unwrap().value, OtlpAttributeValue::StringValue(ref v) if v == "prod"));
        assert!(find("telemetry.sdk.language").is_some());
        assert!(matches!(find("team").unwrap().value, OtlpAttributeValue::StringValue(ref v) if v == "payments"));
    }

    #[test]
    fn span_conversion_produces_decimal_nanosecond_timestamps() {
        let converted = to_otlp_span(&span("checkout.process"));
        assert!(converted.start_time_unix_nano.chars().all(|c| c.is_ascii_digit()));
        assert!(converted.end_time_unix_nano.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(converted.kind, SPAN_KIND_INTERNAL);
    }

    #[test]
    fn unended_span_falls_back_to_start_time_for_end_time() {
        let data = SpanData::new(SpanId::from_bytes([1; 8]), TraceId::from_bytes([2; 16]), None, "in-flight", Utc::now());
        let converted = to_otlp_span(&data);
        assert_eq!(converted.start_time_unix_nano, converted.end_time_unix_nano);
    }

    #[tokio::test]
    async fn disabled_exporter_never_buffers_spans() {
        let mut config = OtlpExporterConfig::new("https://collector.example/v1/traces", "checkout");
        config.enabled = false;
        let exporter = OtlpExporter::new(config);
        exporter.on_end(&span("noop"));
        assert_eq!(exporter.engine.stats().buffered, 0);
    }
}
