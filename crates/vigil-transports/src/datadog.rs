//! Datadog transport: an HTTP transport specialization with a fixed site
//! mapping, level remapping, and a fixed log-intake transform.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use vigil_core::transport::{BatchEngine, BatchSink, Transport, TransportError};
use vigil_types::level::LogLevel;
use vigil_types::record::LogRecord;
use vigil_types::transport::{BatchTransportConfig, TransportConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatadogSite {
    Us1,
    Us3,
    Us5,
    Eu,
    UsGov,
}

impl DatadogSite {
    fn intake_url(self) -> &'static str {
        match self {
            DatadogSite::Us1 => "https://http-intake.logs.datadoghq.com/api/v2/logs",
            DatadogSite::Us3 => "https://http-intake.logs.us3.datadoghq.com/api/v2/logs",
            DatadogSite::Us5 => "https://http-intake.logs.us5.datadoghq.com/api/v2/logs",
            DatadogSite::Eu => "https://http-intake.logs.datadoghq.eu/api/v2/logs",
            DatadogSite::UsGov => "https://http-intake.logs.ddog-gov.com/api/v2/logs",
        }
    }
}

fn remap_level(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace | LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warning",
        LogLevel::Error => "error",
    }
}

#[derive(Clone)]
pub struct DatadogTransportConfig {
    pub base: TransportConfig,
    pub batch: BatchTransportConfig,
    pub site: DatadogSite,
    pub api_key: String,
    pub service: String,
    pub tags: Vec<String>,
    pub timeout: Duration,
}

impl DatadogTransportConfig {
    pub fn new(api_key: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            base: TransportConfig::new("datadog"),
            batch: BatchTransportConfig { batch_size: 50, flush_interval: Duration::from_millis(3000), ..Default::default() },
            site: DatadogSite::Us1,
            api_key: api_key.into(),
            service: service.into(),
            tags: Vec::new(),
            timeout: Duration::from_millis(30_000),
        }
    }
}

/// Converts a single record to the fixed Datadog log-intake shape.
fn to_datadog_log(record: &LogRecord, config: &DatadogTransportConfig, hostname: &str) -> serde_json::Value {
    let mut tags = vec![format!("runtime:{}", record.runtime)];
    if let Some(namespace) = &record.namespace {
        tags.push(format!("namespace:{namespace}"));
    }
    if let Some(context) = &record.context {
        if let Some(trace_id) = context.trace_id() {
            tags.push(format!("trace_id:{trace_id}"));
        }
        if let Some(span_id) = context.span_id() {
            tags.push(format!("span_id:{span_id}"));
        }
    }
    tags.extend(config.tags.iter().cloned());

    let mut entry = serde_json::json!({
        "ddsource": "vigil",
        "ddtags": tags.join(","),
        "hostname": hostname,
        "message": record.message,
        "service": config.service,
        "status": remap_level(record.level),
        "timestamp": record.timestamp.timestamp_millis(),
    });

    if let Some(metadata) = &record.metadata {
        if !metadata.is_empty() {
            entry["attributes"] = serde_json::to_value(metadata).unwrap_or_default();
        }
    }
    if let Some(error) = &record.error {
        entry["error"] = serde_json::to_value(error).unwrap_or_default();
    }

    entry
}

struct DatadogSink {
    client: Client,
    config: DatadogTransportConfig,
    hostname: String,
}

#[async_trait]
impl BatchSink for DatadogSink {
    type Record = LogRecord;

    async fn send(&self, records: &[LogRecord]) -> Result<(), TransportError> {
        let body: Vec<serde_json::Value> = records.iter().map(|r| to_datadog_log(r, &self.config, &self.hostname)).collect();

        let response = self
            .client
            .request(Method::POST, self.config.site.intake_url())
            .header("DD-API-KEY", &self.config.api_key)
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    TransportError::Send { retryable: true, message: "request timed out".to_string(), status_code: Some(408) }
                } else {
                    TransportError::Send { retryable: true, message: err.to_string(), status_code: None }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::Send { retryable: !(400..500).contains(&code), message: text, status_code: Some(code) });
        }

        Ok(())
    }
}

pub struct DatadogTransport {
    engine: Arc<BatchEngine<DatadogSink>>,
    name: String,
    base: TransportConfig,
}

impl DatadogTransport {
    /// Must be called from within a Tokio runtime; starts the periodic
    /// flush timer immediately.
    pub fn new(config: DatadogTransportConfig) -> Self {
        let name = config.base.name.clone();
        let base = config.base.clone();
        let batch = config.batch.clone();
        let hostname = hostname::get().ok().and_then(|h| h.into_string().ok()).unwrap_or_else(|| "unknown".to_string());
        let sink = DatadogSink { client: Client::new(), config, hostname };
        let engine = BatchEngine::new(sink, batch);
        engine.init();
        Self { engine, name, base }
    }
}

#[async_trait]
impl Transport for DatadogTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn admits(&self, level: LogLevel) -> bool {
        self.base.admits(level)
    }

    async fn log(&self, record: LogRecord) {
        self.engine.log(record);
    }

    async fn flush(&self) {
        self.engine.flush().await;
    }

    async fn destroy(&self) {
        self.engine.destroy().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(level: LogLevel, msg: &str) -> LogRecord {
        LogRecord::new(level, msg, "rust")
    }

    #[test]
    fn level_remapping_matches_spec() {
        assert_eq!(remap_level(LogLevel::Trace), "debug");
        assert_eq!(remap_level(LogLevel::Debug), "debug");
        assert_eq!(remap_level(LogLevel::Info), "info");
        assert_eq!(remap_level(LogLevel::Warn), "warning");
        assert_eq!(remap_level(LogLevel::Error), "error");
    }

    #[test]
    fn default_batch_config_matches_spec() {
        let config = DatadogTransportConfig::new("key", "svc");
        assert_eq!(config.batch.batch_size, 50);
        assert_eq!(config.batch.flush_interval, Duration::from_millis(3000));
    }

    #[test]
    fn converted_log_carries_runtime_and_namespace_tags() {
        let config = DatadogTransportConfig::new("key", "svc");
        let mut rec = record(LogLevel::Warn, "low disk");
        rec.namespace = Some("db".to_string());
        let entry = to_datadog_log(&rec, &config, "host-1");
        let tags = entry["ddtags"].as_str().unwrap();
        assert!(tags.contains("runtime:rust"));
        assert!(tags.contains("namespace:db"));
        assert_eq!(entry["status"], "warning");
        assert_eq!(entry["service"], "svc");
    }

    #[test]
    fn site_urls_are_distinct() {
        let urls: std::collections::HashSet<&str> =
            [DatadogSite::Us1, DatadogSite::Us3, DatadogSite::Us5, DatadogSite::Eu, DatadogSite::UsGov].iter().map(|s| s.intake_url()).collect();
        assert_eq!(urls.len(), 5);
    }
}
