//! HTTP transport: batches records into a single JSON POST/PUT per flush.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use vigil_core::transport::{BatchEngine, BatchSink, Transport, TransportError};
use vigil_types::level::LogLevel;
use vigil_types::record::LogRecord;
use vigil_types::transport::{BatchTransportConfig, TransportConfig};

/// Turns a batch of records into the JSON body actually sent. Defaults to
/// serializing the records verbatim as a JSON array.
pub type RecordTransform = Arc<dyn Fn(&[LogRecord]) -> serde_json::Value + Send + Sync>;

#[derive(Clone)]
pub struct HttpTransportConfig {
    pub base: TransportConfig,
    pub batch: BatchTransportConfig,
    pub url: String,
    pub method: Method,
    pub headers: HashMap<String, String>,
    pub timeout: Duration,
    pub transform: Option<RecordTransform>,
}

impl HttpTransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            base: TransportConfig::new("http"),
            batch: BatchTransportConfig::default(),
            url: url.into(),
            method: Method::POST,
            headers: HashMap::new(),
            timeout: Duration::from_millis(30_000),
            transform: None,
        }
    }
}

struct HttpSink {
    client: Client,
    config: HttpTransportConfig,
}

#[async_trait]
impl BatchSink for HttpSink {
    type Record = LogRecord;

    async fn send(&self, records: &[LogRecord]) -> Result<(), TransportError> {
        let body = match &self.config.transform {
            Some(transform) => transform(records),
            None => serde_json::to_value(records).map_err(|e| TransportError::Serialization(e.to_string()))?,
        };

        let mut request = self
            .client
            .request(self.config.method.clone(), &self.config.url)
            .timeout(self.config.timeout)
            .json(&body);

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
            return Err(TransportError::Send {
                retryable: !(400..500).contains(&code),
                message: body,
                status_code: Some(code),
            });
        }

        Ok(())
    }
}

/// Batches records and POSTs (or PUTs) them as a single JSON payload per flush.
pub struct HttpTransport {
    engine: Arc<BatchEngine<HttpSink>>,
    name: String,
    min_level_config: TransportConfig,
}

impl HttpTransport {
    /// Must be called from within a Tokio runtime; starts the periodic
    /// flush timer immediately.
    pub fn new(config: HttpTransportConfig) -> Self {
        let name = config.base.name.clone();
        let min_level_config = config.base.clone();
        let batch = config.batch.clone();
        let sink = HttpSink { client: Client::new(), config };
        let engine = BatchEngine::new(sink, batch);
        engine.init();
        Self { engine, name, min_level_config }
    }

    pub fn stats(&self) -> vigil_core::transport::BatchStats {
        self.engine.stats()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn admits(&self, level: LogLevel) -> bool {
        self.min_level_config.admits(level)
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

    fn record(msg: &str) -> LogRecord {
        LogRecord::new(LogLevel::Info, msg, "rust")
    }

    #[test]
    fn config_defaults_post_with_30s_timeout() {
        let config = HttpTransportConfig::new("https://example.com/logs");
        assert_eq!(config.method, Method::POST);
        assert_eq!(config.timeout, Duration::from_millis(30_000));
    }

    #[tokio::test]
    async fn transform_overrides_default_array_serialization() {
        let mut config = HttpTransportConfig::new("https://example.com/logs");
        config.transform = Some(Arc::new(|records: &[LogRecord]| {
            serde_json::json!({ "count": records.len() })
        }));
        let sink = HttpSink { client: Client::new(), config };
        // Exercise only the pure transform path; no network call happens
        // because `transform` short-circuits before any request is built.
        let body = (sink.config.transform.as_ref().unwrap())(&[record("a"), record("b")]);
        assert_eq!(body["count"], 2);
    }
}
