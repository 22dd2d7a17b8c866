//! Fetch instrumentation: wraps a [`reqwest::Client`] so outbound calls
//! open a span, inject `traceparent`, and record OpenTelemetry HTTP
//! attributes.
//!
//! Wrapping the host's outbound HTTP client once and only once would, on a
//! dynamic host, mean monkey-patching a mutable global function; Rust has
//! no such thing. A `reqwest::Client` is an explicit value instead. The single-install
//! guarantee is instead enforced by a process-wide flag: a second
//! `install` call warns and returns `None` rather than layering a second
//! instrumented client over the same connection pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use regex::Regex;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, Method, Request, Response, Url};
use vigil_types::span::SpanStatus;

use crate::correlation::create_traceparent;
use crate::spans::TracingEngine;

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// A substring or regex match against a full request URL.
pub enum IgnorePattern {
    Substring(String),
    Regex(Regex),
}

impl IgnorePattern {
    fn matches(&self, url: &str) -> bool {
        match self {
            IgnorePattern::Substring(s) => url.contains(s.as_str()),
            IgnorePattern::Regex(re) => re.is_match(url),
        }
    }
}

pub struct FetchInstrumentationConfig {
    pub prefix: String,
    pub ignore_urls: Vec<IgnorePattern>,
    pub propagate_context: bool,
    pub capture_request_headers: Vec<String>,
    pub capture_response_headers: Vec<String>,
}

impl Default for FetchInstrumentationConfig {
    fn default() -> Self {
        Self {
            prefix: "http.client".to_string(),
            ignore_urls: Vec::new(),
            propagate_context: true,
            capture_request_headers: Vec::new(),
            capture_response_headers: Vec::new(),
        }
    }
}

/// The installed instrumentation wrapper. Holds the underlying client and
/// the tracing engine spans are opened on.
pub struct FetchInstrumentation {
    client: Client,
    engine: Arc<TracingEngine>,
    config: FetchInstrumentationConfig,
}

impl FetchInstrumentation {
    /// Install instrumentation around `client`. Returns `None` (and logs a
    /// warning) if instrumentation is already installed elsewhere in the
    /// process.
    pub fn install(client: Client, engine: Arc<TracingEngine>, config: FetchInstrumentationConfig) -> Option<Self> {
        if INSTALLED.swap(true, Ordering::SeqCst) {
            tracing::warn!("vigil: fetch instrumentation is already installed; ignoring duplicate install");
            return None;
        }
        Some(Self { client, engine, config })
    }

    /// Release the single-install guard, letting a future `install` call
    /// succeed again. The wrapped client itself is simply dropped.
    pub fn uninstrument(self) {
        INSTALLED.store(false, Ordering::SeqCst);
    }

    /// Parse `url`, build a `method` request, and execute it instrumented.
    /// An unparseable URL delegates unmodified to the inner client.
    pub async fn request(&self, method: Method, url: &str) -> reqwest::Result<Response> {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(_) => return self.client.request(method, url).send().await,
        };
        let request = self.client.request(method, parsed).build()?;
        self.execute(request).await
    }

    /// Execute an already-built request instrumented, unless its URL
    /// matches one of `config.ignore_urls`.
    pub async fn execute(&self, request: Request) -> reqwest::Result<Response> {
        let url = request.url().clone();
        if self.is_ignored(url.as_str()) {
            return self.client.execute(request).await;
        }

        let method = request.method().clone();
        let host = url.host_str().unwrap_or("");
        let span_name = format!("{} {} {}{}", self.config.prefix, method, host, url.path());

        let client = &self.client;
        let config = &self.config;

        self.engine
            .span(span_name, move |span| async move {
                span.set_attribute("http.request.method", method.as_str());
                span.set_attribute("url.full", url.as_str());
                span.set_attribute("url.scheme", url.scheme());
                if let Some(host) = url.host_str() {
                    span.set_attribute("server.address", host);
                }
                if let Some(port) = url.port() {
                    span.set_attribute("server.port", port as i64);
                }
                span.set_attribute("url.path", url.path());
                if let Some(query) = url.query() {
                    span.set_attribute("url.query", query);
                }

                let mut request = request;
                for name in &config.capture_request_headers {
                    if let Some(value) = request.headers().get(name).and_then(|v| v.to_str().ok()) {
                        span.set_attribute(format!("http.request.header.{name}"), value.to_string());
                    }
                }

                if config.propagate_context {
                    let header = create_traceparent(span.trace_id(), span.span_id());
                    if let Ok(value) = HeaderValue::from_str(&header) {
                        request.headers_mut().insert(HeaderName::from_static("traceparent"), value);
                    }
                }

                let start = Instant::now();
                let result = client.execute(request).await;
                let elapsed_ms = start.elapsed().as_millis() as i64;
                span.set_attribute("http.response.duration_ms", elapsed_ms);

                match &result {
                    Ok(response) => {
                        let status = response.status();
                        span.set_attribute("http.response.status_code", status.as_u16() as i64);
                        for name in &config.capture_response_headers {
                            if let Some(value) = response.headers().get(name).and_then(|v| v.to_str().ok()) {
                                span.set_attribute(format!("http.response.header.{name}"), value.to_string());
                            }
                        }
                        if status.is_success() {
                            span.set_status(SpanStatus::Ok, None);
                        } else {
                            span.set_status(SpanStatus::Error, Some(format!("HTTP {}", status.as_u16())));
                        }
                    }
                    Err(err) => {
                        span.set_attribute("error.type", std::any::type_name_of_val(err));
                        span.set_status(SpanStatus::Error, Some(err.to_string()));
                    }
                }

                result
            })
            .await
    }

    fn is_ignored(&self, url: &str) -> bool {
        self.config.ignore_urls.iter().any(|pattern| pattern.matches(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignore_pattern_substring_and_regex() {
        let substring = IgnorePattern::Substring("/health".to_string());
        assert!(substring.matches("https://api.example.com/health"));
        assert!(!substring.matches("https://api.example.com/users"));

        let regex = IgnorePattern::Regex(Regex::new(r"/users/\d+$").unwrap());
        assert!(regex.matches("https://api.example.com/users/42"));
        assert!(!regex.matches("https://api.example.com/users"));
    }

    #[tokio::test]
    async fn install_is_single_instance_until_uninstrumented() {
        let engine = TracingEngine::new();
        let first = FetchInstrumentation::install(Client::new(), engine.clone(), FetchInstrumentationConfig::default());
        assert!(first.is_some());

        let second = FetchInstrumentation::install(Client::new(), engine.clone(), FetchInstrumentationConfig::default());
        assert!(second.is_none());

        first.unwrap().uninstrument();
        let third = FetchInstrumentation::install(Client::new(), engine, FetchInstrumentationConfig::default());
        assert!(third.is_some());
        third.unwrap().uninstrument();
    }
}
