//! Correlation context: the mapping that flows through async continuations.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ids::{RequestId, SpanId, TraceId};

/// A request-scoped key/value mapping carried alongside a computation.
///
/// Reserved keys (`requestId`, `traceId`, `spanId`, `userId`, `sessionId`)
/// have typed accessors; arbitrary user keys pass through as strings.
/// Contexts nest: [`CorrelationContext::merge`] lets an inner context
/// override an outer one key-by-key while inheriting everything the inner
/// context leaves unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationContext {
    request_id: Option<String>,
    trace_id: Option<String>,
    span_id: Option<String>,
    user_id: Option<String>,
    session_id: Option<String>,
    #[serde(flatten)]
    extra: IndexMap<String, String>,
}

impl CorrelationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn span_id(&self) -> Option<&str> {
        self.span_id.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "requestId" => self.request_id(),
            "traceId" => self.trace_id(),
            "spanId" => self.span_id(),
            "userId" => self.user_id(),
            "sessionId" => self.session_id(),
            other => self.extra.get(other).map(String::as_str),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match key.as_str() {
            "requestId" => self.request_id = Some(value),
            "traceId" => self.trace_id = Some(value),
            "spanId" => self.span_id = Some(value),
            "userId" => self.user_id = Some(value),
            "sessionId" => self.session_id = Some(value),
            _ => {
                self.extra.insert(key, value);
            }
        }
    }

    pub fn with_request_id(mut self, id: RequestId) -> Self {
        self.request_id = Some(id.to_string());
        self
    }

    pub fn with_trace_id(mut self, id: TraceId) -> Self {
        self.trace_id = Some(id.to_string());
        self
    }

    pub fn with_span_id(mut self, id: SpanId) -> Self {
        self.span_id = Some(id.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.request_id.is_none()
            && self.trace_id.is_none()
            && self.span_id.is_none()
            && self.user_id.is_none()
            && self.session_id.is_none()
            && self.extra.is_empty()
    }

    /// Merge `inner` over `self`: keys set in `inner` win, keys unset in
    /// `inner` are inherited from `self`.
    pub fn merged_with(&self, inner: &CorrelationContext) -> CorrelationContext {
        let mut out = self.clone();
        if inner.request_id.is_some() {
            out.request_id = inner.request_id.clone();
        }
        if inner.trace_id.is_some() {
            out.trace_id = inner.trace_id.clone();
        }
        if inner.span_id.is_some() {
            out.span_id = inner.span_id.clone();
        }
        if inner.user_id.is_some() {
            out.user_id = inner.user_id.clone();
        }
        if inner.session_id.is_some() {
            out.session_id = inner.session_id.clone();
        }
        for (k, v) in &inner.extra {
            out.extra.insert(k.clone(), v.clone());
        }
        out
    }

    /// Iterate all set key/value pairs, reserved keys first, in the fixed
    /// order `requestId, traceId, spanId, userId, sessionId`, then user keys
    /// in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        [
            ("requestId", self.request_id.as_deref()),
            ("traceId", self.trace_id.as_deref()),
            ("spanId", self.span_id.as_deref()),
            ("userId", self.user_id.as_deref()),
            ("sessionId", self.session_id.as_deref()),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .chain(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}
