//! Correlation ID generation and W3C Trace Context wire format.

use rand::RngCore;
use vigil_types::ids::{RequestId, SpanId, TraceId};

/// Generate a new 128-bit trace ID from 16 random bytes.
pub fn generate_trace_id() -> TraceId {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    TraceId::from_bytes(bytes)
}

/// Generate a new 64-bit span ID from 8 random bytes.
pub fn generate_span_id() -> SpanId {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    SpanId::from_bytes(bytes)
}

/// Generate a new v4 request UUID.
pub fn generate_request_id() -> RequestId {
    uuid::Uuid::new_v4()
}

/// Parsed `traceparent` header: `version-traceId-spanId-flags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Traceparent {
    pub trace_id: TraceId,
    pub span_id: SpanId,
}

/// Parse a `traceparent` header. Accepts only version `"00"`, a 32-hex-char
/// trace ID, a 16-hex-char span ID, and an exactly-two-hex-char flags
/// segment. Anything else (including an empty string) returns `None`
/// rather than raising.
pub fn parse_traceparent(header: &str) -> Option<Traceparent> {
    let mut parts = header.split('-');
    let version = parts.next()?;
    let trace_id = parts.next()?;
    let span_id = parts.next()?;
    let flags = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    if version != "00" {
        return None;
    }
    if flags.len() != 2 || !flags.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let trace_id = TraceId::parse(trace_id).ok()?;
    let span_id = SpanId::parse(span_id).ok()?;
    Some(Traceparent { trace_id, span_id })
}

/// Produce a `traceparent` header. Always emits version `00` and the
/// sampled flag `01`.
pub fn create_traceparent(trace_id: TraceId, span_id: SpanId) -> String {
    format!("00-{trace_id}-{span_id}-01")
}

/// Maximum number of entries retained in a `tracestate` header.
pub const TRACESTATE_MAX_ENTRIES: usize = 32;
/// Maximum serialized length of a single `tracestate` entry's value, per
/// the W3C spec's practical limit used here.
const TRACESTATE_MAX_VALUE_LEN: usize = 256;

/// Parsed `tracestate`: an ordered list of `key=value` pairs, most
/// recently touched key first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tracestate {
    entries: Vec<(String, String)>,
}

fn is_valid_key(key: &str) -> bool {
    if key.is_empty() || key.len() > 256 {
        return false;
    }
    let mut chars = key.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return false,
    };
    if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
        return false;
    }
    key.chars().all(|c| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '*' | '/' | '@')
    })
}

fn is_valid_value(value: &str) -> bool {
    if value.is_empty() || value.len() > TRACESTATE_MAX_VALUE_LEN {
        return false;
    }
    value.bytes().all(|b| (0x20..=0x7e).contains(&b) && b != b',' && b != b'=')
}

impl Tracestate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `tracestate` header: comma-separated `key=value` pairs,
    /// preserving order. Malformed entries are skipped rather than
    /// aborting the whole parse.
    pub fn parse(header: &str) -> Self {
        let mut entries = Vec::new();
        for raw in header.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let Some((key, value)) = raw.split_once('=') else { continue };
            if is_valid_key(key) && is_valid_value(value) {
                entries.push((key.to_string(), value.to_string()));
            }
        }
        entries.truncate(TRACESTATE_MAX_ENTRIES);
        Self { entries }
    }

    /// Update `key` to `value`, moving it to the front of the list
    /// (most-recently-touched-first), capping the total entry count.
    pub fn update(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.entries.retain(|(k, _)| k != &key);
        self.entries.insert(0, (key, value.into()));
        self.entries.truncate(TRACESTATE_MAX_ENTRIES);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn to_header(&self) -> String {
        self.entries.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_valid_traceparent() {
        let header = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";
        let parsed = parse_traceparent(header).unwrap();
        assert_eq!(parsed.trace_id.to_string(), "0af7651916cd43dd8448eb211c80319c");
        assert_eq!(parsed.span_id.to_string(), "b7ad6b7169203331");
        assert_eq!(create_traceparent(parsed.trace_id, parsed.span_id), header);
    }

    #[test]
    fn rejects_malformed_traceparent() {
        assert!(parse_traceparent("").is_none());
        assert!(parse_traceparent("01-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01").is_none());
        assert!(parse_traceparent("00-tooshort-b7ad6b7169203331-01").is_none());
        assert!(parse_traceparent("00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-1").is_none());
    }

    #[test]
    fn tracestate_preserves_order_and_moves_touched_key_front() {
        let mut ts = Tracestate::parse("vendor1=abc,vendor2=def");
        assert_eq!(ts.to_header(), "vendor1=abc,vendor2=def");
        ts.update("vendor2", "xyz");
        assert_eq!(ts.to_header(), "vendor2=xyz,vendor1=abc");
    }

    #[test]
    fn tracestate_skips_malformed_entries() {
        let ts = Tracestate::parse("ok=1, =bad, also_ok=2");
        assert_eq!(ts.len(), 2);
        assert_eq!(ts.get("ok"), Some("1"));
        assert_eq!(ts.get("also_ok"), Some("2"));
    }

    #[test]
    fn generated_ids_have_correct_shape() {
        let trace_id = generate_trace_id();
        let span_id = generate_span_id();
        assert_eq!(trace_id.to_string().len(), 32);
        assert_eq!(span_id.to_string().len(), 16);
    }
}
