//! Correlation ID newtypes: 128-bit trace IDs, 64-bit span IDs, v4 request UUIDs.
//!
//! This module only defines the value types and their textual invariants.
//! Generation (which needs an RNG) and W3C header parsing live in
//! `vigil-core::correlation`.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum IdParseError {
    #[error("trace id must be 32 lowercase hex chars, got {0:?}")]
    InvalidTraceId(String),
    #[error("span id must be 16 lowercase hex chars, got {0:?}")]
    InvalidSpanId(String),
}

fn is_lowercase_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// 128-bit trace ID, rendered as 32 lowercase hex chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TraceId([u8; 16]);

impl TraceId {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 16] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 16]
    }

    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        if !is_lowercase_hex(s, 32) {
            return Err(IdParseError::InvalidTraceId(s.to_string()));
        }
        let mut bytes = [0u8; 16];
        for i in 0..16 {
            bytes[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| IdParseError::InvalidTraceId(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for TraceId {
    type Error = IdParseError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TraceId> for String {
    fn from(value: TraceId) -> Self {
        value.to_string()
    }
}

/// 64-bit span ID, rendered as 16 lowercase hex chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SpanId([u8; 8]);

impl SpanId {
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 8] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 8]
    }

    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        if !is_lowercase_hex(s, 16) {
            return Err(IdParseError::InvalidSpanId(s.to_string()));
        }
        let mut bytes = [0u8; 8];
        for i in 0..8 {
            bytes[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| IdParseError::InvalidSpanId(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for SpanId {
    type Error = IdParseError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SpanId> for String {
    fn from(value: SpanId) -> Self {
        value.to_string()
    }
}

/// A request-scoped v4 UUID, kept as a distinct type from `uuid::Uuid` so
/// that `CorrelationContext` accessors stay self-documenting.
pub type RequestId = uuid::Uuid;
