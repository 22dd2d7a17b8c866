//! Shared data model for vigil.
//!
//! This crate is the relational foundation: log levels and records,
//! correlation context, span value types, sanitizer/transport/wide-event
//! configuration, and the OTLP export payload tree. It has **no internal
//! vigil dependencies** — a pure leaf crate that `vigil-core` and
//! `vigil-transports` build on.
//!
//! # Key Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`LogLevel`] | Ordered severity enumeration |
//! | [`LogRecord`] | Emitted-once log value |
//! | [`CorrelationContext`] | Request/trace/span correlation mapping |
//! | [`SerializedError`] | Normalized error shape with bounded cause chain |
//! | [`SpanData`] | Immutable + mutable span state |
//! | [`SanitizerConfig`] | Field/pattern redaction configuration |
//! | [`TransportConfig`] | Base transport configuration |
//! | [`WideEventStatus`] | Terminal status of an accumulating wide event |

pub mod context;
pub mod error;
pub mod ids;
pub mod level;
pub mod otlp;
pub mod record;
pub mod sanitizer;
pub mod span;
pub mod transport;
pub mod wide_event;

pub use context::CorrelationContext;
pub use error::SerializedError;
pub use ids::{RequestId, SpanId, TraceId};
pub use level::LogLevel;
pub use record::LogRecord;
pub use sanitizer::{FieldMatcher, MatcherKind, PatternRule, SanitizerConfig};
pub use span::{SpanData, SpanEvent, SpanStatus};
pub use transport::{BatchTransportConfig, TransportConfig};
pub use wide_event::{WideEvent, WideEventStatus};
