//! Logger core, async context propagation, tracing engine, sanitizer,
//! samplers, and batch-transport machinery for vigil.
//!
//! This crate is runtime-agnostic over *which* transports exist (those
//! live in `vigil-transports`); it owns the pipeline every log record and
//! span passes through: sanitize, sample, deduplicate, dispatch.

pub mod buffer;
pub mod config;
pub mod context_store;
pub mod correlation;
pub mod dedup;
pub mod fetch;
pub mod logger;
pub mod probe;
pub mod sampler;
pub mod sanitizer;
pub mod spans;
pub mod transport;
pub mod wide_event;

pub use buffer::{BufferStats, CircularBuffer};
pub use config::{is_production, load_env_overlay, EnvOverlay, DEFAULT_PREFIX};
pub use context_store::{AsyncContextStore, ContextError, FallbackScopeGuard, GlobalFallbackStack, create_correlation_context};
pub use correlation::{Traceparent, Tracestate, create_traceparent, generate_request_id, generate_span_id, generate_trace_id, parse_traceparent};
pub use dedup::{DedupConfig, DedupDecision, Deduplicator, summary_message};
pub use fetch::{FetchInstrumentation, FetchInstrumentationConfig, IgnorePattern};
pub use logger::{create_logger, create_logger_async, LogArgs, Logger, LoggerConfig, LoggerConfigOverride};
pub use probe::RuntimeProbe;
pub use sampler::{AlwaysSample, CompositeBypassSampler, CountingSampler, NamespaceSampler, NamespaceSamplerBuilder, ProbabilitySampler, RateLimitSampler, SampleContext, Sampler};
pub use sanitizer::{Sanitizer, SanitizerBuildError, SanitizerPreset};
pub use spans::{ActiveSpanStack, Span, SpanProcessor, SpanProcessorRegistry, TracingEngine};
pub use transport::{BatchEngine, BatchRecord, BatchSink, BatchStats, Transport, TransportError};
pub use wide_event::{TailSampleDecision, TailSampleReason, TailSamplingConfig, WideEventBuilder, WideEventError, tail_sample};
