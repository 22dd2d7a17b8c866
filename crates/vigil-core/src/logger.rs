//! Logger core: level gating, context merge, sanitize → sample → dedup
//! ordering, transport fan-out, and namespaced child loggers.
//!
//! The original argument-shape normalization rules are written against a
//! variadic call surface that Rust has no equivalent of. [`LogArgs`]
//! captures the same four outcomes (nothing extra, an error, metadata
//! fields, or both) as an enum selected by `From` impls, so a typical call
//! site still reads as `logger.info("msg", error)` or
//! `logger.info("msg", fields)`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use vigil_types::context::CorrelationContext;
use vigil_types::error::SerializedError;
use vigil_types::level::LogLevel;
use vigil_types::record::LogRecord;
use crate::config::{is_production, load_env_overlay, EnvOverlay};
use crate::context_store::AsyncContextStore;
use crate::dedup::{summary_message, DedupConfig, DedupDecision, Deduplicator};
use crate::sampler::{CompositeBypassSampler, SampleContext, Sampler};
use crate::sanitizer::{Sanitizer, SanitizerPreset};
use crate::transport::Transport;

/// The normalized extra argument to a log call.
#[derive(Debug, Clone, Default)]
pub enum LogArgs {
    #[default]
    None,
    Error(SerializedError),
    Metadata(IndexMap<String, Value>),
    ErrorAndMetadata(SerializedError, IndexMap<String, Value>),
}

impl From<&(dyn std::error::Error + 'static)> for LogArgs {
    fn from(err: &(dyn std::error::Error + 'static)) -> Self {
        LogArgs::Error(SerializedError::from_std_error(err))
    }
}

impl From<SerializedError> for LogArgs {
    fn from(err: SerializedError) -> Self {
        LogArgs::Error(err)
    }
}

impl From<IndexMap<String, Value>> for LogArgs {
    fn from(fields: IndexMap<String, Value>) -> Self {
        LogArgs::Metadata(fields)
    }
}

impl From<Vec<(&str, Value)>> for LogArgs {
    fn from(fields: Vec<(&str, Value)>) -> Self {
        LogArgs::Metadata(fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }
}

impl LogArgs {
    fn into_parts(self) -> (Option<SerializedError>, IndexMap<String, Value>) {
        match self {
            LogArgs::None => (None, IndexMap::new()),
            LogArgs::Error(e) => (Some(e), IndexMap::new()),
            LogArgs::Metadata(m) => (None, m),
            LogArgs::ErrorAndMetadata(e, m) => (Some(e), m),
        }
    }
}

/// Configuration a [`Logger`] (or one of its children) is built or
/// overlaid with.
#[derive(Clone)]
pub struct LoggerConfig {
    pub level: LogLevel,
    pub enabled: bool,
    pub context: CorrelationContext,
    pub sanitizer: Option<Arc<Sanitizer>>,
    pub sampler: Option<Arc<dyn Sampler>>,
    pub dedup: Option<DedupConfig>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self { level: LogLevel::Info, enabled: true, context: CorrelationContext::new(), sanitizer: None, sampler: None, dedup: None }
    }
}

/// A partial overlay applied to a parent's config when creating a child
/// logger. `None` fields inherit from the parent; `context` is merged
/// pairwise rather than replaced wholesale.
#[derive(Clone, Default)]
pub struct LoggerConfigOverride {
    pub level: Option<LogLevel>,
    pub enabled: Option<bool>,
    pub context: Option<CorrelationContext>,
    pub sanitizer: Option<Arc<Sanitizer>>,
    pub sampler: Option<Arc<dyn Sampler>>,
    pub dedup: Option<DedupConfig>,
}

impl LoggerConfigOverride {
    pub fn is_empty(&self) -> bool {
        self.level.is_none() && self.enabled.is_none() && self.context.is_none() && self.sanitizer.is_none() && self.sampler.is_none() && self.dedup.is_none()
    }
}

/// Resolve a [`LoggerConfig`] from, in ascending precedence, production-
/// aware defaults, the `prefix`-scoped environment overlay (see
/// [`crate::config`]), and finally `explicit`. Returns the resolved
/// [`EnvOverlay`] alongside the logger so a caller can also honor
/// `<PREFIX>_STRUCTURED` when it picks a transport's output format.
pub fn create_logger(namespace: impl Into<String>, prefix: &str, explicit: LoggerConfigOverride) -> (Arc<Logger>, EnvOverlay) {
    let overlay = load_env_overlay(prefix);
    let production = is_production(prefix);

    let mut context = CorrelationContext::new();
    for (key, value) in &overlay.context {
        context.set(key.clone(), value.clone());
    }
    if let Some(explicit_context) = &explicit.context {
        context = context.merged_with(explicit_context);
    }

    let level = explicit.level.or(overlay.level).unwrap_or(if production { LogLevel::Warn } else { LogLevel::Info });
    let enabled = explicit.enabled.or(overlay.enabled).unwrap_or(true);

    let sanitizer = explicit.sanitizer.clone().or_else(|| {
        overlay.sanitize.unwrap_or(true).then(|| Sanitizer::new(&SanitizerPreset::Default.config()).ok()).flatten().map(Arc::new)
    });

    let config = LoggerConfig { level, enabled, context, sanitizer, sampler: explicit.sampler, dedup: explicit.dedup };
    (Logger::new(namespace, config), overlay)
}

/// Async counterpart to [`create_logger`]. Every transport's flush timer
/// already starts eagerly at its own constructor (see `vigil-transports`),
/// so there is no additional asynchronous setup step here; this exists for
/// API-surface parity with hosts that `await` logger construction.
pub async fn create_logger_async(namespace: impl Into<String>, prefix: &str, explicit: LoggerConfigOverride) -> (Arc<Logger>, EnvOverlay) {
    create_logger(namespace, prefix, explicit)
}

/// The runtime probe's tag, carried on every record regardless of how the
/// process was launched.
const RUNTIME_TAG: &str = "rust";

/// The logger core. Namespaced, cheap to clone-by-`Arc`, and safe to share
/// across tasks: level/enabled use interior mutability with intentionally
/// loose publication timing, since the transport registry (mutated only
/// through `add_transport`/`remove_transport`) is the only state here that
/// actually needs exclusion under real parallelism.
pub struct Logger {
    namespace: String,
    level: Mutex<LogLevel>,
    enabled: AtomicBool,
    static_context: RwLock<CorrelationContext>,
    sanitizer: Option<Arc<Sanitizer>>,
    sampler: Option<Arc<dyn Sampler>>,
    dedup: Option<Deduplicator>,
    transports: RwLock<Vec<Arc<dyn Transport>>>,
    children: DashMap<String, Weak<Logger>>,
}

impl Logger {
    pub fn new(namespace: impl Into<String>, config: LoggerConfig) -> Arc<Self> {
        Arc::new(Self {
            namespace: namespace.into(),
            level: Mutex::new(config.level),
            enabled: AtomicBool::new(config.enabled),
            static_context: RwLock::new(config.context),
            sanitizer: config.sanitizer,
            sampler: config.sampler,
            dedup: config.dedup.map(Deduplicator::new),
            transports: RwLock::new(Vec::new()),
            children: DashMap::new(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn set_level(&self, level: LogLevel) {
        *self.level.lock() = level;
    }

    pub fn level(&self) -> LogLevel {
        *self.level.lock()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn add_transport(&self, transport: Arc<dyn Transport>) {
        self.transports.write().push(transport);
    }

    pub fn remove_transport(&self, name: &str) {
        self.transports.write().retain(|t| t.name() != name);
    }

    pub fn trace(&self, message: impl Into<String>, args: impl Into<LogArgs>) {
        self.log(LogLevel::Trace, message, args.into())
    }

    pub fn debug(&self, message: impl Into<String>, args: impl Into<LogArgs>) {
        self.log(LogLevel::Debug, message, args.into())
    }

    pub fn info(&self, message: impl Into<String>, args: impl Into<LogArgs>) {
        self.log(LogLevel::Info, message, args.into())
    }

    pub fn warn(&self, message: impl Into<String>, args: impl Into<LogArgs>) {
        self.log(LogLevel::Warn, message, args.into())
    }

    pub fn error(&self, message: impl Into<String>, args: impl Into<LogArgs>) {
        self.log(LogLevel::Error, message, args.into())
    }

    /// The full pipeline: level gate, context merge, sanitize, sample,
    /// dedup, transport fan-out.
    pub fn log(&self, level: LogLevel, message: impl Into<String>, args: LogArgs) {
        if !self.is_enabled() || level < self.level() {
            return;
        }

        let message = message.into();
        let (error, mut metadata) = args.into_parts();
        let mut error = error;

        if let Some(sanitizer) = &self.sanitizer {
            if sanitizer.is_enabled() {
                let obj: serde_json::Map<String, Value> = metadata.into_iter().collect();
                metadata = sanitizer.sanitize_object(&obj).into_iter().collect();

                if let Some(err) = &error {
                    if let Ok(Value::Object(err_obj)) = serde_json::to_value(err) {
                        let sanitized_err = sanitizer.sanitize_object(&err_obj);
                        if let Ok(reserialized) = serde_json::from_value(Value::Object(sanitized_err)) {
                            error = Some(reserialized);
                        }
                    }
                }
            }
        }

        let merged_context = self.merged_context();

        let sample_ctx = SampleContext { level, has_error: error.is_some(), namespace: Some(self.namespace.as_str()) };
        if let Some(sampler) = &self.sampler {
            if !CompositeBypassSampler::new(sampler.clone()).should_sample(&sample_ctx) {
                return;
            }
        }

        if let Some(dedup) = &self.dedup {
            match dedup.should_suppress(Some(&self.namespace), level, &message) {
                DedupDecision::Suppress => return,
                DedupDecision::EmitWithFlush { suppressed_count } => {
                    let summary = summary_message(&message, suppressed_count, dedup_window(dedup));
                    self.dispatch(Self::build_record(level, summary, None, metadata.clone(), merged_context.clone(), &self.namespace));
                }
                DedupDecision::Emit => {}
            }
        }

        let record = Self::build_record(level, message, error, metadata, merged_context, &self.namespace);
        self.dispatch(record);
    }

    fn merged_context(&self) -> CorrelationContext {
        let static_context = self.static_context.read().clone();
        match AsyncContextStore::get_context() {
            Some(async_context) => static_context.merged_with(&async_context),
            None => static_context,
        }
    }

    fn build_record(level: LogLevel, message: impl Into<String>, error: Option<SerializedError>, metadata: IndexMap<String, Value>, context: CorrelationContext, namespace: &str) -> LogRecord {
        let mut record = LogRecord::new(level, message, RUNTIME_TAG);
        record.namespace = Some(namespace.to_string());
        record.error = error;
        if !metadata.is_empty() {
            record.metadata = Some(metadata);
        }
        if !context.is_empty() {
            record.context = Some(context);
        }
        record
    }

    /// Deliver `record` to every transport that admits it. Dispatch itself
    /// never suspends: inside a Tokio runtime each transport's (possibly
    /// I/O-bound) `log` runs as a spawned task; outside one (e.g. a plain
    /// `#[test]`) it runs to completion inline via `block_on`, since a
    /// transport's fast path (buffering into a [`crate::transport::BatchEngine`])
    /// does not actually await anything.
    fn dispatch(&self, record: LogRecord) {
        let transports: Vec<Arc<dyn Transport>> = self.transports.read().clone();
        for transport in transports {
            if !transport.should_deliver(&record) {
                continue;
            }
            let record = record.clone();
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        transport.log(record).await;
                    });
                }
                Err(_) => {
                    futures::executor::block_on(transport.log(record));
                }
            }
        }
    }

    /// Fan out `flush()` to every transport.
    pub async fn flush(&self) {
        let transports: Vec<Arc<dyn Transport>> = self.transports.read().clone();
        for transport in transports {
            transport.flush().await;
        }
    }

    /// Fan out `destroy()` to every transport and empty the registry.
    pub async fn destroy(&self) {
        let transports: Vec<Arc<dyn Transport>> = std::mem::take(&mut *self.transports.write());
        for transport in transports {
            transport.destroy().await;
        }
    }

    /// A child logger namespaced `self.namespace : ns`. With no override,
    /// children are cached by weak reference and returned by identity on
    /// repeat calls; an override always produces a fresh, uncached child.
    pub fn child(self: &Arc<Self>, ns: &str, over: LoggerConfigOverride) -> Arc<Logger> {
        let full_ns = format!("{}:{}", self.namespace, ns);

        if over.is_empty() {
            if let Some(existing) = self.children.get(&full_ns).and_then(|weak| weak.upgrade()) {
                return existing;
            }
        }

        let merged_context = match &over.context {
            Some(ctx) => self.static_context.read().merged_with(ctx),
            None => self.static_context.read().clone(),
        };

        let config = LoggerConfig {
            level: over.level.unwrap_or_else(|| self.level()),
            enabled: over.enabled.unwrap_or_else(|| self.is_enabled()),
            context: merged_context,
            sanitizer: over.sanitizer.or_else(|| self.sanitizer.clone()),
            sampler: over.sampler.or_else(|| self.sampler.clone()),
            dedup: over.dedup,
        };

        let child = Logger::new(full_ns.clone(), config);
        child.transports.write().extend(self.transports.read().iter().cloned());

        if over.is_empty() {
            self.children.insert(full_ns, Arc::downgrade(&child));
            self.sweep_dead_children();
        }

        child
    }

    fn sweep_dead_children(&self) {
        self.children.retain(|_, weak| weak.strong_count() > 0);
    }
}

fn dedup_window(dedup: &Deduplicator) -> std::time::Duration {
    dedup.window()
}
