//! The tracing engine: span construction, the active-span stack, and span
//! processor notification.
//!
//! A [`Span`] is cheap to clone (an `Arc<Mutex<SpanData>>` underneath) so it
//! can be handed into a closure and still be reachable from
//! [`ActiveSpanStack::current`] while it's active. Mutation after `end()`
//! is a silent no-op rather than raising, since an ended span is frozen.

use std::cell::RefCell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use vigil_types::span::{SpanData, SpanEvent, SpanStatus};

use crate::context_store::AsyncContextStore;
use crate::correlation::{generate_span_id, generate_trace_id};
use vigil_types::context::CorrelationContext;

/// Observer notified when a span starts and ends. Registered processors run
/// in registration order; a panicking processor is isolated from the rest.
///
/// `name` identifies a processor for [`SpanProcessorRegistry::remove`] and
/// [`SpanProcessorRegistry::get`]; the default is non-unique and only
/// processors that need to be looked up or removed individually need to
/// override it.
#[async_trait]
pub trait SpanProcessor: Send + Sync {
    fn name(&self) -> &str {
        "unnamed"
    }

    fn on_start(&self, _span: &SpanData) {}
    fn on_end(&self, _span: &SpanData) {}

    /// Force this processor to flush any buffered work. Defaults to a no-op
    /// for processors (like simple counters) that buffer nothing.
    async fn force_flush(&self) {}

    /// Stop this processor. Defaults to a no-op; processors that own a
    /// background task or connection should override it to tear that down.
    async fn shutdown(&self) {}
}

/// Registration-ordered, panic-isolated fan-out to [`SpanProcessor`]s.
#[derive(Default)]
pub struct SpanProcessorRegistry {
    processors: Mutex<Vec<Arc<dyn SpanProcessor>>>,
}

impl SpanProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, processor: Arc<dyn SpanProcessor>) {
        self.processors.lock().push(processor);
    }

    /// Remove the first registered processor named `name`. Returns `true` if
    /// one was found and removed.
    pub fn remove(&self, name: &str) -> bool {
        let mut processors = self.processors.lock();
        let before = processors.len();
        processors.retain(|p| p.name() != name);
        processors.len() != before
    }

    /// The first registered processor named `name`, if any.
    pub fn get(&self, name: &str) -> Option<Arc<dyn SpanProcessor>> {
        self.processors.lock().iter().find(|p| p.name() == name).cloned()
    }

    pub fn notify_start(&self, data: &SpanData) {
        for processor in self.processors.lock().iter() {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| processor.on_start(data))).is_err() {
                tracing::warn!(span = %data.name, "vigil: span processor panicked in on_start");
            }
        }
    }

    pub fn notify_end(&self, data: &SpanData) {
        for processor in self.processors.lock().iter() {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| processor.on_end(data))).is_err() {
                tracing::warn!(span = %data.name, "vigil: span processor panicked in on_end");
            }
        }
    }

    /// Flush every registered processor, in registration order. A
    /// panicking processor is isolated from the rest, same as `notify_*`.
    pub async fn force_flush(&self) {
        let processors = self.processors.lock().clone();
        for processor in processors {
            if AssertUnwindSafe(processor.force_flush()).catch_unwind().await.is_err() {
                tracing::warn!("vigil: span processor panicked in force_flush");
            }
        }
    }

    /// Shut down every registered processor, in registration order, then
    /// clear the registry so none of them receive further notifications.
    pub async fn shutdown(&self) {
        let processors = self.processors.lock().clone();
        for processor in &processors {
            if AssertUnwindSafe(processor.shutdown()).catch_unwind().await.is_err() {
                tracing::warn!("vigil: span processor panicked in shutdown");
            }
        }
        self.processors.lock().clear();
    }
}

/// A live or ended span. Clones share the same underlying state.
#[derive(Clone)]
pub struct Span {
    inner: Arc<Mutex<SpanData>>,
}

impl Span {
    fn new(data: SpanData) -> Self {
        Self { inner: Arc::new(Mutex::new(data)) }
    }

    pub fn span_id(&self) -> vigil_types::ids::SpanId {
        self.inner.lock().span_id
    }

    pub fn trace_id(&self) -> vigil_types::ids::TraceId {
        self.inner.lock().trace_id
    }

    pub fn is_ended(&self) -> bool {
        self.inner.lock().is_ended()
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<Value>) {
        let mut data = self.inner.lock();
        if data.is_ended() {
            return;
        }
        data.attributes.insert(key.into(), value.into());
    }

    pub fn add_event(&self, name: impl Into<String>, attributes: Option<IndexMap<String, Value>>) {
        let mut data = self.inner.lock();
        if data.is_ended() {
            return;
        }
        data.events.push(SpanEvent { name: name.into(), timestamp: Utc::now(), attributes });
    }

    pub fn set_status(&self, status: SpanStatus, message: Option<String>) {
        let mut data = self.inner.lock();
        if data.is_ended() {
            return;
        }
        data.status = status;
        data.status_message = message;
    }

    /// End the span. Returns `false` if it was already ended (idempotent).
    pub fn end(&self) -> bool {
        let mut data = self.inner.lock();
        if data.is_ended() {
            return false;
        }
        data.end_time = Some(Utc::now());
        true
    }

    pub fn snapshot(&self) -> SpanData {
        self.inner.lock().clone()
    }
}

tokio::task_local! {
    static ACTIVE_SPANS: RefCell<Vec<Span>>;
}

/// The stack of spans active on the current task, most-recently-entered
/// last. Backed by `tokio::task_local!`, so it follows a task across
/// `.await` suspension and thread migration the same way
/// [`crate::context_store::AsyncContextStore`] does.
pub struct ActiveSpanStack;

impl ActiveSpanStack {
    pub fn current() -> Option<Span> {
        ACTIVE_SPANS.try_with(|stack| stack.borrow().last().cloned()).ok().flatten()
    }

    pub fn depth() -> usize {
        ACTIVE_SPANS.try_with(|stack| stack.borrow().len()).unwrap_or(0)
    }

    pub fn clear() {
        let _ = ACTIVE_SPANS.try_with(|stack| stack.borrow_mut().clear());
    }

    /// Push `span` onto the current task's stack. Only meaningful inside a
    /// scope already opened by [`ActiveSpanStack::enter_sync`] or
    /// [`ActiveSpanStack::enter_async`] (directly or via [`TracingEngine`]);
    /// outside of one this is a documented no-op, matching the rest of this
    /// crate's "refuse rather than silently misbehave" posture for
    /// continuation-local state with no established scope.
    pub fn push(span: Span) -> bool {
        ACTIVE_SPANS.try_with(|stack| stack.borrow_mut().push(span)).is_ok()
    }

    pub fn pop() -> Option<Span> {
        ACTIVE_SPANS.try_with(|stack| stack.borrow_mut().pop()).ok().flatten()
    }

    /// Run `f` synchronously with `span` pushed onto the stack, popping it
    /// before returning (including on unwind, since the guard is a local).
    pub fn enter_sync<F, R>(span: Span, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        struct PopGuard;
        impl Drop for PopGuard {
            fn drop(&mut self) {
                let _ = ACTIVE_SPANS.try_with(|stack| stack.borrow_mut().pop());
            }
        }

        if ACTIVE_SPANS.try_with(|stack| stack.borrow_mut().push(span)).is_ok() {
            let _guard = PopGuard;
            return f();
        }

        // No scope established yet on this task: open one just for this call.
        ACTIVE_SPANS.sync_scope(RefCell::new(Vec::new()), || {
            ACTIVE_SPANS.with(|stack| stack.borrow_mut().push(span.clone()));
            f()
        })
    }

    /// Async counterpart: keeps `span` active across every `.await` inside
    /// the future `f` produces.
    pub async fn enter_async<F, Fut, R>(span: Span, f: F) -> R
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let already_scoped = ACTIVE_SPANS.try_with(|_| ()).is_ok();
        if already_scoped {
            ACTIVE_SPANS.with(|stack| stack.borrow_mut().push(span));
            let result = f().await;
            ACTIVE_SPANS.with(|stack| {
                stack.borrow_mut().pop();
            });
            result
        } else {
            ACTIVE_SPANS.scope(RefCell::new(vec![span]), f()).await
        }
    }
}

struct SpanEndGuard<'a> {
    registry: &'a SpanProcessorRegistry,
    span: Span,
}

impl Drop for SpanEndGuard<'_> {
    fn drop(&mut self) {
        if !self.span.is_ended() && self.span.snapshot().status == SpanStatus::Unset {
            if std::thread::panicking() {
                self.span.set_status(SpanStatus::Error, Some("panicked".to_string()));
            } else {
                self.span.set_status(SpanStatus::Ok, None);
            }
        }
        if self.span.end() {
            self.registry.notify_end(&self.span.snapshot());
        }
    }
}

/// Owns the [`SpanProcessorRegistry`] and builds spans with inherited
/// trace ID / parent span ID taken from [`ActiveSpanStack::current`].
pub struct TracingEngine {
    processors: SpanProcessorRegistry,
}

impl TracingEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { processors: SpanProcessorRegistry::new() })
    }

    pub fn register_processor(&self, processor: Arc<dyn SpanProcessor>) {
        self.processors.register(processor);
    }

    pub fn remove_processor(&self, name: &str) -> bool {
        self.processors.remove(name)
    }

    pub fn get_processor(&self, name: &str) -> Option<Arc<dyn SpanProcessor>> {
        self.processors.get(name)
    }

    /// Flush every registered span processor.
    pub async fn flush_processors(&self) {
        self.processors.force_flush().await;
    }

    /// Shut down every registered span processor and clear the registry.
    pub async fn shutdown_processors(&self) {
        self.processors.shutdown().await;
    }

    /// Build a span as a child of the current active span and notify
    /// processors of its start, without touching the active-span stack.
    fn build_span(&self, name: impl Into<String>) -> Span {
        let parent = ActiveSpanStack::current();
        let trace_id = parent.as_ref().map(|p| p.trace_id()).unwrap_or_else(generate_trace_id);
        let parent_span_id = parent.as_ref().map(|p| p.span_id());
        let data = SpanData::new(generate_span_id(), trace_id, parent_span_id, name, Utc::now());
        self.processors.notify_start(&data);
        Span::new(data)
    }

    /// Manual bracket: build a span, push it onto the active-span stack
    /// (only meaningful when called from within an already-scoped task —
    /// see [`ActiveSpanStack::push`]), and return it. Pair with
    /// [`TracingEngine::end_span`].
    pub fn start_span(&self, name: impl Into<String>) -> Span {
        let span = self.build_span(name);
        ActiveSpanStack::push(span.clone());
        span
    }

    /// End `span`, notify processors, and pop the active-span stack.
    pub fn end_span(&self, span: &Span) {
        if span.end() {
            self.processors.notify_end(&span.snapshot());
        }
        ActiveSpanStack::pop();
    }

    /// Run `f` synchronously with a new span active.
    pub fn span_sync<F, R>(&self, name: impl Into<String>, f: F) -> R
    where
        F: FnOnce(&Span) -> R,
    {
        let span = self.build_span(name);
        let _guard = SpanEndGuard { registry: &self.processors, span: span.clone() };
        ActiveSpanStack::enter_sync(span.clone(), || f(&span))
    }

    /// Run the async `f` with a new span active across every `.await`,
    /// ending the span on completion or panic and merging its trace/span
    /// IDs into the ambient correlation context for the duration.
    pub async fn span<F, Fut, R>(&self, name: impl Into<String>, f: F) -> R
    where
        F: FnOnce(Span) -> Fut,
        Fut: Future<Output = R>,
    {
        let span = self.build_span(name);
        let _guard = SpanEndGuard { registry: &self.processors, span: span.clone() };

        let mut ctx = CorrelationContext::new();
        ctx.set("traceId", span.trace_id().to_string());
        ctx.set("spanId", span.span_id().to_string());

        let inner_span = span.clone();
        ActiveSpanStack::enter_async(span.clone(), move || {
            AsyncContextStore::with_context_async(ctx, move || f(inner_span))
        })
        .await
    }

    /// Run `f(current_active_span)` iff a span is active; no-op otherwise.
    pub fn with_active_span<F>(&self, f: F)
    where
        F: FnOnce(&Span),
    {
        if let Some(span) = ActiveSpanStack::current() {
            f(&span);
        }
    }
}

impl Default for TracingEngine {
    fn default() -> Self {
        Self { processors: SpanProcessorRegistry::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProcessor {
        starts: AtomicUsize,
        ends: AtomicUsize,
    }

    impl CountingProcessor {
        fn new() -> Arc<Self> {
            Arc::new(Self { starts: AtomicUsize::new(0), ends: AtomicUsize::new(0) })
        }
    }

    impl SpanProcessor for CountingProcessor {
        fn on_start(&self, _span: &SpanData) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_end(&self, _span: &SpanData) {
            self.ends.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PanickyProcessor;
    impl SpanProcessor for PanickyProcessor {
        fn on_start(&self, _span: &SpanData) {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn span_notifies_start_and_end() {
        let engine = TracingEngine::new();
        let counter = CountingProcessor::new();
        engine.register_processor(counter.clone());

        engine.span("op", |span| async move {
            span.set_attribute("k", "v");
        })
        .await;

        assert_eq!(counter.starts.load(Ordering::SeqCst), 1);
        assert_eq!(counter.ends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn nested_spans_inherit_trace_id_and_set_parent() {
        let engine = TracingEngine::new();
        engine
            .span("outer", |outer| async move {
                let outer_trace = outer.trace_id();
                let outer_span_id = outer.span_id();
                engine
                    .span("inner", move |inner| async move {
                        assert_eq!(inner.trace_id(), outer_trace);
                        assert_eq!(inner.snapshot().parent_span_id, Some(outer_span_id));
                    })
                    .await;
            })
            .await;
    }

    #[tokio::test]
    async fn ending_twice_only_notifies_once() {
        let engine = TracingEngine::new();
        let counter = CountingProcessor::new();
        engine.register_processor(counter.clone());

        let span = engine.start_span("op");
        engine.end_span(&span);
        engine.end_span(&span);
        assert_eq!(counter.ends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mutation_after_end_is_a_silent_no_op() {
        let engine = TracingEngine::new();
        let span = engine.start_span("op");
        engine.end_span(&span);
        span.set_attribute("late", "value");
        assert!(span.snapshot().attributes.is_empty());
    }

    struct NamedProcessor {
        id: &'static str,
        flushes: AtomicUsize,
        shutdowns: AtomicUsize,
    }

    impl NamedProcessor {
        fn new(id: &'static str) -> Arc<Self> {
            Arc::new(Self { id, flushes: AtomicUsize::new(0), shutdowns: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl SpanProcessor for NamedProcessor {
        fn name(&self) -> &str {
            self.id
        }
        async fn force_flush(&self) {
            self.flushes.fetch_add(1, Ordering::SeqCst);
        }
        async fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn registry_get_and_remove_operate_by_name() {
        let registry = SpanProcessorRegistry::new();
        let a = NamedProcessor::new("a");
        let b = NamedProcessor::new("b");
        registry.register(a.clone());
        registry.register(b.clone());

        assert!(registry.get("a").is_some());
        assert!(registry.remove("a"));
        assert!(registry.get("a").is_none());
        assert!(!registry.remove("a"));
        assert!(registry.get("b").is_some());
    }

    #[tokio::test]
    async fn registry_shutdown_awaits_all_processors_then_clears_itself() {
        let registry = SpanProcessorRegistry::new();
        let a = NamedProcessor::new("a");
        let b = NamedProcessor::new("b");
        registry.register(a.clone());
        registry.register(b.clone());

        registry.shutdown().await;

        assert_eq!(a.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(b.shutdowns.load(Ordering::SeqCst), 1);
        assert!(registry.get("a").is_none());
        assert!(registry.get("b").is_none());
    }

    #[tokio::test]
    async fn tracing_engine_flush_processors_reaches_registered_processors() {
        let engine = TracingEngine::new();
        let a = NamedProcessor::new("a");
        engine.register_processor(a.clone());

        engine.flush_processors().await;
        assert_eq!(a.flushes.load(Ordering::SeqCst), 1);

        engine.shutdown_processors().await;
        assert_eq!(a.shutdowns.load(Ordering::SeqCst), 1);
        assert!(engine.get_processor("a").is_none());
    }

    #[test]
    fn panicking_processor_does_not_stop_others() {
        let engine_arc = TracingEngine::new();
        engine_arc.register_processor(Arc::new(PanickyProcessor));
        let counter = CountingProcessor::new();
        engine_arc.register_processor(counter.clone());

        engine_arc.span_sync("op", |_span| {});
        assert_eq!(counter.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn span_context_is_visible_via_active_span_stack() {
        let engine = TracingEngine::new();
        engine
            .span("outer", |outer| async move {
                assert_eq!(ActiveSpanStack::current().unwrap().span_id(), outer.span_id());
                assert_eq!(ActiveSpanStack::depth(), 1);
            })
            .await;
        assert_eq!(ActiveSpanStack::depth(), 0);
    }
}
