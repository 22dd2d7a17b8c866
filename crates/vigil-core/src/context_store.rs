//! Async context store: a request-scoped mapping visible from every
//! computation descending, transitively and asynchronously, from a
//! scope-entry call — without threading it through arguments.
//!
//! Two backends exist, selected at load time by [`RuntimeProbe`]:
//!
//! - [`TaskLocalStore`] binds to `tokio::task_local!`, the first-class
//!   continuation-local mechanism Tokio provides; context flows through
//!   task suspension/resumption with no source participation. This is the
//!   path used whenever `RuntimeProbe::has_task_local()` is true, which on
//!   this host is always.
//! - [`GlobalFallbackStack`] is a process-wide stack kept for hosts without
//!   a continuation-local primitive. It is single-threaded-cooperative and
//!   unsound under real parallelism; this crate refuses to use it when a
//!   parallel host is detected rather than silently corrupting contexts —
//!   see [`ContextError::UnsoundFallback`].

use std::cell::RefCell;
use std::future::Future;

use thiserror::Error;
use vigil_types::context::CorrelationContext;

use crate::correlation::{generate_request_id, generate_span_id, generate_trace_id};
use crate::probe::RuntimeProbe;

#[derive(Debug, Error)]
pub enum ContextError {
    /// The host has no first-class continuation-local storage and is
    /// running with real parallelism; using the global-stack fallback
    /// here would silently corrupt contexts across interleaved tasks, so
    /// the store refuses instead.
    #[error("async context store has no sound backend on this host under parallelism")]
    UnsoundFallback,
}

tokio::task_local! {
    static CONTEXT: CorrelationContext;
}

/// The primary, Tokio-backed context store.
pub struct AsyncContextStore;

impl AsyncContextStore {
    /// The innermost active context, or `None` if no scope is active.
    pub fn get_context() -> Option<CorrelationContext> {
        CONTEXT.try_with(|c| c.clone()).ok()
    }

    /// Run `f` with a context equal to the current context merged with
    /// `ctx` (inner overrides outer per key). Restores the previous
    /// context on return and on panic unwind.
    pub fn with_context<F, R>(ctx: CorrelationContext, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let merged = Self::get_context().unwrap_or_default().merged_with(&ctx);
        CONTEXT.sync_scope(merged, f)
    }

    /// Async counterpart of [`AsyncContextStore::with_context`]: runs the
    /// future returned by `f` with the merged context bound for its
    /// entire lifetime, including across every `.await` suspension.
    pub async fn with_context_async<F, Fut, R>(ctx: CorrelationContext, f: F) -> R
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let merged = Self::get_context().unwrap_or_default().merged_with(&ctx);
        CONTEXT.scope(merged, f()).await
    }
}

/// Build a correlation context from `partial`, filling in `requestId`/
/// `traceId`/`spanId` from the current context if present and generating
/// fresh ones otherwise. Other keys in `partial` pass through verbatim.
pub fn create_correlation_context(partial: CorrelationContext) -> CorrelationContext {
    let current = AsyncContextStore::get_context().unwrap_or_default();
    let mut out = partial.clone();

    if out.request_id().is_none() {
        let id = current.request_id().map(str::to_string).unwrap_or_else(|| generate_request_id().to_string());
        out.set("requestId", id);
    }
    if out.trace_id().is_none() {
        let id = current.trace_id().map(str::to_string).unwrap_or_else(|| generate_trace_id().to_string());
        out.set("traceId", id);
    }
    if out.span_id().is_none() {
        let id = current.span_id().map(str::to_string).unwrap_or_else(|| generate_span_id().to_string());
        out.set("spanId", id);
    }
    out
}

/// Process-wide stack fallback for hosts without continuation-local
/// storage. Pushes/pops are cooperative: correct only when no two tasks
/// interleave on the same thread between push and pop. Not used by
/// default on this host (`tokio::task_local!` is always available); kept
/// as the documented degraded path for hosts without one.
pub struct GlobalFallbackStack;

thread_local! {
    static FALLBACK_STACK: RefCell<Vec<CorrelationContext>> = const { RefCell::new(Vec::new()) };
}

/// Guard returned by [`GlobalFallbackStack::push`]; pops on drop, including
/// on unwind.
pub struct FallbackScopeGuard {
    _private: (),
}

impl Drop for FallbackScopeGuard {
    fn drop(&mut self) {
        FALLBACK_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

impl GlobalFallbackStack {
    /// Refuse to use the fallback when the host both lacks continuation-
    /// local storage and is not single-threaded-cooperative. On this
    /// crate's supported host (Tokio, `has_task_local() == true`) this
    /// path is simply never taken — [`AsyncContextStore`] is used instead.
    pub fn push(ctx: CorrelationContext) -> Result<(CorrelationContext, FallbackScopeGuard), ContextError> {
        if RuntimeProbe::get().has_task_local() {
            return Err(ContextError::UnsoundFallback);
        }
        let merged = FALLBACK_STACK
            .with(|stack| stack.borrow().last().cloned())
            .unwrap_or_default()
            .merged_with(&ctx);
        FALLBACK_STACK.with(|stack| stack.borrow_mut().push(merged.clone()));
        Ok((merged, FallbackScopeGuard { _private: () }))
    }

    pub fn current() -> Option<CorrelationContext> {
        FALLBACK_STACK.with(|stack| stack.borrow().last().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[tokio::test]
    async fn get_context_is_none_outside_any_scope() {
        assert!(AsyncContextStore::get_context().is_none());
    }

    #[tokio::test]
    async fn with_context_async_restores_on_return() {
        let mut ctx = CorrelationContext::new();
        ctx.set("requestId", "req-1");

        let seen = AsyncContextStore::with_context_async(ctx, || async {
            AsyncContextStore::get_context().unwrap().request_id().unwrap().to_string()
        })
        .await;
        assert_eq!(seen, "req-1");
        assert!(AsyncContextStore::get_context().is_none());
    }

    #[tokio::test]
    async fn with_context_async_restores_on_panic() {
        let before = AsyncContextStore::get_context();
        let mut ctx = CorrelationContext::new();
        ctx.set("requestId", "req-panic");

        let result = std::panic::AssertUnwindSafe(AsyncContextStore::with_context_async(ctx, || async {
            panic!("boom");
        }))
        .catch_unwind()
        .await;

        assert!(result.is_err());
        assert_eq!(AsyncContextStore::get_context(), before);
    }

    #[tokio::test]
    async fn nested_contexts_inherit_and_override() {
        let mut outer = CorrelationContext::new();
        outer.set("requestId", "req-outer");
        outer.set("userId", "u1");

        AsyncContextStore::with_context_async(outer, || async {
            let mut inner = CorrelationContext::new();
            inner.set("requestId", "req-inner");

            AsyncContextStore::with_context_async(inner, || async {
                let ctx = AsyncContextStore::get_context().unwrap();
                assert_eq!(ctx.request_id(), Some("req-inner"));
                assert_eq!(ctx.user_id(), Some("u1"));
            })
            .await;
        })
        .await;
    }

    #[test]
    fn create_correlation_context_generates_missing_ids() {
        let ctx = create_correlation_context(CorrelationContext::new());
        assert!(ctx.request_id().is_some());
        assert!(ctx.trace_id().is_some());
        assert!(ctx.span_id().is_some());
    }
}
