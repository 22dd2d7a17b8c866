//! Transport interface and the batching transport framework: a bounded
//! in-memory queue with drop semantics, periodic+threshold flush, retry
//! with exponential backoff, and failed-batch recovery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use vigil_types::level::LogLevel;
use vigil_types::record::LogRecord;
use vigil_types::transport::BatchTransportConfig;

use crate::buffer::CircularBuffer;

/// Marker bound every record type batched through [`BatchEngine`] must meet.
pub trait BatchRecord: Clone + Send + Sync + 'static {}
impl<T: Clone + Send + Sync + 'static> BatchRecord for T {}

/// Errors a transport's send/configuration path can surface.
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("transport configuration error: {0}")]
    Configuration(String),
    #[error("transport send failed (retryable={retryable}): {message}")]
    Send { retryable: bool, message: String, status_code: Option<u16> },
    #[error("failed to serialize record: {0}")]
    Serialization(String),
}

impl TransportError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, TransportError::Send { status_code: Some(code), .. } if (400..500).contains(code))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Send { retryable: true, .. })
    }
}

/// The interface every concrete transport implements. `init`/`flush`/
/// `destroy` default to no-ops so a synchronous transport (Console) only
/// needs to implement `log`.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this transport accepts a record at `level`. The default
    /// always admits; most concrete transports delegate to their own
    /// `TransportConfig::admits`.
    fn admits(&self, _level: LogLevel) -> bool {
        true
    }

    /// Whether `record` should be delivered at all. Defaults to
    /// [`Transport::admits`] on the record's level; override to add a
    /// custom predicate over the full record.
    fn should_deliver(&self, record: &LogRecord) -> bool {
        self.admits(record.level)
    }

    async fn init(&self) {}

    async fn log(&self, record: LogRecord);

    async fn flush(&self) {}

    async fn destroy(&self) {}
}

/// What a batch transport's subclass implements: turning a batch of
/// records into a single outbound send. Retries, queueing, and failed-
/// batch recovery are handled by [`BatchEngine`], generic over the record
/// type so the OTLP span exporter can reuse the same machinery as the
/// log-record transports (HTTP, File, Datadog).
#[async_trait]
pub trait BatchSink: Send + Sync {
    type Record: BatchRecord;

    async fn send(&self, records: &[Self::Record]) -> Result<(), TransportError>;
}

/// Snapshot of a batch transport's internal counters.
#[derive(Debug, Clone, Copy)]
pub struct BatchStats {
    pub buffered: usize,
    pub dropped: u64,
    pub is_flushing: bool,
    pub pending_retry: usize,
}

struct FlushGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> Drop for FlushGuard<'a> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// The library's most critical concurrency primitive: stages records in a
/// bounded queue and flushes them as batches, with bounded retry and
/// graceful shutdown. Generic over the subclass [`BatchSink`] that
/// performs the actual network/file I/O.
pub struct BatchEngine<S: BatchSink + 'static> {
    sink: S,
    config: BatchTransportConfig,
    buffer: Arc<CircularBuffer<S::Record>>,
    is_flushing: AtomicBool,
    is_destroyed: AtomicBool,
    failed_batch: AsyncMutex<Option<Vec<S::Record>>>,
    timer: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
    on_send_error: Option<Box<dyn Fn(&TransportError, &[S::Record]) + Send + Sync>>,
}

impl<S: BatchSink + 'static> BatchEngine<S> {
    pub fn new(sink: S, config: BatchTransportConfig) -> Arc<Self> {
        let capacity = config.batch_size * 2;
        Arc::new(Self {
            sink,
            buffer: Arc::new(CircularBuffer::with_drop_callback(capacity, |_dropped: S::Record| {
                tracing::warn!("vigil: batch transport dropped a record, queue at capacity");
            })),
            config,
            is_flushing: AtomicBool::new(false),
            is_destroyed: AtomicBool::new(false),
            failed_batch: AsyncMutex::new(None),
            timer: parking_lot::Mutex::new(None),
            on_send_error: None,
        })
    }

    pub fn with_error_handler(mut self, handler: impl Fn(&TransportError, &[S::Record]) + Send + Sync + 'static) -> Self {
        self.on_send_error = Some(Box::new(handler));
        self
    }

    /// Start the periodic flush timer once. Calling `init` more than once
    /// is a no-op after the first call.
    pub fn init(self: &Arc<Self>) {
        let mut timer = self.timer.lock();
        if timer.is_some() {
            return;
        }
        let engine = Arc::clone(self);
        let interval = self.config.flush_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if engine.is_destroyed.load(Ordering::SeqCst) {
                    break;
                }
                engine.flush().await;
            }
        });
        *timer = Some(handle);
    }

    pub fn log(self: &Arc<Self>, record: S::Record) {
        if self.is_destroyed.load(Ordering::SeqCst) {
            return;
        }
        self.buffer.push(record);
        if self.buffer.size() >= self.config.batch_size && !self.is_flushing.load(Ordering::SeqCst) {
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                engine.flush().await;
            });
        }
    }

    pub async fn flush(self: &Arc<Self>) {
        let failed = self.failed_batch.lock().await;
        if self.is_flushing.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.buffer.size() == 0 && failed.is_none() {
            self.is_flushing.store(false, Ordering::SeqCst);
            return;
        }
        drop(failed);

        let _guard = FlushGuard { flag: &self.is_flushing };

        let mut records = self.failed_batch.lock().await.take().unwrap_or_default();
        records.extend(self.buffer.to_vec());
        self.buffer.clear();

        self.send_with_retry(records).await;
    }

    async fn send_with_retry(self: &Arc<Self>, records: Vec<S::Record>) {
        if records.is_empty() {
            return;
        }
        let mut last_err = None;
        for attempt in 0..self.config.max_retries {
            match self.sink.send(&records).await {
                Ok(()) => {
                    *self.failed_batch.lock().await = None;
                    return;
                }
                Err(err) => {
                    let retryable = err.is_retryable();
                    last_err = Some(err);
                    if !retryable {
                        break;
                    }
                    if attempt + 1 < self.config.max_retries {
                        let backoff = self.config.retry_delay * 2u32.pow(attempt);
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        if let Some(err) = last_err {
            *self.failed_batch.lock().await = Some(records.clone());
            if let Some(handler) = &self.on_send_error {
                handler(&err, &records);
            }
            tracing::warn!(error = %err, count = records.len(), "vigil: batch transport exhausted retries, retaining batch");
        }
    }

    pub async fn destroy(self: &Arc<Self>) {
        if self.is_destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
        if self.buffer.size() > 0 {
            self.flush().await;
        }
    }

    pub fn stats(&self) -> BatchStats {
        let pending_retry = self.failed_batch.try_lock().map(|guard| guard.as_ref().map_or(0, Vec::len)).unwrap_or(0);
        BatchStats {
            buffered: self.buffer.size(),
            dropped: self.buffer.dropped_count(),
            is_flushing: self.is_flushing.load(Ordering::SeqCst),
            pending_retry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use vigil_types::level::LogLevel;

    struct FlakySink {
        fail_first_n: usize,
        attempts: AtomicUsize,
        received: parking_lot::Mutex<Vec<Vec<LogRecord>>>,
    }

    impl FlakySink {
        fn new(fail_first_n: usize) -> Self {
            Self { fail_first_n, attempts: AtomicUsize::new(0), received: parking_lot::Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl BatchSink for FlakySink {
        type Record = LogRecord;

        async fn send(&self, records: &[LogRecord]) -> Result<(), TransportError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first_n {
                return Err(TransportError::Send { retryable: true, message: "boom".into(), status_code: None });
            }
            self.received.lock().push(records.to_vec());
            Ok(())
        }
    }

    fn record(msg: &str) -> LogRecord {
        LogRecord::new(LogLevel::Info, msg, "rust")
    }

    #[tokio::test]
    async fn retries_then_succeeds_without_on_send_error() {
        let called = Arc::new(AtomicUsize::new(0));
        let called2 = called.clone();
        let sink = FlakySink::new(2);
        let engine = BatchEngine::new(sink, BatchTransportConfig { batch_size: 10, retry_delay: Duration::from_millis(1), max_retries: 3, ..Default::default() })
            .with_error_handler(move |_, _| {
                called2.fetch_add(1, Ordering::SeqCst);
            });

        engine.log(record("a"));
        engine.flush().await;

        assert_eq!(engine.sink.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_batch_is_prepended_to_next_flush() {
        let sink = FlakySink::new(100); // always fails
        let engine = BatchEngine::new(sink, BatchTransportConfig { batch_size: 10, retry_delay: Duration::from_millis(1), max_retries: 1, ..Default::default() });

        engine.log(record("a"));
        engine.log(record("b"));
        engine.flush().await;
        assert!(engine.failed_batch.lock().await.is_some());

        engine.log(record("c"));
        // Swap in a sink that succeeds for the second flush by resetting attempts.
        engine.sink.attempts.store(0, Ordering::SeqCst);
        let failed = engine.failed_batch.lock().await.clone().unwrap();
        assert_eq!(failed.len(), 2);
    }

    #[tokio::test]
    async fn stats_reports_pending_retry_from_the_retained_failed_batch() {
        let sink = FlakySink::new(100); // always fails
        let engine = BatchEngine::new(sink, BatchTransportConfig { batch_size: 10, retry_delay: Duration::from_millis(1), max_retries: 1, ..Default::default() });

        assert_eq!(engine.stats().pending_retry, 0);

        engine.log(record("a"));
        engine.log(record("b"));
        engine.flush().await;

        assert_eq!(engine.stats().pending_retry, 2);
    }

    #[tokio::test]
    async fn drop_callback_fires_when_buffer_overflows() {
        let sink = FlakySink::new(0);
        let engine = BatchEngine::new(sink, BatchTransportConfig { batch_size: 2, ..Default::default() });
        for i in 0..10 {
            engine.log(record(&format!("msg-{i}")));
        }
        assert!(engine.buffer.dropped_count() > 0);
    }
}
