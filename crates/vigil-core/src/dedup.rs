//! Deduplicator: suppresses repeated identical log lines within a window,
//! emitting a flush flag + suppressed count so the caller can summarize.

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;
use vigil_types::level::LogLevel;

#[derive(Debug, Clone)]
struct Entry {
    first_seen: Instant,
    count: u64,
    level: LogLevel,
}

/// Configuration for the deduplicator.
#[derive(Debug, Clone)]
pub struct DedupConfig {
    pub enabled: bool,
    pub window: Duration,
    pub max_size: usize,
    /// Whether the dedup signature includes the namespace.
    pub include_namespace: bool,
    /// Whether the dedup signature includes the level.
    pub include_level: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window: Duration::from_millis(1000),
            max_size: 1000,
            include_namespace: true,
            include_level: true,
        }
    }
}

/// Outcome of [`Deduplicator::should_suppress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupDecision {
    /// Not suppressed; nothing more to do.
    Emit,
    /// Suppressed: the caller must drop this record.
    Suppress,
    /// Not suppressed, but a prior run of identical records just ended;
    /// the caller should emit one synthetic summary record before this one.
    EmitWithFlush { suppressed_count: u64 },
}

/// Per-logger signature -> {first_seen, count, level} map, bounded to
/// `max_size` via insertion-order eviction.
pub struct Deduplicator {
    config: DedupConfig,
    entries: Mutex<IndexMap<String, Entry>>,
}

impl Deduplicator {
    pub fn new(config: DedupConfig) -> Self {
        Self { config, entries: Mutex::new(IndexMap::new()) }
    }

    fn signature(&self, namespace: Option<&str>, level: LogLevel, message: &str) -> String {
        let mut parts = Vec::with_capacity(3);
        if self.config.include_namespace {
            parts.push(namespace.unwrap_or("").to_string());
        }
        if self.config.include_level {
            parts.push(level.as_str().to_string());
        }
        parts.push(message.to_string());
        parts.join("\u{1f}")
    }

    pub fn should_suppress(&self, namespace: Option<&str>, level: LogLevel, message: &str) -> DedupDecision {
        if !self.config.enabled {
            return DedupDecision::Emit;
        }

        let signature = self.signature(namespace, level, message);
        let mut entries = self.entries.lock();
        let now = Instant::now();

        if let Some(entry) = entries.get_mut(&signature) {
            if now.duration_since(entry.first_seen) < self.config.window {
                entry.count += 1;
                return DedupDecision::Suppress;
            }
            let suppressed = entry.count.saturating_sub(1);
            entries.shift_remove(&signature);
            Self::insert_bounded(&mut entries, signature, Entry { first_seen: now, count: 1, level }, self.config.max_size);
            return if suppressed > 0 {
                DedupDecision::EmitWithFlush { suppressed_count: suppressed }
            } else {
                DedupDecision::Emit
            };
        }

        Self::insert_bounded(&mut entries, signature, Entry { first_seen: now, count: 1, level }, self.config.max_size);
        DedupDecision::Emit
    }

    fn insert_bounded(entries: &mut IndexMap<String, Entry>, key: String, value: Entry, max_size: usize) {
        if entries.len() >= max_size {
            entries.shift_remove_index(0);
        }
        entries.insert(key, value);
    }

    /// Remove entries whose window has elapsed and whose count is 1
    /// (nothing to summarize). Intended to be driven by a periodic task
    /// at interval `2 * window`.
    pub fn sweep(&self) {
        let now = Instant::now();
        let window = self.config.window;
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| !(now.duration_since(entry.first_seen) >= window && entry.count == 1));
    }

    /// All tracked signatures whose count > 1, for shutdown drains.
    pub fn pending_summaries(&self) -> Vec<(String, u64, LogLevel)> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, e)| e.count > 1)
            .map(|(sig, e)| (sig.clone(), e.count - 1, e.level))
            .collect()
    }

    pub fn window(&self) -> Duration {
        self.config.window
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The default dedup summary message.
pub fn summary_message(original_message: &str, suppressed_count: u64, window: Duration) -> String {
    format!("{original_message} (repeated {suppressed_count}\u{00d7} in last {}ms)", window.as_millis())
}
