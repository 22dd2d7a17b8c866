//! Transport configuration value types.

use std::time::Duration;

use crate::level::LogLevel;

/// Configuration common to every transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub name: String,
    pub enabled: bool,
    pub min_level: Option<LogLevel>,
}

impl TransportConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), enabled: true, min_level: None }
    }

    pub fn admits(&self, level: LogLevel) -> bool {
        self.enabled && self.min_level.map(|min| level >= min).unwrap_or(true)
    }
}

/// Configuration shared by every batch-based transport (HTTP, File,
/// Datadog, OTLP).
#[derive(Debug, Clone)]
pub struct BatchTransportConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for BatchTransportConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval: Duration::from_millis(5000),
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_respects_min_level_and_enabled() {
        let mut cfg = TransportConfig::new("console");
        assert!(cfg.admits(LogLevel::Trace));

        cfg.min_level = Some(LogLevel::Warn);
        assert!(!cfg.admits(LogLevel::Info));
        assert!(cfg.admits(LogLevel::Error));

        cfg.enabled = false;
        assert!(!cfg.admits(LogLevel::Error));
    }
}
