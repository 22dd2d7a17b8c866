//! Console transport: synchronous, never batches, structured or pretty
//! rendering to stdout/stderr.

use async_trait::async_trait;
use colored::{Color, Colorize};
use vigil_types::level::LogLevel;
use vigil_types::record::LogRecord;
use vigil_types::transport::TransportConfig;
use vigil_core::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleFormat {
    Structured,
    Pretty,
}

#[derive(Debug, Clone)]
pub struct ConsoleTransportConfig {
    pub base: TransportConfig,
    pub format: ConsoleFormat,
    pub colors: bool,
}

impl Default for ConsoleTransportConfig {
    fn default() -> Self {
        Self { base: TransportConfig::new("console"), format: ConsoleFormat::Pretty, colors: true }
    }
}

/// Writes each record directly to stdout (trace/debug/info) or stderr
/// (warn/error) as soon as it arrives; there is no buffering to flush.
pub struct ConsoleTransport {
    config: ConsoleTransportConfig,
}

impl ConsoleTransport {
    pub fn new(config: ConsoleTransportConfig) -> Self {
        Self { config }
    }

    fn level_color(level: LogLevel) -> Color {
        match level {
            LogLevel::Trace => Color::BrightBlack,
            LogLevel::Debug => Color::Cyan,
            LogLevel::Info => Color::Green,
            LogLevel::Warn => Color::Yellow,
            LogLevel::Error => Color::Red,
        }
    }

    fn render_pretty(&self, record: &LogRecord) -> String {
        let label = record.level.label();
        let label = if self.config.colors { label.color(Self::level_color(record.level)).to_string() } else { label.to_string() };

        let mut line = format!("{} {}", label, record.timestamp.to_rfc3339());
        if let Some(namespace) = &record.namespace {
            line.push_str(&format!(" [{namespace}]"));
        }
        line.push(' ');
        line.push_str(&record.message);

        if let Some(metadata) = &record.metadata {
            if !metadata.is_empty() {
                line.push(' ');
                line.push_str(&serde_json::to_string(metadata).unwrap_or_default());
            }
        }

        if let Some(error) = &record.error {
            if let Some(stack) = &error.stack {
                line.push('\n');
                line.push_str(stack);
            }
        }

        line
    }

    fn render_structured(&self, record: &LogRecord) -> String {
        serde_json::to_string(record).unwrap_or_else(|_| record.message.clone())
    }

    fn render(&self, record: &LogRecord) -> String {
        match self.config.format {
            ConsoleFormat::Structured => self.render_structured(record),
            ConsoleFormat::Pretty => self.render_pretty(record),
        }
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    fn name(&self) -> &str {
        &self.config.base.name
    }

    fn admits(&self, level: LogLevel) -> bool {
        self.config.base.admits(level)
    }

    async fn log(&self, record: LogRecord) {
        let line = self.render(&record);
        // trace maps onto the same stream as debug, matching the host's
        // debug/info/warn/error console family.
        match record.level {
            LogLevel::Trace | LogLevel::Debug | LogLevel::Info => println!("{line}"),
            LogLevel::Warn | LogLevel::Error => eprintln!("{line}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(level: LogLevel, message: &str) -> LogRecord {
        LogRecord::new(level, message, "rust")
    }

    #[test]
    fn pretty_render_includes_label_timestamp_and_message() {
        let transport = ConsoleTransport::new(ConsoleTransportConfig { colors: false, ..Default::default() });
        let rendered = transport.render(&record(LogLevel::Info, "hello"));
        assert!(rendered.contains("INFO "));
        assert!(rendered.contains("hello"));
    }

    #[test]
    fn pretty_render_appends_namespace_when_present() {
        let transport = ConsoleTransport::new(ConsoleTransportConfig { colors: false, ..Default::default() });
        let mut rec = record(LogLevel::Warn, "disk low");
        rec.namespace = Some("db:pool".to_string());
        let rendered = transport.render(&rec);
        assert!(rendered.contains("[db:pool]"));
    }

    #[test]
    fn structured_render_is_valid_json() {
        let transport = ConsoleTransport::new(ConsoleTransportConfig { format: ConsoleFormat::Structured, ..Default::default() });
        let rendered = transport.render(&record(LogLevel::Error, "boom"));
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["message"], "boom");
    }

    #[test]
    fn admits_respects_min_level() {
        let mut config = ConsoleTransportConfig::default();
        config.base.min_level = Some(LogLevel::Warn);
        let transport = ConsoleTransport::new(config);
        assert!(!transport.admits(LogLevel::Info));
        assert!(transport.admits(LogLevel::Error));
    }
}
