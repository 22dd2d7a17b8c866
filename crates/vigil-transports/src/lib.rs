//! Concrete log transports and the OTLP span exporter for vigil.
//!
//! Every transport here is built on [`vigil_core::transport::BatchEngine`]
//! except [`console::ConsoleTransport`], which writes synchronously and
//! never batches.

pub mod console;
pub mod datadog;
pub mod file;
pub mod http;
pub mod otlp;

pub use console::{ConsoleFormat, ConsoleTransport, ConsoleTransportConfig};
pub use datadog::{DatadogSite, DatadogTransport, DatadogTransportConfig};
pub use file::{FileTransport, FileTransportConfig, RotationInterval};
pub use http::{HttpTransport, HttpTransportConfig, RecordTransform};
pub use otlp::{OtlpExporter, OtlpExporterConfig};
