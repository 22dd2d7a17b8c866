//! File transport: server-only, extends the batch transport framework with
//! size- and time-based rotation and optional gzip compression of rolled
//! files.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use vigil_core::transport::{BatchEngine, BatchSink, Transport, TransportError};
use vigil_types::level::LogLevel;
use vigil_types::record::LogRecord;
use vigil_types::transport::{BatchTransportConfig, TransportConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationInterval {
    Hourly,
    Daily,
    Weekly,
}

impl RotationInterval {
    /// A wall-clock bucket identifier; writes in the same bucket never
    /// trigger a time-based rotation.
    fn bucket(self, at: chrono::DateTime<chrono::Utc>) -> i64 {
        use chrono::Datelike;
        match self {
            RotationInterval::Hourly => at.timestamp() / 3600,
            RotationInterval::Daily => at.timestamp() / 86_400,
            RotationInterval::Weekly => (at.iso_week().year() as i64) * 100 + at.iso_week().week() as i64,
        }
    }
}

#[derive(Clone)]
pub struct FileTransportConfig {
    pub base: TransportConfig,
    pub batch: BatchTransportConfig,
    pub path: PathBuf,
    pub max_size: u64,
    pub max_files: u32,
    pub compress: bool,
    pub rotation_interval: Option<RotationInterval>,
}

impl FileTransportConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            base: TransportConfig::new("file"),
            batch: BatchTransportConfig::default(),
            path: path.into(),
            max_size: 10 * 1024 * 1024,
            max_files: 5,
            compress: false,
            rotation_interval: None,
        }
    }
}

/// Owns the live file handle, its current byte size, and the wall-clock
/// bucket of the last write; performs size/time rotation before each append.
struct FileStore {
    config: FileTransportConfig,
    file: std::fs::File,
    current_size: u64,
    last_bucket: Option<i64>,
}

impl FileStore {
    fn open(config: FileTransportConfig) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new().create(true).append(true).open(&config.path)?;
        let current_size = file.metadata()?.len();
        Ok(Self { config, file, current_size, last_bucket: None })
    }

    /// Index 0 is the live file itself; indices 1.. are rotated files,
    /// suffixed `.gz` when compression is enabled.
    fn rotated_path(&self, index: u32) -> PathBuf {
        if index == 0 {
            return self.config.path.clone();
        }
        let suffix = if self.config.compress { format!(".{index}.gz") } else { format!(".{index}") };
        let mut name = self.config.path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        let oldest = self.rotated_path(self.config.max_files);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }

        for i in (1..self.config.max_files).rev() {
            let from = self.rotated_path(i - 1);
            if !from.exists() {
                continue;
            }
            if i == 1 && self.config.compress {
                gzip_file(&from, &self.rotated_path(1))?;
                std::fs::remove_file(&from)?;
            } else {
                std::fs::rename(&from, self.rotated_path(i))?;
            }
        }

        self.file = std::fs::OpenOptions::new().create(true).write(true).truncate(true).open(&self.config.path)?;
        self.current_size = 0;
        Ok(())
    }

    fn write_records(&mut self, records: &[LogRecord]) -> std::io::Result<()> {
        for record in records {
            let mut line = serde_json::to_vec(record).map_err(std::io::Error::other)?;
            line.push(b'\n');

            let bucket_rotation = self.config.rotation_interval.map(|interval| {
                let bucket = interval.bucket(record.timestamp);
                let rotate = self.last_bucket.is_some_and(|last| last != bucket);
                self.last_bucket = Some(bucket);
                rotate
            });

            if bucket_rotation == Some(true) || self.current_size + line.len() as u64 > self.config.max_size {
                self.rotate()?;
            }

            self.file.write_all(&line)?;
            self.current_size += line.len() as u64;
        }
        self.file.flush()?;
        Ok(())
    }
}

fn gzip_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    let data = std::fs::read(src)?;
    let out = std::fs::File::create(dst)?;
    let mut encoder = GzEncoder::new(out, Compression::default());
    encoder.write_all(&data)?;
    encoder.finish()?;
    Ok(())
}

struct FileSink {
    store: Mutex<FileStore>,
}

#[async_trait]
impl BatchSink for FileSink {
    type Record = LogRecord;

    async fn send(&self, records: &[LogRecord]) -> Result<(), TransportError> {
        // Rotation and append are blocking file I/O; run them without
        // yielding the worker thread back to the runtime mid-write.
        tokio::task::block_in_place(|| self.store.lock().write_records(records))
            .map_err(|e| TransportError::Send { retryable: false, message: e.to_string(), status_code: None })
    }
}

/// Appends records as newline-delimited JSON, rotating by size (always) and
/// optionally by wall-clock interval, with optional gzip of rolled files.
pub struct FileTransport {
    engine: Arc<BatchEngine<FileSink>>,
    name: String,
    base: TransportConfig,
}

impl FileTransport {
    /// Must be called from within a Tokio runtime; starts the periodic
    /// flush timer immediately. Opens (or creates) the log file eagerly.
    pub fn new(config: FileTransportConfig) -> std::io::Result<Self> {
        let name = config.base.name.clone();
        let base = config.base.clone();
        let batch = config.batch.clone();
        let store = FileStore::open(config)?;
        let sink = FileSink { store: Mutex::new(store) };
        let engine = BatchEngine::new(sink, batch);
        engine.init();
        Ok(Self { engine, name, base })
    }
}

#[async_trait]
impl Transport for FileTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn admits(&self, level: LogLevel) -> bool {
        self.base.admits(level)
    }

    async fn log(&self, record: LogRecord) {
        self.engine.log(record);
    }

    async fn flush(&self) {
        self.engine.flush().await;
    }

    async fn destroy(&self) {
        self.engine.destroy().await;
    }
}
