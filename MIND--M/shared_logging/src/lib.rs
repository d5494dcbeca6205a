#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSON-lines logging shared by the perception and spatial crates.
//!
//! A [`LogRecord`] is written to any [`LogSink`]. Two sinks ship with the
//! crate: [`JsonLogger`] appends to a file, [`MemorySink`] keeps records in
//! process so embedding hosts and tests can inspect them.

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Log severity level, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Per-field or per-entity diagnostics.
    Debug,
    /// Completed merges, evictions, queries.
    Info,
    /// Recoverable anomalies such as a truncated snapshot.
    Warn,
    /// Failures that made an operation give up.
    Error,
}

/// Structured log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp in ISO8601.
    pub timestamp: DateTime<Utc>,
    /// Module emitting the log (`perception`, `spatial`, ...).
    pub module: String,
    /// Severity.
    pub level: LogLevel,
    /// Dotted message key, e.g. `perception.merge.completed`.
    pub message: String,
    /// Arbitrary JSON payload.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl LogRecord {
    /// Creates a record with an empty metadata object.
    #[must_use]
    pub fn new(module: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            module: module.into(),
            level,
            message: message.into(),
            metadata: Map::new(),
        }
    }

    /// Adds a single metadata field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Merges every key of a JSON object into the metadata. Non-object values are ignored.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        if let Value::Object(obj) = metadata {
            self.metadata.extend(obj);
        }
        self
    }
}

/// Destination for log records.
pub trait LogSink: Send + Sync {
    /// Writes a record.
    fn write(&self, record: &LogRecord) -> Result<()>;

    /// Records below this level are dropped by [`LogSink::log`].
    fn min_level(&self) -> LogLevel {
        LogLevel::Debug
    }

    /// Filters by level, then writes.
    fn log(&self, record: &LogRecord) -> Result<()> {
        if record.level < self.min_level() {
            return Ok(());
        }
        self.write(record)
    }
}

/// Thread-safe JSON logger with append-only semantics.
#[derive(Debug)]
pub struct JsonLogger {
    path: PathBuf,
    min_level: LogLevel,
    writer: Mutex<File>,
}

impl JsonLogger {
    /// Creates or opens a logger at the desired path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            min_level: LogLevel::Debug,
            writer: Mutex::new(file),
        })
    }

    /// Drops records below `level`.
    #[must_use]
    pub const fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Returns the underlying file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for JsonLogger {
    fn write(&self, record: &LogRecord) -> Result<()> {
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

/// In-process sink retaining the most recent records.
#[derive(Debug)]
pub struct MemorySink {
    capacity: usize,
    min_level: LogLevel,
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    /// Creates a sink keeping at most `capacity` records (oldest dropped first).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            min_level: LogLevel::Debug,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Drops records below `level`.
    #[must_use]
    pub const fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Snapshot of retained records.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Retained records whose message equals `message`.
    #[must_use]
    pub fn find(&self, message: &str) -> Vec<LogRecord> {
        self.records
            .lock()
            .iter()
            .filter(|record| record.message == message)
            .cloned()
            .collect()
    }
}

impl LogSink for MemorySink {
    fn write(&self, record: &LogRecord) -> Result<()> {
        let mut records = self.records.lock();
        records.push(record.clone());
        if records.len() > self.capacity {
            let overflow = records.len() - self.capacity;
            records.drain(..overflow);
        }
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn writes_json_lines() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("mind.log")).unwrap();
        logger
            .log(
                &LogRecord::new("perception", LogLevel::Info, "perception.merge.completed")
                    .with_field("creature", "C1"),
            )
            .unwrap();
        let content = fs::read_to_string(logger.path()).unwrap();
        assert!(content.contains("\"message\":\"perception.merge.completed\""));
        assert!(content.contains("\"creature\":\"C1\""));
    }

    #[test]
    fn min_level_filters_records() {
        let sink = MemorySink::new(8).with_min_level(LogLevel::Warn);
        sink.log(&LogRecord::new("spatial", LogLevel::Debug, "noise"))
            .unwrap();
        sink.log(&LogRecord::new("spatial", LogLevel::Warn, "kept"))
            .unwrap();
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "kept");
    }

    #[test]
    fn memory_sink_drops_oldest() {
        let sink = MemorySink::new(2);
        for message in ["a", "b", "c"] {
            sink.log(&LogRecord::new("perception", LogLevel::Info, message))
                .unwrap();
        }
        let messages: Vec<_> = sink.records().into_iter().map(|r| r.message).collect();
        assert_eq!(messages, vec!["b", "c"]);
    }

    #[test]
    fn metadata_merges_objects_only() {
        let record = LogRecord::new("perception", LogLevel::Info, "m")
            .with_metadata(json!({ "vision": 1, "frustum": 2 }))
            .with_metadata(json!(3));
        assert_eq!(record.metadata.len(), 2);
    }
}
