use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord, LogSink};
use tokio::runtime::{Builder, Handle};

/// Builder for perception telemetry sinks.
pub struct PerceptionTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    sinks: Vec<Arc<dyn LogSink>>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl PerceptionTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            sinks: Vec::new(),
            event_publisher: None,
        }
    }

    /// Appends JSON lines to a file.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Adds an arbitrary log sink, e.g. a `MemorySink`.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Sets the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<PerceptionTelemetry> {
        let mut sinks = self.sinks;
        if let Some(path) = self.log_path {
            sinks.push(Arc::new(JsonLogger::new(path)?));
        }
        Ok(PerceptionTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                sinks,
                publisher: self.event_publisher,
            }),
        })
    }
}

/// Telemetry handle shared by buffers, registries and maps.
#[derive(Clone)]
pub struct PerceptionTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for PerceptionTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerceptionTelemetry")
            .field("module", &self.inner.module)
            .field("sinks", &self.inner.sinks.len())
            .field("events", &self.inner.publisher.is_some())
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    sinks: Vec<Arc<dyn LogSink>>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl PerceptionTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> PerceptionTelemetryBuilder {
        PerceptionTelemetryBuilder::new(module)
    }

    /// Module name stamped on every record.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.inner.module
    }

    /// Logs structured metadata to every sink.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if self.inner.sinks.is_empty() {
            return Ok(());
        }
        let record = LogRecord::new(&self.inner.module, level, message).with_metadata(metadata);
        for sink in &self.inner.sinks {
            sink.log(&record)?;
        }
        Ok(())
    }

    /// Emits an event on the bus.
    ///
    /// Publishers able to emit synchronously are used directly; otherwise the
    /// event is spawned onto the ambient runtime, or published on a
    /// short-lived runtime when called outside of one.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        let Some(publisher) = &self.inner.publisher else {
            return Ok(());
        };
        let record = EventRecord::new(self.inner.module.clone(), event_type, payload);
        if publisher.try_publish_now(&record) {
            return Ok(());
        }
        if let Ok(handle) = Handle::try_current() {
            let publisher = Arc::clone(publisher);
            handle.spawn(async move {
                if let Err(err) = publisher.publish(record).await {
                    tracing::warn!(error = ?err, "telemetry event publish failed");
                }
            });
            Ok(())
        } else {
            let runtime = Builder::new_current_thread().enable_all().build()?;
            runtime.block_on(publisher.publish(record))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_event_bus::{FileEventPublisher, MemoryEventBus};
    use shared_logging::MemorySink;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_log_and_event() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("perception.log");
        let bus = Arc::new(MemoryEventBus::new(16));
        let memory = Arc::new(MemorySink::new(8));
        let telemetry = PerceptionTelemetry::builder("perception")
            .log_path(&path)
            .sink(memory.clone())
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Info, "perception.merge.completed", json!({ "vision": 1 }))
            .unwrap();
        telemetry
            .event("perception.merge.completed", json!({ "creature": "C1" }))
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("perception.merge.completed"));
        assert_eq!(memory.find("perception.merge.completed").len(), 1);
        assert_eq!(bus.snapshot().len(), 1);
        assert_eq!(bus.snapshot()[0].source, "perception");
    }

    #[test]
    fn async_only_publisher_blocks_outside_runtime() {
        let tmp = tempdir().unwrap();
        let publisher = Arc::new(FileEventPublisher::new(tmp.path().join("events.log")).unwrap());
        let telemetry = PerceptionTelemetry::builder("spatial")
            .event_publisher(publisher.clone())
            .build()
            .unwrap();
        telemetry
            .event("spatial.unknown.nearest", json!({ "found": false }))
            .unwrap();
        let content = std::fs::read_to_string(publisher.path()).unwrap();
        assert!(content.contains("spatial.unknown.nearest"));
    }

    #[test]
    fn silent_without_sinks() {
        let telemetry = PerceptionTelemetry::builder("perception").build().unwrap();
        assert!(telemetry.log(LogLevel::Warn, "noop", json!({})).is_ok());
        assert!(telemetry.event("noop", json!({})).is_ok());
        assert_eq!(telemetry.module(), "perception");
    }
}
