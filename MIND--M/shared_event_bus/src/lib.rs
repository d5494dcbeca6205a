#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Event bus carrying notifications between the creature mind crates and
//! their host (planners, viewers, recorders).

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::broadcast};
use uuid::Uuid;

/// Generic event record encoded as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique identifier.
    pub id: String,
    /// Module producing the event.
    pub source: String,
    /// Event type (e.g., `perception.merge.completed`).
    pub event_type: String,
    /// RFC3339 timestamp.
    pub timestamp: String,
    /// Arbitrary JSON payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl EventRecord {
    /// Creates a record stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: format!("evt-{}", Uuid::new_v4()),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now().to_rfc3339(),
            payload,
        }
    }

    /// True when the event type starts with `prefix`.
    #[must_use]
    pub fn matches(&self, prefix: &str) -> bool {
        self.event_type.starts_with(prefix)
    }
}

/// Event publisher interface.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes an event to the bus.
    async fn publish(&self, event: EventRecord) -> Result<()>;

    /// Publishes without awaiting. Publishers that cannot do so synchronously return `false`
    /// and the caller falls back to [`EventPublisher::publish`].
    fn try_publish_now(&self, _event: &EventRecord) -> bool {
        false
    }
}

/// Event subscriber interface.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Returns a receiver for every event published after the call.
    async fn subscribe(&self) -> Result<broadcast::Receiver<EventRecord>>;
}

/// In-memory broadcast bus with a bounded backlog.
#[derive(Debug, Clone)]
pub struct MemoryEventBus {
    sender: broadcast::Sender<EventRecord>,
    capacity: usize,
    backlog: Arc<Mutex<VecDeque<EventRecord>>>,
}

impl MemoryEventBus {
    /// Creates a new bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            capacity,
            backlog: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// Records the event in the backlog and broadcasts it to live subscribers.
    pub fn emit(&self, event: EventRecord) {
        {
            let mut backlog = self.backlog.lock();
            backlog.push_back(event.clone());
            while backlog.len() > self.capacity {
                backlog.pop_front();
            }
        }
        // No live subscriber is not an error; the backlog still has it.
        let _ = self.sender.send(event);
    }

    /// Snapshot of recent events retained in memory.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.backlog.lock().iter().cloned().collect()
    }

    /// Retained events whose type starts with `prefix`.
    #[must_use]
    pub fn events_matching(&self, prefix: &str) -> Vec<EventRecord> {
        self.backlog
            .lock()
            .iter()
            .filter(|event| event.matches(prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventPublisher for MemoryEventBus {
    async fn publish(&self, event: EventRecord) -> Result<()> {
        self.emit(event);
        Ok(())
    }

    fn try_publish_now(&self, event: &EventRecord) -> bool {
        self.emit(event.clone());
        true
    }
}

#[async_trait]
impl EventSubscriber for MemoryEventBus {
    async fn subscribe(&self) -> Result<broadcast::Receiver<EventRecord>> {
        Ok(self.sender.subscribe())
    }
}

/// File-backed publisher appending one JSON event per line (replayable merge journal).
#[derive(Debug, Clone)]
pub struct FileEventPublisher {
    path: PathBuf,
}

impl FileEventPublisher {
    /// Creates a publisher that appends JSON lines to the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// Journal location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventPublisher for FileEventPublisher {
    async fn publish(&self, event: EventRecord) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let mut data = serde_json::to_vec(&event)?;
        data.push(b'\n');
        file.write_all(&data).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn merge_event() -> EventRecord {
        EventRecord::new(
            "perception",
            "perception.merge.completed",
            json!({ "creature": "C1", "vision": 1 }),
        )
    }

    #[tokio::test]
    async fn publishes_and_receives() {
        let bus = MemoryEventBus::new(16);
        let mut rx = bus.subscribe().await.unwrap();
        bus.publish(merge_event()).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, "perception.merge.completed");
        assert_eq!(event.payload["creature"], "C1");
    }

    #[test]
    fn backlog_is_bounded_and_filterable() {
        let bus = MemoryEventBus::new(2);
        bus.emit(merge_event());
        bus.emit(EventRecord::new("spatial", "spatial.unknown.nearest", json!({})));
        bus.emit(merge_event());
        assert_eq!(bus.snapshot().len(), 2);
        assert_eq!(bus.events_matching("perception.").len(), 1);
        assert_eq!(bus.events_matching("spatial.").len(), 1);
    }

    #[test]
    fn sync_publish_reaches_backlog() {
        let bus = MemoryEventBus::new(4);
        assert!(bus.try_publish_now(&merge_event()));
        assert_eq!(bus.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn file_publisher_appends_lines() {
        let dir = tempdir().unwrap();
        let publisher = FileEventPublisher::new(dir.path().join("journal/events.log")).unwrap();
        publisher.publish(merge_event()).await.unwrap();
        publisher.publish(merge_event()).await.unwrap();
        let content = std::fs::read_to_string(publisher.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(!publisher.try_publish_now(&merge_event()));
    }
}
