//! In-process event bus.
//!
//! A broadcast channel with typed payloads for the two topics the core
//! emits: `data_collected` after every successful fresh collection, and
//! `file_changed` for every accepted watcher event. Slow subscribers lag
//! and drop the oldest events rather than applying backpressure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default broadcast buffer depth
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Payload for the `data_collected` topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataCollectedEvent {
    /// Operation id of the collect call
    pub operation_id: Uuid,
    /// Registered operation name
    pub operation_name: String,
    /// Device the data came from
    pub device_id: Uuid,
    /// Emission time
    pub timestamp: DateTime<Utc>,
    /// Command category of the operation
    pub data_category: String,
    /// Wall-clock duration of the collection
    pub execution_time_ms: u64,
}

/// Payload for the `file_changed` topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChangedEvent {
    /// Device the change was observed on
    pub device_id: Uuid,
    /// Remote path that changed
    pub path: String,
    /// What happened to the file
    pub change_type: String,
    /// Classified configuration type
    pub config_type: String,
    /// Content hash of the new snapshot; absent for deletions
    pub content_hash: Option<String>,
    /// Observation time
    pub timestamp: DateTime<Utc>,
}

/// Every event the core can publish
#[derive(Debug, Clone)]
pub enum Event {
    /// A fresh collection completed successfully
    DataCollected(DataCollectedEvent),
    /// A watched configuration file changed
    FileChanged(FileChangedEvent),
}

impl Event {
    /// Topic name for subscribers that filter by string
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            Self::DataCollected(_) => "data_collected",
            Self::FileChanged(_) => "file_changed",
        }
    }
}

/// Broadcast bus shared by the collector and the watcher
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus with the given buffer depth
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event; returns the number of subscribers that will see it.
    /// Publishing with no subscribers is not an error.
    pub fn emit(&self, event: Event) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to all future events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Current subscriber count
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let delivered = bus.emit(Event::FileChanged(FileChangedEvent {
            device_id: Uuid::new_v4(),
            path: "/etc/nginx/proxy-confs/app.conf".into(),
            change_type: "MODIFY".into(),
            config_type: "nginx_proxy".into(),
            content_hash: Some("abc".into()),
            timestamp: Utc::now(),
        }));
        assert_eq!(delivered, 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic(), "file_changed");
    }

    #[test]
    fn test_emit_without_subscribers_is_ok() {
        let bus = EventBus::default();
        let delivered = bus.emit(Event::DataCollected(DataCollectedEvent {
            operation_id: Uuid::new_v4(),
            operation_name: "list_containers".into(),
            device_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            data_category: "container_management".into(),
            execution_time_ms: 12,
        }));
        assert_eq!(delivered, 0);
    }
}
