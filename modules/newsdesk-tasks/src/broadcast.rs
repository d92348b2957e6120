//! Per-task event fan-out. SSE subscribers replay persisted events, then
//! tail the live broadcast; bounded channels mean a stalled subscriber is
//! dropped rather than backing up the producer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

const CHANNEL_CAPACITY: usize = 256;

/// One event frame on a task's live stream. Mirrors the persisted
/// task_events row.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStreamEvent {
    pub task_id: i64,
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Process-local registry of per-task broadcast channels.
#[derive(Default)]
pub struct TaskHub {
    channels: RwLock<HashMap<i64, broadcast::Sender<TaskStreamEvent>>>,
}

impl TaskHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publisher(&self, task_id: i64) -> broadcast::Sender<TaskStreamEvent> {
        let mut channels = self.channels.write().await;
        channels
            .entry(task_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    pub async fn subscribe(&self, task_id: i64) -> broadcast::Receiver<TaskStreamEvent> {
        self.publisher(task_id).await.subscribe()
    }

    /// Fire an event to whoever is listening. Nobody listening is fine.
    pub async fn publish(&self, event: TaskStreamEvent) {
        let tx = self.publisher(event.task_id).await;
        let _ = tx.send(event);
    }

    /// Release a finished task's channel.
    pub async fn remove(&self, task_id: i64) {
        self.channels.write().await.remove(&task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let hub = TaskHub::new();
        let mut rx = hub.subscribe(1).await;
        hub.publish(TaskStreamEvent {
            task_id: 1,
            event_type: "progress".to_string(),
            data: Some(serde_json::json!({"current": 1, "total": 10})),
            created_at: Utc::now(),
        })
        .await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, "progress");
        assert_eq!(event.data.unwrap()["current"], 1);
    }

    #[tokio::test]
    async fn tasks_are_isolated() {
        let hub = TaskHub::new();
        let mut rx_other = hub.subscribe(2).await;
        hub.publish(TaskStreamEvent {
            task_id: 1,
            event_type: "info".to_string(),
            data: None,
            created_at: Utc::now(),
        })
        .await;
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let hub = TaskHub::new();
        hub.publish(TaskStreamEvent {
            task_id: 3,
            event_type: "started".to_string(),
            data: None,
            created_at: Utc::now(),
        })
        .await;
        hub.remove(3).await;
    }
}
