use std::collections::HashSet;
use thiserror::Error;
use tokio::sync::broadcast;

use super::event::{FileEvent, FileEventKind};

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode event on topic {topic}: {source}")]
    Decode {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No subscribers for topic {0}")]
    NoSubscribers(String),
}

/// One serialized message on one topic.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn decode(&self) -> Result<FileEvent, EventError> {
        serde_json::from_slice(&self.payload).map_err(|source| EventError::Decode {
            topic: self.topic.clone(),
            source,
        })
    }
}

/// Fire-and-forget publish/subscribe channel with one topic per event kind.
///
/// Delivery is at-most-once: a subscriber that falls more than `capacity`
/// messages behind loses the oldest ones, and nothing is replayed.
pub struct EventChannel {
    prefix: String,
    sender: broadcast::Sender<Envelope>,
}

impl EventChannel {
    pub fn new(prefix: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            prefix: prefix.into(),
            sender,
        }
    }

    pub fn topic_for(&self, kind: FileEventKind) -> String {
        format!("{}.{}", self.prefix, kind.as_str())
    }

    /// Returns the number of subscriptions the message was handed to.
    pub fn publish(&self, event: &FileEvent) -> Result<usize, EventError> {
        let topic = self.topic_for(event.kind);
        let payload = serde_json::to_vec(event).map_err(EventError::Encode)?;
        self.publish_raw(topic, payload)
    }

    pub fn publish_raw(&self, topic: String, payload: Vec<u8>) -> Result<usize, EventError> {
        self.sender
            .send(Envelope {
                topic: topic.clone(),
                payload,
            })
            .map_err(|_| EventError::NoSubscribers(topic))
    }

    pub fn subscribe(&self, kinds: &[FileEventKind]) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            topics: kinds.iter().map(|kind| self.topic_for(*kind)).collect(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

pub struct Subscription {
    receiver: broadcast::Receiver<Envelope>,
    topics: HashSet<String>,
}

impl Subscription {
    /// Next message on a subscribed topic, or `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if self.topics.contains(&envelope.topic) => return Some(envelope),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Event subscription lagged, {} messages were dropped",
                        skipped
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn topics(&self) -> &HashSet<String> {
        &self.topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::Map;

    fn event(kind: FileEventKind) -> FileEvent {
        FileEvent {
            kind,
            asset_id: 1,
            public_id: "p".to_string(),
            action: kind.as_str().to_string(),
            entity_type: None,
            entity_id: None,
            user_id: None,
            metadata: Map::new(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_reports_topic() {
        let channel = EventChannel::new("file_events", 8);
        match channel.publish(&event(FileEventKind::Upload)) {
            Err(EventError::NoSubscribers(topic)) => assert_eq!(topic, "file_events.upload"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscription_filters_topics() {
        let channel = EventChannel::new("file_events", 8);
        let mut sub = channel.subscribe(&[FileEventKind::Orphaned]);

        channel.publish(&event(FileEventKind::Upload)).unwrap();
        channel.publish(&event(FileEventKind::Orphaned)).unwrap();

        let envelope = sub.recv().await.unwrap();
        assert_eq!(envelope.topic, "file_events.orphaned");
        assert_eq!(envelope.decode().unwrap().kind, FileEventKind::Orphaned);
    }

    #[tokio::test]
    async fn test_lagged_subscriber_keeps_receiving() {
        let channel = EventChannel::new("t", 2);
        let mut sub = channel.subscribe(&FileEventKind::ALL);

        for _ in 0..5 {
            channel.publish(&event(FileEventKind::Cleanup)).unwrap();
        }

        // The oldest messages are gone but the subscription stays usable.
        assert!(sub.recv().await.is_some());
    }
}
