//! In-memory topic backend
//!
//! One `tokio::sync::broadcast` channel per topic. Local to the process, so
//! only suitable for single-instance deployments.

use std::collections::HashMap;

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::backend::{BroadcastSubscription, TopicBackend};
use super::error::TopicError;

/// Default broadcast channel capacity
const DEFAULT_BROADCAST_CAPACITY: usize = 10_000;

pub struct MemoryTopicBackend {
    channels: RwLock<HashMap<String, broadcast::Sender<Vec<u8>>>>,
    capacity: usize,
}

impl Default for MemoryTopicBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTopicBackend {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BROADCAST_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn get_or_create(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        {
            let channels = self.channels.read();
            if let Some(sender) = channels.get(topic) {
                return sender.clone();
            }
        }

        let mut channels = self.channels.write();
        // Another task may have created it between the two locks
        if let Some(sender) = channels.get(topic) {
            return sender.clone();
        }
        let (sender, _) = broadcast::channel(self.capacity);
        channels.insert(topic.to_string(), sender.clone());
        sender
    }
}

#[async_trait]
impl TopicBackend for MemoryTopicBackend {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TopicError> {
        let sender = self.get_or_create(topic);
        // Send error only means no active subscribers
        let _ = sender.send(payload.to_vec());
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BroadcastSubscription, TopicError> {
        let mut receiver = self.get_or_create(topic).subscribe();

        let stream = stream! {
            loop {
                match receiver.recv().await {
                    Ok(payload) => yield Ok(payload),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        yield Err(TopicError::Lagged(n));
                    }
                }
            }
        };

        Ok(BroadcastSubscription {
            receiver: Box::pin(stream),
        })
    }

    async fn health_check(&self) -> Result<(), TopicError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn test_broadcast_publish_subscribe() {
        let backend = MemoryTopicBackend::new();

        let sub = backend.subscribe("test").await.unwrap();
        let mut receiver = sub.receiver;

        backend.publish("test", b"hello").await.unwrap();

        let msg = tokio::time::timeout(Duration::from_millis(100), receiver.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(msg, b"hello");
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let backend = MemoryTopicBackend::new();
        let mut a = backend.subscribe("fanout").await.unwrap().receiver;
        let mut b = backend.subscribe("fanout").await.unwrap().receiver;

        backend.publish("fanout", b"1").await.unwrap();
        backend.publish("fanout", b"2").await.unwrap();

        for receiver in [&mut a, &mut b] {
            assert_eq!(receiver.next().await.unwrap().unwrap(), b"1");
            assert_eq!(receiver.next().await.unwrap().unwrap(), b"2");
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let backend = MemoryTopicBackend::new();
        assert!(backend.publish("nobody", b"x").await.is_ok());
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let backend = MemoryTopicBackend::new();
        let mut receiver = backend.subscribe("a").await.unwrap().receiver;

        backend.publish("b", b"other").await.unwrap();
        backend.publish("a", b"mine").await.unwrap();

        assert_eq!(receiver.next().await.unwrap().unwrap(), b"mine");
    }

    #[tokio::test]
    async fn test_lagged_receiver_reports_error() {
        let backend = MemoryTopicBackend::with_capacity(2);
        let mut receiver = backend.subscribe("slow").await.unwrap().receiver;

        for i in 0..5u8 {
            backend.publish("slow", &[i]).await.unwrap();
        }

        let first = receiver.next().await.unwrap();
        assert!(matches!(first, Err(TopicError::Lagged(3))));
        assert_eq!(receiver.next().await.unwrap().unwrap(), vec![3]);
    }

    #[test]
    fn test_backend_name() {
        assert_eq!(MemoryTopicBackend::new().backend_name(), "memory");
    }
}
