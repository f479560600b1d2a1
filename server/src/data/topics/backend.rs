//! Topic backend trait definition
//!
//! Broadcast (pub/sub) semantics only: every active subscriber receives each
//! published message, nothing is persisted, and a message published with no
//! subscribers is dropped.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use super::error::TopicError;

/// Subscription to a broadcast topic
///
/// The stream ends when the underlying channel or connection closes.
pub struct BroadcastSubscription {
    pub receiver: Pin<Box<dyn Stream<Item = Result<Vec<u8>, TopicError>> + Send>>,
}

/// Topic backend trait
///
/// Both in-memory and Redis backends implement this trait.
#[async_trait]
pub trait TopicBackend: Send + Sync {
    /// Publish message to topic (fire-and-forget)
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TopicError>;

    /// Subscribe to topic
    ///
    /// Lagging subscribers may miss messages (bounded buffer overflow).
    async fn subscribe(&self, topic: &str) -> Result<BroadcastSubscription, TopicError>;

    async fn health_check(&self) -> Result<(), TopicError>;

    fn backend_name(&self) -> &'static str;
}
