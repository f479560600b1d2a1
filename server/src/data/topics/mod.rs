//! Topic (pub/sub) service
//!
//! Fire-and-forget fan-out with pluggable backends:
//! - In-memory (default) - tokio broadcast channels
//! - Redis (optional) - PUBLISH/SUBSCRIBE, shared across instances
//!
//! Follows the same `cache.backend` selection as the counter store.

mod backend;
mod error;
mod memory;
mod redis;

use std::sync::Arc;

pub use backend::{BroadcastSubscription, TopicBackend};
pub use error::TopicError;
pub use memory::MemoryTopicBackend;

use crate::core::config::{CacheBackendType, CacheConfig};

/// Topic carrying cost deltas from ingestion to the broadcast manager
pub const COST_UPDATES_TOPIC: &str = "sse:cost_updates";

/// Topic service wrapping the configured backend
#[derive(Clone)]
pub struct TopicService {
    backend: Arc<dyn TopicBackend>,
}

impl std::fmt::Debug for TopicService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicService")
            .field("backend", &self.backend.backend_name())
            .finish()
    }
}

impl TopicService {
    pub async fn new(config: &CacheConfig) -> Result<Self, TopicError> {
        let backend: Arc<dyn TopicBackend> = match config.backend {
            CacheBackendType::Memory => {
                tracing::debug!("Initializing in-memory topics");
                Arc::new(MemoryTopicBackend::new())
            }
            CacheBackendType::Redis => {
                let url = config.redis_url.as_ref().ok_or_else(|| {
                    TopicError::Config("redis_url required for Redis backend".into())
                })?;
                Arc::new(redis::RedisTopicBackend::new(url).await?)
            }
        };

        Ok(Self { backend })
    }

    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(MemoryTopicBackend::new()))
    }

    pub fn from_backend(backend: Arc<dyn TopicBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    pub async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TopicError> {
        self.backend.publish(topic, payload).await
    }

    pub async fn subscribe(&self, topic: &str) -> Result<BroadcastSubscription, TopicError> {
        self.backend.subscribe(topic).await
    }

    pub async fn health_check(&self) -> Result<(), TopicError> {
        self.backend.health_check().await
    }
}
