//! Redis pub/sub topic backend
//!
//! `PUBLISH` goes through the shared connection pool. Each subscription opens
//! its own pub/sub connection, since a connection in subscriber mode cannot
//! issue regular commands. The subscription stream ends when that connection
//! drops; callers decide whether to resubscribe.
//!
//! Channel naming: `{costscope}:pubsub:{topic}`

use async_stream::stream;
use async_trait::async_trait;
use deadpool_redis::Pool;
use futures::StreamExt;

use super::backend::{BroadcastSubscription, TopicBackend};
use super::error::TopicError;
use crate::data::counters::redis::{create_pool, sanitize_redis_url};

const PUBSUB_PREFIX: &str = "{costscope}:pubsub:";

pub struct RedisTopicBackend {
    pool: Pool,
    /// Needed for dedicated pub/sub connections
    redis_url: String,
}

impl RedisTopicBackend {
    pub async fn new(redis_url: &str) -> Result<Self, TopicError> {
        let pool = create_pool(redis_url)
            .await
            .map_err(|e| TopicError::Connection(e.to_string()))?;

        tracing::debug!(url = %sanitize_redis_url(redis_url), "Redis topic backend connected");

        Ok(Self {
            pool,
            redis_url: redis_url.to_string(),
        })
    }

    fn channel(topic: &str) -> String {
        format!("{PUBSUB_PREFIX}{topic}")
    }
}

#[async_trait]
impl TopicBackend for RedisTopicBackend {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TopicError> {
        let mut conn = self.pool.get().await?;
        let _: i64 = deadpool_redis::redis::cmd("PUBLISH")
            .arg(Self::channel(topic))
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BroadcastSubscription, TopicError> {
        let channel = Self::channel(topic);

        let client = deadpool_redis::redis::Client::open(self.redis_url.as_str())
            .map_err(|e| TopicError::Config(e.to_string()))?;
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| TopicError::Connection(e.to_string()))?;
        pubsub.subscribe(&channel).await?;

        tracing::debug!(channel = %channel, "Redis pub/sub subscribed");

        let stream = stream! {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                match msg.get_payload::<Vec<u8>>() {
                    Ok(payload) => yield Ok(payload),
                    Err(e) => {
                        tracing::warn!(error = %e, channel = %channel, "Failed to get message payload");
                    }
                }
            }
            tracing::debug!(channel = %channel, "Redis pub/sub stream ended");
        };

        Ok(BroadcastSubscription {
            receiver: Box::pin(stream),
        })
    }

    async fn health_check(&self) -> Result<(), TopicError> {
        let mut conn = self.pool.get().await?;
        deadpool_redis::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| TopicError::Connection(e.to_string()))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
