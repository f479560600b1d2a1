//! Counter store
//!
//! Atomic counters with pluggable backends:
//! - In-memory (default) - dashmap + atomics
//! - Redis (optional) - deadpool-redis
//!
//! Holds the running cost/request/token totals and the windowed counters
//! behind the rate limiter.

mod backend;
mod error;
mod key;
mod memory;
pub mod rate_limiter;
pub(crate) mod redis;

use std::sync::Arc;
use std::time::Duration;

pub use backend::{CounterBackend, CounterDelta, CounterTotals};
pub use error::CounterError;
pub use key::CounterKey;
pub use rate_limiter::{RateLimitBucket, RateLimitBuckets, RateLimitResult, RateLimiter};

use memory::InMemoryCounters;

use crate::core::config::{CacheBackendType, CacheConfig};

/// Counter service wrapping the configured backend
pub struct CounterService {
    backend: Arc<dyn CounterBackend>,
}

impl std::fmt::Debug for CounterService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterService")
            .field("backend", &self.backend.backend_name())
            .finish()
    }
}

impl CounterService {
    pub async fn new(config: &CacheConfig) -> Result<Self, CounterError> {
        let backend: Arc<dyn CounterBackend> = match config.backend {
            CacheBackendType::Memory => {
                tracing::debug!("Initializing in-memory counters");
                Arc::new(InMemoryCounters::new())
            }
            CacheBackendType::Redis => {
                let url = config.redis_url.as_ref().ok_or_else(|| {
                    CounterError::Config("redis_url required for Redis backend".into())
                })?;
                Arc::new(redis::RedisCounters::new(url).await?)
            }
        };

        Ok(Self { backend })
    }

    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(InMemoryCounters::new()))
    }

    pub fn from_backend(backend: Arc<dyn CounterBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    pub async fn incr_window(&self, key: &str, window: Duration) -> Result<i64, CounterError> {
        self.backend.incr_window(key, window).await
    }

    pub async fn ttl(&self, key: &str) -> Result<Option<Duration>, CounterError> {
        self.backend.ttl(key).await
    }

    pub async fn incr_totals(&self, delta: &CounterDelta) -> Result<(), CounterError> {
        self.backend.incr_totals(delta).await
    }

    pub async fn totals(&self) -> Result<CounterTotals, CounterError> {
        self.backend.totals().await
    }

    pub async fn health_check(&self) -> Result<(), CounterError> {
        self.backend.health_check().await
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> CacheConfig {
        CacheConfig {
            backend: CacheBackendType::Memory,
            redis_url: None,
        }
    }

    #[tokio::test]
    async fn test_counter_service_backend_name() {
        let service = CounterService::new(&memory_config()).await.unwrap();
        assert_eq!(service.backend_name(), "memory");
        assert!(service.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_redis_backend_requires_url() {
        let config = CacheConfig {
            backend: CacheBackendType::Redis,
            redis_url: None,
        };
        let err = CounterService::new(&config).await.unwrap_err();
        assert!(matches!(err, CounterError::Config(_)));
    }

    #[tokio::test]
    async fn test_totals_start_at_zero() {
        let service = CounterService::in_memory();
        assert_eq!(service.totals().await.unwrap(), CounterTotals::default());
    }
}
