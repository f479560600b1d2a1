//! Redis-compatible counter store using deadpool-redis
//!
//! # URL Formats
//!
//! ```text
//! redis://[user:password@]host:port[/db]
//! rediss://[user:password@]host:port[/db]  (TLS)
//! ```

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};

use super::backend::{CounterBackend, CounterDelta, CounterTotals};
use super::error::CounterError;
use super::key::CounterKey;

/// INCR, then PEXPIRE only when this call created the key
const INCR_WINDOW_SCRIPT: &str = r#"
    local count = redis.call('INCR', KEYS[1])
    if count == 1 then
        redis.call('PEXPIRE', KEYS[1], ARGV[1])
    end
    return count
"#;

pub struct RedisCounters {
    pool: Pool,
}

impl RedisCounters {
    pub async fn new(redis_url: &str) -> Result<Self, CounterError> {
        let pool = create_pool(redis_url).await?;
        tracing::debug!(url = %sanitize_redis_url(redis_url), "Redis counters connected");
        Ok(Self { pool })
    }
}

/// Build a pool and validate it with a PING
pub(crate) async fn create_pool(redis_url: &str) -> Result<Pool, CounterError> {
    let sanitized_url = sanitize_redis_url(redis_url);

    let mut config = Config::from_url(redis_url);
    config.pool = Some(deadpool_redis::PoolConfig {
        max_size: 32,
        timeouts: deadpool_redis::Timeouts {
            wait: Some(Duration::from_secs(5)),
            create: Some(Duration::from_secs(5)),
            recycle: Some(Duration::from_secs(5)),
        },
        ..Default::default()
    });
    let pool = config.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
        CounterError::Connection(format!(
            "Failed to create Redis pool for {sanitized_url}: {e}"
        ))
    })?;

    let mut conn = pool.get().await.map_err(|e| {
        CounterError::Connection(format!(
            "Failed to get Redis connection from pool for {sanitized_url}: {e}"
        ))
    })?;
    deadpool_redis::redis::cmd("PING")
        .query_async::<String>(&mut conn)
        .await
        .map_err(|e| CounterError::Connection(format!("Redis PING failed for {sanitized_url}: {e}")))?;

    Ok(pool)
}

/// Sanitize Redis URL for logging (removes password)
pub(crate) fn sanitize_redis_url(url: &str) -> String {
    // rfind: passwords may contain '@'
    if let Some(at_pos) = url.rfind('@') {
        let scheme_end = url.find("://").map(|i| i + 3).unwrap_or(0);
        if let Some(colon_pos) = url[scheme_end..at_pos].find(':') {
            let abs_colon = scheme_end + colon_pos;
            let prefix = &url[..abs_colon + 1];
            let suffix = &url[at_pos..];
            return format!("{prefix}***{suffix}");
        }
    }
    url.to_string()
}

fn parse_total<T: std::str::FromStr + Default>(
    raw: Option<String>,
    key: &str,
) -> Result<T, CounterError> {
    match raw {
        None => Ok(T::default()),
        Some(s) => s
            .parse::<T>()
            .map_err(|_| CounterError::Operation(format!("Non-numeric value at {key}: {s}"))),
    }
}

#[async_trait]
impl CounterBackend for RedisCounters {
    async fn incr_window(&self, key: &str, window: Duration) -> Result<i64, CounterError> {
        let mut conn = self.pool.get().await?;
        let window_ms: u64 = window.as_millis().try_into().unwrap_or(u64::MAX).max(1);

        let count: i64 = deadpool_redis::redis::cmd("EVAL")
            .arg(INCR_WINDOW_SCRIPT)
            .arg(1)
            .arg(key)
            .arg(window_ms)
            .query_async(&mut conn)
            .await?;

        Ok(count)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CounterError> {
        let mut conn = self.pool.get().await?;
        let ttl_ms: i64 = deadpool_redis::redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await?;

        // -2: missing key, -1: no expiry
        match ttl_ms {
            n if n > 0 => Ok(Some(Duration::from_millis(n as u64))),
            _ => Ok(None),
        }
    }

    async fn incr_totals(&self, delta: &CounterDelta) -> Result<(), CounterError> {
        let mut conn = self.pool.get().await?;
        let _: () = deadpool_redis::redis::pipe()
            .atomic()
            .cmd("INCRBYFLOAT")
            .arg(CounterKey::TOTAL_COST)
            .arg(delta.cost_usd)
            .ignore()
            .cmd("INCRBY")
            .arg(CounterKey::TOTAL_REQUESTS)
            .arg(delta.requests)
            .ignore()
            .cmd("INCRBY")
            .arg(CounterKey::TOTAL_TOKENS)
            .arg(delta.tokens)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn totals(&self) -> Result<CounterTotals, CounterError> {
        let mut conn = self.pool.get().await?;
        let (cost, requests, tokens): (Option<String>, Option<String>, Option<String>) =
            deadpool_redis::redis::cmd("MGET")
                .arg(CounterKey::TOTAL_COST)
                .arg(CounterKey::TOTAL_REQUESTS)
                .arg(CounterKey::TOTAL_TOKENS)
                .query_async(&mut conn)
                .await?;

        Ok(CounterTotals {
            total_cost: parse_total(cost, CounterKey::TOTAL_COST)?,
            total_requests: parse_total(requests, CounterKey::TOTAL_REQUESTS)?,
            total_tokens: parse_total(tokens, CounterKey::TOTAL_TOKENS)?,
        })
    }

    async fn health_check(&self) -> Result<(), CounterError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| CounterError::Connection(e.to_string()))?;

        deadpool_redis::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| CounterError::Connection(e.to_string()))?;

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
