//! Fixed-window rate limiter on top of the counter store
//!
//! Each `(prefix, identity)` pair gets a counter whose expiry is set by the
//! increment that created it. A request is rejected once the post-increment
//! count exceeds the bucket limit.
//!
//! # Known Limitations
//!
//! **Window Boundary Burst**: fixed windows admit up to 2x the limit across a
//! window boundary (limit at the end of one window, limit again at the start
//! of the next).

use std::sync::Arc;
use std::time::Duration;

use super::CounterService;
use super::key::CounterKey;
use crate::core::constants::{
    DEFAULT_RATE_LIMIT_ANALYTICS, DEFAULT_RATE_LIMIT_EVENTS, DEFAULT_RATE_LIMIT_WINDOW_SECS,
};

/// Rate limit bucket configuration
#[derive(Debug, Clone)]
pub struct RateLimitBucket {
    /// Bucket name for logs
    pub name: &'static str,
    /// Counter key prefix
    pub prefix: &'static str,
    /// Maximum requests per window
    pub limit: u32,
    pub window_secs: u64,
}

impl RateLimitBucket {
    /// Ingestion endpoint bucket
    pub fn events(limit: u32, window_secs: u64) -> Self {
        Self {
            name: "events",
            prefix: "rate:events",
            limit,
            window_secs,
        }
    }

    /// Analytics endpoints bucket
    pub fn analytics(limit: u32, window_secs: u64) -> Self {
        Self {
            name: "analytics",
            prefix: "rate:analytics",
            limit,
            window_secs,
        }
    }
}

/// Both gated buckets, built from configuration
#[derive(Debug, Clone)]
pub struct RateLimitBuckets {
    pub events: RateLimitBucket,
    pub analytics: RateLimitBucket,
}

impl Default for RateLimitBuckets {
    fn default() -> Self {
        Self {
            events: RateLimitBucket::events(DEFAULT_RATE_LIMIT_EVENTS, DEFAULT_RATE_LIMIT_WINDOW_SECS),
            analytics: RateLimitBucket::analytics(
                DEFAULT_RATE_LIMIT_ANALYTICS,
                DEFAULT_RATE_LIMIT_WINDOW_SECS,
            ),
        }
    }
}

/// Rate limit check result
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    pub allowed: bool,
    /// Requests remaining in window (floored at 0)
    pub remaining: u32,
    pub limit: u32,
    pub window_secs: u64,
    /// Epoch milliseconds when the window resets
    pub reset_at_ms: i64,
    /// Seconds until the window resets (only if blocked)
    pub retry_after: Option<u64>,
}

pub struct RateLimiter {
    counters: Arc<CounterService>,
}

impl RateLimiter {
    pub fn new(counters: Arc<CounterService>) -> Self {
        Self { counters }
    }

    /// Count one request for `identity` in `bucket`.
    ///
    /// Returns `None` when the counter store fails; the caller admits the
    /// request without rate limit headers.
    pub async fn check(&self, bucket: &RateLimitBucket, identity: &str) -> Option<RateLimitResult> {
        let key = CounterKey::rate_limit(bucket.prefix, identity);
        let window = Duration::from_secs(bucket.window_secs);

        let counted = async {
            let count = self.counters.incr_window(&key, window).await?;
            let ttl = self.counters.ttl(&key).await?;
            Ok::<_, super::CounterError>((count, ttl))
        };

        let (count, ttl) = match counted.await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(
                    bucket = bucket.name,
                    %identity,
                    error = %e,
                    "Rate limit counter failed, allowing request"
                );
                return None;
            }
        };

        let now_ms = chrono::Utc::now().timestamp_millis();
        let ttl = ttl.unwrap_or(window);
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let ttl_secs = u64::try_from(ttl.as_millis().div_ceil(1000)).unwrap_or(u64::MAX);

        let limit = i64::from(bucket.limit);
        let allowed = count <= limit;
        let remaining = limit.saturating_sub(count).try_into().unwrap_or(0u32);

        tracing::trace!(
            bucket = bucket.name,
            %identity,
            count,
            limit,
            allowed,
            "Rate limit check"
        );

        Some(RateLimitResult {
            allowed,
            remaining,
            limit: bucket.limit,
            window_secs: bucket.window_secs,
            reset_at_ms: now_ms.saturating_add(ttl_ms),
            retry_after: if allowed { None } else { Some(ttl_secs) },
        })
    }
}
