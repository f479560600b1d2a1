//! Counter backend trait definition

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use utoipa::ToSchema;

use super::error::CounterError;

/// Increments applied to the running totals by one ingested batch
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CounterDelta {
    pub cost_usd: f64,
    pub requests: u64,
    pub tokens: u64,
}

/// Current value of the running totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CounterTotals {
    pub total_cost: f64,
    pub total_requests: u64,
    pub total_tokens: u64,
}

/// Atomic counter store
///
/// Every mutation is a single atomic primitive of the backend. Nothing here
/// reads a value, modifies it and writes it back.
#[async_trait]
pub trait CounterBackend: Send + Sync {
    /// Increment a windowed counter, setting its expiry only when this
    /// increment created the key. Returns the post-increment count.
    async fn incr_window(&self, key: &str, window: Duration) -> Result<i64, CounterError>;

    /// Remaining lifetime of a windowed counter
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CounterError>;

    /// Add a delta to all three running totals in one atomic step
    async fn incr_totals(&self, delta: &CounterDelta) -> Result<(), CounterError>;

    async fn totals(&self) -> Result<CounterTotals, CounterError>;

    async fn health_check(&self) -> Result<(), CounterError>;

    fn backend_name(&self) -> &'static str;
}
