//! In-memory counter store using dashmap and atomics
//!
//! Windowed counters live in a `DashMap` so increment-and-expire happens
//! under the shard lock of a single entry. Running totals sit behind one
//! mutex so a reader never sees a delta half applied. Cost is held in
//! micro-USD so every increment is integer arithmetic.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::backend::{CounterBackend, CounterDelta, CounterTotals};
use super::error::CounterError;

const MICROS_PER_USD: f64 = 1_000_000.0;

/// Windowed counter entry
struct CounterEntry {
    count: AtomicI64,
    expires_at: Instant,
}

#[derive(Default)]
struct RunningTotals {
    cost_micros: u64,
    requests: u64,
    tokens: u64,
}

pub struct InMemoryCounters {
    counters: DashMap<String, CounterEntry>,
    /// Counter for cleanup scheduling (increments on every incr operation)
    cleanup_ops: AtomicU64,
    totals: Mutex<RunningTotals>,
}

impl Default for InMemoryCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCounters {
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
            cleanup_ops: AtomicU64::new(0),
            totals: Mutex::new(RunningTotals::default()),
        }
    }

    fn cleanup_expired_counters(&self) {
        let now = Instant::now();
        self.counters.retain(|_, entry| now < entry.expires_at);
    }
}

fn usd_to_micros(cost_usd: f64) -> u64 {
    if cost_usd.is_finite() && cost_usd > 0.0 {
        (cost_usd * MICROS_PER_USD).round() as u64
    } else {
        0
    }
}

#[async_trait]
impl CounterBackend for InMemoryCounters {
    async fn incr_window(&self, key: &str, window: Duration) -> Result<i64, CounterError> {
        use dashmap::mapref::entry::Entry;

        let now = Instant::now();
        let expires_at = now + window;

        // entry API holds the shard lock, so reset-on-expiry cannot race an increment
        let count = match self.counters.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let counter = occupied.get_mut();
                if now >= counter.expires_at {
                    counter.count.store(1, Ordering::SeqCst);
                    counter.expires_at = expires_at;
                    1
                } else {
                    counter.count.fetch_add(1, Ordering::SeqCst) + 1
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CounterEntry {
                    count: AtomicI64::new(1),
                    expires_at,
                });
                1
            }
        };

        // Cleanup runs every 256 operations regardless of map size
        let ops = self.cleanup_ops.fetch_add(1, Ordering::Relaxed);
        if ops.is_multiple_of(256) {
            self.cleanup_expired_counters();
        }

        Ok(count)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CounterError> {
        let now = Instant::now();
        Ok(self
            .counters
            .get(key)
            .and_then(|entry| entry.expires_at.checked_duration_since(now))
            .filter(|remaining| !remaining.is_zero()))
    }

    async fn incr_totals(&self, delta: &CounterDelta) -> Result<(), CounterError> {
        let cost_micros = usd_to_micros(delta.cost_usd);
        let mut totals = self.totals.lock();
        totals.cost_micros = totals.cost_micros.saturating_add(cost_micros);
        totals.requests = totals.requests.saturating_add(delta.requests);
        totals.tokens = totals.tokens.saturating_add(delta.tokens);
        Ok(())
    }

    async fn totals(&self) -> Result<CounterTotals, CounterError> {
        let totals = self.totals.lock();
        Ok(CounterTotals {
            total_cost: totals.cost_micros as f64 / MICROS_PER_USD,
            total_requests: totals.requests,
            total_tokens: totals.tokens,
        })
    }

    async fn health_check(&self) -> Result<(), CounterError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
