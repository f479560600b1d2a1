//! Messages delivered to real-time subscribers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::counters::{CounterDelta, CounterTotals};

/// Running-total increments from one ingested batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostUpdate {
    pub cost_delta: f64,
    pub requests_delta: u64,
    pub tokens_delta: u64,
    pub timestamp: DateTime<Utc>,
}

impl CostUpdate {
    pub fn from_delta(delta: &CounterDelta, timestamp: DateTime<Utc>) -> Self {
        Self {
            cost_delta: delta.cost_usd,
            requests_delta: delta.requests,
            tokens_delta: delta.tokens,
            timestamp,
        }
    }
}

/// Current totals, sent once to each new subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub total_cost: f64,
    pub total_requests: u64,
    pub total_tokens: u64,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    pub fn from_totals(totals: &CounterTotals, timestamp: DateTime<Utc>) -> Self {
        Self {
            total_cost: totals.total_cost,
            total_requests: totals.total_requests,
            total_tokens: totals.total_tokens,
            timestamp,
        }
    }
}

/// Payload of one `data:` frame on the cost stream
///
/// Wire shapes:
/// - `{"type":"cost_update","data":{"costDelta":..,"requestsDelta":..,"tokensDelta":..,"timestamp":..}}`
/// - `{"type":"snapshot","totalCost":..,"totalRequests":..,"totalTokens":..,"timestamp":..}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    CostUpdate { data: CostUpdate },
    Snapshot(Snapshot),
}

impl StreamMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
