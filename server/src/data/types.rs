//! Row types shared by the durable store backends

use chrono::{DateTime, TimeZone, Utc};
use costscope::Provider;
use serde::Serialize;
use utoipa::ToSchema;

use super::error::DataError;

/// Persisted, server-enriched LLM event
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventRow {
    pub id: String,
    pub project_id: String,
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub feature: String,
    pub user_id: Option<String>,
    #[schema(value_type = String, example = "openai")]
    pub provider: Provider,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cached_tokens: i64,
    pub latency_ms: f64,
    pub estimated_cost_usd: f64,
    pub verified_cost_usd: f64,
    pub is_cache_hit: bool,
    pub is_streaming: bool,
    pub is_error: bool,
    pub error_code: Option<String>,
    pub retry_count: i64,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Column list in insert/select order
pub(crate) const EVENT_COLUMNS: &str = "id, project_id, trace_id, span_id, parent_span_id, \
    feature, user_id, provider, model, input_tokens, output_tokens, cached_tokens, latency_ms, \
    estimated_cost_usd, verified_cost_usd, is_cache_hit, is_streaming, is_error, error_code, \
    retry_count, metadata, created_at";

/// Raw column values as stored by either backend
///
/// Timestamps are epoch milliseconds and metadata is JSON text, so the same
/// record decodes from SQLite and PostgreSQL.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EventRecord {
    pub id: String,
    pub project_id: String,
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub feature: String,
    pub user_id: Option<String>,
    pub provider: String,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cached_tokens: i64,
    pub latency_ms: f64,
    pub estimated_cost_usd: f64,
    pub verified_cost_usd: f64,
    pub is_cache_hit: bool,
    pub is_streaming: bool,
    pub is_error: bool,
    pub error_code: Option<String>,
    pub retry_count: i64,
    pub metadata: Option<String>,
    pub created_at: i64,
}

impl TryFrom<EventRecord> for EventRow {
    type Error = DataError;

    fn try_from(r: EventRecord) -> Result<Self, Self::Error> {
        let provider = r
            .provider
            .parse::<Provider>()
            .map_err(|_| DataError::InvalidRow(format!("unknown provider '{}'", r.provider)))?;
        let created_at = Utc
            .timestamp_millis_opt(r.created_at)
            .single()
            .ok_or_else(|| DataError::InvalidRow(format!("bad timestamp {}", r.created_at)))?;
        let metadata = r
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| DataError::InvalidRow(format!("bad metadata: {e}")))?;

        Ok(EventRow {
            id: r.id,
            project_id: r.project_id,
            trace_id: r.trace_id,
            span_id: r.span_id,
            parent_span_id: r.parent_span_id,
            feature: r.feature,
            user_id: r.user_id,
            provider,
            model: r.model,
            input_tokens: r.input_tokens,
            output_tokens: r.output_tokens,
            cached_tokens: r.cached_tokens,
            latency_ms: r.latency_ms,
            estimated_cost_usd: r.estimated_cost_usd,
            verified_cost_usd: r.verified_cost_usd,
            is_cache_hit: r.is_cache_hit,
            is_streaming: r.is_streaming,
            is_error: r.is_error,
            error_code: r.error_code,
            retry_count: r.retry_count,
            metadata,
            created_at,
        })
    }
}

/// Position of a row in `(created_at desc, id desc)` order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPosition {
    pub created_at_ms: i64,
    pub id: String,
}

/// Filters for a historical event page
#[derive(Debug, Clone)]
pub struct ListEventsParams {
    /// Inclusive lower bound
    pub from: DateTime<Utc>,
    /// Exclusive upper bound
    pub to: DateTime<Utc>,
    /// Only rows strictly after this position in the sort order
    pub before: Option<EventPosition>,
    /// Page size; backends fetch one extra row to detect more pages
    pub limit: usize,
    pub feature: Option<String>,
    pub model: Option<String>,
    pub provider: Option<Provider>,
    pub user_id: Option<String>,
}

impl ListEventsParams {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>, limit: usize) -> Self {
        Self {
            from,
            to,
            before: None,
            limit,
            feature: None,
            model: None,
            provider: None,
            user_id: None,
        }
    }
}
