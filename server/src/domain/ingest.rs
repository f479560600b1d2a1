//! Event ingestion and enrichment
//!
//! For each accepted batch:
//! 1. Enrich every event with a server id and the verified cost
//! 2. Persist all rows in one batch insert (all-or-nothing)
//! 3. Add the batch totals to the running counters (one atomic step)
//! 4. Publish the delta to the cost-update topic
//!
//! Publishing after the increment means a subscriber that re-reads the
//! snapshot never sees totals older than a delta it already received.
//! Failures in steps 3 and 4 are logged and do not fail the request; the
//! persisted rows stay the source of truth.

use std::sync::Arc;

use chrono::Utc;
use costscope::{LlmEvent, MAX_BATCH_EVENTS, calculate_cost};
use thiserror::Error;

use super::broadcast::{CostUpdate, StreamMessage};
use crate::core::constants::DEFAULT_PROJECT_ID;
use crate::data::counters::{CounterDelta, CounterService};
use crate::data::topics::{COST_UPDATES_TOPIC, TopicService};
use crate::data::{DataError, EventRepository, EventRow};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Batch must contain between 1 and {max} events, got {count}")]
    BatchSize { count: usize, max: usize },

    #[error("Failed to persist events: {0}")]
    Persistence(#[source] DataError),
}

/// Result of one accepted batch
#[derive(Debug, Clone, PartialEq)]
pub struct IngestSummary {
    pub count: usize,
    pub delta: CounterDelta,
}

/// Build the stored row for one event
pub fn enrich(event: LlmEvent) -> EventRow {
    let verified_cost_usd = calculate_cost(
        &event.model,
        event.input_tokens,
        event.output_tokens,
        event.cached_tokens,
    );

    EventRow {
        id: uuid::Uuid::new_v4().to_string(),
        project_id: DEFAULT_PROJECT_ID.to_string(),
        trace_id: event.trace_id,
        span_id: event.span_id,
        parent_span_id: event.parent_span_id,
        feature: event.feature,
        user_id: event.user_id,
        provider: event.provider,
        model: event.model,
        input_tokens: to_i64(event.input_tokens),
        output_tokens: to_i64(event.output_tokens),
        cached_tokens: to_i64(event.cached_tokens),
        latency_ms: event.latency_ms,
        estimated_cost_usd: event.estimated_cost_usd,
        verified_cost_usd,
        is_cache_hit: event.cached_tokens > 0,
        is_streaming: event.is_streaming,
        is_error: event.is_error,
        error_code: event.error_code,
        retry_count: i64::from(event.retry_count),
        metadata: event.metadata.map(serde_json::Value::Object),
        created_at: event.timestamp,
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Summed counter increments for a batch of enriched rows
pub fn batch_delta(rows: &[EventRow]) -> CounterDelta {
    let cost: f64 = rows.iter().map(|r| r.verified_cost_usd).sum();
    let tokens: i64 = rows
        .iter()
        .map(|r| r.input_tokens.saturating_add(r.output_tokens))
        .fold(0i64, i64::saturating_add);

    CounterDelta {
        cost_usd: costscope::pricing::round6(cost),
        requests: rows.len() as u64,
        tokens: tokens.max(0) as u64,
    }
}

pub struct IngestService {
    repository: Arc<dyn EventRepository>,
    counters: Arc<CounterService>,
    topics: Arc<TopicService>,
}

impl IngestService {
    pub fn new(
        repository: Arc<dyn EventRepository>,
        counters: Arc<CounterService>,
        topics: Arc<TopicService>,
    ) -> Self {
        Self {
            repository,
            counters,
            topics,
        }
    }

    /// Enrich, persist, count and publish one batch
    ///
    /// Only persistence failures are returned. Nothing is counted or
    /// published for a batch that was not stored.
    pub async fn ingest(&self, events: Vec<LlmEvent>) -> Result<IngestSummary, IngestError> {
        let count = events.len();
        if count == 0 || count > MAX_BATCH_EVENTS {
            return Err(IngestError::BatchSize {
                count,
                max: MAX_BATCH_EVENTS,
            });
        }

        let rows: Vec<EventRow> = events.into_iter().map(enrich).collect();

        self.repository
            .insert_events(&rows)
            .await
            .map_err(IngestError::Persistence)?;

        let delta = batch_delta(&rows);

        if let Err(e) = self.counters.incr_totals(&delta).await {
            tracing::error!(error = %e, batch_size = count, "Failed to update running totals");
        }

        self.publish(&delta).await;

        tracing::info!(
            batch_size = count,
            total_cost = delta.cost_usd,
            total_tokens = delta.tokens,
            "Processed event batch"
        );

        Ok(IngestSummary { count, delta })
    }

    async fn publish(&self, delta: &CounterDelta) {
        let message = StreamMessage::CostUpdate {
            data: CostUpdate::from_delta(delta, Utc::now()),
        };
        let payload = match message.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize cost update");
                return;
            }
        };
        if let Err(e) = self
            .topics
            .publish(COST_UPDATES_TOPIC, payload.as_bytes())
            .await
        {
            tracing::error!(error = %e, "Failed to publish cost update");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use costscope::Provider;
    use futures::StreamExt;

    use super::*;
    use crate::data::counters::testing::BrokenCounters;
    use crate::data::traits::testing::FailingRepository;
    use crate::data::{EventStore, ListEventsParams};

    fn event(model: &str, input: u64, output: u64, cached: u64) -> LlmEvent {
        LlmEvent {
            trace_id: "tr_abc".into(),
            span_id: "sp_abc".into(),
            parent_span_id: None,
            feature: "chat".into(),
            user_id: Some("u1".into()),
            provider: Provider::OpenAi,
            model: model.into(),
            input_tokens: input,
            output_tokens: output,
            cached_tokens: cached,
            latency_ms: 42.0,
            estimated_cost_usd: 0.0,
            timestamp: Utc::now(),
            metadata: None,
            is_streaming: false,
            error_code: None,
            retry_count: 0,
            is_error: false,
        }
    }

    async fn sqlite_repository() -> Arc<dyn EventRepository> {
        EventStore::in_memory().await.unwrap().repository()
    }

    #[test]
    fn test_enrich_computes_verified_cost() {
        let mut e = event("gpt-4o", 1000, 500, 0);
        e.estimated_cost_usd = 99.0;
        let row = enrich(e);
        assert_eq!(row.verified_cost_usd, 0.0075);
        assert_eq!(row.estimated_cost_usd, 99.0);
        assert_eq!(row.project_id, "default");
        assert!(!row.is_cache_hit);
        assert!(uuid::Uuid::parse_str(&row.id).is_ok());
    }

    #[test]
    fn test_enrich_marks_cache_hits() {
        let row = enrich(event("claude-3-5-sonnet-20241022", 1000, 100, 400));
        assert!(row.is_cache_hit);
        assert_eq!(row.cached_tokens, 400);
        assert_eq!(row.verified_cost_usd, 0.00342);
    }

    #[test]
    fn test_enrich_keeps_metadata_and_timestamp() {
        let mut e = event("gpt-4o", 1, 1, 0);
        let mut meta = serde_json::Map::new();
        meta.insert("route".into(), serde_json::json!("/chat"));
        e.metadata = Some(meta);
        let ts = e.timestamp;
        let row = enrich(e);
        assert_eq!(row.metadata, Some(serde_json::json!({"route": "/chat"})));
        assert_eq!(row.created_at, ts);
    }

    #[test]
    fn test_batch_delta_sums() {
        let rows = vec![
            enrich(event("gpt-4o", 1000, 500, 0)),
            enrich(event("gpt-4o", 1000, 500, 0)),
        ];
        let delta = batch_delta(&rows);
        assert_eq!(delta.cost_usd, 0.015);
        assert_eq!(delta.requests, 2);
        assert_eq!(delta.tokens, 3000);
    }

    #[tokio::test]
    async fn test_ingest_persists_counts_and_publishes() {
        let repository = sqlite_repository().await;
        let counters = Arc::new(CounterService::in_memory());
        let topics = Arc::new(TopicService::in_memory());
        let mut updates = topics.subscribe(COST_UPDATES_TOPIC).await.unwrap();

        let service = IngestService::new(repository.clone(), counters.clone(), topics);
        let summary = service
            .ingest(vec![event("gpt-4o", 1000, 500, 0), event("unknown", 0, 0, 0)])
            .await
            .unwrap();
        assert_eq!(summary.count, 2);

        let totals = counters.totals().await.unwrap();
        assert_eq!(totals.total_cost, 0.0075);
        assert_eq!(totals.total_requests, 2);
        assert_eq!(totals.total_tokens, 1500);

        let payload = tokio::time::timeout(Duration::from_secs(1), updates.receiver.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let StreamMessage::CostUpdate { data } = serde_json::from_slice(&payload).unwrap() else {
            panic!("expected cost_update");
        };
        assert_eq!(data.cost_delta, 0.0075);
        assert_eq!(data.requests_delta, 2);
        assert_eq!(data.tokens_delta, 1500);

        let now = Utc::now();
        let params = ListEventsParams::new(now - chrono::Duration::hours(1), now + chrono::Duration::hours(1), 10);
        assert_eq!(repository.list_events(&params).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_persistence_failure_has_no_side_effects() {
        let counters = Arc::new(CounterService::in_memory());
        let topics = Arc::new(TopicService::in_memory());
        let mut updates = topics.subscribe(COST_UPDATES_TOPIC).await.unwrap();

        let service = IngestService::new(Arc::new(FailingRepository), counters.clone(), topics);
        let err = service
            .ingest(vec![event("gpt-4o", 1000, 500, 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Persistence(_)));

        assert_eq!(counters.totals().await.unwrap().total_requests, 0);
        let nothing = tokio::time::timeout(Duration::from_millis(50), updates.receiver.next()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_counter_failure_is_not_fatal() {
        let repository = sqlite_repository().await;
        let counters = Arc::new(CounterService::from_backend(Arc::new(BrokenCounters)));
        let topics = Arc::new(TopicService::in_memory());
        let mut updates = topics.subscribe(COST_UPDATES_TOPIC).await.unwrap();

        let service = IngestService::new(repository, counters, topics);
        let summary = service.ingest(vec![event("gpt-4o", 10, 10, 0)]).await.unwrap();
        assert_eq!(summary.count, 1);

        // Publish still happens after a failed increment
        let payload = tokio::time::timeout(Duration::from_secs(1), updates.receiver.next()).await;
        assert!(payload.is_ok());
    }

    #[tokio::test]
    async fn test_batch_size_guard() {
        let service = IngestService::new(
            Arc::new(FailingRepository),
            Arc::new(CounterService::in_memory()),
            Arc::new(TopicService::in_memory()),
        );
        assert!(matches!(
            service.ingest(vec![]).await,
            Err(IngestError::BatchSize { count: 0, .. })
        ));
        let too_many = vec![event("gpt-4o", 1, 1, 0); MAX_BATCH_EVENTS + 1];
        assert!(matches!(
            service.ingest(too_many).await,
            Err(IngestError::BatchSize { count: 501, .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_ingestion_loses_no_updates() {
        let repository = sqlite_repository().await;
        let counters = Arc::new(CounterService::in_memory());
        let service = Arc::new(IngestService::new(
            repository,
            counters.clone(),
            Arc::new(TopicService::in_memory()),
        ));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.ingest(vec![event("gpt-4o", 1000, 500, 0)]).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let totals = counters.totals().await.unwrap();
        assert_eq!(totals.total_requests, 20);
        assert_eq!(totals.total_tokens, 30_000);
        assert!((totals.total_cost - 0.15).abs() < 1e-9);
    }
}
