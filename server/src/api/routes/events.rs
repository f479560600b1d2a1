//! Event ingestion endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use costscope::BatchEventRequest;
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::extractors::ValidatedJson;
use crate::api::types::{ApiError, FieldError};
use crate::domain::ingest::{IngestError, IngestService};

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
pub struct EventsApiState {
    pub ingest: Arc<IngestService>,
}

// ============================================================================
// Response DTOs
// ============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    pub success: bool,
    pub count: usize,
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::BatchSize { .. } => ApiError::Validation(vec![FieldError {
                path: "events".to_string(),
                message: e.to_string(),
            }]),
            IngestError::Persistence(source) => {
                tracing::error!(error = %source, backend = source.backend(), "Failed to persist events");
                ApiError::internal("Failed to persist events")
            }
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Ingest a batch of LLM events
#[utoipa::path(
    post,
    path = "/api/v1/events",
    tag = "events",
    request_body(content = serde_json::Value, description = "`{events: [...]}` with 1-500 events"),
    responses(
        (status = 202, description = "Batch accepted", body = IngestResponse),
        (status = 400, description = "Validation failed"),
        (status = 429, description = "Rate limit exceeded"),
        (status = 500, description = "Events could not be persisted")
    )
)]
pub async fn ingest_events(
    State(state): State<EventsApiState>,
    ValidatedJson(body): ValidatedJson<BatchEventRequest>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let summary = state.ingest.ingest(body.events).await?;

    tracing::debug!(count = summary.count, "Events ingested");

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            success: true,
            count: summary.count,
        }),
    ))
}

/// Build event ingestion routes
pub fn routes(ingest: Arc<IngestService>) -> Router<()> {
    let state = EventsApiState { ingest };

    Router::new()
        .route("/", post(ingest_events))
        .with_state(state)
}
