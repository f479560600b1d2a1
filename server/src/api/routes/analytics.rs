//! Analytics endpoints: historical event pages and running totals

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use costscope::Provider;
use serde::Deserialize;
use utoipa::IntoParams;
use validator::Validate;

use crate::api::extractors::ValidatedQuery;
use crate::api::types::{ApiError, parse_timestamp_param};
use crate::data::counters::{CounterService, CounterTotals};
use crate::data::{EventRepository, EventRow, ListEventsParams};
use crate::domain::pagination::{Page, decode_cursor, format_page, parse_limit};

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
pub struct AnalyticsApiState {
    pub repository: Arc<dyn EventRepository>,
    pub counters: Arc<CounterService>,
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Query parameters for the historical event list
#[derive(Debug, Deserialize, Validate, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListEventsQuery {
    /// Inclusive start (ISO 8601)
    pub from: Option<String>,
    /// Exclusive end (ISO 8601)
    pub to: Option<String>,
    /// Opaque cursor from a previous page
    #[validate(length(max = 1024))]
    pub cursor: Option<String>,
    /// Page size (default 50, max 200)
    pub limit: Option<String>,
    #[validate(length(min = 1, max = 256))]
    pub feature: Option<String>,
    #[validate(length(min = 1, max = 256))]
    pub model: Option<String>,
    pub provider: Option<String>,
    #[validate(length(min = 1, max = 256))]
    pub user_id: Option<String>,
}

impl ListEventsQuery {
    fn into_list_params(self) -> Result<ListEventsParams, ApiError> {
        if self.from.is_none() || self.to.is_none() {
            return Err(ApiError::bad_request(
                "MISSING_PARAMETER",
                "from and to parameters are required",
            ));
        }
        let (Some(from), Some(to)) = (
            parse_timestamp_param(&self.from)?,
            parse_timestamp_param(&self.to)?,
        ) else {
            return Err(ApiError::bad_request(
                "MISSING_PARAMETER",
                "from and to parameters are required",
            ));
        };
        if from >= to {
            return Err(ApiError::bad_request(
                "INVALID_DATE_RANGE",
                "\"from\" must be before \"to\"",
            ));
        }

        let mut params = ListEventsParams::new(from, to, parse_limit(self.limit.as_deref()));

        if let Some(token) = self.cursor.as_deref() {
            let cursor = decode_cursor(token)
                .map_err(|e| ApiError::bad_request("INVALID_CURSOR", e.to_string()))?;
            params.before = Some(cursor.into());
        }

        if let Some(provider) = self.provider.as_deref() {
            let provider: Provider = provider.parse().map_err(|_| {
                ApiError::bad_request(
                    "INVALID_PARAMETER",
                    format!(
                        "Invalid provider '{}'. Valid options: openai, anthropic, google-gemini",
                        provider
                    ),
                )
            })?;
            params.provider = Some(provider);
        }

        params.feature = self.feature;
        params.model = self.model;
        params.user_id = self.user_id;
        Ok(params)
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// List historical events, newest first
#[utoipa::path(
    get,
    path = "/api/v1/analytics/events",
    tag = "analytics",
    params(ListEventsQuery),
    responses(
        (status = 200, description = "One page of events", body = Page<EventRow>),
        (status = 400, description = "Missing or invalid parameters"),
        (status = 429, description = "Rate limit exceeded")
    )
)]
pub async fn list_events(
    State(state): State<AnalyticsApiState>,
    ValidatedQuery(query): ValidatedQuery<ListEventsQuery>,
) -> Result<Json<Page<EventRow>>, ApiError> {
    let params = query.into_list_params()?;
    let limit = params.limit;

    let rows = state
        .repository
        .list_events(&params)
        .await
        .map_err(ApiError::from_data)?;

    Ok(Json(format_page(rows, limit)))
}

/// Running totals since the counters were created
#[utoipa::path(
    get,
    path = "/api/v1/analytics/realtime-totals",
    tag = "analytics",
    responses(
        (status = 200, description = "Running totals", body = CounterTotals),
        (status = 429, description = "Rate limit exceeded")
    )
)]
pub async fn realtime_totals(
    State(state): State<AnalyticsApiState>,
) -> Result<Json<CounterTotals>, ApiError> {
    let totals = state
        .counters
        .totals()
        .await
        .map_err(ApiError::from_counter)?;
    Ok(Json(totals))
}

/// Build analytics routes
pub fn routes(repository: Arc<dyn EventRepository>, counters: Arc<CounterService>) -> Router<()> {
    let state = AnalyticsApiState {
        repository,
        counters,
    };

    Router::new()
        .route("/events", get(list_events))
        .route("/realtime-totals", get(realtime_totals))
        .with_state(state)
}
