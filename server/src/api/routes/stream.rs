//! SSE endpoint for real-time cost updates
//!
//! The first frame is a snapshot of the running totals. Cost updates and
//! keepalive comments follow until the client disconnects or the server
//! shuts down.

use std::convert::Infallible;

use axum::Router;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::routing::get;
use futures::stream::{Stream, StreamExt};

use crate::api::types::ApiError;
use crate::domain::broadcast::{BroadcastError, BroadcastManager, StreamFrame};

#[derive(Clone)]
pub struct StreamApiState {
    pub broadcast: BroadcastManager,
}

fn to_event(frame: StreamFrame) -> Event {
    match frame {
        StreamFrame::Message(json) => Event::default().data(json),
        StreamFrame::Keepalive => Event::default().comment("keepalive"),
    }
}

/// Stream cost updates
#[utoipa::path(
    get,
    path = "/api/v1/stream/costs",
    tag = "stream",
    responses(
        (status = 200, description = "Server-sent event stream", content_type = "text/event-stream"),
        (status = 503, description = "Too many SSE connections")
    )
)]
pub async fn stream_costs(
    State(state): State<StreamApiState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let subscription = state
        .broadcast
        .add_subscriber()
        .await
        .map_err(|e| match e {
            BroadcastError::Capacity { .. } => {
                ApiError::service_unavailable("Too many SSE connections")
            }
            BroadcastError::Serialization(e) => {
                tracing::error!(error = %e, "Failed to build stream snapshot");
                ApiError::internal("Failed to open stream")
            }
        })?;

    let stream = subscription.map(|frame| Ok::<_, Infallible>(to_event(frame)));
    Ok(Sse::new(stream))
}

/// Build stream routes
pub fn routes(broadcast: BroadcastManager) -> Router<()> {
    Router::new()
        .route("/costs", get(stream_costs))
        .with_state(StreamApiState { broadcast })
}
