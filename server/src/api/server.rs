//! API server initialization

use std::net::SocketAddr;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::middleware;
use super::openapi::{openapi_json, swagger_ui_html};
use super::rate_limit::{RateLimitState, rate_limit_middleware};
use super::routes::{analytics, events, health, stream};
use crate::core::CostScopeApp;
use crate::core::constants::DEFAULT_BODY_LIMIT;
use crate::data::counters::RateLimitBucket;

pub struct ApiServer {
    app: CostScopeApp,
}

impl ApiServer {
    pub fn new(app: CostScopeApp) -> Self {
        Self { app }
    }

    /// Build the full router with every layer applied
    pub fn router(&self) -> Router {
        let app = &self.app;
        let rate_limit_enabled = app.config.rate_limit.enabled;
        let buckets = app.config.rate_limit.buckets();
        let rate_limiter = app.rate_limiter.clone();

        let with_rate_limit = |routes: Router, bucket: RateLimitBucket| {
            if rate_limit_enabled {
                routes.layer(axum::middleware::from_fn_with_state(
                    RateLimitState {
                        limiter: rate_limiter.clone(),
                        bucket,
                    },
                    rate_limit_middleware,
                ))
            } else {
                routes
            }
        };

        // Ingestion (rate limited per client)
        let events_routes = with_rate_limit(events::routes(app.ingest.clone()), buckets.events);

        // Historical reads and running totals (rate limited per client)
        let analytics_routes = with_rate_limit(
            analytics::routes(app.store.repository(), app.counters.clone()),
            buckets.analytics,
        );

        // Live stream (bounded by the subscriber cap instead)
        let stream_routes = stream::routes(app.broadcast.clone());

        Router::new()
            .route("/health", get(health::health))
            .route("/api/openapi.json", get(openapi_json))
            .route("/api/docs", get(swagger_ui_html))
            .route("/api/docs/", get(swagger_ui_html))
            .nest("/api/v1/events", events_routes)
            .nest("/api/v1/stream", stream_routes)
            .nest("/api/v1/analytics", analytics_routes)
            .fallback(middleware::handle_404)
            .layer(middleware::compression())
            .layer(middleware::cors(&app.config.cors))
            .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT))
            .layer(TraceLayer::new_for_http())
    }

    /// Returns CostScopeApp for graceful shutdown
    pub async fn start(self) -> Result<CostScopeApp> {
        let router = self.router();
        let app = self.app;

        let shutdown = app.shutdown.clone();
        let broadcast = app.broadcast.clone();

        let addr = SocketAddr::new(app.config.server.host.parse()?, app.config.server.port);
        let listener = TcpListener::bind(addr).await?;
        tracing::debug!(%addr, "HTTP listener bound");

        // Open SSE streams would otherwise keep graceful shutdown waiting forever
        let wait = shutdown.wait();
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            wait.await;
            broadcast.shutdown();
        })
        .await?;

        Ok(app)
    }
}
