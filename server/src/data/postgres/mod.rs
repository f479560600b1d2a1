//! PostgreSQL database service
//!
//! Durable store for multi-instance deployments:
//! - Connection pooling with min/max bounds
//! - Idle connection cleanup
//! - Statement timeout protection

pub mod error;
pub mod schema;

pub use error::PostgresError;
pub use sqlx::PgPool;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::config::DatabaseConfig;
use crate::core::constants::{
    POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS, POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS,
    POSTGRES_DEFAULT_MAX_CONNECTIONS, POSTGRES_DEFAULT_MIN_CONNECTIONS,
    POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS, POSTGRES_HEALTH_CHECK_INTERVAL_SECS,
};
use crate::data::error::DataError;
use crate::data::sql;
use crate::data::traits::EventRepository;
use crate::data::types::{EventRecord, EventRow, ListEventsParams};

/// PostgreSQL database service
pub struct PostgresService {
    pool: PgPool,
}

impl PostgresService {
    pub async fn init(config: &DatabaseConfig) -> Result<Self, PostgresError> {
        let url = config
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| PostgresError::Config("PostgreSQL URL is required".into()))?;

        let max_connections = if config.max_connections > 0 {
            config.max_connections
        } else {
            POSTGRES_DEFAULT_MAX_CONNECTIONS
        };
        let min_connections = POSTGRES_DEFAULT_MIN_CONNECTIONS.min(max_connections);

        let options: PgConnectOptions = url
            .parse::<PgConnectOptions>()
            .map_err(|e| PostgresError::Config(format!("Invalid PostgreSQL URL: {}", e)))?
            .options([(
                "statement_timeout",
                format!("{}s", POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS),
            )]);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS))
            .idle_timeout(Duration::from_secs(POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS))
            .connect_with(options)
            .await?;

        sqlx::raw_sql(schema::SCHEMA).execute(&pool).await?;

        tracing::debug!(max_connections, min_connections, "PostgresService initialized");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the connection pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("PostgreSQL pool closed");
    }

    /// Periodic `SELECT 1` so broken pools show up in the logs
    pub fn start_health_check_task(
        self: &Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let db = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(POSTGRES_HEALTH_CHECK_INTERVAL_SECS));
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("PostgreSQL health check task shutting down");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if let Err(e) = sqlx::query("SELECT 1").execute(&db.pool).await {
                            tracing::warn!("PostgreSQL health check failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl EventRepository for Arc<PostgresService> {
    async fn insert_events(&self, rows: &[EventRow]) -> Result<(), DataError> {
        if rows.is_empty() {
            return Ok(());
        }
        sql::build_insert::<sqlx::Postgres>(rows)
            .build()
            .execute(self.pool())
            .await
            .map_err(DataError::Postgres)?;
        Ok(())
    }

    async fn list_events(&self, params: &ListEventsParams) -> Result<Vec<EventRow>, DataError> {
        let records: Vec<EventRecord> = sql::build_list::<sqlx::Postgres>(params)
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(DataError::Postgres)?;
        records.into_iter().map(EventRow::try_from).collect()
    }

    async fn health_check(&self) -> Result<(), DataError> {
        sqlx::query("SELECT 1")
            .execute(self.pool())
            .await
            .map_err(DataError::Postgres)?;
        Ok(())
    }
}
