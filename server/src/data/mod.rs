//! Data storage layer
//!
//! - `sqlite` / `postgres` - durable event store backends
//! - `counters` - atomic running totals and rate-limit windows
//! - `topics` - pub/sub fan-out of cost deltas
//! - `types` - row types shared by the store backends
//! - `traits` - repository trait for multi-database support
//! - `sql` - query building shared by both SQL backends
//! - `error` - unified error type for the store backends

pub mod counters;
pub mod error;
pub mod postgres;
mod sql;
pub mod sqlite;
pub mod topics;
pub mod traits;
pub mod types;

pub use postgres::PostgresService;
pub use sqlite::SqliteService;

pub use error::DataError;
pub use traits::EventRepository;
pub use types::{EventPosition, EventRow, ListEventsParams};

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::config::{DatabaseBackend, DatabaseConfig};

/// Durable event store
///
/// Wraps the backend-specific service selected by `database.backend`.
pub enum EventStore {
    /// SQLite backend (default, embedded)
    Sqlite(Arc<SqliteService>),
    /// PostgreSQL backend (for multi-instance deployments)
    Postgres(Arc<PostgresService>),
}

impl EventStore {
    pub async fn init(config: &DatabaseConfig) -> Result<Self, DataError> {
        match config.backend {
            DatabaseBackend::Sqlite => {
                let service = SqliteService::init(config).await?;
                Ok(Self::Sqlite(Arc::new(service)))
            }
            DatabaseBackend::Postgres => {
                let service = PostgresService::init(config).await?;
                Ok(Self::Postgres(Arc::new(service)))
            }
        }
    }

    /// In-memory SQLite store
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, DataError> {
        let service = SqliteService::in_memory().await?;
        Ok(Self::Sqlite(Arc::new(service)))
    }

    pub fn backend(&self) -> DatabaseBackend {
        match self {
            Self::Sqlite(_) => DatabaseBackend::Sqlite,
            Self::Postgres(_) => DatabaseBackend::Postgres,
        }
    }

    /// Backend-agnostic repository handle
    pub fn repository(&self) -> Arc<dyn EventRepository> {
        match self {
            Self::Sqlite(s) => Arc::new(Arc::clone(s)),
            Self::Postgres(p) => Arc::new(Arc::clone(p)),
        }
    }

    /// WAL checkpointing for SQLite, pool health checks for PostgreSQL
    pub fn start_maintenance_task(&self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        match self {
            Self::Sqlite(s) => s.start_checkpoint_task(shutdown_rx),
            Self::Postgres(p) => p.start_health_check_task(shutdown_rx),
        }
    }

    /// Close the connection pool gracefully
    pub async fn close(&self) {
        match self {
            Self::Sqlite(s) => s.close().await,
            Self::Postgres(p) => p.close().await,
        }
    }
}
