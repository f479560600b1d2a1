//! Repository traits for database backends
//!
//! SQLite and PostgreSQL both implement [`EventRepository`]; callers hold a
//! trait object obtained from [`super::EventStore::repository`].

use async_trait::async_trait;

use crate::data::error::DataError;
use crate::data::types::{EventRow, ListEventsParams};

#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Insert a batch of events in one statement
    ///
    /// All-or-nothing: either every row is stored or none is.
    async fn insert_events(&self, rows: &[EventRow]) -> Result<(), DataError>;

    /// Fetch up to `params.limit + 1` rows in `(created_at desc, id desc)` order
    async fn list_events(&self, params: &ListEventsParams) -> Result<Vec<EventRow>, DataError>;

    async fn health_check(&self) -> Result<(), DataError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Repository whose writes always fail
    pub(crate) struct FailingRepository;

    #[async_trait]
    impl EventRepository for FailingRepository {
        async fn insert_events(&self, _rows: &[EventRow]) -> Result<(), DataError> {
            Err(DataError::Sqlite(sqlx::Error::PoolClosed))
        }

        async fn list_events(&self, _params: &ListEventsParams) -> Result<Vec<EventRow>, DataError> {
            Err(DataError::Sqlite(sqlx::Error::PoolClosed))
        }

        async fn health_check(&self) -> Result<(), DataError> {
            Err(DataError::Sqlite(sqlx::Error::PoolClosed))
        }
    }
}
