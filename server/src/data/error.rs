//! Unified error type for the durable store
//!
//! Wraps backend-specific errors while keeping track of which backend
//! produced them. Callers at the API boundary log these and return a generic
//! message; connection details never reach clients.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("SQLite error: {0}")]
    Sqlite(sqlx::Error),

    #[error("PostgreSQL error: {0}")]
    Postgres(sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored row could not be mapped back to an event
    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

impl DataError {
    /// Check if this is a connection-related error that might be transient
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlite(e) | Self::Postgres(e) => {
                matches!(
                    e,
                    sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
                )
            }
            _ => false,
        }
    }

    /// Backend that generated this error
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::Postgres(_) => "postgres",
            Self::Config(_) | Self::Io(_) | Self::InvalidRow(_) => "unknown",
        }
    }
}

impl From<crate::data::sqlite::SqliteError> for DataError {
    fn from(e: crate::data::sqlite::SqliteError) -> Self {
        match e {
            crate::data::sqlite::SqliteError::Database(e) => Self::Sqlite(e),
            crate::data::sqlite::SqliteError::Io(e) => Self::Io(e),
        }
    }
}

impl From<crate::data::postgres::PostgresError> for DataError {
    fn from(e: crate::data::postgres::PostgresError) -> Self {
        match e {
            crate::data::postgres::PostgresError::Database(e) => Self::Postgres(e),
            crate::data::postgres::PostgresError::Config(msg) => Self::Config(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::postgres::PostgresError;
    use crate::data::sqlite::SqliteError;

    #[test]
    fn test_backend_method() {
        assert_eq!(DataError::Sqlite(sqlx::Error::PoolClosed).backend(), "sqlite");
        assert_eq!(
            DataError::from(PostgresError::Database(sqlx::Error::RowNotFound)).backend(),
            "postgres"
        );
        assert_eq!(DataError::Config("x".into()).backend(), "unknown");
    }

    #[test]
    fn test_is_transient() {
        assert!(DataError::Sqlite(sqlx::Error::PoolTimedOut).is_transient());
        assert!(DataError::Postgres(sqlx::Error::PoolClosed).is_transient());
        assert!(!DataError::Sqlite(sqlx::Error::RowNotFound).is_transient());
        assert!(!DataError::InvalidRow("bad".into()).is_transient());
    }

    #[test]
    fn test_sqlite_io_maps_to_io() {
        let err: DataError =
            SqliteError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk")).into();
        assert!(matches!(err, DataError::Io(_)));
    }
}
