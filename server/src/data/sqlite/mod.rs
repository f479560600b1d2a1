//! SQLite database service
//!
//! Default durable store for single-node deployments:
//! - WAL mode for concurrent reads during writes
//! - In-memory temp storage for fast queries
//! - Periodic WAL checkpointing

pub mod error;
pub mod schema;

pub use error::SqliteError;
pub use sqlx::SqlitePool;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::config::DatabaseConfig;
use crate::core::constants::{
    SQLITE_BUSY_TIMEOUT_SECS, SQLITE_CACHE_SIZE, SQLITE_CHECKPOINT_INTERVAL_SECS,
    SQLITE_DB_FILENAME, SQLITE_MAX_CONNECTIONS,
};
use crate::data::error::DataError;
use crate::data::sql;
use crate::data::traits::EventRepository;
use crate::data::types::{EventRecord, EventRow, ListEventsParams};

/// SQLite database service
///
/// Should be created once at server startup and shared.
pub struct SqliteService {
    pool: SqlitePool,
}

impl SqliteService {
    /// Open (or create) the database file under the data directory and apply
    /// the schema.
    pub async fn init(config: &DatabaseConfig) -> Result<Self, SqliteError> {
        tokio::fs::create_dir_all(&config.data_dir).await?;
        let db_path = config.data_dir.join(SQLITE_DB_FILENAME);

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(SQLITE_BUSY_TIMEOUT_SECS))
            .pragma("cache_size", SQLITE_CACHE_SIZE)
            .pragma("temp_store", "MEMORY");

        let max_connections = if config.max_connections > 0 {
            config.max_connections
        } else {
            SQLITE_MAX_CONNECTIONS
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(schema::SCHEMA).execute(&pool).await?;

        tracing::debug!(path = %db_path.display(), "SqliteService initialized");
        Ok(Self { pool })
    }

    /// Single-connection in-memory database with the schema applied
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, SqliteError> {
        // Every connection to :memory: is a separate database, so pin the pool to one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        sqlx::raw_sql(schema::SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn checkpoint(&self) -> Result<(), SqliteError> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await?;
        tracing::debug!("WAL checkpoint completed");
        Ok(())
    }

    /// Close the connection pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("SQLite pool closed");
    }

    pub fn start_checkpoint_task(
        self: &Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let db = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(SQLITE_CHECKPOINT_INTERVAL_SECS));
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("WAL checkpoint task shutting down");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if let Err(e) = db.checkpoint().await {
                            tracing::warn!("WAL checkpoint failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl EventRepository for Arc<SqliteService> {
    async fn insert_events(&self, rows: &[EventRow]) -> Result<(), DataError> {
        if rows.is_empty() {
            return Ok(());
        }
        sql::build_insert::<sqlx::Sqlite>(rows)
            .build()
            .execute(self.pool())
            .await
            .map_err(DataError::Sqlite)?;
        Ok(())
    }

    async fn list_events(&self, params: &ListEventsParams) -> Result<Vec<EventRow>, DataError> {
        let records: Vec<EventRecord> = sql::build_list::<sqlx::Sqlite>(params)
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(DataError::Sqlite)?;
        records.into_iter().map(EventRow::try_from).collect()
    }

    async fn health_check(&self) -> Result<(), DataError> {
        sqlx::query("SELECT 1")
            .execute(self.pool())
            .await
            .map_err(DataError::Sqlite)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use costscope::Provider;

    use super::*;
    use crate::data::types::EventPosition;
    use crate::data::types::tests::sample_row;

    const DAY_MS: i64 = 86_400_000;
    const JAN_1: i64 = 1_704_067_200_000;

    async fn setup_repo() -> Arc<SqliteService> {
        Arc::new(SqliteService::in_memory().await.unwrap())
    }

    fn range_params(limit: usize) -> ListEventsParams {
        ListEventsParams::new(
            Utc.timestamp_millis_opt(JAN_1 - DAY_MS).unwrap(),
            Utc.timestamp_millis_opt(JAN_1 + 30 * DAY_MS).unwrap(),
            limit,
        )
    }

    #[tokio::test]
    async fn test_insert_and_list_round_trip() {
        let repo = setup_repo().await;
        let row = sample_row("e1", JAN_1);
        repo.insert_events(std::slice::from_ref(&row)).await.unwrap();

        let rows = repo.list_events(&range_params(50)).await.unwrap();
        assert_eq!(rows, vec![row]);
    }

    #[tokio::test]
    async fn test_list_orders_desc_and_fetches_one_extra() {
        let repo = setup_repo().await;
        let rows: Vec<_> = (0..3)
            .map(|i| sample_row(&format!("e{i}"), JAN_1 + i * DAY_MS))
            .collect();
        repo.insert_events(&rows).await.unwrap();

        let page = repo.list_events(&range_params(2)).await.unwrap();
        let ids: Vec<_> = page.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["e2", "e1", "e0"]);
    }

    #[tokio::test]
    async fn test_cursor_breaks_timestamp_ties_by_id() {
        let repo = setup_repo().await;
        let rows = vec![
            sample_row("a", JAN_1),
            sample_row("b", JAN_1),
            sample_row("c", JAN_1),
            sample_row("z", JAN_1 - 1),
        ];
        repo.insert_events(&rows).await.unwrap();

        let mut params = range_params(10);
        params.before = Some(EventPosition {
            created_at_ms: JAN_1,
            id: "b".into(),
        });
        let page = repo.list_events(&params).await.unwrap();
        let ids: Vec<_> = page.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "z"]);
    }

    #[tokio::test]
    async fn test_range_is_half_open() {
        let repo = setup_repo().await;
        repo.insert_events(&[sample_row("start", JAN_1), sample_row("end", JAN_1 + DAY_MS)])
            .await
            .unwrap();

        let params = ListEventsParams::new(
            Utc.timestamp_millis_opt(JAN_1).unwrap(),
            Utc.timestamp_millis_opt(JAN_1 + DAY_MS).unwrap(),
            10,
        );
        let page = repo.list_events(&params).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "start");
    }

    #[tokio::test]
    async fn test_dimension_filters() {
        let repo = setup_repo().await;
        let mut claude = sample_row("c1", JAN_1);
        claude.provider = Provider::Anthropic;
        claude.model = "claude-3-5-haiku-20241022".into();
        claude.feature = "search".into();
        repo.insert_events(&[sample_row("o1", JAN_1), claude]).await.unwrap();

        let mut params = range_params(10);
        params.provider = Some(Provider::Anthropic);
        let page = repo.list_events(&params).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "c1");

        let mut params = range_params(10);
        params.feature = Some("chat".into());
        params.model = Some("gpt-4o".into());
        let page = repo.list_events(&params).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "o1");
    }

    #[tokio::test]
    async fn test_batch_insert_is_all_or_nothing() {
        let repo = setup_repo().await;
        // Duplicate primary key in the same statement fails the whole batch
        let rows = vec![sample_row("dup", JAN_1), sample_row("dup", JAN_1 + 1)];
        assert!(repo.insert_events(&rows).await.is_err());

        let page = repo.list_events(&range_params(10)).await.unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn test_init_creates_file_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            data_dir: dir.path().join("nested"),
            ..DatabaseConfig::default()
        };
        let service = SqliteService::init(&config).await.unwrap();
        assert!(dir.path().join("nested").join(SQLITE_DB_FILENAME).exists());

        let repo = Arc::new(service);
        assert!(repo.health_check().await.is_ok());
        repo.checkpoint().await.unwrap();
        repo.close().await;
    }
}
