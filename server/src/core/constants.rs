// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display)
pub const APP_NAME: &str = "CostScope";

/// Application version from Cargo.toml
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name, looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "costscope.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "COSTSCOPE_CONFIG";

// =============================================================================
// Environment Variables - Server
// =============================================================================

/// Environment variable for server host
pub const ENV_HOST: &str = "COSTSCOPE_HOST";

/// Environment variable for server port
pub const ENV_PORT: &str = "COSTSCOPE_PORT";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "COSTSCOPE_LOG";

/// Environment variable for log output format (compact | json)
pub const ENV_LOG_FORMAT: &str = "COSTSCOPE_LOG_FORMAT";

/// Default tracing filter when neither COSTSCOPE_LOG nor RUST_LOG is set
pub const DEFAULT_LOG_FILTER: &str = "costscope=info,costscope_server=info,tower_http=warn";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 3001;

/// Maximum request body size (10 MiB)
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

// =============================================================================
// Database
// =============================================================================

/// Environment variable for the database URL (selects PostgreSQL when set)
pub const ENV_DATABASE_URL: &str = "COSTSCOPE_DATABASE_URL";

/// Environment variable to override the data directory
pub const ENV_DATA_DIR: &str = "COSTSCOPE_DATA_DIR";

/// Default data directory, relative to the working directory
pub const DEFAULT_DATA_DIR: &str = "data";

/// SQLite database filename
pub const SQLITE_DB_FILENAME: &str = "costscope.db";

/// SQLite connection pool max connections
pub const SQLITE_MAX_CONNECTIONS: u32 = 5;

/// SQLite busy timeout in seconds
pub const SQLITE_BUSY_TIMEOUT_SECS: u64 = 30;

/// SQLite cache size (negative = KB, so -64000 = 64MB)
pub const SQLITE_CACHE_SIZE: &str = "-64000";

/// WAL checkpoint interval in seconds (5 minutes)
pub const SQLITE_CHECKPOINT_INTERVAL_SECS: u64 = 300;

pub const POSTGRES_DEFAULT_MAX_CONNECTIONS: u32 = 20;

pub const POSTGRES_DEFAULT_MIN_CONNECTIONS: u32 = 2;

pub const POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

pub const POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

pub const POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 60;

/// Interval between PostgreSQL pool health checks
pub const POSTGRES_HEALTH_CHECK_INTERVAL_SECS: u64 = 60;

/// Project id stamped on every ingested event
pub const DEFAULT_PROJECT_ID: &str = "default";

// =============================================================================
// Counters and Topics
// =============================================================================

/// Environment variable for the Redis URL (selects the Redis backend when set)
pub const ENV_REDIS_URL: &str = "COSTSCOPE_REDIS_URL";

// =============================================================================
// Rate Limiting
// =============================================================================

/// Environment variable to enable or disable rate limiting
pub const ENV_RATE_LIMIT_ENABLED: &str = "COSTSCOPE_RATE_LIMIT_ENABLED";

/// Default ingestion limit (requests per window per client)
pub const DEFAULT_RATE_LIMIT_EVENTS: u32 = 5000;

/// Default analytics limit (requests per window per client)
pub const DEFAULT_RATE_LIMIT_ANALYTICS: u32 = 1000;

/// Rate limit window in seconds (fixed 1-minute window)
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

// =============================================================================
// Real-time Stream
// =============================================================================

/// Maximum concurrent SSE subscribers
pub const DEFAULT_MAX_SUBSCRIBERS: usize = 100;

/// Keepalive interval for SSE subscribers
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

/// Frames buffered per subscriber before it counts as a failed write
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Delay before re-subscribing upstream after the topic stream ends
pub const DEFAULT_RESUBSCRIBE_DELAY_SECS: u64 = 1;

// =============================================================================
// Pagination
// =============================================================================

pub const DEFAULT_PAGE_LIMIT: usize = 50;

pub const MAX_PAGE_LIMIT: usize = 200;

// =============================================================================
// Shutdown
// =============================================================================

/// Graceful shutdown timeout in seconds
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;
