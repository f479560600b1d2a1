use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::cli::CliConfig;
use super::constants::{
    CONFIG_FILE_NAME, DEFAULT_DATA_DIR, DEFAULT_HEARTBEAT_SECS, DEFAULT_HOST,
    DEFAULT_MAX_SUBSCRIBERS, DEFAULT_PORT, DEFAULT_RATE_LIMIT_ANALYTICS,
    DEFAULT_RATE_LIMIT_EVENTS, DEFAULT_RATE_LIMIT_WINDOW_SECS,
};
use crate::data::counters::{RateLimitBucket, RateLimitBuckets};

// =============================================================================
// Database Backend Enum (SQLite or PostgreSQL)
// =============================================================================

/// Durable event store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Sqlite,
    Postgres,
}

impl fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseBackend::Sqlite => write!(f, "sqlite"),
            DatabaseBackend::Postgres => write!(f, "postgres"),
        }
    }
}

// =============================================================================
// Cache Backend Enum
// =============================================================================

/// Backend for counters, rate limits and pub/sub topics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendType {
    #[default]
    Memory,
    Redis,
}

impl fmt::Display for CacheBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheBackendType::Memory => write!(f, "memory"),
            CacheBackendType::Redis => write!(f, "redis"),
        }
    }
}

// =============================================================================
// Log Format Enum
// =============================================================================

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

// =============================================================================
// File Config Structs (from JSON config file)
// =============================================================================

/// Server configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Database configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DatabaseFileConfig {
    /// sqlite (default) or postgres
    pub backend: Option<DatabaseBackend>,
    /// PostgreSQL connection URL
    pub url: Option<String>,
    /// Directory holding the SQLite file
    pub data_dir: Option<PathBuf>,
    pub max_connections: Option<u32>,
}

/// Cache configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CacheFileConfig {
    /// memory (default) or redis
    pub backend: Option<CacheBackendType>,
    pub redis_url: Option<String>,
}

/// Rate limit configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RateLimitFileConfig {
    pub enabled: Option<bool>,
    pub events_per_minute: Option<u32>,
    pub analytics_per_minute: Option<u32>,
    pub window_secs: Option<u64>,
}

/// Real-time stream configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct StreamFileConfig {
    pub max_subscribers: Option<usize>,
    pub heartbeat_secs: Option<u64>,
}

/// CORS configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CorsFileConfig {
    /// Allowed origins; `*` or empty allows any origin
    pub origins: Option<Vec<String>>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<ServerFileConfig>,
    pub database: Option<DatabaseFileConfig>,
    pub cache: Option<CacheFileConfig>,
    pub rate_limit: Option<RateLimitFileConfig>,
    pub stream: Option<StreamFileConfig>,
    pub cors: Option<CorsFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }
}

// =============================================================================
// Runtime Config Structs (final merged configuration)
// =============================================================================

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    /// Required when backend = postgres
    pub url: Option<String>,
    pub data_dir: PathBuf,
    /// 0 selects the backend default
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::Sqlite,
            url: None,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            max_connections: 0,
        }
    }
}

/// Cache configuration (used by CounterService and TopicService)
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    pub backend: CacheBackendType,
    /// Required when backend = redis
    pub redis_url: Option<String>,
}

/// Rate limit configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub events_per_minute: u32,
    pub analytics_per_minute: u32,
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn buckets(&self) -> RateLimitBuckets {
        RateLimitBuckets {
            events: RateLimitBucket::events(self.events_per_minute, self.window_secs),
            analytics: RateLimitBucket::analytics(self.analytics_per_minute, self.window_secs),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            events_per_minute: DEFAULT_RATE_LIMIT_EVENTS,
            analytics_per_minute: DEFAULT_RATE_LIMIT_ANALYTICS,
            window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
        }
    }
}

/// Real-time stream configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub max_subscribers: usize,
    pub heartbeat_secs: u64,
}

/// CORS configuration (final/runtime)
#[derive(Debug, Clone, Default)]
pub struct CorsConfig {
    /// Empty means any origin
    pub origins: Vec<String>,
}

impl CorsConfig {
    pub fn allows_any(&self) -> bool {
        self.origins.is_empty() || self.origins.iter().any(|o| o == "*")
    }
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub stream: StreamConfig,
    pub cors: CorsConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Local `costscope.json` OR CLI-specified config path
    /// 3. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let config_path = if let Some(ref path) = cli.config {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Some(path.clone())
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        let file_config = match config_path {
            Some(path) => {
                let loaded = FileConfig::load_from_file(&path)?;
                loaded.warn_unknown_fields();
                tracing::debug!(path = %path.display(), "Config file loaded");
                loaded
            }
            None => FileConfig::default(),
        };

        let config = Self::from_sources(cli, file_config);
        config.validate()?;

        tracing::debug!(
            host = %config.server.host,
            port = config.server.port,
            database = %config.database.backend,
            cache = %config.cache.backend,
            rate_limit = config.rate_limit.enabled,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Layer configs: defaults -> file config -> CLI/env overrides
    pub(crate) fn from_sources(cli: &CliConfig, file_config: FileConfig) -> Self {
        let file_server = file_config.server.unwrap_or_default();
        let file_database = file_config.database.unwrap_or_default();
        let file_cache = file_config.cache.unwrap_or_default();
        let file_rate_limit = file_config.rate_limit.unwrap_or_default();
        let file_stream = file_config.stream.unwrap_or_default();
        let file_cors = file_config.cors.unwrap_or_default();

        let host = cli
            .host
            .clone()
            .or(file_server.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = cli.port.or(file_server.port).unwrap_or(DEFAULT_PORT);

        // A database URL on the command line or in the env always means postgres
        let database = match &cli.database_url {
            Some(url) => DatabaseConfig {
                backend: DatabaseBackend::Postgres,
                url: Some(url.clone()),
                ..Default::default()
            },
            None => DatabaseConfig {
                backend: file_database.backend.unwrap_or(if file_database.url.is_some() {
                    DatabaseBackend::Postgres
                } else {
                    DatabaseBackend::Sqlite
                }),
                url: file_database.url,
                ..Default::default()
            },
        };
        let database = DatabaseConfig {
            data_dir: cli
                .data_dir
                .clone()
                .or(file_database.data_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            max_connections: file_database.max_connections.unwrap_or(0),
            ..database
        };

        let cache = match &cli.redis_url {
            Some(url) => CacheConfig {
                backend: CacheBackendType::Redis,
                redis_url: Some(url.clone()),
            },
            None => CacheConfig {
                backend: file_cache.backend.unwrap_or(if file_cache.redis_url.is_some() {
                    CacheBackendType::Redis
                } else {
                    CacheBackendType::Memory
                }),
                redis_url: file_cache.redis_url,
            },
        };

        let rate_limit = RateLimitConfig {
            enabled: cli
                .rate_limit_enabled
                .or(file_rate_limit.enabled)
                .unwrap_or(true),
            events_per_minute: file_rate_limit
                .events_per_minute
                .unwrap_or(DEFAULT_RATE_LIMIT_EVENTS),
            analytics_per_minute: file_rate_limit
                .analytics_per_minute
                .unwrap_or(DEFAULT_RATE_LIMIT_ANALYTICS),
            window_secs: file_rate_limit
                .window_secs
                .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS),
        };

        let stream = StreamConfig {
            max_subscribers: file_stream
                .max_subscribers
                .unwrap_or(DEFAULT_MAX_SUBSCRIBERS),
            heartbeat_secs: file_stream.heartbeat_secs.unwrap_or(DEFAULT_HEARTBEAT_SECS),
        };

        let cors = CorsConfig {
            origins: file_cors.origins.unwrap_or_default(),
        };

        Self {
            server: ServerConfig { host, port },
            database,
            cache,
            rate_limit,
            stream,
            cors,
        }
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Configuration error: server.host must not be empty");
        }

        // Port 0 would bind a random port
        if self.server.port == 0 {
            anyhow::bail!("Configuration error: server.port must be greater than 0");
        }

        if self.database.backend == DatabaseBackend::Postgres
            && self.database.url.as_ref().is_none_or(|u| u.is_empty())
        {
            anyhow::bail!(
                "Configuration error: database.url is required when database.backend is 'postgres'"
            );
        }

        if self.cache.backend == CacheBackendType::Redis
            && self.cache.redis_url.as_ref().is_none_or(|u| u.is_empty())
        {
            anyhow::bail!(
                "Configuration error: cache.redis_url is required when cache.backend is 'redis'"
            );
        }

        if self.rate_limit.window_secs == 0 {
            anyhow::bail!("Configuration error: rate_limit.window_secs must be greater than 0");
        }

        if self.stream.max_subscribers == 0 {
            anyhow::bail!("Configuration error: stream.max_subscribers must be greater than 0");
        }

        if self.stream.heartbeat_secs == 0 {
            anyhow::bail!("Configuration error: stream.heartbeat_secs must be greater than 0");
        }

        if self.rate_limit.enabled
            && (self.rate_limit.events_per_minute == 0 || self.rate_limit.analytics_per_minute == 0)
        {
            tracing::warn!("A rate limit of 0 blocks every request in that bucket");
        }

        if self.cors.allows_any() && is_all_interfaces(&self.server.host) {
            tracing::warn!(
                host = %self.server.host,
                "CORS allows any origin while binding to all network interfaces"
            );
        }

        Ok(())
    }
}

/// Check if host binds to all network interfaces
fn is_all_interfaces(host: &str) -> bool {
    matches!(host, "0.0.0.0" | "::" | "[::]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_backend_enums_serde() {
        let backend: DatabaseBackend = serde_json::from_str(r#""postgres""#).unwrap();
        assert_eq!(backend, DatabaseBackend::Postgres);
        let cache: CacheBackendType = serde_json::from_str(r#""redis""#).unwrap();
        assert_eq!(cache, CacheBackendType::Redis);
        assert_eq!(LogFormat::Json.to_string(), "json");
        assert_eq!(DatabaseBackend::Sqlite.to_string(), "sqlite");
    }

    #[test]
    fn test_file_config_parse_full() {
        let json = r#"{
            "server": { "host": "0.0.0.0", "port": 8080 },
            "database": { "backend": "sqlite", "data_dir": "/tmp/cs", "max_connections": 3 },
            "cache": { "backend": "memory" },
            "rate_limit": { "enabled": false, "events_per_minute": 10 },
            "stream": { "max_subscribers": 5, "heartbeat_secs": 15 },
            "cors": { "origins": ["http://localhost:5173"] }
        }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();

        let server = config.server.as_ref().unwrap();
        assert_eq!(server.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(server.port, Some(8080));
        assert_eq!(config.database.as_ref().unwrap().max_connections, Some(3));
        assert_eq!(config.rate_limit.as_ref().unwrap().enabled, Some(false));
        assert_eq!(config.stream.as_ref().unwrap().heartbeat_secs, Some(15));
        assert_eq!(
            config.cors.as_ref().unwrap().origins.as_deref(),
            Some(&["http://localhost:5173".to_string()][..])
        );
    }

    #[test]
    fn test_file_config_parse_empty() {
        let config: FileConfig = serde_json::from_str("{}").unwrap();
        assert!(config.server.is_none());
        assert!(config.database.is_none());
    }

    #[test]
    fn test_file_config_parse_extra_fields() {
        let json = r#"{ "server": { "port": 9000 }, "sever": {} }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.server.unwrap().port, Some(9000));
        assert!(config.extra.get("sever").is_some());
    }

    #[test]
    fn test_app_config_defaults() {
        let config = AppConfig::from_sources(&CliConfig::default(), FileConfig::default());
        assert!(config.validate().is_ok());

        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.database.backend, DatabaseBackend::Sqlite);
        assert_eq!(config.database.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(config.cache.backend, CacheBackendType::Memory);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.events_per_minute, 5000);
        assert_eq!(config.rate_limit.analytics_per_minute, 1000);
        assert_eq!(config.stream.max_subscribers, 100);
        assert!(config.cors.allows_any());
    }

    #[test]
    fn test_database_url_selects_postgres() {
        let cli = CliConfig {
            database_url: Some("postgres://localhost/costscope".to_string()),
            ..Default::default()
        };
        let config = AppConfig::from_sources(&cli, FileConfig::default());
        assert_eq!(config.database.backend, DatabaseBackend::Postgres);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_redis_url_selects_redis() {
        let cli = CliConfig {
            redis_url: Some("redis://localhost:6379".to_string()),
            ..Default::default()
        };
        let config = AppConfig::from_sources(&cli, FileConfig::default());
        assert_eq!(config.cache.backend, CacheBackendType::Redis);
        assert_eq!(
            config.cache.redis_url.as_deref(),
            Some("redis://localhost:6379")
        );
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = write_config(r#"{ "server": { "host": "file.host", "port": 4000 } }"#);
        let cli = CliConfig {
            port: Some(5000),
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.server.host, "file.host");
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_missing_config_file_is_error() {
        let cli = CliConfig {
            config: Some(PathBuf::from("/nonexistent/costscope.json")),
            ..Default::default()
        };
        let err = AppConfig::load(&cli).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_invalid_json_is_error() {
        let file = write_config("{ not json");
        let cli = CliConfig {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let err = AppConfig::load(&cli).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_validation_server_port_zero() {
        let cli = CliConfig {
            port: Some(0),
            ..Default::default()
        };
        let config = AppConfig::from_sources(&cli, FileConfig::default());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.port must be greater than 0"));
    }

    #[test]
    fn test_validation_postgres_requires_url() {
        let file: FileConfig =
            serde_json::from_str(r#"{ "database": { "backend": "postgres" } }"#).unwrap();
        let config = AppConfig::from_sources(&CliConfig::default(), file);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("database.url is required"));
    }

    #[test]
    fn test_validation_redis_requires_url() {
        let file: FileConfig =
            serde_json::from_str(r#"{ "cache": { "backend": "redis" } }"#).unwrap();
        let config = AppConfig::from_sources(&CliConfig::default(), file);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cache.redis_url is required"));
    }

    #[test]
    fn test_validation_zero_window() {
        let file: FileConfig =
            serde_json::from_str(r#"{ "rate_limit": { "window_secs": 0 } }"#).unwrap();
        let config = AppConfig::from_sources(&CliConfig::default(), file);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_limit_buckets_follow_config() {
        let config = RateLimitConfig {
            enabled: true,
            events_per_minute: 7,
            analytics_per_minute: 3,
            window_secs: 30,
        };
        let buckets = config.buckets();
        assert_eq!(buckets.events.limit, 7);
        assert_eq!(buckets.events.prefix, "rate:events");
        assert_eq!(buckets.analytics.limit, 3);
        assert_eq!(buckets.analytics.window_secs, 30);
    }

    #[test]
    fn test_cors_specific_origins() {
        let cors = CorsConfig {
            origins: vec!["https://app.example.com".to_string()],
        };
        assert!(!cors.allows_any());
    }

    #[test]
    fn test_is_all_interfaces() {
        assert!(is_all_interfaces("0.0.0.0"));
        assert!(is_all_interfaces("::"));
        assert!(!is_all_interfaces("127.0.0.1"));
    }
}
