//! Core application

use std::sync::Arc;

use anyhow::Result;

use crate::api::ApiServer;
use crate::core::cli::{self, CliConfig, Commands};
use crate::core::config::{AppConfig, LogFormat};
use crate::core::constants::{APP_NAME, APP_VERSION, DEFAULT_LOG_FILTER, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::data::EventStore;
use crate::data::counters::{CounterService, RateLimiter};
use crate::data::topics::TopicService;
use crate::domain::broadcast::{BroadcastConfig, BroadcastManager};
use crate::domain::ingest::IngestService;

pub struct CostScopeApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub store: Arc<EventStore>,
    pub counters: Arc<CounterService>,
    pub topics: Arc<TopicService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub ingest: Arc<IngestService>,
    pub broadcast: BroadcastManager,
}

impl CostScopeApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();

        let (cli_config, command) = cli::parse();
        Self::init_logging(cli_config.log_format);

        tracing::debug!(command = ?command, "Application starting");

        match command {
            Some(Commands::Serve) | None => {
                let app = Self::init(&cli_config).await?;
                Self::start_server(app).await
            }
        }
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;

        let store = Arc::new(
            EventStore::init(&config.database)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to initialize event store: {}", e))?,
        );
        tracing::debug!(backend = %store.backend(), "Event store initialized");

        let (counters, topics) = tokio::try_join!(
            async {
                CounterService::new(&config.cache)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to initialize counters: {}", e))
            },
            async {
                TopicService::new(&config.cache)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to initialize topics: {}", e))
            },
        )?;
        let counters = Arc::new(counters);
        let topics = Arc::new(topics);
        tracing::debug!(
            counters = counters.backend_name(),
            topics = topics.backend_name(),
            "Counters and topics initialized"
        );

        Ok(Self::from_services(config, store, counters, topics))
    }

    /// Wire the services that sit on top of the store, counters and topics
    pub fn from_services(
        config: AppConfig,
        store: Arc<EventStore>,
        counters: Arc<CounterService>,
        topics: Arc<TopicService>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(counters.clone()));
        let ingest = Arc::new(IngestService::new(
            store.repository(),
            counters.clone(),
            topics.clone(),
        ));
        let broadcast = BroadcastManager::new(
            counters.clone(),
            topics.clone(),
            BroadcastConfig::from(&config.stream),
        );
        let shutdown = ShutdownService::new(store.clone(), broadcast.clone());

        Self {
            shutdown,
            config,
            store,
            counters,
            topics,
            rate_limiter,
            ingest,
            broadcast,
        }
    }

    fn init_logging(format: LogFormat) {
        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        let builder = tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_env_filter(filter);

        match format {
            LogFormat::Compact => builder.with_ansi(true).compact().init(),
            LogFormat::Json => builder.with_ansi(false).json().init(),
        }
    }

    async fn start_server(app: Self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        app.shutdown.install_signal_handlers();

        app.start_background_tasks().await;

        tracing::info!(
            version = APP_VERSION,
            host = %app.config.server.host,
            port = app.config.server.port,
            database = %app.store.backend(),
            cache = %app.config.cache.backend,
            rate_limit = app.config.rate_limit.enabled,
            "{} listening",
            APP_NAME
        );

        let server = ApiServer::new(app);
        let app = server.start().await?;
        app.shutdown.shutdown().await;

        Ok(())
    }

    pub async fn start_background_tasks(&self) {
        self.shutdown
            .register(self.store.start_maintenance_task(self.shutdown.subscribe()))
            .await;

        if let Err(e) = self.store.repository().health_check().await {
            tracing::warn!(error = %e, backend = e.backend(), "Event store health check failed");
        }
        if let Err(e) = self.counters.health_check().await {
            tracing::warn!(error = %e, "Counter store health check failed");
        }
        if let Err(e) = self.topics.health_check().await {
            tracing::warn!(error = %e, "Topic backend health check failed");
        }

        tracing::debug!("Background tasks started");
    }
}
