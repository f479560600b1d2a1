use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::config::LogFormat;
use super::constants::{
    ENV_CONFIG, ENV_DATA_DIR, ENV_DATABASE_URL, ENV_HOST, ENV_LOG_FORMAT, ENV_PORT,
    ENV_RATE_LIMIT_ENABLED, ENV_REDIS_URL,
};

#[derive(Parser)]
#[command(name = "costscope")]
#[command(version, about = "Real-time LLM cost tracking server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server host address
    #[arg(long, short = 'H', global = true, env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', global = true, env = ENV_PORT)]
    pub port: Option<u16>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// PostgreSQL connection URL (selects the postgres backend)
    #[arg(long, global = true, env = ENV_DATABASE_URL)]
    pub database_url: Option<String>,

    /// Directory for the SQLite database file
    #[arg(long, global = true, env = ENV_DATA_DIR)]
    pub data_dir: Option<PathBuf>,

    /// Redis-compatible URL for counters and pub/sub (selects the redis backend)
    #[arg(long, global = true, env = ENV_REDIS_URL)]
    pub redis_url: Option<String>,

    /// Enable or disable rate limiting
    #[arg(long, global = true, env = ENV_RATE_LIMIT_ENABLED)]
    pub rate_limit_enabled: Option<bool>,

    /// Log output format (compact or json)
    #[arg(long, global = true, env = ENV_LOG_FORMAT, value_parser = parse_log_format)]
    pub log_format: Option<LogFormat>,
}

/// Parse log format from CLI/env string
fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    match s.to_lowercase().as_str() {
        "compact" | "text" => Ok(LogFormat::Compact),
        "json" => Ok(LogFormat::Json),
        _ => Err(format!(
            "Invalid log format '{}'. Valid options: compact, json",
            s
        )),
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the server (default command)
    Serve,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config: Option<PathBuf>,
    pub database_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub redis_url: Option<String>,
    pub rate_limit_enabled: Option<bool>,
    pub log_format: LogFormat,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        host: cli.host,
        port: cli.port,
        config: cli.config,
        database_url: cli.database_url,
        data_dir: cli.data_dir,
        redis_url: cli.redis_url,
        rate_limit_enabled: cli.rate_limit_enabled,
        log_format: cli.log_format.unwrap_or_default(),
    };
    (config, cli.command)
}
