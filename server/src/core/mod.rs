//! Core application infrastructure

pub mod cli;
pub mod config;
pub mod constants;
pub mod shutdown;

pub use crate::app::CostScopeApp;
pub use cli::{CliConfig, Commands};
pub use config::{AppConfig, ServerConfig};
pub use shutdown::ShutdownService;
