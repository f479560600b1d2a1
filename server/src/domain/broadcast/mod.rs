//! Real-time cost broadcast
//!
//! - `message` - wire format of stream frames
//! - `manager` - subscriber registry, upstream relay and heartbeat

mod manager;
mod message;

use std::time::Duration;

use thiserror::Error;

pub use manager::{BroadcastManager, BroadcastState, StreamFrame, Subscription};
pub use message::{CostUpdate, Snapshot, StreamMessage};

use crate::core::config::StreamConfig;
use crate::core::constants::{
    DEFAULT_HEARTBEAT_SECS, DEFAULT_MAX_SUBSCRIBERS, DEFAULT_RESUBSCRIBE_DELAY_SECS,
    DEFAULT_SUBSCRIBER_BUFFER,
};

#[derive(Error, Debug)]
pub enum BroadcastError {
    #[error("Subscriber limit reached ({max})")]
    Capacity { max: usize },

    #[error("Failed to serialize stream message: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub max_subscribers: usize,
    pub heartbeat_interval: Duration,
    /// Frames queued per subscriber before a write counts as failed
    pub subscriber_buffer: usize,
    pub resubscribe_delay: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_subscribers: DEFAULT_MAX_SUBSCRIBERS,
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            resubscribe_delay: Duration::from_secs(DEFAULT_RESUBSCRIBE_DELAY_SECS),
        }
    }
}

impl From<&StreamConfig> for BroadcastConfig {
    fn from(config: &StreamConfig) -> Self {
        Self {
            max_subscribers: config.max_subscribers,
            heartbeat_interval: Duration::from_secs(config.heartbeat_secs.max(1)),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BroadcastConfig::default();
        assert_eq!(config.max_subscribers, 100);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.subscriber_buffer, 64);
        assert_eq!(config.resubscribe_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_config_from_stream_section() {
        let stream = StreamConfig {
            max_subscribers: 5,
            heartbeat_secs: 10,
        };
        let config = BroadcastConfig::from(&stream);
        assert_eq!(config.max_subscribers, 5);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.subscriber_buffer, 64);
    }

    #[test]
    fn test_capacity_error_display() {
        let err = BroadcastError::Capacity { max: 100 };
        assert_eq!(err.to_string(), "Subscriber limit reached (100)");
    }
}
