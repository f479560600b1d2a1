//! Topic error types

use std::fmt;

/// Error type for topic operations
#[derive(Debug)]
pub enum TopicError {
    /// Channel or connection closed
    ChannelClosed,
    /// Receiver lagged behind
    Lagged(u64),
    /// Connection error (Redis)
    Connection(String),
    /// Command failed on an open connection
    Command(String),
    /// Configuration error
    Config(String),
}

impl std::error::Error for TopicError {}

impl fmt::Display for TopicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicError::ChannelClosed => write!(f, "channel closed"),
            TopicError::Lagged(n) => write!(f, "receiver lagged by {} messages", n),
            TopicError::Connection(msg) => write!(f, "connection error: {}", msg),
            TopicError::Command(msg) => write!(f, "command error: {}", msg),
            TopicError::Config(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl From<tokio::sync::broadcast::error::RecvError> for TopicError {
    fn from(err: tokio::sync::broadcast::error::RecvError) -> Self {
        match err {
            tokio::sync::broadcast::error::RecvError::Closed => TopicError::ChannelClosed,
            tokio::sync::broadcast::error::RecvError::Lagged(n) => TopicError::Lagged(n),
        }
    }
}

impl From<deadpool_redis::PoolError> for TopicError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        TopicError::Connection(err.to_string())
    }
}

impl From<deadpool_redis::redis::RedisError> for TopicError {
    fn from(err: deadpool_redis::redis::RedisError) -> Self {
        TopicError::Command(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recv_error_conversion() {
        let lagged: TopicError = tokio::sync::broadcast::error::RecvError::Lagged(3).into();
        assert!(matches!(lagged, TopicError::Lagged(3)));
        assert_eq!(lagged.to_string(), "receiver lagged by 3 messages");

        let closed: TopicError = tokio::sync::broadcast::error::RecvError::Closed.into();
        assert!(matches!(closed, TopicError::ChannelClosed));
    }
}
