//! Counter store error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CounterError {
    #[error("Counter configuration error: {0}")]
    Config(String),

    #[error("Counter connection error: {0}")]
    Connection(String),

    #[error("Counter operation failed: {0}")]
    Operation(String),

    #[error("Redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = CounterError::Config("redis_url required".to_string());
        assert_eq!(
            err.to_string(),
            "Counter configuration error: redis_url required"
        );
    }

    #[test]
    fn test_operation_error_display() {
        let err = CounterError::Operation("bad total".to_string());
        assert_eq!(err.to_string(), "Counter operation failed: bad total");
    }
}
