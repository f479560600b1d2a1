//! SDK error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdkError {
    /// Network or protocol failure talking to the ingestion endpoint
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Ingestion endpoint answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Client could not be mapped to a supported provider
    #[error("Unsupported client: {0}. Must be an OpenAI, Anthropic or Google Gemini client")]
    UnsupportedProvider(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = SdkError::Status {
            status: 503,
            message: "Service Unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 503: Service Unavailable");
    }

    #[test]
    fn test_unsupported_provider_display() {
        let err = SdkError::UnsupportedProvider("mistral".to_string());
        assert!(err.to_string().starts_with("Unsupported client: mistral"));
    }
}
