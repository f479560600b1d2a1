//! Delivery of event batches to the ingestion endpoint

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SdkError;
use crate::event::LlmEvent;

pub const EVENTS_PATH: &str = "/api/v1/events";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends one batch of events somewhere
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, events: &[LlmEvent]) -> Result<(), SdkError>;
}

#[derive(Serialize)]
struct BatchBody<'a> {
    events: &'a [LlmEvent],
}

/// POSTs `{"events": [...]}` to `{server_url}/api/v1/events`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(server_url: &str) -> Result<Self, SdkError> {
        Self::with_timeout(server_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(server_url: &str, timeout: Duration) -> Result<Self, SdkError> {
        let base = server_url.trim_end_matches('/');
        if base.is_empty() {
            return Err(SdkError::Config("server_url must not be empty".to_string()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{base}{EVENTS_PATH}"),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, events: &[LlmEvent]) -> Result<(), SdkError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&BatchBody { events })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SdkError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::event::tests::sample_event;

    #[tokio::test]
    async fn test_send_posts_batch() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/events")
                    .header("content-type", "application/json");
                then.status(202).json_body(json!({"success": true, "count": 2}));
            })
            .await;

        let transport = HttpTransport::new(&server.base_url()).unwrap();
        let events = vec![sample_event("gpt-4o"), sample_event("gpt-4o-mini")];
        transport.send(&events).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/events");
                then.status(503);
            })
            .await;

        let transport = HttpTransport::new(&server.base_url()).unwrap();
        let err = transport.send(&[sample_event("gpt-4o")]).await.unwrap_err();
        assert!(matches!(err, SdkError::Status { status: 503, .. }));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let transport = HttpTransport::new("http://localhost:3001/").unwrap();
        assert_eq!(transport.endpoint(), "http://localhost:3001/api/v1/events");
        assert!(HttpTransport::new("").is_err());
    }
}
