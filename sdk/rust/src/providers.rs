//! Provider-specific knowledge: client classification, usage extraction and
//! error classification
//!
//! The SDK does not talk to LLM vendors itself. Callers plug their own client
//! in through [`LlmClient`] and the profiler reads the vendor's usage block
//! out of the JSON response.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::error::SdkError;
use crate::event::Provider;

/// Token usage reported by a provider for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input: u64,
    pub output: u64,
    pub cached: u64,
}

fn read_u64(value: &Value, path: &[&str]) -> u64 {
    path.iter()
        .try_fold(value, |v, key| v.get(key))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

impl Provider {
    /// Map a client hint (vendor name or API base URL) to a provider
    pub fn classify(hint: &str) -> Result<Provider, SdkError> {
        let lower = hint.trim().to_ascii_lowercase();
        if lower.contains("api.openai.com") || lower == "openai" {
            Ok(Provider::OpenAi)
        } else if lower.contains("api.anthropic.com") || lower == "anthropic" {
            Ok(Provider::Anthropic)
        } else if lower.contains("generativelanguage.googleapis.com")
            || lower.contains("gemini")
            || lower == "google"
        {
            Ok(Provider::GoogleGemini)
        } else {
            Err(SdkError::UnsupportedProvider(hint.to_string()))
        }
    }

    /// Read the usage block of a complete (non-streamed) response body
    pub fn extract_usage(&self, body: &Value) -> Usage {
        match self {
            Provider::OpenAi => Usage {
                input: read_u64(body, &["usage", "prompt_tokens"]),
                output: read_u64(body, &["usage", "completion_tokens"]),
                cached: read_u64(body, &["usage", "prompt_tokens_details", "cached_tokens"]),
            },
            Provider::Anthropic => Usage {
                input: read_u64(body, &["usage", "input_tokens"]),
                output: read_u64(body, &["usage", "output_tokens"]),
                cached: read_u64(body, &["usage", "cache_read_input_tokens"]),
            },
            Provider::GoogleGemini => Usage {
                input: read_u64(body, &["usageMetadata", "promptTokenCount"]),
                output: read_u64(body, &["usageMetadata", "candidatesTokenCount"]),
                cached: read_u64(body, &["usageMetadata", "cachedContentTokenCount"]),
            },
        }
    }

    /// Fold usage out of a sequence of streamed chunks.
    ///
    /// OpenAI reports usage on the final chunk (when `include_usage` is set).
    /// Anthropic splits it between `message_start` (input) and
    /// `message_delta` (output). Gemini repeats `usageMetadata`, the last one
    /// being authoritative.
    pub fn extract_stream_usage<'a>(&self, chunks: impl IntoIterator<Item = &'a Value>) -> Usage {
        let mut usage = Usage::default();
        for chunk in chunks {
            match self {
                Provider::OpenAi | Provider::GoogleGemini => {
                    let key = if *self == Provider::OpenAi { "usage" } else { "usageMetadata" };
                    if chunk.get(key).is_some_and(|u| !u.is_null()) {
                        usage = self.extract_usage(chunk);
                    }
                }
                Provider::Anthropic => match chunk.get("type").and_then(Value::as_str) {
                    Some("message_start") => {
                        let message = chunk.get("message").unwrap_or(&Value::Null);
                        usage.input = read_u64(message, &["usage", "input_tokens"]);
                        usage.cached = read_u64(message, &["usage", "cache_read_input_tokens"]);
                    }
                    Some("message_delta") => {
                        usage.output = read_u64(chunk, &["usage", "output_tokens"]);
                    }
                    _ => {}
                },
            }
        }
        usage
    }
}

/// One call to hand to an [`LlmClient`]
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub body: Value,
    pub stream: bool,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, body: Value) -> Self {
        Self {
            model: model.into(),
            body,
            stream: false,
        }
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

#[derive(Debug, Clone)]
pub enum LlmResponse {
    Complete(Value),
    Streamed(Vec<Value>),
}

/// Failure reported by a provider client
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ProviderError {
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Capability the profiler wraps: something that can make LLM calls
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn invoke(&self, request: LlmRequest) -> Result<LlmResponse, ProviderError>;
}

/// Map a provider failure to a stable error code.
///
/// Checks run in a fixed order, so a 429 whose message mentions a timeout is
/// still `rate_limit`.
pub fn classify_error(error: &ProviderError) -> &'static str {
    let status = error.status;
    let message = error.message.as_str();

    if status == Some(429) || message.contains("RESOURCE_EXHAUSTED") {
        return "rate_limit";
    }
    if error.code.as_deref() == Some("ETIMEDOUT") || message.contains("timeout") {
        return "timeout";
    }
    if message.contains("UNAVAILABLE") || status.is_some_and(|s| s >= 500) {
        return "server_error";
    }
    if matches!(status, Some(400 | 401 | 403)) || message.contains("INVALID_ARGUMENT") {
        return "invalid_request";
    }
    "unknown_error"
}
