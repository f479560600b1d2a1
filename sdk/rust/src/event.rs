//! Event model shared by the SDK and the ingestion server
//!
//! An [`LlmEvent`] describes one observed LLM call. Events are produced by the
//! profiling wrapper, buffered by the batcher and shipped to the server as a
//! [`BatchEventRequest`]. Validation rules live on the types themselves so the
//! server enforces exactly what the SDK emits.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::SdkError;

/// Maximum number of events accepted in one ingestion request
pub const MAX_BATCH_EVENTS: usize = 500;

/// LLM vendor that served a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "google-gemini")]
    GoogleGemini,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Anthropic, Provider::GoogleGemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::GoogleGemini => "google-gemini",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| SdkError::UnsupportedProvider(s.to_string()))
    }
}

/// One recorded LLM API call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LlmEvent {
    #[validate(length(min = 1, message = "traceId must not be empty"))]
    pub trace_id: String,

    #[validate(length(min = 1, message = "spanId must not be empty"))]
    pub span_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,

    #[validate(length(min = 1, message = "feature must not be empty"))]
    pub feature: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    pub provider: Provider,

    #[validate(length(min = 1, message = "model must not be empty"))]
    pub model: String,

    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cached_tokens: u64,

    #[validate(range(min = 0.0, message = "latencyMs must be non-negative"))]
    pub latency_ms: f64,

    #[validate(range(min = 0.0, message = "estimatedCostUsd must be non-negative"))]
    pub estimated_cost_usd: f64,

    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,

    #[serde(default)]
    pub is_streaming: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    #[serde(default)]
    pub retry_count: u32,

    #[serde(default)]
    pub is_error: bool,
}

impl LlmEvent {
    /// Tokens counted toward the running token total (input + output)
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Body of `POST /api/v1/events`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatchEventRequest {
    #[validate(
        length(min = 1, max = 500, message = "events must contain between 1 and 500 items"),
        nested
    )]
    pub events: Vec<LlmEvent>,
}
