//! Profiling wrapper around an [`LlmClient`]

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{Map, Value};

use crate::batcher::{BatcherConfig, DEFAULT_BATCH_SIZE, DEFAULT_MAX_BUFFER, EventBatcher};
use crate::error::SdkError;
use crate::event::{LlmEvent, Provider};
use crate::ids::{generate_span_id, generate_trace_id};
use crate::pricing::calculate_cost;
use crate::providers::{LlmClient, LlmRequest, LlmResponse, ProviderError, Usage, classify_error};
use crate::transport::{HttpTransport, Transport};

#[derive(Debug, Clone)]
pub struct ProfilerConfig {
    pub server_url: String,
    pub feature: String,
    pub user_id: Option<String>,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub enabled: bool,
}

impl ProfilerConfig {
    pub fn new(server_url: impl Into<String>, feature: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            feature: feature.into(),
            user_id: None,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval_ms: 5000,
            enabled: true,
        }
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    fn batcher_config(&self) -> BatcherConfig {
        BatcherConfig {
            batch_size: self.batch_size,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            max_buffer: DEFAULT_MAX_BUFFER,
        }
    }
}

/// Per-call context shared by success and error events
struct CallContext<'a> {
    trace_id: String,
    span_id: String,
    provider: Provider,
    model: &'a str,
    is_streaming: bool,
    latency_ms: f64,
}

/// Wraps a client, records one event per call and returns the call's result
/// untouched.
pub struct Profiler<C> {
    client: C,
    feature: String,
    user_id: Option<String>,
    batcher: Option<EventBatcher>,
}

impl<C: LlmClient> Profiler<C> {
    /// Wrap `client`, shipping events over HTTP to `config.server_url`
    pub fn new(client: C, config: ProfilerConfig) -> Result<Self, SdkError> {
        if !config.enabled {
            return Ok(Self::disabled(client, config));
        }
        let transport = Arc::new(HttpTransport::new(&config.server_url)?);
        Ok(Self::with_transport(client, config, transport))
    }

    pub fn with_transport(client: C, config: ProfilerConfig, transport: Arc<dyn Transport>) -> Self {
        if !config.enabled {
            return Self::disabled(client, config);
        }
        let batcher = EventBatcher::new(config.batcher_config(), transport);
        Self {
            client,
            feature: config.feature,
            user_id: config.user_id,
            batcher: Some(batcher),
        }
    }

    fn disabled(client: C, config: ProfilerConfig) -> Self {
        tracing::debug!(feature = %config.feature, "Profiling disabled");
        Self {
            client,
            feature: config.feature,
            user_id: config.user_id,
            batcher: None,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub async fn invoke(&self, request: LlmRequest) -> Result<LlmResponse, ProviderError> {
        let Some(batcher) = &self.batcher else {
            return self.client.invoke(request).await;
        };

        let provider = self.client.provider();
        let model = request.model.clone();
        let is_streaming = request.stream;

        let started = Instant::now();
        let result = self.client.invoke(request).await;
        let ctx = CallContext {
            trace_id: generate_trace_id(),
            span_id: generate_span_id(),
            provider,
            model: &model,
            is_streaming,
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
        };

        let event = match &result {
            Ok(response) => {
                let usage = match response {
                    LlmResponse::Complete(body) => provider.extract_usage(body),
                    LlmResponse::Streamed(chunks) => provider.extract_stream_usage(chunks),
                };
                self.success_event(ctx, usage)
            }
            Err(err) => self.error_event(ctx, err),
        };
        batcher.add(event);

        result
    }

    /// Number of events waiting to be shipped
    pub fn pending(&self) -> usize {
        self.batcher.as_ref().map_or(0, EventBatcher::len)
    }

    pub async fn flush(&self) {
        if let Some(batcher) = &self.batcher {
            batcher.flush().await;
        }
    }

    /// Stop periodic flushing and attempt a final delivery
    pub async fn shutdown(&self) {
        if let Some(batcher) = &self.batcher {
            batcher.destroy().await;
        }
    }

    fn base_event(&self, ctx: CallContext<'_>) -> LlmEvent {
        LlmEvent {
            trace_id: ctx.trace_id,
            span_id: ctx.span_id,
            parent_span_id: None,
            feature: self.feature.clone(),
            user_id: self.user_id.clone(),
            provider: ctx.provider,
            model: ctx.model.to_string(),
            input_tokens: 0,
            output_tokens: 0,
            cached_tokens: 0,
            latency_ms: ctx.latency_ms,
            estimated_cost_usd: 0.0,
            timestamp: Utc::now(),
            metadata: None,
            is_streaming: ctx.is_streaming,
            error_code: None,
            retry_count: 0,
            is_error: false,
        }
    }

    fn success_event(&self, ctx: CallContext<'_>, usage: Usage) -> LlmEvent {
        let model = ctx.model;
        LlmEvent {
            input_tokens: usage.input,
            output_tokens: usage.output,
            cached_tokens: usage.cached,
            estimated_cost_usd: calculate_cost(model, usage.input, usage.output, usage.cached),
            ..self.base_event(ctx)
        }
    }

    fn error_event(&self, ctx: CallContext<'_>, err: &ProviderError) -> LlmEvent {
        let mut metadata = Map::new();
        metadata.insert("error".to_string(), Value::String(err.message.clone()));
        LlmEvent {
            is_error: true,
            error_code: Some(classify_error(err).to_string()),
            metadata: Some(metadata),
            ..self.base_event(ctx)
        }
    }
}
