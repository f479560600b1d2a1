//! # CostScope
//!
//! Client SDK for recording what LLM calls cost.
//!
//! Wrap any [`LlmClient`] in a [`Profiler`] and every call produces an
//! [`LlmEvent`] with token usage, latency and an estimated USD cost. Events
//! are buffered and delivered in batches to a CostScope server; delivery
//! failures never surface to the wrapped call.
//!
//! ```no_run
//! use costscope::{LlmClient, LlmRequest, Profiler, ProfilerConfig};
//!
//! # async fn demo<C: LlmClient>(client: C) -> Result<(), Box<dyn std::error::Error>> {
//! let profiler = Profiler::new(client, ProfilerConfig::new("http://localhost:3001", "chat"))?;
//! let _response = profiler
//!     .invoke(LlmRequest::new("gpt-4o", serde_json::json!({"messages": []})))
//!     .await?;
//! profiler.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod batcher;
pub mod buffer;
pub mod error;
pub mod event;
pub mod ids;
pub mod pricing;
pub mod profiler;
pub mod providers;
pub mod transport;

pub use batcher::{BatcherConfig, EventBatcher};
pub use error::SdkError;
pub use event::{BatchEventRequest, LlmEvent, MAX_BATCH_EVENTS, Provider};
pub use ids::{generate_span_id, generate_trace_id};
pub use pricing::{ModelPricing, calculate_cost, lookup_pricing};
pub use profiler::{Profiler, ProfilerConfig};
pub use providers::{LlmClient, LlmRequest, LlmResponse, ProviderError, Usage, classify_error};
pub use transport::{HttpTransport, Transport};
