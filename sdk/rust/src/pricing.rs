//! Model pricing and cost calculation
//!
//! Rates are USD per one million tokens. The same function computes the
//! client-side estimate and the server-side verified cost, so both sides
//! agree whenever the pricing table matches.

use std::collections::BTreeMap;

use crate::event::Provider;

/// Per-model pricing (USD per 1M tokens)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub model: &'static str,
    pub provider: Provider,
    pub input_per_1m: f64,
    pub output_per_1m: f64,
    /// Cached-input tier; `None` means cached tokens are free
    pub cached_input_per_1m: Option<f64>,
}

const fn price(
    model: &'static str,
    provider: Provider,
    input_per_1m: f64,
    output_per_1m: f64,
    cached_input_per_1m: Option<f64>,
) -> ModelPricing {
    ModelPricing {
        model,
        provider,
        input_per_1m,
        output_per_1m,
        cached_input_per_1m,
    }
}

pub static MODEL_PRICING: &[ModelPricing] = &[
    // OpenAI
    price("gpt-4o", Provider::OpenAi, 2.50, 10.00, None),
    price("gpt-4o-mini", Provider::OpenAi, 0.15, 0.60, None),
    price("gpt-4-turbo", Provider::OpenAi, 10.00, 30.00, None),
    price("gpt-3.5-turbo", Provider::OpenAi, 0.50, 1.50, None),
    price("text-embedding-3-small", Provider::OpenAi, 0.02, 0.0, None),
    price("text-embedding-3-large", Provider::OpenAi, 0.13, 0.0, None),
    // Anthropic
    price("claude-3-5-sonnet-20241022", Provider::Anthropic, 3.00, 15.00, Some(0.30)),
    price("claude-3-5-haiku-20241022", Provider::Anthropic, 1.00, 5.00, Some(0.10)),
    price("claude-3-opus-20240229", Provider::Anthropic, 15.00, 75.00, Some(1.50)),
    price("claude-sonnet-4-20250514", Provider::Anthropic, 3.00, 15.00, Some(0.30)),
    // Google Gemini
    price("gemini-1.5-pro", Provider::GoogleGemini, 1.25, 5.00, Some(0.3125)),
    price("gemini-1.5-flash", Provider::GoogleGemini, 0.075, 0.30, Some(0.01875)),
    price("gemini-1.0-pro", Provider::GoogleGemini, 0.50, 1.50, None),
];

/// Conservative fallback for models missing from the table
pub static DEFAULT_PRICING: ModelPricing = price("default", Provider::OpenAi, 10.00, 30.00, None);

const TOKENS_PER_UNIT: f64 = 1_000_000.0;

/// Look up pricing for an exact model id
pub fn lookup_pricing(model: &str) -> Option<&'static ModelPricing> {
    MODEL_PRICING.iter().find(|p| p.model == model)
}

/// Cost of one call in USD, rounded to 6 decimal places.
///
/// Cached tokens are billed at the cached tier and excluded from the regular
/// input count. A cached count larger than the input count contributes zero
/// regular input tokens rather than a negative amount.
pub fn calculate_cost(model: &str, input_tokens: u64, output_tokens: u64, cached_tokens: u64) -> f64 {
    let pricing = lookup_pricing(model).unwrap_or(&DEFAULT_PRICING);

    let regular_input = input_tokens.saturating_sub(cached_tokens) as f64;
    let input_cost = regular_input / TOKENS_PER_UNIT * pricing.input_per_1m;
    let output_cost = output_tokens as f64 / TOKENS_PER_UNIT * pricing.output_per_1m;
    let cached_cost = pricing
        .cached_input_per_1m
        .map(|rate| cached_tokens as f64 / TOKENS_PER_UNIT * rate)
        .unwrap_or(0.0);

    round6(input_cost + output_cost + cached_cost)
}

/// Round to 6 decimal places (micro-dollar precision)
pub fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Known model ids grouped by provider
pub fn models_by_provider() -> BTreeMap<Provider, Vec<&'static str>> {
    let mut grouped: BTreeMap<Provider, Vec<&'static str>> = BTreeMap::new();
    for pricing in MODEL_PRICING {
        grouped.entry(pricing.provider).or_default().push(pricing.model);
    }
    grouped
}
