//! Counter key names

/// Key builder for the counter store
pub struct CounterKey;

impl CounterKey {
    pub const TOTAL_COST: &'static str = "realtime:total_cost";
    pub const TOTAL_REQUESTS: &'static str = "realtime:total_requests";
    pub const TOTAL_TOKENS: &'static str = "realtime:total_tokens";

    /// Fixed-window rate limit key: `{prefix}:{identity}`
    pub fn rate_limit(prefix: &str, identity: &str) -> String {
        format!("{}:{}", prefix, identity)
    }
}
