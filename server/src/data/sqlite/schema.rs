//! SQLite schema definitions

/// Event table and its indexes. Idempotent, applied at startup.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL DEFAULT 'default',
    trace_id TEXT NOT NULL,
    span_id TEXT NOT NULL,
    parent_span_id TEXT,
    feature TEXT NOT NULL,
    user_id TEXT,
    provider TEXT NOT NULL,
    model TEXT NOT NULL,
    input_tokens INTEGER NOT NULL CHECK(input_tokens >= 0),
    output_tokens INTEGER NOT NULL CHECK(output_tokens >= 0),
    cached_tokens INTEGER NOT NULL DEFAULT 0 CHECK(cached_tokens >= 0),
    latency_ms REAL NOT NULL,
    estimated_cost_usd REAL NOT NULL,
    verified_cost_usd REAL NOT NULL,
    is_cache_hit BOOLEAN NOT NULL DEFAULT 0,
    is_streaming BOOLEAN NOT NULL DEFAULT 0,
    is_error BOOLEAN NOT NULL DEFAULT 0,
    error_code TEXT,
    retry_count INTEGER NOT NULL DEFAULT 0,
    metadata TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_created_at_id ON events(created_at DESC, id);
CREATE INDEX IF NOT EXISTS idx_events_feature ON events(feature);
CREATE INDEX IF NOT EXISTS idx_events_model ON events(model);
CREATE INDEX IF NOT EXISTS idx_events_provider ON events(provider);
CREATE INDEX IF NOT EXISTS idx_events_feature_created_at ON events(feature, created_at);
CREATE INDEX IF NOT EXISTS idx_events_user_created_at ON events(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_events_trace_id ON events(trace_id);
"#;
