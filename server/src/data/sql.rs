//! Query building shared by the SQLite and PostgreSQL backends
//!
//! `QueryBuilder` renders the right placeholder style per database, so one
//! builder serves both.

use sqlx::{Database, Encode, QueryBuilder, Type};

use super::types::{EVENT_COLUMNS, EventRow, ListEventsParams};

/// Multi-row `INSERT` for a batch of events
pub(crate) fn build_insert<'a, DB>(rows: &'a [EventRow]) -> QueryBuilder<'a, DB>
where
    DB: Database,
    &'a str: Encode<'a, DB> + Type<DB>,
    Option<&'a str>: Encode<'a, DB> + Type<DB>,
    Option<String>: Encode<'a, DB> + Type<DB>,
    i64: Encode<'a, DB> + Type<DB>,
    f64: Encode<'a, DB> + Type<DB>,
    bool: Encode<'a, DB> + Type<DB>,
{
    let mut qb = QueryBuilder::new(format!("INSERT INTO events ({EVENT_COLUMNS}) "));
    qb.push_values(rows, |mut b, row| {
        b.push_bind(row.id.as_str())
            .push_bind(row.project_id.as_str())
            .push_bind(row.trace_id.as_str())
            .push_bind(row.span_id.as_str())
            .push_bind(row.parent_span_id.as_deref())
            .push_bind(row.feature.as_str())
            .push_bind(row.user_id.as_deref())
            .push_bind(row.provider.as_str())
            .push_bind(row.model.as_str())
            .push_bind(row.input_tokens)
            .push_bind(row.output_tokens)
            .push_bind(row.cached_tokens)
            .push_bind(row.latency_ms)
            .push_bind(row.estimated_cost_usd)
            .push_bind(row.verified_cost_usd)
            .push_bind(row.is_cache_hit)
            .push_bind(row.is_streaming)
            .push_bind(row.is_error)
            .push_bind(row.error_code.as_deref())
            .push_bind(row.retry_count)
            .push_bind(row.metadata.as_ref().map(|m| m.to_string()))
            .push_bind(row.created_at.timestamp_millis());
    });
    qb
}

/// Page query ordered by `(created_at desc, id desc)`, fetching `limit + 1`
pub(crate) fn build_list<'a, DB>(params: &'a ListEventsParams) -> QueryBuilder<'a, DB>
where
    DB: Database,
    &'a str: Encode<'a, DB> + Type<DB>,
    i64: Encode<'a, DB> + Type<DB>,
{
    let mut qb = QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM events WHERE created_at >= "));
    qb.push_bind(params.from.timestamp_millis());
    qb.push(" AND created_at < ");
    qb.push_bind(params.to.timestamp_millis());

    if let Some(feature) = &params.feature {
        qb.push(" AND feature = ").push_bind(feature.as_str());
    }
    if let Some(model) = &params.model {
        qb.push(" AND model = ").push_bind(model.as_str());
    }
    if let Some(provider) = &params.provider {
        qb.push(" AND provider = ").push_bind(provider.as_str());
    }
    if let Some(user_id) = &params.user_id {
        qb.push(" AND user_id = ").push_bind(user_id.as_str());
    }

    // Strictly after the cursor; the id tie-break keeps equal timestamps stable
    if let Some(before) = &params.before {
        qb.push(" AND (created_at < ")
            .push_bind(before.created_at_ms)
            .push(" OR (created_at = ")
            .push_bind(before.created_at_ms)
            .push(" AND id < ")
            .push_bind(before.id.as_str())
            .push("))");
    }

    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    qb.push_bind(params.limit as i64 + 1);
    qb
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use costscope::Provider;
    use sqlx::{Postgres, Sqlite};

    use super::*;
    use crate::data::types::EventPosition;

    fn params() -> ListEventsParams {
        ListEventsParams::new(
            Utc.timestamp_millis_opt(0).unwrap(),
            Utc.timestamp_millis_opt(1_000).unwrap(),
            50,
        )
    }

    #[test]
    fn test_list_without_filters() {
        let p = params();
        let qb = build_list::<Sqlite>(&p);
        assert!(qb.sql().ends_with(
            "FROM events WHERE created_at >= ? AND created_at < ? ORDER BY created_at DESC, id DESC LIMIT ?"
        ));
    }

    #[test]
    fn test_list_with_cursor_and_filters_postgres() {
        let mut p = params();
        p.provider = Some(Provider::Anthropic);
        p.before = Some(EventPosition {
            created_at_ms: 500,
            id: "e5".into(),
        });
        let qb = build_list::<Postgres>(&p);
        let sql = qb.sql();
        assert!(sql.contains("AND provider = $3"));
        assert!(sql.contains("AND (created_at < $4 OR (created_at = $5 AND id < $6))"));
        assert!(sql.ends_with("LIMIT $7"));
    }

    #[test]
    fn test_insert_has_row_per_event() {
        let rows = vec![
            crate::data::types::tests::sample_row("a", 1),
            crate::data::types::tests::sample_row("b", 2),
        ];
        let qb = build_insert::<Sqlite>(&rows);
        let sql = qb.sql();
        assert!(sql.starts_with("INSERT INTO events (id, project_id"));
        assert_eq!(sql.matches("(?, ?").count(), 2);
    }
}
