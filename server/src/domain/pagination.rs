//! Cursor-based pagination over `(timestamp desc, id desc)`
//!
//! A cursor is the base64 of `{"timestamp": <ms>, "id": "<id>"}` taken from the
//! last row of a page. Tokens are opaque to clients and carry no ordering of
//! their own.

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::core::constants::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use crate::data::{EventPosition, EventRow};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaginationError {
    #[error("Invalid cursor format")]
    InvalidCursor,
}

/// Decoded resume position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Epoch milliseconds of the last returned row
    pub timestamp: i64,
    pub id: String,
}

impl From<Cursor> for EventPosition {
    fn from(cursor: Cursor) -> Self {
        EventPosition {
            created_at_ms: cursor.timestamp,
            id: cursor.id,
        }
    }
}

pub fn encode_cursor(timestamp: i64, id: &str) -> String {
    let cursor = Cursor {
        timestamp,
        id: id.to_string(),
    };
    // Serializing a struct of an integer and a string cannot fail
    let json = serde_json::to_vec(&cursor).unwrap_or_default();
    BASE64_STANDARD.encode(json)
}

pub fn decode_cursor(token: &str) -> Result<Cursor, PaginationError> {
    let bytes = BASE64_STANDARD
        .decode(token)
        .map_err(|_| PaginationError::InvalidCursor)?;
    serde_json::from_slice(&bytes).map_err(|_| PaginationError::InvalidCursor)
}

/// Rows that can produce a cursor pointing at themselves
pub trait CursorRow {
    fn cursor_timestamp(&self) -> i64;
    fn cursor_id(&self) -> &str;
}

impl CursorRow for EventRow {
    fn cursor_timestamp(&self) -> i64 {
        self.created_at.timestamp_millis()
    }

    fn cursor_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: PageInfo,
}

/// Trim a `limit + 1` fetch to one page
///
/// The extra row only signals that another page exists; the cursor comes from
/// the last row actually returned.
pub fn format_page<T: CursorRow>(mut rows: Vec<T>, limit: usize) -> Page<T> {
    let has_more = rows.len() > limit;
    if has_more {
        rows.truncate(limit);
    }

    let next_cursor = if has_more {
        rows.last()
            .map(|row| encode_cursor(row.cursor_timestamp(), row.cursor_id()))
    } else {
        None
    };

    Page {
        data: rows,
        pagination: PageInfo {
            next_cursor,
            has_more,
        },
    }
}

/// Page size from a raw query value: default 50, capped at 200, and
/// anything non-numeric or below 1 falls back to the default
pub fn parse_limit(raw: Option<&str>) -> usize {
    match raw.and_then(|s| s.trim().parse::<i64>().ok()) {
        Some(n) if n >= 1 => (n as usize).min(MAX_PAGE_LIMIT),
        _ => DEFAULT_PAGE_LIMIT,
    }
}
