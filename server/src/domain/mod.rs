//! Domain logic for the cost pipeline
//!
//! - `ingest` - enrichment, persistence, counter update and publish
//! - `broadcast` - live fan-out of cost updates to stream subscribers
//! - `pagination` - cursor codec and page formatting for historical lists

pub mod broadcast;
pub mod ingest;
pub mod pagination;

pub use broadcast::{BroadcastConfig, BroadcastError, BroadcastManager, StreamFrame};
pub use ingest::{IngestError, IngestService, IngestSummary};
pub use pagination::{Page, PageInfo, PaginationError};
