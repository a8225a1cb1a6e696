// Record store contract used by the tier engine: create, paged range query,
// merge-patch update, single and bulk delete. Timestamps cross the storage boundary
// as "YYYY-MM-DD HH:MM:SS.mmmZ" (UTC, space separated) so range predicates compare
// correctly as text.

mod blob;
pub mod memory;
pub mod sqlite;

use std::future::Future;

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

use crate::models::{EntityMap, PointMetadata, RecordId, StoredPoint, TimeSeriesPoint};

pub use memory::{InMemoryStore, StoreCalls};
pub use sqlite::SqliteStore;

/// Largest page the store hands out.
pub const MAX_PAGE_SIZE: u32 = 1000;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3fZ";
/// 9999-12-31 23:59:59.999 UTC; beyond this the text form stops sorting correctly.
const MAX_TIMESTAMP_MS: i64 = 253_402_300_799_999;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {id} not found in tier {tier}")]
    NotFound { tier: String, id: RecordId },
    #[error("invalid record: {0}")]
    Validation(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("encoding error: {0}")]
    Encoding(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Timestamp predicate: `timestamp >= from AND timestamp < to`; a missing bound is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RangeFilter {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl RangeFilter {
    pub fn between(from: i64, to: i64) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn before(to: i64) -> Self {
        Self {
            from: None,
            to: Some(to),
        }
    }

    /// Exactly one millisecond: records stamped at `timestamp`.
    pub fn at(timestamp: i64) -> Self {
        Self::between(timestamp, timestamp + 1)
    }

    pub fn matches(&self, timestamp: i64) -> bool {
        self.from.is_none_or(|f| timestamp >= f) && self.to.is_none_or(|t| timestamp < t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    fn sql(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

/// 1-based page number; `per_page` is capped at [`MAX_PAGE_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn first(per_page: u32) -> Self {
        Self::new(1, per_page)
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.per_page as u64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<StoredPoint>,
    pub has_more: bool,
}

/// Merge-patch: only the fields that are `Some` are replaced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointPatch {
    pub entities: Option<EntityMap>,
    pub metadata: Option<PointMetadata>,
}

/// Backing store for tier records. One logical partition per tier id.
pub trait PointStore: Send + Sync + 'static {
    fn create(
        &self,
        tier: &str,
        point: &TimeSeriesPoint,
    ) -> impl Future<Output = StoreResult<RecordId>> + Send;

    fn query(
        &self,
        tier: &str,
        filter: RangeFilter,
        order: SortOrder,
        page: PageRequest,
    ) -> impl Future<Output = StoreResult<Page>> + Send;

    fn update(
        &self,
        tier: &str,
        id: RecordId,
        patch: PointPatch,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn delete(&self, tier: &str, id: RecordId) -> impl Future<Output = StoreResult<()>> + Send;

    /// Bulk delete by predicate; returns the number of records removed.
    fn delete_where(
        &self,
        tier: &str,
        filter: RangeFilter,
    ) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Reclaims space after deletes. No-op unless the backend needs it.
    fn vacuum(&self) -> impl Future<Output = StoreResult<()>> + Send {
        async { Ok(()) }
    }
}

/// Walks every page of a range query and returns the concatenated records.
pub async fn fetch_all<S: PointStore + ?Sized>(
    store: &S,
    tier: &str,
    filter: RangeFilter,
    order: SortOrder,
    per_page: u32,
) -> StoreResult<Vec<StoredPoint>> {
    let mut out = Vec::new();
    let mut request = PageRequest::first(per_page);
    loop {
        let page = store.query(tier, filter, order, request).await?;
        out.extend(page.items);
        if !page.has_more {
            return Ok(out);
        }
        request = PageRequest::new(request.page + 1, request.per_page);
    }
}

/// Epoch ms -> "2024-05-01 10:00:05.000Z".
pub fn format_timestamp(ms: i64) -> StoreResult<String> {
    if !(0..=MAX_TIMESTAMP_MS).contains(&ms) {
        return Err(StoreError::Validation(format!(
            "timestamp {ms} outside storable range"
        )));
    }
    let dt = DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Validation(format!("timestamp {ms} out of range")))?;
    Ok(dt.format(TIMESTAMP_FORMAT).to_string())
}

pub fn parse_timestamp(s: &str) -> StoreResult<i64> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map(|dt| dt.and_utc().timestamp_millis())
        .map_err(|e| StoreError::Encoding(format!("timestamp {s:?}: {e}")))
}

/// Clamps an open-ended or out-of-range bound to the storable range.
pub(crate) fn clamp_bound(ms: i64) -> i64 {
    ms.clamp(0, MAX_TIMESTAMP_MS)
}
