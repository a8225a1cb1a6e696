// In-process record store. Counts every call so callers can assert that a pass issued
// no mutations; can be told to fail specific operations.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use super::{
    Page, PageRequest, PointPatch, PointStore, RangeFilter, SortOrder, StoreError, StoreResult,
};
use crate::models::{RecordId, StoredPoint, TimeSeriesPoint};

/// Snapshot of call counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreCalls {
    pub creates: u64,
    pub queries: u64,
    pub updates: u64,
    pub deletes: u64,
    pub bulk_deletes: u64,
}

impl StoreCalls {
    pub fn mutations(&self) -> u64 {
        self.creates + self.updates + self.deletes + self.bulk_deletes
    }
}

#[derive(Default)]
struct Counters {
    creates: AtomicU64,
    queries: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    bulk_deletes: AtomicU64,
}

#[derive(Default)]
pub struct InMemoryStore {
    tiers: Mutex<BTreeMap<String, Vec<StoredPoint>>>,
    next_id: AtomicI64,
    counters: Counters,
    fail_creates: AtomicBool,
    fail_queries: AtomicBool,
    failing_deletes: Mutex<HashSet<RecordId>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> StoreCalls {
        let c = &self.counters;
        StoreCalls {
            creates: c.creates.load(Ordering::Relaxed),
            queries: c.queries.load(Ordering::Relaxed),
            updates: c.updates.load(Ordering::Relaxed),
            deletes: c.deletes.load(Ordering::Relaxed),
            bulk_deletes: c.bulk_deletes.load(Ordering::Relaxed),
        }
    }

    pub fn reset_calls(&self) {
        let c = &self.counters;
        for counter in [
            &c.creates,
            &c.queries,
            &c.updates,
            &c.deletes,
            &c.bulk_deletes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// All records of a tier, ascending by (timestamp, id).
    pub fn records(&self, tier: &str) -> Vec<StoredPoint> {
        self.lock().get(tier).cloned().unwrap_or_default()
    }

    pub fn set_fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::Relaxed);
    }

    /// Single-record deletes of `id` fail until cleared.
    pub fn fail_delete_of(&self, id: RecordId) {
        self.failing_deletes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<StoredPoint>>> {
        self.tiers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn not_found(tier: &str, id: RecordId) -> StoreError {
        StoreError::NotFound {
            tier: tier.to_string(),
            id,
        }
    }
}

impl PointStore for InMemoryStore {
    async fn create(&self, tier: &str, point: &TimeSeriesPoint) -> StoreResult<RecordId> {
        self.counters.creates.fetch_add(1, Ordering::Relaxed);
        if self.fail_creates.load(Ordering::Relaxed) {
            return Err(StoreError::Validation("create rejected".into()));
        }
        if point.metadata.resolution.is_empty() {
            return Err(StoreError::Validation("resolution must be non-empty".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut tiers = self.lock();
        let records = tiers.entry(tier.to_string()).or_default();
        records.push(StoredPoint {
            id,
            point: point.clone(),
        });
        records.sort_by_key(|r| (r.point.timestamp, r.id));
        Ok(id)
    }

    async fn query(
        &self,
        tier: &str,
        filter: RangeFilter,
        order: SortOrder,
        page: PageRequest,
    ) -> StoreResult<Page> {
        self.counters.queries.fetch_add(1, Ordering::Relaxed);
        if self.fail_queries.load(Ordering::Relaxed) {
            return Err(StoreError::Validation("query rejected".into()));
        }
        let mut matching: Vec<StoredPoint> = self
            .lock()
            .get(tier)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| filter.matches(r.point.timestamp))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if order == SortOrder::Descending {
            matching.reverse();
        }
        let offset = page.offset() as usize;
        let end = offset.saturating_add(page.per_page as usize);
        let has_more = matching.len() > end;
        let items = matching
            .into_iter()
            .skip(offset)
            .take(page.per_page as usize)
            .collect();
        Ok(Page { items, has_more })
    }

    async fn update(&self, tier: &str, id: RecordId, patch: PointPatch) -> StoreResult<()> {
        self.counters.updates.fetch_add(1, Ordering::Relaxed);
        let mut tiers = self.lock();
        let record = tiers
            .get_mut(tier)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| Self::not_found(tier, id))?;
        if let Some(entities) = patch.entities {
            record.point.entities = entities;
        }
        if let Some(metadata) = patch.metadata {
            record.point.metadata = metadata;
        }
        Ok(())
    }

    async fn delete(&self, tier: &str, id: RecordId) -> StoreResult<()> {
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        let failing = self
            .failing_deletes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&id);
        if failing {
            return Err(StoreError::Validation(format!("delete of {id} rejected")));
        }
        let mut tiers = self.lock();
        let records = tiers
            .get_mut(tier)
            .ok_or_else(|| Self::not_found(tier, id))?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(Self::not_found(tier, id));
        }
        Ok(())
    }

    async fn delete_where(&self, tier: &str, filter: RangeFilter) -> StoreResult<u64> {
        self.counters.bulk_deletes.fetch_add(1, Ordering::Relaxed);
        let mut tiers = self.lock();
        let Some(records) = tiers.get_mut(tier) else {
            return Ok(0);
        };
        let before = records.len();
        records.retain(|r| !filter.matches(r.point.timestamp));
        Ok((before - records.len()) as u64)
    }
}
