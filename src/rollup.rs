// Rollup: move aging records from each tier into the next coarser one.
// Per destination tier: fetch the source's aging window, bucket by destination
// resolution, create or running-average-update one record per bucket, delete the
// consumed source records, then drop duplicate buckets in the destination.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::aggregator::{combine, merge_incremental};
use crate::bucket::aligned_start;
use crate::models::{
    Aggregation, PointMetadata, RecordId, StoredPoint, TimeSeriesPoint, TimeWindow,
};
use crate::store::{
    MAX_PAGE_SIZE, PageRequest, PointPatch, PointStore, RangeFilter, SortOrder, StoreError,
    fetch_all,
};
use crate::tiers::{Tier, TierCatalog};

/// Without an explicit start_from the window reaches back this many destination buckets.
/// Only reachable for tiers built outside `TierCatalog::from_specs`, which rejects the gap.
const FALLBACK_WINDOW_BUCKETS: i64 = 10;

#[derive(Debug, Clone, Copy)]
pub struct RollupSettings {
    pub page_size: u32,
    /// Concurrent deletes per batch.
    pub delete_batch_size: usize,
}

impl Default for RollupSettings {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            delete_batch_size: 50,
        }
    }
}

/// Outcome of one (source -> destination) migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierRollupReport {
    pub tier: String,
    pub source: String,
    pub source_records: usize,
    pub buckets_created: usize,
    pub buckets_updated: usize,
    pub bucket_failures: usize,
    pub source_deleted: usize,
    pub delete_failures: usize,
    pub duplicates_removed: usize,
}

impl TierRollupReport {
    fn new(source: &Tier, dest: &Tier) -> Self {
        Self {
            tier: dest.id.clone(),
            source: source.id.clone(),
            ..Default::default()
        }
    }

    pub fn moved_anything(&self) -> bool {
        self.buckets_created + self.buckets_updated + self.source_deleted + self.duplicates_removed
            > 0
    }
}

enum BucketWrite {
    Created,
    Updated,
}

/// Source records in `[now - retention, now - start_from)` are due for `dest`.
pub fn aging_window(dest: &Tier, now: i64) -> TimeWindow {
    let end = now - dest.start_age_ms();
    let start = if dest.start_from_ms.is_some() {
        now - dest.retention_ms
    } else {
        end - FALLBACK_WINDOW_BUCKETS * dest.resolution_ms
    };
    TimeWindow::new(start, end)
}

pub struct RollupEngine<S> {
    catalog: Arc<TierCatalog>,
    store: Arc<S>,
    settings: RollupSettings,
}

impl<S> Clone for RollupEngine<S> {
    fn clone(&self) -> Self {
        Self {
            catalog: self.catalog.clone(),
            store: self.store.clone(),
            settings: self.settings,
        }
    }
}

impl<S: PointStore> RollupEngine<S> {
    pub fn new(catalog: Arc<TierCatalog>, store: Arc<S>, settings: RollupSettings) -> Self {
        Self {
            catalog,
            store,
            settings,
        }
    }

    /// One full pass in catalog order. A failing tier is logged and skipped; the rest
    /// still run.
    #[instrument(skip(self))]
    pub async fn run(&self, now: i64) -> Vec<TierRollupReport> {
        let mut reports = Vec::with_capacity(self.catalog.len().saturating_sub(1));
        for (index, dest) in self.catalog.tiers().iter().enumerate().skip(1) {
            let Some(source) = self.catalog.source_of(index) else {
                warn!(tier = %dest.id, "no source tier; skipping rollup");
                continue;
            };
            match self.migrate(source, dest, now).await {
                Ok(report) => {
                    if report.moved_anything() {
                        info!(
                            tier = %report.tier,
                            source = %report.source,
                            source_records = report.source_records,
                            created = report.buckets_created,
                            updated = report.buckets_updated,
                            consumed = report.source_deleted,
                            duplicates = report.duplicates_removed,
                            "rollup"
                        );
                    }
                    reports.push(report);
                }
                Err(e) => {
                    warn!(error = %e, tier = %dest.id, source = %source.id, "rollup failed");
                }
            }
        }
        reports
    }

    /// Migrates `source` records that aged into `dest`'s window. Fails only when the
    /// source fetch fails; per-bucket and per-delete failures are counted in the report.
    pub async fn migrate(
        &self,
        source: &Tier,
        dest: &Tier,
        now: i64,
    ) -> Result<TierRollupReport, StoreError> {
        let mut report = TierRollupReport::new(source, dest);
        let window = aging_window(dest, now);
        if window.is_empty() {
            return Ok(report);
        }

        let records = fetch_all(
            self.store.as_ref(),
            &source.id,
            RangeFilter::between(window.start, window.end),
            SortOrder::Ascending,
            self.settings.page_size,
        )
        .await?;
        report.source_records = records.len();
        if records.is_empty() {
            return Ok(report);
        }

        let mut buckets: BTreeMap<i64, Vec<StoredPoint>> = BTreeMap::new();
        for record in records {
            let key = aligned_start(record.point.timestamp, dest.resolution_ms);
            buckets.entry(key).or_default().push(record);
        }

        let mut consumed: Vec<RecordId> = Vec::new();
        for (bucket_start, members) in buckets {
            match self.write_bucket(dest, bucket_start, &members).await {
                Ok(write) => {
                    match write {
                        BucketWrite::Created => report.buckets_created += 1,
                        BucketWrite::Updated => report.buckets_updated += 1,
                    }
                    consumed.extend(members.iter().map(|m| m.id));
                }
                Err(e) => {
                    // Sources stay put and are picked up again next cycle.
                    warn!(error = %e, tier = %dest.id, bucket_start, "bucket write failed");
                    report.bucket_failures += 1;
                }
            }
        }

        let (deleted, failed) = self.delete_batched(&source.id, &consumed).await;
        report.source_deleted = deleted;
        report.delete_failures = failed;

        report.duplicates_removed = match self.deduplicate(dest, now).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, tier = %dest.id, "duplicate cleanup failed");
                0
            }
        };

        Ok(report)
    }

    async fn write_bucket(
        &self,
        dest: &Tier,
        bucket_start: i64,
        members: &[StoredPoint],
    ) -> Result<BucketWrite, StoreError> {
        let points: Vec<TimeSeriesPoint> = members.iter().map(|m| m.point.clone()).collect();
        let candidate = combine(&points, &dest.resolution)
            .ok_or_else(|| StoreError::Validation("empty bucket".into()))?;

        let existing = self
            .store
            .query(
                &dest.id,
                RangeFilter::at(bucket_start),
                SortOrder::Ascending,
                PageRequest::first(1),
            )
            .await?
            .items
            .into_iter()
            .next();

        match existing {
            Some(record) => {
                let (entities, count) = merge_incremental(
                    &record.point.entities,
                    &candidate.entities,
                    record.point.observation_count(),
                );
                let patch = PointPatch {
                    entities: Some(entities),
                    metadata: Some(PointMetadata {
                        resolution: dest.resolution.clone(),
                        aggregation: Aggregation::Average { count },
                    }),
                };
                self.store.update(&dest.id, record.id, patch).await?;
                Ok(BucketWrite::Updated)
            }
            None => {
                let point = TimeSeriesPoint::average(
                    bucket_start,
                    &dest.resolution,
                    candidate.entities,
                    1,
                );
                self.store.create(&dest.id, &point).await?;
                Ok(BucketWrite::Created)
            }
        }
    }

    /// Keeps the first record seen per bucket key within `dest`'s window and deletes the
    /// rest. Returns how many were deleted.
    pub async fn deduplicate(&self, dest: &Tier, now: i64) -> Result<usize, StoreError> {
        let window = TimeWindow::new(now - dest.retention_ms, now - dest.start_age_ms());
        if window.is_empty() {
            return Ok(0);
        }
        let records = fetch_all(
            self.store.as_ref(),
            &dest.id,
            RangeFilter::between(window.start, window.end),
            SortOrder::Ascending,
            self.settings.page_size,
        )
        .await?;

        let mut seen: HashSet<i64> = HashSet::with_capacity(records.len());
        let duplicates: Vec<RecordId> = records
            .iter()
            .filter(|r| !seen.insert(aligned_start(r.point.timestamp, dest.resolution_ms)))
            .map(|r| r.id)
            .collect();
        if duplicates.is_empty() {
            return Ok(0);
        }
        debug!(tier = %dest.id, count = duplicates.len(), "removing duplicate buckets");
        let (deleted, _) = self.delete_batched(&dest.id, &duplicates).await;
        Ok(deleted)
    }

    /// Deletes in fixed-size concurrent batches. Failures are logged and counted, never
    /// abort the rest. Returns (deleted, failed).
    async fn delete_batched(&self, tier: &str, ids: &[RecordId]) -> (usize, usize) {
        let mut deleted = 0;
        let mut failed = 0;
        for batch in ids.chunks(self.settings.delete_batch_size.max(1)) {
            let results = join_all(batch.iter().map(|id| self.store.delete(tier, *id))).await;
            for (id, result) in batch.iter().zip(results) {
                match result {
                    Ok(()) => deleted += 1,
                    Err(e) => {
                        warn!(error = %e, tier, id, "failed to delete record");
                        failed += 1;
                    }
                }
            }
        }
        (deleted, failed)
    }
}
