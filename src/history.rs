// Tiered history facade: raw sample writes, the rollup/retention passes and the
// multi-tier read path over one store and one catalog.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::models::{EntityMap, RecordId, TimeSeriesPoint, TimeWindow};
use crate::query::{QueryError, QueryRouter, SubQuery};
use crate::retention::{RetentionSweeper, TierSweepReport};
use crate::rollup::{RollupEngine, RollupSettings, TierRollupReport};
use crate::store::{PointStore, StoreResult};
use crate::tiers::TierCatalog;

pub struct TieredHistory<S> {
    catalog: Arc<TierCatalog>,
    store: Arc<S>,
    rollup: RollupEngine<S>,
    retention: RetentionSweeper<S>,
    router: QueryRouter<S>,
}

impl<S> Clone for TieredHistory<S> {
    fn clone(&self) -> Self {
        Self {
            catalog: self.catalog.clone(),
            store: self.store.clone(),
            rollup: self.rollup.clone(),
            retention: self.retention.clone(),
            router: self.router.clone(),
        }
    }
}

impl<S: PointStore> TieredHistory<S> {
    pub fn new(catalog: Arc<TierCatalog>, store: Arc<S>, settings: RollupSettings) -> Self {
        Self {
            rollup: RollupEngine::new(catalog.clone(), store.clone(), settings),
            retention: RetentionSweeper::new(catalog.clone(), store.clone()),
            router: QueryRouter::new(catalog.clone(), store.clone(), settings.page_size),
            catalog,
            store,
        }
    }

    pub fn catalog(&self) -> &TierCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Writes one raw point into the first tier. An empty sample is not written.
    #[instrument(skip(self, entities), fields(entities = entities.len()))]
    pub async fn record_sample(
        &self,
        now: i64,
        entities: EntityMap,
    ) -> StoreResult<Option<RecordId>> {
        if entities.is_empty() {
            debug!("empty sample, nothing to record");
            return Ok(None);
        }
        let raw = self.catalog.raw();
        let point = TimeSeriesPoint::raw(now, &raw.resolution, entities);
        self.store.create(&raw.id, &point).await.map(Some)
    }

    pub async fn aggregate_cycle(&self, now: i64) -> Vec<TierRollupReport> {
        self.rollup.run(now).await
    }

    pub async fn cleanup_expired(&self, now: i64) -> Vec<TierSweepReport> {
        self.retention.sweep(now).await
    }

    pub fn plan(&self, window: TimeWindow, now: i64) -> Vec<SubQuery> {
        self.router.plan(window, now)
    }

    pub async fn query(
        &self,
        window: TimeWindow,
        now: i64,
    ) -> Result<Vec<TimeSeriesPoint>, QueryError> {
        self.router.query(window, now).await
    }
}
