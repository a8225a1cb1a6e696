// Retention: drop records older than each tier's retention horizon.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::store::{PointStore, RangeFilter};
use crate::tiers::TierCatalog;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierSweepReport {
    pub tier: String,
    /// Records strictly older than this were removed.
    pub cutoff: i64,
    pub deleted: u64,
}

pub struct RetentionSweeper<S> {
    catalog: Arc<TierCatalog>,
    store: Arc<S>,
}

impl<S> Clone for RetentionSweeper<S> {
    fn clone(&self) -> Self {
        Self {
            catalog: self.catalog.clone(),
            store: self.store.clone(),
        }
    }
}

impl<S: PointStore> RetentionSweeper<S> {
    pub fn new(catalog: Arc<TierCatalog>, store: Arc<S>) -> Self {
        Self { catalog, store }
    }

    /// One bulk delete per tier. A failing tier is logged; the others still run.
    /// Repeating with the same `now` deletes nothing further.
    #[instrument(skip(self))]
    pub async fn sweep(&self, now: i64) -> Vec<TierSweepReport> {
        let mut reports = Vec::with_capacity(self.catalog.len());
        for tier in self.catalog.tiers() {
            let cutoff = now - tier.retention_ms;
            match self
                .store
                .delete_where(&tier.id, RangeFilter::before(cutoff))
                .await
            {
                Ok(deleted) => {
                    if deleted > 0 {
                        info!(tier = %tier.id, deleted, "expired records removed");
                    }
                    reports.push(TierSweepReport {
                        tier: tier.id.clone(),
                        cutoff,
                        deleted,
                    });
                }
                Err(e) => warn!(error = %e, tier = %tier.id, "retention sweep failed"),
            }
        }
        reports
    }
}
