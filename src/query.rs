// Read path: split a time window across the tiers whose coverage it touches,
// query them concurrently, return one ascending series.

use std::sync::Arc;

use futures_util::future::try_join_all;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::models::{TimeSeriesPoint, TimeWindow};
use crate::store::{PointStore, RangeFilter, SortOrder, StoreError, fetch_all};
use crate::tiers::TierCatalog;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid window: start {start} must be before end {end}")]
    InvalidWindow { start: i64, end: i64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One tier's share of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubQuery {
    pub tier: String,
    pub window: TimeWindow,
}

pub struct QueryRouter<S> {
    catalog: Arc<TierCatalog>,
    store: Arc<S>,
    page_size: u32,
}

impl<S> Clone for QueryRouter<S> {
    fn clone(&self) -> Self {
        Self {
            catalog: self.catalog.clone(),
            store: self.store.clone(),
            page_size: self.page_size,
        }
    }
}

impl<S: PointStore> QueryRouter<S> {
    pub fn new(catalog: Arc<TierCatalog>, store: Arc<S>, page_size: u32) -> Self {
        Self {
            catalog,
            store,
            page_size,
        }
    }

    /// Intersects `window` with each tier's coverage at `now`. Tiers with an empty
    /// intersection are left out.
    pub fn plan(&self, window: TimeWindow, now: i64) -> Vec<SubQuery> {
        self.catalog
            .tiers()
            .iter()
            .filter_map(|tier| {
                let (start, end) = tier.coverage(now);
                window
                    .intersect(&TimeWindow::new(start, end))
                    .map(|w| SubQuery {
                        tier: tier.id.clone(),
                        window: w,
                    })
            })
            .collect()
    }

    /// Sorted ascending by timestamp; overlapping tiers are not deduplicated. Any
    /// failing sub-query fails the whole request.
    #[instrument(skip(self), fields(start = window.start, end = window.end))]
    pub async fn query(
        &self,
        window: TimeWindow,
        now: i64,
    ) -> Result<Vec<TimeSeriesPoint>, QueryError> {
        if window.is_empty() {
            return Err(QueryError::InvalidWindow {
                start: window.start,
                end: window.end,
            });
        }
        let plan = self.plan(window, now);
        debug!(sub_queries = plan.len(), "query plan");

        let results = try_join_all(plan.iter().map(|sub| {
            fetch_all(
                self.store.as_ref(),
                &sub.tier,
                RangeFilter::between(sub.window.start, sub.window.end),
                SortOrder::Ascending,
                self.page_size,
            )
        }))
        .await?;

        let mut points: Vec<TimeSeriesPoint> = results
            .into_iter()
            .flatten()
            .map(|record| record.point)
            .collect();
        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::tiers::TierSpec;

    const MIN: i64 = 60_000;

    fn router() -> QueryRouter<InMemoryStore> {
        let catalog = TierCatalog::from_specs(&[
            TierSpec::new("a", "10s", "5m", None, Some("5m")),
            TierSpec::new("b", "1m", "15m", Some("5m"), Some("15m")),
        ])
        .unwrap();
        QueryRouter::new(Arc::new(catalog), Arc::new(InMemoryStore::new()), 1000)
    }

    #[test]
    fn plan_splits_window_by_coverage() {
        let now = 612 * MIN;
        let plan = router().plan(TimeWindow::new(600 * MIN, 610 * MIN), now);
        assert_eq!(
            plan,
            vec![
                SubQuery {
                    tier: "a".into(),
                    window: TimeWindow::new(607 * MIN, 610 * MIN),
                },
                SubQuery {
                    tier: "b".into(),
                    window: TimeWindow::new(600 * MIN, 607 * MIN),
                },
            ]
        );
    }

    #[test]
    fn plan_skips_tiers_outside_window() {
        let now = 612 * MIN;
        let plan = router().plan(TimeWindow::new(608 * MIN, 610 * MIN), now);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].tier, "a");
        assert!(router().plan(TimeWindow::new(0, MIN), now).is_empty());
    }

    #[tokio::test]
    async fn empty_window_is_rejected() {
        let err = router()
            .query(TimeWindow::new(5, 5), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidWindow { .. }));
    }
}
