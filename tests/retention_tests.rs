// Retention sweep tests

mod common;

use std::sync::Arc;

use common::*;
use statsrollup::retention::RetentionSweeper;
use statsrollup::store::{InMemoryStore, PointStore};
use statsrollup::tiers::{TierCatalog, default_specs};

#[tokio::test]
async fn sweep_removes_only_expired_records_and_is_idempotent() {
    let store = Arc::new(InMemoryStore::new());
    let now = T10_00 + 10 * HOUR;
    store
        .create("stats_realtime", &raw_point(now - 2 * HOUR, &[("web", 1.0)]))
        .await
        .unwrap();
    store
        .create("stats_realtime", &raw_point(now - 30 * MIN, &[("web", 2.0)]))
        .await
        .unwrap();
    store
        .create("stats_30m", &raw_point(now - 20 * HOUR, &[("web", 3.0)]))
        .await
        .unwrap();
    let catalog = Arc::new(TierCatalog::from_specs(&default_specs()).unwrap());
    let sweeper = RetentionSweeper::new(catalog.clone(), store.clone());

    let first = sweeper.sweep(now).await;
    assert_eq!(first.len(), catalog.len());
    assert_eq!(first.iter().map(|r| r.deleted).sum::<u64>(), 1);
    assert_eq!(first[0].cutoff, now - HOUR);
    assert_eq!(store.records("stats_realtime").len(), 1);
    assert_eq!(store.records("stats_30m").len(), 1);

    let second = sweeper.sweep(now).await;
    assert_eq!(second.iter().map(|r| r.deleted).sum::<u64>(), 0);
    assert_eq!(store.records("stats_realtime").len(), 1);
}
