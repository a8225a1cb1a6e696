// Shared test helpers

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use statsrollup::collector::SampleSource;
use statsrollup::models::{EntityMap, MetricSample, TimeSeriesPoint};
use statsrollup::tiers::{Tier, TierSpec};
use tokio::sync::Notify;

/// 2024-05-01 10:00:00.000 UTC
pub const T10_00: i64 = 1_714_557_600_000;
pub const SEC: i64 = 1_000;
pub const MIN: i64 = 60 * SEC;
pub const HOUR: i64 = 60 * MIN;

pub fn sample(name: &str, cpu: f64) -> MetricSample {
    MetricSample {
        cpu_percent: cpu,
        memory_usage: 100.0,
        memory_limit: 2048.0,
        pids: 4,
        ..MetricSample::named(name)
    }
}

pub fn entities(values: &[(&str, f64)]) -> EntityMap {
    values
        .iter()
        .map(|(name, cpu)| (name.to_string(), sample(name, *cpu)))
        .collect()
}

pub fn raw_point(timestamp: i64, values: &[(&str, f64)]) -> TimeSeriesPoint {
    TimeSeriesPoint::raw(timestamp, "10s", entities(values))
}

pub fn tier(
    id: &str,
    resolution: &str,
    retention: &str,
    start_from: Option<&str>,
    until: Option<&str>,
) -> Tier {
    Tier::from_spec(&TierSpec::new(id, resolution, retention, start_from, until)).unwrap()
}

/// Returns a fixed sample set, or fails when built with `failing()`.
pub struct FakeSource {
    entities: EntityMap,
    fail: bool,
    pub calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(entities: EntityMap) -> Self {
        Self {
            entities,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            entities: EntityMap::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }
}

impl SampleSource for FakeSource {
    async fn collect(&self) -> anyhow::Result<EntityMap> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("collector offline");
        }
        Ok(self.entities.clone())
    }
}

/// Parks inside `collect` until released, so a cycle can be held open.
pub struct GatedSource {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl GatedSource {
    pub fn new() -> Self {
        Self {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }
}

impl SampleSource for GatedSource {
    async fn collect(&self) -> anyhow::Result<EntityMap> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(entities(&[("web", 1.0)]))
    }
}
