// Background scheduler: every sample interval run one cycle {raw sample write,
// rollup pass, retention pass when on a cleanup boundary}. Single-flight: a tick
// that fires while a cycle is still running is dropped.
// VACUUM runs on a configurable schedule (cron expression or fixed interval).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

use crate::bucket::is_on_boundary;
use crate::collector::SampleSource;
use crate::history::TieredHistory;
use crate::models::RecordId;
use crate::retention::TierSweepReport;
use crate::rollup::TierRollupReport;
use crate::store::PointStore;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub sample_interval_ms: u64,
    pub cleanup_interval_ms: i64,
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * *" = 03:00 daily). Uses local time.
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    pub vacuum_interval_secs: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub recorded: Option<RecordId>,
    pub rollups: Vec<TierRollupReport>,
    /// None when this cycle was not on a cleanup boundary.
    pub sweeps: Option<Vec<TierSweepReport>>,
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle held the guard.
    Skipped,
}

pub struct Scheduler<S, C> {
    history: TieredHistory<S>,
    source: Option<Arc<C>>,
    config: SchedulerConfig,
    guard: Arc<Mutex<()>>,
}

impl<S, C> Clone for Scheduler<S, C> {
    fn clone(&self) -> Self {
        Self {
            history: self.history.clone(),
            source: self.source.clone(),
            config: self.config.clone(),
            guard: self.guard.clone(),
        }
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl<S: PointStore, C: SampleSource> Scheduler<S, C> {
    /// `source` None disables raw sampling; rollup and retention still run.
    pub fn new(history: TieredHistory<S>, source: Option<Arc<C>>, config: SchedulerConfig) -> Self {
        Self {
            history,
            source,
            config,
            guard: Arc::new(Mutex::new(())),
        }
    }

    /// Runs one cycle unless one is already in flight.
    pub async fn try_cycle(&self, now: i64) -> CycleOutcome {
        let Ok(_guard) = self.guard.clone().try_lock_owned() else {
            debug!(now, "previous cycle still running; tick dropped");
            return CycleOutcome::Skipped;
        };
        CycleOutcome::Completed(self.cycle(now).await)
    }

    #[instrument(skip(self))]
    async fn cycle(&self, now: i64) -> CycleReport {
        let recorded = self.record(now).await;
        let rollups = self.history.aggregate_cycle(now).await;
        let tolerance = i64::try_from(self.config.sample_interval_ms).unwrap_or(i64::MAX);
        let sweeps = if is_on_boundary(now, self.config.cleanup_interval_ms, tolerance) {
            Some(self.history.cleanup_expired(now).await)
        } else {
            None
        };
        CycleReport {
            recorded,
            rollups,
            sweeps,
        }
    }

    async fn record(&self, now: i64) -> Option<RecordId> {
        let source = self.source.as_ref()?;
        let entities = match source.collect().await {
            Ok(entities) => entities,
            Err(e) => {
                warn!(error = %e, "sample collection failed");
                return None;
            }
        };
        match self.history.record_sample(now, entities).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "raw sample write failed");
                None
            }
        }
    }

    /// One rollup and retention pass, so data that aged while the process was down
    /// moves before the first tick. Waits for the guard instead of skipping.
    pub async fn backfill(&self, now: i64) {
        let _guard = self.guard.lock().await;
        let rollups = self.history.aggregate_cycle(now).await;
        let sweeps = self.history.cleanup_expired(now).await;
        info!(
            tiers_rolled = rollups.iter().filter(|r| r.moved_anything()).count(),
            expired = sweeps.iter().map(|s| s.deleted).sum::<u64>(),
            "backfill complete"
        );
    }

    /// Spawns the scheduler loop. Sending on (or dropping) the shutdown sender stops the
    /// timer; an in-flight cycle finishes before the task exits.
    pub fn spawn(self, shutdown_rx: oneshot::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown_rx).await;
        })
    }

    #[instrument(skip(self, shutdown_rx), fields(interval_ms = self.config.sample_interval_ms))]
    async fn run(self, mut shutdown_rx: oneshot::Receiver<()>) {
        self.backfill(now_ms()).await;

        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.sample_interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let (vacuum_tx, mut vacuum_rx) = mpsc::channel::<()>(1);
        let vacuum_task = tokio::spawn(vacuum_scheduler(self.config.clone(), vacuum_tx));

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {
                    let scheduler = self.clone();
                    tokio::spawn(async move {
                        scheduler.try_cycle(now_ms()).await;
                    });
                }
                Some(()) = vacuum_rx.recv() => {
                    if let Err(e) = self.history.store().vacuum().await {
                        warn!(error = %e, "vacuum failed");
                    } else {
                        info!("vacuum complete");
                    }
                }
            }
        }

        vacuum_task.abort();
        let _drain = self.guard.lock().await;
        info!("scheduler stopped");
    }
}

/// Sends a message on `tx` at each VACUUM time (cron or fixed interval). Uses local time for cron.
async fn vacuum_scheduler(config: SchedulerConfig, tx: mpsc::Sender<()>) {
    if let Some(ref cron_str) = config.vacuum_schedule {
        let Ok(schedule) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid vacuum_schedule; VACUUM will not run");
            return;
        };
        loop {
            let now = chrono::Local::now();
            if let Some(next) = schedule.after(&now).next() {
                let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(delay).await;
                if tx.send(()).await.is_err() {
                    break;
                }
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    } else {
        let interval = Duration::from_secs(config.vacuum_interval_secs.max(1));
        loop {
            tokio::time::sleep(interval).await;
            if tx.send(()).await.is_err() {
                break;
            }
        }
    }
}
