use std::sync::Arc;

use anyhow::Result;
use statsrollup::*;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

use collector::DockerCollector;
use history::TieredHistory;
use scheduler::{Scheduler, SchedulerConfig};
use store::SqliteStore;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    let catalog = Arc::new(app_config.catalog()?);
    tracing::info!(
        tiers = catalog.len(),
        raw = %catalog.raw().id,
        "tier catalog loaded"
    );

    let store = Arc::new(
        SqliteStore::connect(&app_config.database.path, app_config.database.max_pool_size).await?,
    );
    store.init().await?;

    let source = if app_config.collector.enabled {
        match DockerCollector::connect() {
            Ok(c) => Some(Arc::new(c)),
            Err(e) => {
                tracing::warn!(error = %e, "docker unavailable; raw sampling disabled");
                None
            }
        }
    } else {
        None
    };

    let history = TieredHistory::new(catalog, store, app_config.rollup_settings());
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let scheduler = Scheduler::new(
        history.clone(),
        source.clone(),
        SchedulerConfig {
            sample_interval_ms: app_config.collector.sample_interval_ms,
            cleanup_interval_ms: app_config.cleanup_interval_ms()?,
            vacuum_schedule: app_config.database.vacuum_schedule.clone(),
            vacuum_interval_secs: app_config.database.vacuum_interval_secs,
        },
    );
    let scheduler_handle = scheduler.spawn(shutdown_rx);

    let app = routes::app(history, source, app_config.server.api_token.clone());
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Received shutdown signal");
    let _ = shutdown_tx.send(());
    let _ = scheduler_handle.await;
    Ok(())
}
