use std::str::FromStr;

use serde::Deserialize;

use crate::duration::parse_duration_strict;
use crate::rollup::RollupSettings;
use crate::store::MAX_PAGE_SIZE;
use crate::tiers::{TierCatalog, TierSpec, default_specs};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Ordered finest to coarsest. Omitted -> built-in catalog.
    #[serde(default = "default_specs")]
    pub tiers: Vec<TierSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// When set, /api routes require `Authorization: Bearer <token>`.
    #[serde(default)]
    pub api_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * *"). Uses local time.
    #[serde(default)]
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    #[serde(default = "default_vacuum_interval_secs")]
    pub vacuum_interval_secs: u64,
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_vacuum_interval_secs() -> u64 {
    86_400
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            enabled: true,
        }
    }
}

fn default_sample_interval_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Retention runs on cycles that land on a multiple of this duration.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: String,
    #[serde(default = "default_delete_batch_size")]
    pub delete_batch_size: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: default_cleanup_interval(),
            delete_batch_size: default_delete_batch_size(),
        }
    }
}

fn default_cleanup_interval() -> String {
    "5m".into()
}

fn default_delete_batch_size() -> usize {
    50
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn catalog(&self) -> anyhow::Result<TierCatalog> {
        TierCatalog::from_specs(&self.tiers).map_err(|e| anyhow::anyhow!("tiers: {e}"))
    }

    pub fn cleanup_interval_ms(&self) -> anyhow::Result<i64> {
        parse_duration_strict(&self.retention.cleanup_interval)
            .map_err(|e| anyhow::anyhow!("retention.cleanup_interval: {e}"))
    }

    pub fn rollup_settings(&self) -> RollupSettings {
        RollupSettings {
            page_size: self.database.page_size,
            delete_batch_size: self.retention.delete_batch_size,
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            self.server.api_token.as_deref().is_none_or(|t| !t.is_empty()),
            "server.api_token must be non-empty when set"
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            (1..=MAX_PAGE_SIZE).contains(&self.database.page_size),
            "database.page_size must be between 1 and {}, got {}",
            MAX_PAGE_SIZE,
            self.database.page_size
        );
        if let Some(schedule) = &self.database.vacuum_schedule {
            cron::Schedule::from_str(schedule)
                .map_err(|e| anyhow::anyhow!("database.vacuum_schedule {schedule:?}: {e}"))?;
        }
        anyhow::ensure!(
            self.database.vacuum_interval_secs > 0,
            "database.vacuum_interval_secs must be > 0, got {}",
            self.database.vacuum_interval_secs
        );
        anyhow::ensure!(
            self.collector.sample_interval_ms > 0,
            "collector.sample_interval_ms must be > 0, got {}",
            self.collector.sample_interval_ms
        );
        anyhow::ensure!(
            self.retention.delete_batch_size > 0,
            "retention.delete_batch_size must be > 0, got {}",
            self.retention.delete_batch_size
        );
        let cleanup_ms = self.cleanup_interval_ms()?;
        anyhow::ensure!(
            cleanup_ms > 0,
            "retention.cleanup_interval must be > 0, got {:?}",
            self.retention.cleanup_interval
        );
        self.catalog()?;
        Ok(())
    }
}
