// Docker container stats via bollard: one non-streaming reading per running container.

use std::collections::HashMap;

use bollard::Docker;
use bollard::query_parameters::{ListContainersOptions, StatsOptions};
use bollard::models::ContainerStatsResponse;
use futures_util::StreamExt;
use futures_util::future::join_all;
use tracing::{debug, warn};

use super::SampleSource;
use crate::models::{EntityMap, MetricSample};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub struct DockerCollector {
    docker: Docker,
}

impl DockerCollector {
    pub fn connect() -> anyhow::Result<Self> {
        let docker = Docker::connect_with_unix_defaults()?;
        Ok(Self { docker })
    }

    /// (id, name) of every running container.
    async fn running(&self) -> anyhow::Result<Vec<(String, String)>> {
        let mut filters = HashMap::new();
        filters.insert("status".to_string(), vec!["running".to_string()]);
        let options = ListContainersOptions {
            all: false,
            filters: Some(filters),
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = c
                    .names
                    .as_ref()
                    .and_then(|n| n.first())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_else(|| id.clone());
                Some((id, name))
            })
            .collect())
    }

    async fn sample(&self, id: &str, name: &str) -> Option<MetricSample> {
        let options = StatsOptions {
            stream: false,
            ..Default::default()
        };
        let mut stream = self.docker.stats(id, Some(options));
        match stream.next().await {
            Some(Ok(s)) => process_statistics(&s, name),
            Some(Err(e)) => {
                warn!(error = %e, container = %name, "stats read failed");
                None
            }
            None => {
                debug!(container = %name, "stats stream closed without a reading");
                None
            }
        }
    }
}

impl SampleSource for DockerCollector {
    async fn collect(&self) -> anyhow::Result<EntityMap> {
        let running = self.running().await?;
        let samples = join_all(running.iter().map(|(id, name)| self.sample(id, name))).await;
        Ok(samples
            .into_iter()
            .flatten()
            .map(|s| (s.name.clone(), s))
            .collect())
    }
}

fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// Sums blkio entries whose op matches `op` (case-insensitive).
fn blkio_total(s: &ContainerStatsResponse, op: &str) -> u64 {
    s.blkio_stats
        .as_ref()
        .and_then(|b| b.io_service_bytes_recursive.as_ref())
        .map_or(0, |entries| {
            entries
                .iter()
                .filter(|e| e.op.as_ref().is_some_and(|o| o.eq_ignore_ascii_case(op)))
                .map(|e| e.value.unwrap_or(0))
                .sum()
        })
}

/// Raw Docker stats -> MetricSample (sizes in MB). None when cpu counters are missing.
pub(crate) fn process_statistics(s: &ContainerStatsResponse, name: &str) -> Option<MetricSample> {
    let cpu_stats = s.cpu_stats.as_ref()?;
    let precpu_stats = s.precpu_stats.as_ref()?;
    let cpu_usage = cpu_stats.cpu_usage.as_ref()?;
    let precpu_usage = precpu_stats.cpu_usage.as_ref()?;

    let cpu_delta =
        cpu_usage.total_usage.unwrap_or(0) as i64 - precpu_usage.total_usage.unwrap_or(0) as i64;
    let system_delta = cpu_stats.system_cpu_usage.unwrap_or(0) as i64
        - precpu_stats.system_cpu_usage.unwrap_or(0) as i64;
    let online = cpu_stats.online_cpus.unwrap_or(1) as f64;
    let cpu_percent = if system_delta > 0 && online > 0.0 {
        (cpu_delta as f64 / system_delta as f64) * online * 100.0
    } else {
        0.0
    };

    let mem_usage = s.memory_stats.as_ref().and_then(|m| m.usage).unwrap_or(0);
    let mem_limit = s.memory_stats.as_ref().and_then(|m| m.limit).unwrap_or(0);
    let memory_percent = if mem_limit > 0 {
        mem_usage as f64 / mem_limit as f64 * 100.0
    } else {
        0.0
    };

    let (rx, tx) = s.networks.as_ref().map_or((0u64, 0u64), |n| {
        n.values().fold((0, 0), |(rx, tx), v| {
            (rx + v.rx_bytes.unwrap_or(0), tx + v.tx_bytes.unwrap_or(0))
        })
    });

    Some(MetricSample {
        name: name.to_string(),
        cpu_percent,
        memory_usage: to_mb(mem_usage),
        memory_limit: to_mb(mem_limit),
        memory_percent,
        net_io_in: to_mb(rx),
        net_io_out: to_mb(tx),
        block_io_in: to_mb(blkio_total(s, "read")),
        block_io_out: to_mb(blkio_total(s, "write")),
        pids: s.pids_stats.as_ref().and_then(|p| p.current).unwrap_or(0),
    })
}
