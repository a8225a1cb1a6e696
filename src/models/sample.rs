// Per-entity resource usage sample (one container at one tick).

use serde::{Deserialize, Serialize};
use wincode::{SchemaRead, SchemaWrite};

/// Sizes are in MB. `memory_limit` is constant for an entity and is never averaged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub name: String,
    #[serde(default)]
    pub cpu_percent: f64,
    #[serde(default)]
    pub memory_usage: f64,
    #[serde(default)]
    pub memory_limit: f64,
    #[serde(default)]
    pub memory_percent: f64,
    #[serde(default)]
    pub net_io_in: f64,
    #[serde(default)]
    pub net_io_out: f64,
    #[serde(default)]
    pub block_io_in: f64,
    #[serde(default)]
    pub block_io_out: f64,
    #[serde(default)]
    pub pids: u64,
}

impl MetricSample {
    /// Sample with every gauge at zero; handy as a starting point for builders.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cpu_percent: 0.0,
            memory_usage: 0.0,
            memory_limit: 0.0,
            memory_percent: 0.0,
            net_io_in: 0.0,
            net_io_out: 0.0,
            block_io_in: 0.0,
            block_io_out: 0.0,
            pids: 0,
        }
    }
}
