// Sample sources: one reading per entity each time the scheduler asks.

pub mod docker;

use std::future::Future;

use crate::models::EntityMap;

pub use docker::DockerCollector;

/// Produces one sample per entity. An error skips the raw write for that cycle only.
pub trait SampleSource: Send + Sync + 'static {
    fn collect(&self) -> impl Future<Output = anyhow::Result<EntityMap>> + Send;
}
