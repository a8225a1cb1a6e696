// Domain models: samples, points, windows.

mod point;
mod sample;

pub use point::{
    Aggregation, EntityMap, PointMetadata, RecordId, StoredPoint, TimeSeriesPoint, TimeWindow,
};
pub use sample::MetricSample;
