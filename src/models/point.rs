// Time series points as stored per tier.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::MetricSample;

/// Entity id (container name) -> sample.
pub type EntityMap = BTreeMap<String, MetricSample>;

/// Store-assigned record id.
pub type RecordId = i64;

fn default_count() -> u32 {
    1
}

/// How a point was produced. Rolled-up points carry the number of observations
/// folded into their running average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "aggregationType", rename_all = "lowercase")]
pub enum Aggregation {
    Raw,
    Average {
        #[serde(default = "default_count")]
        count: u32,
    },
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Raw => "raw",
            Aggregation::Average { .. } => "average",
        }
    }

    pub fn count(&self) -> Option<u32> {
        match self {
            Aggregation::Raw => None,
            Aggregation::Average { count } => Some(*count),
        }
    }

    /// Rebuild from stored columns. A missing or zero count on an average reads as 1.
    pub fn from_parts(kind: &str, count: Option<i64>) -> Option<Self> {
        match kind {
            "raw" => Some(Aggregation::Raw),
            "average" => Some(Aggregation::Average {
                count: count
                    .and_then(|c| u32::try_from(c).ok())
                    .filter(|c| *c > 0)
                    .unwrap_or_else(default_count),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointMetadata {
    pub resolution: String,
    #[serde(flatten)]
    pub aggregation: Aggregation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub entities: EntityMap,
    pub metadata: PointMetadata,
}

impl TimeSeriesPoint {
    pub fn raw(timestamp: i64, resolution: &str, entities: EntityMap) -> Self {
        Self {
            timestamp,
            entities,
            metadata: PointMetadata {
                resolution: resolution.to_string(),
                aggregation: Aggregation::Raw,
            },
        }
    }

    pub fn average(timestamp: i64, resolution: &str, entities: EntityMap, count: u32) -> Self {
        Self {
            timestamp,
            entities,
            metadata: PointMetadata {
                resolution: resolution.to_string(),
                aggregation: Aggregation::Average { count },
            },
        }
    }

    /// Observations represented by this point; raw points count as one.
    pub fn observation_count(&self) -> u32 {
        self.metadata.aggregation.count().unwrap_or(1)
    }
}

/// A point together with the id the store assigned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPoint {
    pub id: RecordId,
    pub point: TimeSeriesPoint,
}

/// Half-open absolute time range `[start, end)` in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn intersect(&self, other: &TimeWindow) -> Option<TimeWindow> {
        let w = TimeWindow {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        };
        (!w.is_empty()).then_some(w)
    }
}
