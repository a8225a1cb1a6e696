// Tier catalog: ordered resolution/retention tiers, validated once at load into a
// source -> destination chain.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::duration::{DurationError, parse_duration_strict};

/// Tier definition as written in config (duration strings).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSpec {
    pub id: String,
    pub resolution: String,
    pub retention: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
}

impl TierSpec {
    pub fn new(
        id: &str,
        resolution: &str,
        retention: &str,
        start_from: Option<&str>,
        until: Option<&str>,
    ) -> Self {
        Self {
            id: id.to_string(),
            resolution: resolution.to_string(),
            retention: retention.to_string(),
            start_from: start_from.map(str::to_string),
            until: until.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("tier catalog is empty")]
    Empty,
    #[error("duplicate tier id {0:?}")]
    DuplicateId(String),
    #[error("tier {tier:?}: invalid {field}: {source}")]
    InvalidDuration {
        tier: String,
        field: &'static str,
        #[source]
        source: DurationError,
    },
    #[error("tier {0:?}: resolution must be > 0")]
    ZeroResolution(String),
    #[error("tier {0:?}: retention must be > 0")]
    ZeroRetention(String),
    #[error("tier {0:?}: until must be greater than start_from")]
    EmptyCoverage(String),
    #[error("tier {0:?}: retention must be >= until")]
    RetentionShorterThanUntil(String),
    #[error("tier {0:?}: first tier must start at age 0")]
    FirstTierStartsLate(String),
    #[error("tier {0:?}: only the last tier may omit until")]
    UnboundedNotLast(String),
    #[error("tiers {previous:?} and {next:?} do not tile: until {until_ms}ms != start_from {start_from_ms}ms")]
    Gap {
        previous: String,
        next: String,
        until_ms: i64,
        start_from_ms: i64,
    },
}

/// Resolved tier: durations in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    pub id: String,
    /// Resolution as configured ("5m"); written into point metadata.
    pub resolution: String,
    pub resolution_ms: i64,
    pub retention_ms: i64,
    pub start_from_ms: Option<i64>,
    pub until_ms: Option<i64>,
}

fn strict(tier: &str, field: &'static str, value: &str) -> Result<i64, CatalogError> {
    parse_duration_strict(value).map_err(|source| CatalogError::InvalidDuration {
        tier: tier.to_string(),
        field,
        source,
    })
}

impl Tier {
    pub fn from_spec(spec: &TierSpec) -> Result<Self, CatalogError> {
        let id = spec.id.as_str();
        let resolution_ms = strict(id, "resolution", &spec.resolution)?;
        let retention_ms = strict(id, "retention", &spec.retention)?;
        let start_from_ms = spec
            .start_from
            .as_deref()
            .map(|s| strict(id, "start_from", s))
            .transpose()?;
        let until_ms = spec
            .until
            .as_deref()
            .map(|s| strict(id, "until", s))
            .transpose()?;

        if resolution_ms <= 0 {
            return Err(CatalogError::ZeroResolution(spec.id.clone()));
        }
        if retention_ms <= 0 {
            return Err(CatalogError::ZeroRetention(spec.id.clone()));
        }
        if let Some(until) = until_ms {
            if until <= start_from_ms.unwrap_or(0) {
                return Err(CatalogError::EmptyCoverage(spec.id.clone()));
            }
            if retention_ms < until {
                return Err(CatalogError::RetentionShorterThanUntil(spec.id.clone()));
            }
        }

        Ok(Self {
            id: spec.id.clone(),
            resolution: spec.resolution.clone(),
            resolution_ms,
            retention_ms,
            start_from_ms,
            until_ms,
        })
    }

    /// Youngest age this tier is authoritative for (0 when start_from is omitted).
    pub fn start_age_ms(&self) -> i64 {
        self.start_from_ms.unwrap_or(0)
    }

    /// Absolute coverage `[now - until, now - start_from)`; unbounded below when until is omitted.
    pub fn coverage(&self, now: i64) -> (i64, i64) {
        let start = match self.until_ms {
            Some(until) => now - until,
            None => i64::MIN,
        };
        (start, now - self.start_age_ms())
    }
}

/// Validated, ordered chain of tiers. Built once; `source_of` is a lookup, not a scan.
#[derive(Debug, Clone)]
pub struct TierCatalog {
    tiers: Vec<Tier>,
    sources: Vec<Option<usize>>,
}

impl TierCatalog {
    pub fn from_specs(specs: &[TierSpec]) -> Result<Self, CatalogError> {
        let tiers = specs
            .iter()
            .map(Tier::from_spec)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_tiers(tiers)
    }

    pub fn from_tiers(tiers: Vec<Tier>) -> Result<Self, CatalogError> {
        let Some(first) = tiers.first() else {
            return Err(CatalogError::Empty);
        };
        if first.start_age_ms() != 0 {
            return Err(CatalogError::FirstTierStartsLate(first.id.clone()));
        }

        for (i, tier) in tiers.iter().enumerate() {
            if tiers[..i].iter().any(|t| t.id == tier.id) {
                return Err(CatalogError::DuplicateId(tier.id.clone()));
            }
        }

        for pair in tiers.windows(2) {
            let (previous, next) = (&pair[0], &pair[1]);
            let Some(until_ms) = previous.until_ms else {
                return Err(CatalogError::UnboundedNotLast(previous.id.clone()));
            };
            let start_from_ms = next.start_age_ms();
            if until_ms != start_from_ms {
                return Err(CatalogError::Gap {
                    previous: previous.id.clone(),
                    next: next.id.clone(),
                    until_ms,
                    start_from_ms,
                });
            }
        }

        let sources = tiers
            .iter()
            .enumerate()
            .map(|(i, dest)| {
                if i == 0 {
                    return None;
                }
                let start = dest.start_age_ms();
                tiers.iter().position(|t| t.until_ms == Some(start))
            })
            .collect();

        Ok(Self { tiers, sources })
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Finest tier; the collector writes here.
    pub fn raw(&self) -> &Tier {
        &self.tiers[0]
    }

    pub fn get(&self, id: &str) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.id == id)
    }

    pub fn source_of(&self, index: usize) -> Option<&Tier> {
        self.sources
            .get(index)
            .copied()
            .flatten()
            .map(|i| &self.tiers[i])
    }

    /// (source, destination) pairs in catalog order.
    pub fn adjacencies(&self) -> impl Iterator<Item = (&Tier, &Tier)> {
        self.tiers
            .iter()
            .enumerate()
            .filter_map(|(i, dest)| self.source_of(i).map(|src| (src, dest)))
    }
}

/// Built-in catalog: 10s raw data for an hour, progressively coarser out to 30 days.
pub fn default_specs() -> Vec<TierSpec> {
    vec![
        TierSpec::new("stats_realtime", "10s", "1h", None, Some("1h")),
        TierSpec::new("stats_5m", "5m", "6h", Some("1h"), Some("3h")),
        TierSpec::new("stats_10m", "10m", "6h", Some("3h"), Some("6h")),
        TierSpec::new("stats_15m", "15m", "12h", Some("6h"), Some("12h")),
        TierSpec::new("stats_30m", "30m", "24h", Some("12h"), Some("24h")),
        TierSpec::new("stats_1h", "1h", "48h", Some("24h"), Some("48h")),
        TierSpec::new("stats_3h", "3h", "96h", Some("48h"), Some("96h")),
        TierSpec::new("stats_6h", "6h", "7d", Some("96h"), Some("7d")),
        TierSpec::new("stats_9h", "9h", "14d", Some("7d"), Some("14d")),
        TierSpec::new("stats_12h", "12h", "30d", Some("14d"), Some("30d")),
    ]
}
